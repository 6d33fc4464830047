use super::{check_copy_region, transfer_barrier, Scenario, Verification, BUFFER_COMMANDS};
use crate::error::HarnessError;
use crate::session::{BoundBuffer, BufferUsage, MemoryLocation, Session};
use ash::vk;
use std::ffi::CStr;

/// Two device-local sources with distinct patterns, copied side by side into one host-visible
/// destination.
#[derive(Debug, Clone)]
pub struct MultiCopy {
    /// Bytes per source; the destination holds both.
    pub half: u64,
    pub patterns: [u32; 2],
    sources: Vec<BoundBuffer>,
    dst: Option<BoundBuffer>,
}

impl Default for MultiCopy {
    fn default() -> Self {
        Self::new(512, [0x1111_1111, 0x2222_2222])
    }
}

impl MultiCopy {
    pub fn new(half: u64, patterns: [u32; 2]) -> Self {
        Self {
            half,
            patterns,
            sources: Vec::new(),
            dst: None,
        }
    }

    fn regions(&self) -> [vk::BufferCopy; 2] {
        [0, 1].map(|i| vk::BufferCopy {
            src_offset: 0,
            dst_offset: i * self.half,
            size: self.half,
        })
    }

    fn destination(&self) -> Result<&BoundBuffer, HarnessError> {
        self.dst.as_ref().ok_or(HarnessError::Verification {
            scenario: "multi_copy",
            detail: "destination was never built".into(),
        })
    }
}

impl Scenario for MultiCopy {
    fn name(&self) -> &'static str {
        "multi_copy"
    }

    fn required_commands(&self) -> &'static [&'static CStr] {
        &[c"vkCmdFillBuffer", c"vkCmdCopyBuffer", c"vkCmdPipelineBarrier"]
    }

    fn required_command_sets(&self) -> &'static [&'static [&'static CStr]] {
        &[BUFFER_COMMANDS]
    }

    fn build(&mut self, session: &mut Session) -> Result<(), HarnessError> {
        if self.half == 0 || self.half % 4 != 0 {
            return Err(HarnessError::Config(format!(
                "copy size must be a non-zero multiple of 4, got {}",
                self.half
            )));
        }
        let total = self.half * 2;
        for region in self.regions() {
            check_copy_region(&region, self.half, total)?;
        }
        for _ in 0..2 {
            let source = session.create_buffer(
                self.half,
                BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                MemoryLocation::DeviceLocal,
            )?;
            self.sources.push(source);
        }
        self.dst = Some(session.create_buffer(total, BufferUsage::COPY_DST, MemoryLocation::HostVisible)?);
        Ok(())
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, _pass: u32) -> Result<(), HarnessError> {
        let dst = self.destination()?;
        unsafe {
            for (source, pattern) in self.sources.iter().zip(self.patterns) {
                device.cmd_fill_buffer(cmd, source.buffer, 0, vk::WHOLE_SIZE, pattern);
            }
            transfer_barrier(device, cmd, vk::AccessFlags::TRANSFER_READ);
            for (source, region) in self.sources.iter().zip(self.regions()) {
                device.cmd_copy_buffer(cmd, source.buffer, dst.buffer, &[region]);
            }
            transfer_barrier(device, cmd, vk::AccessFlags::HOST_READ);
        }
        Ok(())
    }

    fn verify(&mut self, session: &Session, _pass: u32) -> Result<Verification, HarnessError> {
        let dst = self.destination()?;
        let words = session.read_buffer_words(dst, 0, dst.size)?;
        let (first, second) = words.split_at(words.len() / 2);
        let half_words = first.len();
        Ok(Verification::compare_words(0, first, self.patterns[0])
            .merge(Verification::compare_words(half_words, second, self.patterns[1])))
    }
}
