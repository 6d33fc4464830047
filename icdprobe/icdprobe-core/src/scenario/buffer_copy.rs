use super::{transfer_barrier, Scenario, Verification, BUFFER_COMMANDS};
use crate::error::HarnessError;
use crate::session::{BoundBuffer, BufferUsage, MemoryLocation, Session};
use ash::vk;
use std::ffi::CStr;

/// Reject a copy region that does not fit inside both buffers. Regions are never clamped.
pub fn check_copy_region(region: &vk::BufferCopy, src_size: u64, dst_size: u64) -> Result<(), HarnessError> {
    let out_of_range = || HarnessError::CopyOutOfRange {
        src_offset: region.src_offset,
        dst_offset: region.dst_offset,
        size: region.size,
        src_size,
        dst_size,
    };
    let src_end = region.src_offset.checked_add(region.size).ok_or_else(out_of_range)?;
    let dst_end = region.dst_offset.checked_add(region.size).ok_or_else(out_of_range)?;
    if region.size == 0 || src_end > src_size || dst_end > dst_size {
        return Err(out_of_range());
    }
    Ok(())
}

/// Fill a device-local source, copy it into a host-visible destination and read that back.
#[derive(Debug, Clone)]
pub struct BufferCopy {
    pub size: u64,
    pub pattern: u32,
    /// Full range when `None`.
    pub region: Option<vk::BufferCopy>,
    src: Option<BoundBuffer>,
    dst: Option<BoundBuffer>,
}

impl Default for BufferCopy {
    fn default() -> Self {
        Self::new(4096, 0xCAFE_BABE)
    }
}

impl BufferCopy {
    pub fn new(size: u64, pattern: u32) -> Self {
        Self {
            size,
            pattern,
            region: None,
            src: None,
            dst: None,
        }
    }

    pub fn with_region(mut self, region: vk::BufferCopy) -> Self {
        self.region = Some(region);
        self
    }

    fn effective_region(&self) -> vk::BufferCopy {
        self.region.unwrap_or(vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: self.size,
        })
    }

    fn buffers(&self) -> Result<(&BoundBuffer, &BoundBuffer), HarnessError> {
        match (&self.src, &self.dst) {
            (Some(src), Some(dst)) => Ok((src, dst)),
            _ => Err(HarnessError::Verification {
                scenario: "buffer_copy",
                detail: "buffers were never built".into(),
            }),
        }
    }
}

impl Scenario for BufferCopy {
    fn name(&self) -> &'static str {
        "buffer_copy"
    }

    fn required_commands(&self) -> &'static [&'static CStr] {
        &[c"vkCmdFillBuffer", c"vkCmdCopyBuffer", c"vkCmdPipelineBarrier"]
    }

    fn required_command_sets(&self) -> &'static [&'static [&'static CStr]] {
        &[BUFFER_COMMANDS]
    }

    fn build(&mut self, session: &mut Session) -> Result<(), HarnessError> {
        let region = self.effective_region();
        check_copy_region(&region, self.size, self.size)?;
        if region.src_offset % 4 != 0 || region.dst_offset % 4 != 0 || region.size % 4 != 0 {
            return Err(HarnessError::Config(format!(
                "copy region must be word aligned: {:?}",
                region
            )));
        }
        self.src = Some(session.create_buffer(
            self.size,
            BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            MemoryLocation::DeviceLocal,
        )?);
        self.dst = Some(session.create_buffer(self.size, BufferUsage::COPY_DST, MemoryLocation::HostVisible)?);
        Ok(())
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, _pass: u32) -> Result<(), HarnessError> {
        let (src, dst) = self.buffers()?;
        let region = self.effective_region();
        check_copy_region(&region, src.size, dst.size)?;
        unsafe {
            device.cmd_fill_buffer(cmd, src.buffer, 0, vk::WHOLE_SIZE, self.pattern);
            transfer_barrier(device, cmd, vk::AccessFlags::TRANSFER_READ);
            device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
            transfer_barrier(device, cmd, vk::AccessFlags::HOST_READ);
        }
        Ok(())
    }

    fn verify(&mut self, session: &Session, _pass: u32) -> Result<Verification, HarnessError> {
        let (_, dst) = self.buffers()?;
        let region = self.effective_region();
        let words = session.read_buffer_words(dst, region.dst_offset, region.size)?;
        Ok(Verification::compare_words(
            (region.dst_offset / 4) as usize,
            &words,
            self.pattern,
        ))
    }
}
