use super::{transfer_barrier, Scenario, Verification, BUFFER_COMMANDS};
use crate::error::HarnessError;
use crate::session::{BoundBuffer, BufferUsage, MemoryLocation, Session};
use ash::vk;
use std::ffi::CStr;

/// Fill a host-visible buffer with a 32-bit pattern and read every word back.
#[derive(Debug, Clone)]
pub struct BufferFill {
    /// Bytes; a multiple of 4.
    pub size: u64,
    pub pattern: u32,
    pub passes: u32,
    buffer: Option<BoundBuffer>,
}

impl Default for BufferFill {
    fn default() -> Self {
        Self::new(1024, 0xDEAD_BEEF)
    }
}

impl BufferFill {
    pub fn new(size: u64, pattern: u32) -> Self {
        Self {
            size,
            pattern,
            passes: 1,
            buffer: None,
        }
    }

    /// Repeat fill and readback on the same buffer.
    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes.max(1);
        self
    }

    fn buffer(&self) -> Result<&BoundBuffer, HarnessError> {
        self.buffer.as_ref().ok_or(HarnessError::Verification {
            scenario: "buffer_fill",
            detail: "buffer was never built".into(),
        })
    }
}

impl Scenario for BufferFill {
    fn name(&self) -> &'static str {
        "buffer_fill"
    }

    fn required_commands(&self) -> &'static [&'static CStr] {
        &[c"vkCmdFillBuffer", c"vkCmdPipelineBarrier"]
    }

    fn required_command_sets(&self) -> &'static [&'static [&'static CStr]] {
        &[BUFFER_COMMANDS]
    }

    fn passes(&self) -> u32 {
        self.passes
    }

    fn build(&mut self, session: &mut Session) -> Result<(), HarnessError> {
        if self.size == 0 || self.size % 4 != 0 {
            return Err(HarnessError::Config(format!(
                "fill size must be a non-zero multiple of 4, got {}",
                self.size
            )));
        }
        self.buffer = Some(session.create_buffer(self.size, BufferUsage::COPY_DST, MemoryLocation::HostVisible)?);
        Ok(())
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, _pass: u32) -> Result<(), HarnessError> {
        let buffer = self.buffer()?;
        unsafe {
            device.cmd_fill_buffer(cmd, buffer.buffer, 0, vk::WHOLE_SIZE, self.pattern);
            transfer_barrier(device, cmd, vk::AccessFlags::HOST_READ);
        }
        Ok(())
    }

    fn verify(&mut self, session: &Session, _pass: u32) -> Result<Verification, HarnessError> {
        let buffer = self.buffer()?;
        let words = session.read_buffer_words(buffer, 0, buffer.size)?;
        Ok(Verification::compare_words(0, &words, self.pattern))
    }
}
