use super::{Scenario, Verification};
use crate::error::HarnessError;
use crate::session::Session;
use ash::vk;

/// Submit a command buffer with nothing recorded and wait for its fence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubmit;

impl Scenario for EmptySubmit {
    fn name(&self) -> &'static str {
        "empty_submit"
    }

    fn build(&mut self, _session: &mut Session) -> Result<(), HarnessError> {
        Ok(())
    }

    fn record(&self, _device: &ash::Device, _cmd: vk::CommandBuffer, _pass: u32) -> Result<(), HarnessError> {
        Ok(())
    }

    fn verify(&mut self, _session: &Session, _pass: u32) -> Result<Verification, HarnessError> {
        Ok(Verification::unchecked())
    }
}
