//! Resource scenarios and the one runner that drives them.
//!
//! The runner owns bootstrap, the command pool, per-pass submission and teardown; a scenario only
//! builds its resources, records into the command buffer it is handed, and checks what came back.

mod buffer_copy;
mod buffer_fill;
mod empty_submit;
mod image_readback;
mod multi_copy;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::loader::Driver;
use crate::session::{BootstrapState, Session, TeardownReport};
use ash::vk;
use std::ffi::CStr;

pub use buffer_copy::{check_copy_region, BufferCopy};
pub use buffer_fill::BufferFill;
pub use empty_submit::EmptySubmit;
pub use image_readback::{ImageReadback, IMAGE_EXTENT, PNG_FILE_NAME};
pub use multi_copy::MultiCopy;

/// Mismatches kept per verification; the rest are only counted.
pub const MAX_REPORTED_MISMATCHES: usize = 16;

/// Device commands every submitting scenario needs.
pub const SUBMIT_COMMANDS: &[&CStr] = &[
    c"vkCreateCommandPool",
    c"vkDestroyCommandPool",
    c"vkAllocateCommandBuffers",
    c"vkFreeCommandBuffers",
    c"vkResetCommandBuffer",
    c"vkBeginCommandBuffer",
    c"vkEndCommandBuffer",
    c"vkCreateFence",
    c"vkDestroyFence",
    c"vkQueueSubmit",
    c"vkWaitForFences",
];

/// Device commands needed to create, bind, read back and release memory-backed buffers.
pub const BUFFER_COMMANDS: &[&CStr] = &[
    c"vkCreateBuffer",
    c"vkDestroyBuffer",
    c"vkGetBufferMemoryRequirements",
    c"vkBindBufferMemory",
    c"vkAllocateMemory",
    c"vkFreeMemory",
    c"vkMapMemory",
    c"vkUnmapMemory",
];

pub trait Scenario {
    fn name(&self) -> &'static str;

    /// Device commands needed beyond [`SUBMIT_COMMANDS`], checked before anything is built.
    fn required_commands(&self) -> &'static [&'static CStr] {
        &[]
    }

    /// Command lists required as a whole, e.g. [`BUFFER_COMMANDS`].
    fn required_command_sets(&self) -> &'static [&'static [&'static CStr]] {
        &[]
    }

    /// Record → submit → wait → verify cycles to run on the same resources.
    fn passes(&self) -> u32 {
        1
    }

    /// Create and bind the scenario's resources.
    fn build(&mut self, session: &mut Session) -> Result<(), HarnessError>;

    /// Record into a command buffer that is already begun.
    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, pass: u32) -> Result<(), HarnessError>;

    /// Check the results of `pass`. Runs after its fence has signalled.
    fn verify(&mut self, session: &Session, pass: u32) -> Result<Verification, HarnessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Word index within the checked range.
    pub index: usize,
    pub expected: u32,
    pub actual: u32,
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
    pub total_mismatches: usize,
}

impl Verification {
    /// Nothing read back; success is the absence of a failed call.
    pub fn unchecked() -> Self {
        Self::default()
    }

    /// Compare every word against `expected`. Indices are reported from `first_index`.
    pub fn compare_words(first_index: usize, words: &[u32], expected: u32) -> Self {
        let mut verification = Self {
            checked: words.len(),
            ..Self::default()
        };
        for (i, &actual) in words.iter().enumerate() {
            if actual != expected {
                verification.total_mismatches += 1;
                if verification.mismatches.len() < MAX_REPORTED_MISMATCHES {
                    verification.mismatches.push(Mismatch {
                        index: first_index + i,
                        expected,
                        actual,
                    });
                }
            }
        }
        verification
    }

    pub fn merge(mut self, other: Verification) -> Self {
        self.checked += other.checked;
        self.total_mismatches += other.total_mismatches;
        let room = MAX_REPORTED_MISMATCHES.saturating_sub(self.mismatches.len());
        self.mismatches.extend(other.mismatches.into_iter().take(room));
        self
    }

    pub fn passed(&self) -> bool {
        self.total_mismatches == 0
    }
}

/// Everything one scenario run observed.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: &'static str,
    pub device_name: String,
    pub transitions: Vec<BootstrapState>,
    pub verifications: Vec<Verification>,
    pub teardown: TeardownReport,
}

impl RunReport {
    pub fn checked(&self) -> usize {
        self.verifications.iter().map(|v| v.checked).sum()
    }

    pub fn total_mismatches(&self) -> usize {
        self.verifications.iter().map(|v| v.total_mismatches).sum()
    }

    pub fn passed(&self) -> bool {
        self.verifications.iter().all(Verification::passed)
    }
}

/// Load the configured driver and run `scenario` against it.
pub fn run(config: &HarnessConfig, scenario: &mut dyn Scenario) -> Result<RunReport, HarnessError> {
    let driver = Driver::load(&config.driver_path, config.instance_mode.root_symbol())?;
    run_with_driver(driver, config, scenario)
}

/// Bootstrap `driver`, run every pass of `scenario`, then tear down. Teardown runs whatever the
/// passes did; a pass error wins over a teardown error.
pub fn run_with_driver(
    driver: Driver,
    config: &HarnessConfig,
    scenario: &mut dyn Scenario,
) -> Result<RunReport, HarnessError> {
    let mut session = Session::bootstrap(driver, config)?;
    let device_name = session
        .physical_device()
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let transitions = session.transitions().to_vec();
    log::info!("scenario {} on {}", scenario.name(), device_name);

    let executed = execute(&mut session, scenario);
    let teardown = session.teardown();
    let verifications = executed?;
    let teardown = teardown?;
    log::info!(
        "teardown released {} object(s)",
        teardown.released.len()
    );

    let report = RunReport {
        scenario: scenario.name(),
        device_name,
        transitions,
        verifications,
        teardown,
    };
    if !report.passed() {
        let detail = format!(
            "{} of {} word(s) differ",
            report.total_mismatches(),
            report.checked()
        );
        if config.strict_verification {
            return Err(HarnessError::Verification {
                scenario: report.scenario,
                detail,
            });
        }
        log::warn!("{}: {} (not strict, continuing)", report.scenario, detail);
    }
    Ok(report)
}

fn execute(session: &mut Session, scenario: &mut dyn Scenario) -> Result<Vec<Verification>, HarnessError> {
    session.require_device_commands(SUBMIT_COMMANDS)?;
    for set in scenario.required_command_sets() {
        session.require_device_commands(set)?;
    }
    session.require_device_commands(scenario.required_commands())?;

    scenario.build(session)?;
    let pool = session.create_command_pool()?;
    let cmd = session.allocate_command_buffer(pool)?;

    let mut verifications = Vec::new();
    for pass in 0..scenario.passes() {
        session.begin_recording(cmd)?;
        scenario.record(session.device()?, cmd, pass)?;
        session.end_recording(cmd)?;
        let fence = session.create_fence()?;
        session.submit(cmd, fence)?;
        session.wait_fence(fence)?;

        let verification = scenario.verify(session, pass)?;
        if verification.passed() {
            log::info!(
                "{} pass {}: {} word(s) verified",
                scenario.name(),
                pass,
                verification.checked
            );
        } else {
            for m in &verification.mismatches {
                log::error!(
                    "{} pass {}: word {} is {:#010x}, expected {:#010x}",
                    scenario.name(),
                    pass,
                    m.index,
                    m.actual,
                    m.expected
                );
            }
            log::error!(
                "{} pass {}: {} mismatch(es) in {} word(s)",
                scenario.name(),
                pass,
                verification.total_mismatches,
                verification.checked
            );
        }
        verifications.push(verification);
    }
    Ok(verifications)
}

/// Full-pipeline barrier between transfer writes and the following transfer or host access.
pub(crate) unsafe fn transfer_barrier(device: &ash::Device, cmd: vk::CommandBuffer, dst_access: vk::AccessFlags) {
    let barrier = vk::MemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(dst_access);
    let dst_stage = if dst_access.contains(vk::AccessFlags::HOST_READ) {
        vk::PipelineStageFlags::HOST
    } else {
        vk::PipelineStageFlags::TRANSFER
    };
    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::TRANSFER,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[barrier],
        &[],
        &[],
    );
}
