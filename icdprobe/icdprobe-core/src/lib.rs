//! icdprobe: drives a Vulkan ICD directly, without the system loader.
//!
//! The driver shared object is opened with [`loader::Driver`], its entry points are resolved into
//! explicit per-scope [`dispatch::ProcTable`]s, and a [`session::Session`] walks the bootstrap
//! sequence up to a usable device. [`scenario::run`] then runs one resource scenario on that device
//! and tears everything down in class order.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod probe;
pub mod scenario;
pub mod session;

#[cfg(test)]
mod fake_icd;

pub use config::{DeviceProfile, DeviceSelection, HarnessConfig, InstanceMode};
pub use error::{ErrorClass, HarnessError};
pub use loader::Driver;
pub use scenario::{run, run_with_driver, RunReport, Scenario, Verification};
pub use session::{BootstrapState, Session, TeardownReport};
