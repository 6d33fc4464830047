//! Harness configuration: driver location, instance path, device selection, fence policy.

use crate::error::HarnessError;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Driver name substituted at build time (`ICDPROBE_LIBVK=foo` gives `libfoo.so`).
pub const DRIVER_NAME: &str = match option_env!("ICDPROBE_LIBVK") {
    Some(name) => name,
    None => "vulkan",
};

/// Build-output directory the driver is expected in.
pub const DRIVER_DIR: &str = "./zig-out/lib";

pub const STANDARD_ENTRY_POINT: &CStr = c"vkGetInstanceProcAddr";
pub const ICD_ENTRY_POINT: &CStr = c"vk_icdGetInstanceProcAddr";

/// How the instance is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstanceMode {
    /// Structure-type tag and application info only.
    #[default]
    Plain,
    /// Chain a `VK_LUNARG_direct_driver_loading` list holding the ICD entry point.
    DirectDriverLoading,
}

impl InstanceMode {
    /// Root symbol resolved from the driver library for this mode.
    pub fn root_symbol(self) -> &'static CStr {
        match self {
            InstanceMode::Plain => STANDARD_ENTRY_POINT,
            InstanceMode::DirectDriverLoading => ICD_ENTRY_POINT,
        }
    }
}

/// Physical device selection policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Index 0 of the enumeration.
    #[default]
    First,
    /// First device with a graphics queue family, discrete GPUs first.
    PreferGraphics,
}

/// What the logical-device descriptor requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Structure-type tag only. No queue can be retrieved.
    Bare,
    /// One queue from the graphics family.
    #[default]
    Graphics,
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Driver shared object.
    pub driver_path: PathBuf,
    pub instance_mode: InstanceMode,
    pub device_selection: DeviceSelection,
    pub device_profile: DeviceProfile,
    /// `None` waits forever; a hang is then a driver defect surfaced as a hang.
    pub fence_timeout: Option<Duration>,
    /// Promote readback mismatches to a failing exit code.
    pub strict_verification: bool,
    /// Where artifacts such as the readback PNG are written.
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            driver_path: default_driver_path(),
            instance_mode: InstanceMode::default(),
            device_selection: DeviceSelection::default(),
            device_profile: DeviceProfile::default(),
            fence_timeout: None,
            strict_verification: true,
            output_dir: PathBuf::from("."),
        }
    }
}

pub fn default_driver_path() -> PathBuf {
    Path::new(DRIVER_DIR).join(libloading::library_filename(DRIVER_NAME))
}

impl HarnessConfig {
    /// Defaults overridden by `ICDPROBE_*` environment variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        let mut config = Self::default();
        if let Some(path) = lookup("ICDPROBE_DRIVER") {
            config.driver_path = PathBuf::from(path);
        }
        if let Some(mode) = lookup("ICDPROBE_INSTANCE") {
            config.instance_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "plain" => InstanceMode::Plain,
                "direct" | "ddl" => InstanceMode::DirectDriverLoading,
                other => {
                    return Err(HarnessError::Config(format!(
                        "ICDPROBE_INSTANCE must be 'plain' or 'direct', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(selection) = lookup("ICDPROBE_DEVICE") {
            config.device_selection = match selection.trim().to_ascii_lowercase().as_str() {
                "first" => DeviceSelection::First,
                "graphics" => DeviceSelection::PreferGraphics,
                other => {
                    return Err(HarnessError::Config(format!(
                        "ICDPROBE_DEVICE must be 'first' or 'graphics', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(ms) = lookup("ICDPROBE_FENCE_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|e| {
                HarnessError::Config(format!("ICDPROBE_FENCE_TIMEOUT_MS: {}", e))
            })?;
            config.fence_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(strict) = lookup("ICDPROBE_STRICT") {
            config.strict_verification = parse_flag("ICDPROBE_STRICT", &strict)?;
        }
        if let Some(dir) = lookup("ICDPROBE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Fence wait argument in nanoseconds.
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, HarnessError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::Config(format!("{} is not a boolean: '{}'", key, other))),
    }
}
