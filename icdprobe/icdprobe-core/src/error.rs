//! Harness error type. Every variant is fatal; there is no retry path.

use crate::dispatch::DispatchScope;
use crate::session::BootstrapState;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure class, used for exit codes and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    DriverLoad,
    SymbolResolution,
    VulkanCall,
    Verification,
    Harness,
}

impl ErrorClass {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorClass::DriverLoad => 2,
            ErrorClass::SymbolResolution => 3,
            ErrorClass::VulkanCall => 4,
            ErrorClass::Verification => 5,
            ErrorClass::Harness => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to open driver library '{}': {source}", path.display())]
    DriverLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("failed to close driver library: {0}")]
    DriverClose(#[source] libloading::Error),

    #[error("driver does not provide required {scope} entry point {name}")]
    SymbolMissing { scope: DispatchScope, name: String },

    #[error("{call} returned {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("fence wait exceeded {timeout_ms} ms")]
    FenceTimeout { timeout_ms: u64 },

    #[error("verification failed in {scenario}: {detail}")]
    Verification {
        scenario: &'static str,
        detail: String,
    },

    #[error("bootstrap step {requested:?} requested while in state {current:?}")]
    OutOfOrder {
        current: BootstrapState,
        requested: BootstrapState,
    },

    #[error("driver reported no physical devices")]
    NoPhysicalDevice,

    #[error("physical device enumeration is inconsistent: {detail}")]
    Enumeration { detail: String },

    #[error("no memory type in bits {type_bits:#b} has properties {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("selected physical device exposes no graphics queue family")]
    NoGraphicsQueue,

    #[error(
        "copy of {size} bytes at src+{src_offset} / dst+{dst_offset} exceeds bound sizes \
         (src {src_size}, dst {dst_size})"
    )]
    CopyOutOfRange {
        src_offset: u64,
        dst_offset: u64,
        size: u64,
        src_size: u64,
        dst_size: u64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl HarnessError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HarnessError::DriverLoad { .. } | HarnessError::DriverClose(_) => ErrorClass::DriverLoad,
            HarnessError::SymbolMissing { .. } => ErrorClass::SymbolResolution,
            HarnessError::Vulkan { .. } | HarnessError::FenceTimeout { .. } => ErrorClass::VulkanCall,
            HarnessError::Verification { .. } => ErrorClass::Verification,
            _ => ErrorClass::Harness,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.class().exit_code()
    }
}

/// Attaches the Vulkan command name to a failing result.
pub trait VkResultExt<T> {
    fn vk_call(self, call: &'static str) -> Result<T, HarnessError>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    fn vk_call(self, call: &'static str) -> Result<T, HarnessError> {
        self.map_err(|result| HarnessError::Vulkan { call, result })
    }
}

/// For raw function-pointer calls that hand back a bare `vk::Result`.
pub(crate) fn check(result: vk::Result, call: &'static str) -> Result<(), HarnessError> {
    result.result().vk_call(call)
}
