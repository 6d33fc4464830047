//! Entry-point resolution and explicit per-scope dispatch tables.
//!
//! Tables are built once per instance / device and passed by reference; nothing is bound globally.
//! The calls themselves go through ash's `Entry`/`Instance`/`Device` loaders, which are populated
//! from the same `vkGetInstanceProcAddr` / `vkGetDeviceProcAddr` pair; these tables are the harness's
//! own record of what the driver actually exported.

use crate::error::HarnessError;
use ash::vk;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fmt;

pub type VoidFunction = unsafe extern "system" fn();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchScope {
    /// Symbols exported by the shared object itself.
    Library,
    /// `vkGetInstanceProcAddr(NULL, name)`.
    Global,
    Instance,
    Device,
}

impl fmt::Display for DispatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchScope::Library => "library",
            DispatchScope::Global => "global",
            DispatchScope::Instance => "instance",
            DispatchScope::Device => "device",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

pub type CommandList = &'static [(&'static CStr, Requirement)];

use Requirement::{Optional, Required};

pub const GLOBAL_COMMANDS: CommandList = &[
    (c"vkCreateInstance", Required),
    (c"vkEnumerateInstanceExtensionProperties", Optional),
    (c"vkEnumerateInstanceLayerProperties", Optional),
    (c"vkEnumerateInstanceVersion", Optional),
];

pub const INSTANCE_COMMANDS: CommandList = &[
    (c"vkDestroyInstance", Required),
    (c"vkEnumeratePhysicalDevices", Required),
    (c"vkGetPhysicalDeviceProperties", Required),
    (c"vkGetPhysicalDeviceMemoryProperties", Required),
    (c"vkGetPhysicalDeviceQueueFamilyProperties", Required),
    (c"vkCreateDevice", Required),
    (c"vkGetDeviceProcAddr", Required),
    (c"vkGetPhysicalDeviceFeatures", Optional),
    (c"vkGetPhysicalDeviceFormatProperties", Optional),
    (c"vkEnumerateDeviceExtensionProperties", Optional),
];

/// Device commands. Only what bootstrap and teardown themselves need is required here;
/// scenarios and the runner check their own needs with [`ProcTable::require`].
pub const DEVICE_COMMANDS: CommandList = &[
    (c"vkDestroyDevice", Required),
    (c"vkGetDeviceQueue", Required),
    (c"vkCreateBuffer", Optional),
    (c"vkDestroyBuffer", Optional),
    (c"vkGetBufferMemoryRequirements", Optional),
    (c"vkBindBufferMemory", Optional),
    (c"vkCreateImage", Optional),
    (c"vkDestroyImage", Optional),
    (c"vkGetImageMemoryRequirements", Optional),
    (c"vkBindImageMemory", Optional),
    (c"vkGetImageSubresourceLayout", Optional),
    (c"vkCreateImageView", Optional),
    (c"vkDestroyImageView", Optional),
    (c"vkAllocateMemory", Optional),
    (c"vkFreeMemory", Optional),
    (c"vkMapMemory", Optional),
    (c"vkUnmapMemory", Optional),
    (c"vkCreateCommandPool", Optional),
    (c"vkDestroyCommandPool", Optional),
    (c"vkAllocateCommandBuffers", Optional),
    (c"vkFreeCommandBuffers", Optional),
    (c"vkResetCommandBuffer", Optional),
    (c"vkBeginCommandBuffer", Optional),
    (c"vkEndCommandBuffer", Optional),
    (c"vkCmdFillBuffer", Optional),
    (c"vkCmdCopyBuffer", Optional),
    (c"vkCmdPipelineBarrier", Optional),
    (c"vkCmdClearColorImage", Optional),
    (c"vkCreateFence", Optional),
    (c"vkDestroyFence", Optional),
    (c"vkResetFences", Optional),
    (c"vkWaitForFences", Optional),
    (c"vkQueueSubmit", Optional),
    (c"vkQueueWaitIdle", Optional),
    (c"vkDeviceWaitIdle", Optional),
];

/// Resolve a global command: the root entry point called with a null instance.
///
/// # Safety
/// `root` must be a live `vkGetInstanceProcAddr`.
pub unsafe fn resolve_global(root: vk::PFN_vkGetInstanceProcAddr, name: &CStr) -> vk::PFN_vkVoidFunction {
    root(vk::Instance::null(), name.as_ptr())
}

/// # Safety
/// `root` must be a live `vkGetInstanceProcAddr` and `instance` a live instance created through it.
pub unsafe fn resolve_instance(
    root: vk::PFN_vkGetInstanceProcAddr,
    instance: vk::Instance,
    name: &CStr,
) -> vk::PFN_vkVoidFunction {
    root(instance, name.as_ptr())
}

/// # Safety
/// `get_device_proc_addr` must have been resolved against the instance owning `device`.
pub unsafe fn resolve_device(
    get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    device: vk::Device,
    name: &CStr,
) -> vk::PFN_vkVoidFunction {
    get_device_proc_addr(device, name.as_ptr())
}

/// Name → address map for one scope, resolved once.
#[derive(Clone)]
pub struct ProcTable {
    scope: DispatchScope,
    entries: BTreeMap<&'static CStr, (Requirement, Option<VoidFunction>)>,
}

impl ProcTable {
    pub fn resolve(
        scope: DispatchScope,
        commands: CommandList,
        mut resolver: impl FnMut(&CStr) -> vk::PFN_vkVoidFunction,
    ) -> Self {
        let entries = commands
            .iter()
            .map(|&(name, requirement)| (name, (requirement, resolver(name))))
            .collect();
        let table = Self { scope, entries };
        log::debug!(
            "{} table: {}/{} entry points resolved",
            scope,
            table.resolved_count(),
            table.len()
        );
        table
    }

    pub fn scope(&self) -> DispatchScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.values().filter(|(_, f)| f.is_some()).count()
    }

    pub fn get(&self, name: &CStr) -> Option<VoidFunction> {
        self.entries.get(name).and_then(|(_, f)| *f)
    }

    pub fn contains(&self, name: &CStr) -> bool {
        self.get(name).is_some()
    }

    /// Required entries that came back null, in name order.
    pub fn missing_required(&self) -> Vec<&'static CStr> {
        self.entries
            .iter()
            .filter(|(_, (req, f))| *req == Requirement::Required && f.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Fail on the first required entry that resolved to null.
    pub fn check_required(&self) -> Result<(), HarnessError> {
        match self.missing_required().first() {
            Some(name) => Err(self.missing(name)),
            None => Ok(()),
        }
    }

    /// Fail unless every name in `names` resolved, whatever its declared requirement.
    pub fn require(&self, names: &[&CStr]) -> Result<(), HarnessError> {
        for name in names {
            if !self.contains(name) {
                return Err(self.missing(name));
            }
        }
        Ok(())
    }

    fn missing(&self, name: &CStr) -> HarnessError {
        HarnessError::SymbolMissing {
            scope: self.scope,
            name: name.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Debug for ProcTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, (_, function)) in &self.entries {
            map.entry(name, &function.map(|p| p as *const ()));
        }
        map.finish()
    }
}
