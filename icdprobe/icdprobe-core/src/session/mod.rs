//! Driver session: the bootstrap state machine, the objects it owns, and their ordered release.
//!
//! A [`Session`] walks `Loaded → GlobalResolved → InstanceCreated → InstanceResolved →
//! PhysicalDeviceSelected → DeviceCreated → DeviceResolved → Ready`, one step per method. Whatever
//! was created when the session is torn down (or dropped) is released in reverse.

mod buffer;
mod image;
mod ledger;
mod memory;
mod queue;

use crate::config::{DeviceProfile, DeviceSelection, HarnessConfig, InstanceMode};
use crate::dispatch::{self, DispatchScope, ProcTable, VoidFunction, DEVICE_COMMANDS, GLOBAL_COMMANDS, INSTANCE_COMMANDS};
use crate::error::{check, HarnessError};
use crate::loader::Driver;
use ash::vk;
use ash::vk::Handle;
use std::ffi::CStr;
use std::ptr;

pub use buffer::{BoundBuffer, BufferUsage};
pub use image::{BoundImage, LINEAR_IMAGE_FORMAT, RGBA8_BYTES_PER_PIXEL};
pub(crate) use image::color_range;
pub use ledger::{DeviceObject, Released, TeardownClass, TeardownReport};
pub use memory::{find_memory_type, Allocation, MemoryLocation};
pub use queue::GraphicsQueue;

use ledger::ObjectLedger;

pub const DIRECT_DRIVER_LOADING_EXTENSION: &CStr = c"VK_LUNARG_direct_driver_loading";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapState {
    Unloaded,
    Loaded,
    GlobalResolved,
    InstanceCreated,
    InstanceResolved,
    PhysicalDeviceSelected,
    DeviceCreated,
    DeviceResolved,
    Ready,
}

impl BootstrapState {
    pub fn next(self) -> Option<Self> {
        use BootstrapState::*;
        Some(match self {
            Unloaded => Loaded,
            Loaded => GlobalResolved,
            GlobalResolved => InstanceCreated,
            InstanceCreated => InstanceResolved,
            InstanceResolved => PhysicalDeviceSelected,
            PhysicalDeviceSelected => DeviceCreated,
            DeviceCreated => DeviceResolved,
            DeviceResolved => Ready,
            Ready => return None,
        })
    }
}

/// Read-only description of the selected physical device.
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    /// Position in the enumeration.
    pub index: usize,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub graphics_family: Option<u32>,
}

/// Build the single loading-info node of a direct-driver-loading chain.
pub fn direct_driver_loading_info(
    callback: vk::PFN_vkGetInstanceProcAddrLUNARG,
) -> Result<vk::DirectDriverLoadingInfoLUNARG<'static>, HarnessError> {
    if callback.is_none() {
        return Err(HarnessError::SymbolMissing {
            scope: DispatchScope::Library,
            name: crate::config::ICD_ENTRY_POINT.to_string_lossy().into_owned(),
        });
    }
    Ok(vk::DirectDriverLoadingInfoLUNARG::default().pfn_get_instance_proc_addr(callback))
}

pub struct Session {
    state: BootstrapState,
    transitions: Vec<BootstrapState>,
    driver: Option<Driver>,
    entry: Option<ash::Entry>,
    global_table: Option<ProcTable>,
    instance_handle: vk::Instance,
    instance: Option<ash::Instance>,
    instance_table: Option<ProcTable>,
    physical_devices: Vec<vk::PhysicalDevice>,
    physical: Option<PhysicalDevice>,
    device_profile: DeviceProfile,
    device_handle: vk::Device,
    device: Option<ash::Device>,
    device_table: Option<ProcTable>,
    queue: Option<GraphicsQueue>,
    ledger: ObjectLedger,
    fence_timeout_ns: u64,
    released: bool,
}

impl Session {
    /// Take ownership of a loaded driver (`Unloaded → Loaded`).
    pub fn open(driver: Driver, fence_timeout_ns: u64) -> Self {
        log::debug!("bootstrap: Unloaded -> Loaded ({:?})", driver);
        Self {
            state: BootstrapState::Loaded,
            transitions: vec![BootstrapState::Loaded],
            driver: Some(driver),
            entry: None,
            global_table: None,
            instance_handle: vk::Instance::null(),
            instance: None,
            instance_table: None,
            physical_devices: Vec::new(),
            physical: None,
            device_profile: DeviceProfile::Bare,
            device_handle: vk::Device::null(),
            device: None,
            device_table: None,
            queue: None,
            ledger: ObjectLedger::default(),
            fence_timeout_ns,
            released: false,
        }
    }

    /// Load the configured driver and run the whole sequence to `Ready`.
    pub fn load(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let driver = Driver::load(&config.driver_path, config.instance_mode.root_symbol())?;
        Self::bootstrap(driver, config)
    }

    /// Run every bootstrap step on an already-loaded driver. On failure, whatever was created is
    /// released before the error is returned.
    pub fn bootstrap(driver: Driver, config: &HarnessConfig) -> Result<Self, HarnessError> {
        let mut session = Self::open(driver, config.fence_timeout_ns());
        session.resolve_global()?;
        session.create_instance(config.instance_mode)?;
        session.resolve_instance()?;
        session.select_physical_device(config.device_selection)?;
        session.create_device(config.device_profile)?;
        session.resolve_device()?;
        session.ready()?;
        Ok(session)
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// States entered so far, in order.
    pub fn transitions(&self) -> &[BootstrapState] {
        &self.transitions
    }

    fn expect_next(&self, requested: BootstrapState) -> Result<(), HarnessError> {
        if self.released || self.state.next() != Some(requested) {
            return Err(HarnessError::OutOfOrder {
                current: self.state,
                requested,
            });
        }
        Ok(())
    }

    fn enter(&mut self, state: BootstrapState) {
        log::debug!("bootstrap: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    fn driver(&self) -> Result<&Driver, HarnessError> {
        self.driver.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::Loaded,
        })
    }

    /// Resolve the global table and build the entry-level loader.
    pub fn resolve_global(&mut self) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::GlobalResolved)?;
        let root = self.driver()?.root();
        let table = ProcTable::resolve(DispatchScope::Global, GLOBAL_COMMANDS, |name| unsafe {
            dispatch::resolve_global(root, name)
        });
        if let Some(create) = table.get(c"vkCreateInstance") {
            log::info!("vkCreateInstance = {:p}", create as *const ());
        }
        table.check_required()?;
        self.entry = Some(unsafe {
            ash::Entry::from_static_fn(ash::StaticFn {
                get_instance_proc_addr: root,
            })
        });
        self.global_table = Some(table);
        self.enter(BootstrapState::GlobalResolved);
        Ok(())
    }

    pub fn create_instance(&mut self, mode: InstanceMode) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::InstanceCreated)?;
        let root = self.driver()?.root();
        let entry = self.entry.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::GlobalResolved,
        })?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"icdprobe")
            .application_version(1)
            .api_version(vk::API_VERSION_1_0);
        let mut handle = vk::Instance::null();
        let result = match mode {
            InstanceMode::Plain => {
                let create_info = vk::InstanceCreateInfo::default().application_info(&app_info);
                unsafe { (entry.fp_v1_0().create_instance)(&create_info, ptr::null(), &mut handle) }
            }
            InstanceMode::DirectDriverLoading => {
                let drivers = [direct_driver_loading_info(Some(root))?];
                let mut list = vk::DirectDriverLoadingListLUNARG::default()
                    .mode(vk::DirectDriverLoadingModeLUNARG::EXCLUSIVE)
                    .drivers(&drivers);
                let extensions = [DIRECT_DRIVER_LOADING_EXTENSION.as_ptr()];
                let create_info = vk::InstanceCreateInfo::default()
                    .application_info(&app_info)
                    .enabled_extension_names(&extensions)
                    .push_next(&mut list);
                unsafe { (entry.fp_v1_0().create_instance)(&create_info, ptr::null(), &mut handle) }
            }
        };
        check(result, "vkCreateInstance")?;
        log::info!("instance {:#x} created ({:?})", handle.as_raw(), mode);
        self.instance_handle = handle;
        self.enter(BootstrapState::InstanceCreated);
        Ok(())
    }

    pub fn resolve_instance(&mut self) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::InstanceResolved)?;
        let root = self.driver()?.root();
        let handle = self.instance_handle;
        let table = ProcTable::resolve(DispatchScope::Instance, INSTANCE_COMMANDS, |name| unsafe {
            dispatch::resolve_instance(root, handle, name)
        });
        table.check_required()?;
        let entry = self.entry.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::GlobalResolved,
        })?;
        self.instance = Some(unsafe { ash::Instance::load(entry.static_fn(), handle) });
        self.instance_table = Some(table);
        self.enter(BootstrapState::InstanceResolved);
        Ok(())
    }

    fn loaded_instance(&self) -> Result<&ash::Instance, HarnessError> {
        self.instance.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::InstanceResolved,
        })
    }

    /// Two-call enumeration, then selection.
    pub fn select_physical_device(&mut self, selection: DeviceSelection) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::PhysicalDeviceSelected)?;
        let instance = self.loaded_instance()?;
        let handles = enumerate_physical_devices(instance)?;
        log::info!("{} physical device(s)", handles.len());
        let candidates: Vec<PhysicalDevice> = handles
            .iter()
            .enumerate()
            .map(|(index, &handle)| describe_physical_device(instance, index, handle))
            .collect();
        for candidate in &candidates {
            log::info!(
                "  [{}] {} ({:?}, api {}.{}.{})",
                candidate.index,
                candidate.name,
                candidate.device_type,
                vk::api_version_major(candidate.api_version),
                vk::api_version_minor(candidate.api_version),
                vk::api_version_patch(candidate.api_version),
            );
        }
        let chosen = pick_physical_device(&candidates, selection)?.clone();
        log::info!("selected [{}] {}", chosen.index, chosen.name);
        self.physical_devices = handles;
        self.physical = Some(chosen);
        self.enter(BootstrapState::PhysicalDeviceSelected);
        Ok(())
    }

    pub fn create_device(&mut self, profile: DeviceProfile) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::DeviceCreated)?;
        let instance = self.loaded_instance()?;
        let physical = self.physical.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::PhysicalDeviceSelected,
        })?;
        let priorities = [1.0f32];
        let mut handle = vk::Device::null();
        let result = match profile {
            DeviceProfile::Bare => {
                let create_info = vk::DeviceCreateInfo::default();
                unsafe {
                    (instance.fp_v1_0().create_device)(physical.handle, &create_info, ptr::null(), &mut handle)
                }
            }
            DeviceProfile::Graphics => {
                let family = physical.graphics_family.ok_or(HarnessError::NoGraphicsQueue)?;
                let queue_info = vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities);
                let create_info =
                    vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));
                unsafe {
                    (instance.fp_v1_0().create_device)(physical.handle, &create_info, ptr::null(), &mut handle)
                }
            }
        };
        check(result, "vkCreateDevice")?;
        log::info!("device {:#x} created ({:?})", handle.as_raw(), profile);
        self.device_handle = handle;
        self.device_profile = profile;
        self.enter(BootstrapState::DeviceCreated);
        Ok(())
    }

    pub fn resolve_device(&mut self) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::DeviceResolved)?;
        let instance = self.loaded_instance()?;
        let get_device_proc_addr = instance.fp_v1_0().get_device_proc_addr;
        let handle = self.device_handle;
        let table = ProcTable::resolve(DispatchScope::Device, DEVICE_COMMANDS, |name| unsafe {
            dispatch::resolve_device(get_device_proc_addr, handle, name)
        });
        table.check_required()?;
        let device = unsafe { ash::Device::load(instance.fp_v1_0(), handle) };
        if self.device_profile == DeviceProfile::Graphics {
            let family = self
                .physical
                .as_ref()
                .and_then(|p| p.graphics_family)
                .ok_or(HarnessError::NoGraphicsQueue)?;
            let queue = unsafe { device.get_device_queue(family, 0) };
            log::info!("graphics queue {:#x} (family {})", queue.as_raw(), family);
            self.queue = Some(GraphicsQueue { handle: queue, family });
        }
        self.device = Some(device);
        self.device_table = Some(table);
        self.enter(BootstrapState::DeviceResolved);
        Ok(())
    }

    pub fn ready(&mut self) -> Result<(), HarnessError> {
        self.expect_next(BootstrapState::Ready)?;
        self.enter(BootstrapState::Ready);
        Ok(())
    }

    fn require_ready(&self) -> Result<(), HarnessError> {
        if self.state != BootstrapState::Ready || self.released {
            return Err(HarnessError::OutOfOrder {
                current: self.state,
                requested: BootstrapState::Ready,
            });
        }
        Ok(())
    }

    /// Device-level loader. Only available once the session is `Ready`.
    pub fn device(&self) -> Result<&ash::Device, HarnessError> {
        self.require_ready()?;
        self.device.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::DeviceResolved,
        })
    }

    pub fn physical_device(&self) -> Option<&PhysicalDevice> {
        self.physical.as_ref()
    }

    /// Every handle returned by the second enumeration call.
    pub fn enumerated_physical_devices(&self) -> &[vk::PhysicalDevice] {
        &self.physical_devices
    }

    pub fn global_table(&self) -> Option<&ProcTable> {
        self.global_table.as_ref()
    }

    pub fn instance_table(&self) -> Option<&ProcTable> {
        self.instance_table.as_ref()
    }

    pub fn device_table(&self) -> Option<&ProcTable> {
        self.device_table.as_ref()
    }

    /// Fail unless the device exported every named command.
    pub fn require_device_commands(&self, names: &[&CStr]) -> Result<(), HarnessError> {
        match self.device_table.as_ref() {
            Some(table) => table.require(names),
            None => Err(HarnessError::OutOfOrder {
                current: self.state,
                requested: BootstrapState::DeviceResolved,
            }),
        }
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ns
    }

    pub(crate) fn track(&mut self, object: DeviceObject) {
        log::debug!("tracking {:?}", object);
        self.ledger.track(object);
    }

    /// Objects currently owned by the device.
    pub fn tracked_objects(&self) -> usize {
        self.ledger.len()
    }

    /// Release everything and close the driver.
    pub fn teardown(mut self) -> Result<TeardownReport, HarnessError> {
        let (report, outcome) = self.release();
        outcome.map(|()| report)
    }

    /// Like [`Session::teardown`], but the report comes back even when teardown failed, so leaked
    /// objects stay visible.
    pub fn teardown_with_report(mut self) -> (TeardownReport, Result<(), HarnessError>) {
        self.release()
    }

    fn release(&mut self) -> (TeardownReport, Result<(), HarnessError>) {
        let mut report = TeardownReport::default();
        if self.released {
            return (report, Ok(()));
        }
        self.released = true;
        let mut outcome = Ok(());
        let mut device_busy = false;

        if let Some(device) = self.device.take() {
            if let Err(e) = self.ledger.release_all(&device, self.fence_timeout_ns, &mut report) {
                outcome = Err(e);
                device_busy = true;
            }
        }
        self.queue = None;
        self.device_table = None;

        if device_busy {
            // Submitted work may still be executing driver code against the device.
            self.leak_remaining(&mut report);
            return (report, outcome);
        }

        if self.device_handle != vk::Device::null() {
            let destroy = self
                .instance
                .as_ref()
                .and_then(|i| unsafe {
                    dispatch::resolve_device(i.fp_v1_0().get_device_proc_addr, self.device_handle, c"vkDestroyDevice")
                });
            match destroy {
                Some(f) => unsafe {
                    let destroy: vk::PFN_vkDestroyDevice = std::mem::transmute::<VoidFunction, _>(f);
                    destroy(self.device_handle, ptr::null());
                },
                None => log::error!("teardown: vkDestroyDevice unavailable, device leaked"),
            }
            report.push(TeardownClass::Device, "vkDestroyDevice", self.device_handle.as_raw());
            self.device_handle = vk::Device::null();
        }
        self.instance = None;
        self.instance_table = None;

        if self.instance_handle != vk::Instance::null() {
            let destroy = self
                .driver
                .as_ref()
                .and_then(|d| unsafe { dispatch::resolve_instance(d.root(), self.instance_handle, c"vkDestroyInstance") });
            match destroy {
                Some(f) => unsafe {
                    let destroy: vk::PFN_vkDestroyInstance = std::mem::transmute::<VoidFunction, _>(f);
                    destroy(self.instance_handle, ptr::null());
                },
                None => log::error!("teardown: vkDestroyInstance unavailable, instance leaked"),
            }
            report.push(TeardownClass::Instance, "vkDestroyInstance", self.instance_handle.as_raw());
            self.instance_handle = vk::Instance::null();
        }
        self.entry = None;
        self.global_table = None;

        if let Some(driver) = self.driver.take() {
            let close = driver.close();
            report.push(TeardownClass::Library, "close", 0);
            if let Err(e) = close {
                outcome = outcome.and(Err(e));
            }
        }
        self.state = BootstrapState::Unloaded;
        (report, outcome)
    }

    /// Leave the device, the instance and the mapped driver alive.
    fn leak_remaining(&mut self, report: &mut TeardownReport) {
        if self.device_handle != vk::Device::null() {
            report.leak(TeardownClass::Device, "vkDestroyDevice", self.device_handle.as_raw());
            self.device_handle = vk::Device::null();
        }
        if self.instance_handle != vk::Instance::null() {
            report.leak(TeardownClass::Instance, "vkDestroyInstance", self.instance_handle.as_raw());
            self.instance_handle = vk::Instance::null();
        }
        if let Some(driver) = self.driver.take() {
            report.leak(TeardownClass::Library, "close", 0);
            driver.leak();
        }
        self.instance = None;
        self.instance_table = None;
        self.entry = None;
        self.global_table = None;
        self.state = BootstrapState::Unloaded;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released {
            if let (_, Err(e)) = self.release() {
                log::error!("teardown during drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("physical", &self.physical.as_ref().map(|p| &p.name))
            .field("tracked", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

fn enumerate_physical_devices(instance: &ash::Instance) -> Result<Vec<vk::PhysicalDevice>, HarnessError> {
    let enumerate = instance.fp_v1_0().enumerate_physical_devices;
    let mut count = 0u32;
    check(
        unsafe { enumerate(instance.handle(), &mut count, ptr::null_mut()) },
        "vkEnumeratePhysicalDevices",
    )?;
    if count == 0 {
        return Err(HarnessError::NoPhysicalDevice);
    }
    let mut handles = vec![vk::PhysicalDevice::null(); count as usize];
    let mut filled = count;
    check(
        unsafe { enumerate(instance.handle(), &mut filled, handles.as_mut_ptr()) },
        "vkEnumeratePhysicalDevices",
    )?;
    if filled != count {
        return Err(HarnessError::Enumeration {
            detail: format!("count call reported {}, fill call returned {}", count, filled),
        });
    }
    if let Some(index) = handles.iter().position(|h| *h == vk::PhysicalDevice::null()) {
        return Err(HarnessError::Enumeration {
            detail: format!("handle {} of {} is null", index, count),
        });
    }
    Ok(handles)
}

fn describe_physical_device(instance: &ash::Instance, index: usize, handle: vk::PhysicalDevice) -> PhysicalDevice {
    let properties = unsafe { instance.get_physical_device_properties(handle) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(handle) };
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(handle) };
    let graphics_family = queue_families
        .iter()
        .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);
    let name = CStr::from_bytes_until_nul(bytemuck::cast_slice(&properties.device_name))
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unterminated name>".to_string());
    PhysicalDevice {
        handle,
        index,
        name,
        device_type: properties.device_type,
        api_version: properties.api_version,
        memory_properties,
        queue_families,
        graphics_family,
    }
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// Deterministic choice among enumerated devices. Never falls back silently.
pub fn pick_physical_device(
    candidates: &[PhysicalDevice],
    selection: DeviceSelection,
) -> Result<&PhysicalDevice, HarnessError> {
    match selection {
        DeviceSelection::First => candidates.first().ok_or(HarnessError::NoPhysicalDevice),
        DeviceSelection::PreferGraphics => {
            if candidates.is_empty() {
                return Err(HarnessError::NoPhysicalDevice);
            }
            candidates
                .iter()
                .filter(|c| c.graphics_family.is_some())
                .min_by_key(|c| (device_type_rank(c.device_type), c.index))
                .ok_or(HarnessError::NoGraphicsQueue)
        }
    }
}
