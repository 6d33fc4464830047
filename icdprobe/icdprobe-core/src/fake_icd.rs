//! An in-process fake ICD for unit tests.
//!
//! It exports a `vkGetInstanceProcAddr` that hands out host implementations of every command the
//! harness uses. Memory is plain host vectors, command buffers record into a list that runs on
//! `vkQueueSubmit`, and fences are signalled at submit time. One fake can be installed per thread;
//! tests run on their own threads, so they never see each other's state.

use crate::config::STANDARD_ENTRY_POINT;
use crate::dispatch::VoidFunction;
use crate::loader::Driver;
use ash::vk;
use ash::vk::Handle;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_void, CStr};
use std::mem::transmute;
use std::slice;

thread_local! {
    static CURRENT: RefCell<Option<FakeIcd>> = RefCell::new(None);
}

pub const FAKE_DEVICE_NAME: &str = "icdprobe fake device";
pub const MEMORY_TYPE_DEVICE_LOCAL: u32 = 0;
pub const MEMORY_TYPE_HOST_VISIBLE: u32 = 1;

const PHYSICAL_DEVICE_BASE: u64 = 0x100;
const QUEUE_HANDLE: u64 = 0x200;

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Fill {
        buffer: u64,
        offset: u64,
        size: u64,
        data: u32,
    },
    Copy {
        src: u64,
        dst: u64,
        regions: Vec<vk::BufferCopy>,
    },
    Clear {
        image: u64,
        color: [f32; 4],
    },
    Barrier,
}

#[derive(Debug)]
pub(crate) enum Object {
    Instance,
    Device,
    Buffer { size: u64, binding: Option<(u64, u64)> },
    Image { width: u32, height: u32, binding: Option<(u64, u64)> },
    ImageView,
    Memory { data: Vec<u8>, memory_type: u32 },
    CommandPool,
    CommandBuffer { commands: Vec<Command>, recording: bool },
    Fence { signaled: bool },
}

/// What `vkCreateInstance` saw of a direct-driver-loading chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectDriverLoadingSeen {
    pub mode: vk::DirectDriverLoadingModeLUNARG,
    pub driver_count: u32,
    pub extension_mentions: usize,
}

/// Knobs and observations of the fake driver.
#[derive(Debug)]
pub struct FakeIcd {
    pub physical_device_count: u32,
    /// Whether the single queue family supports graphics.
    pub graphics_queue: bool,
    /// The fill call of the two-call enumeration reports one device fewer than the count call.
    pub short_enumeration: bool,
    /// Fences are never signalled.
    pub never_signal: bool,
    /// The last word of every fill is written with its low bit flipped.
    pub corrupt_fills: bool,
    /// Linear-tiled RGBA8 images can be sampled.
    pub linear_sampled: bool,
    /// Commands resolved as null.
    pub missing: HashSet<&'static str>,
    /// Commands returning the given failure instead of success.
    pub failures: HashMap<&'static str, vk::Result>,

    pub calls: Vec<&'static str>,
    pub direct_driver_loading: Option<DirectDriverLoadingSeen>,
    pub submissions: usize,
    pub barriers: usize,
    pub(crate) objects: HashMap<u64, Object>,
    pub(crate) next_handle: u64,
}

impl Default for FakeIcd {
    fn default() -> Self {
        Self {
            physical_device_count: 1,
            graphics_queue: true,
            short_enumeration: false,
            never_signal: false,
            corrupt_fills: false,
            linear_sampled: true,
            missing: HashSet::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            direct_driver_loading: None,
            submissions: 0,
            barriers: 0,
            objects: HashMap::new(),
            next_handle: 0x1000,
        }
    }
}

/// Removes the thread's fake on drop.
pub struct Installed(());

impl Drop for Installed {
    fn drop(&mut self) {
        CURRENT.with(|current| current.borrow_mut().take());
    }
}

pub fn install(fake: FakeIcd) -> Installed {
    CURRENT.with(|current| {
        let old = current.borrow_mut().replace(fake);
        assert!(old.is_none(), "a fake ICD is already installed on this thread");
    });
    Installed(())
}

pub fn with<R>(f: impl FnOnce(&mut FakeIcd) -> R) -> R {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        let fake = current.as_mut().expect("no fake ICD installed on this thread");
        f(fake)
    })
}

/// The fake as a driver, rooted at its standard entry point.
pub fn driver() -> Driver {
    unsafe { Driver::from_entry_point(get_instance_proc_addr, STANDARD_ENTRY_POINT) }
}

impl FakeIcd {
    fn call(&mut self, name: &'static str) -> vk::Result {
        self.calls.push(name);
        self.failures.get(name).copied().unwrap_or(vk::Result::SUCCESS)
    }

    fn create(&mut self, object: Object) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn destroy(&mut self, handle: u64) {
        self.objects.remove(&handle);
    }

    /// Objects created and not yet destroyed, instance and device included.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Calls whose names start with one of `prefixes`, in order.
    pub fn calls_matching(&self, prefixes: &[&str]) -> Vec<&'static str> {
        self.calls
            .iter()
            .copied()
            .filter(|c| prefixes.iter().any(|p| c.starts_with(p)))
            .collect()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| **c == name).count()
    }

    /// Memory types of every live allocation.
    pub fn allocated_memory_types(&self) -> Vec<u32> {
        let mut types: Vec<u32> = self
            .objects
            .values()
            .filter_map(|o| match o {
                Object::Memory { memory_type, .. } => Some(*memory_type),
                _ => None,
            })
            .collect();
        types.sort_unstable();
        types
    }

    fn memory_requirements(size: u64, alignment: u64) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: size.div_ceil(alignment) * alignment,
            alignment,
            memory_type_bits: 0b11,
        }
    }

    fn buffer_binding(&self, buffer: u64) -> Option<(u64, u64, u64)> {
        match self.objects.get(&buffer) {
            Some(Object::Buffer {
                size,
                binding: Some((memory, offset)),
            }) => Some((*memory, *offset, *size)),
            _ => None,
        }
    }

    fn memory_mut(&mut self, memory: u64) -> Option<&mut Vec<u8>> {
        match self.objects.get_mut(&memory) {
            Some(Object::Memory { data, .. }) => Some(data),
            _ => None,
        }
    }

    fn execute(&mut self, cmd: u64) {
        let commands = match self.objects.get(&cmd) {
            Some(Object::CommandBuffer { commands, .. }) => commands.clone(),
            _ => return,
        };
        for command in commands {
            match command {
                Command::Fill {
                    buffer,
                    offset,
                    size,
                    data,
                } => self.fill(buffer, offset, size, data),
                Command::Copy { src, dst, regions } => self.copy(src, dst, &regions),
                Command::Clear { image, color } => self.clear(image, color),
                Command::Barrier => self.barriers += 1,
            }
        }
    }

    fn fill(&mut self, buffer: u64, offset: u64, size: u64, data: u32) {
        let Some((memory, base, buffer_size)) = self.buffer_binding(buffer) else {
            return;
        };
        let size = if size == vk::WHOLE_SIZE {
            (buffer_size - offset) & !3
        } else {
            size
        };
        let corrupt = self.corrupt_fills;
        let Some(bytes) = self.memory_mut(memory) else {
            return;
        };
        let start = (base + offset) as usize;
        let words = (size / 4) as usize;
        for i in 0..words {
            let word = if corrupt && i + 1 == words { data ^ 1 } else { data };
            bytes[start + i * 4..start + i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
        }
    }

    fn copy(&mut self, src: u64, dst: u64, regions: &[vk::BufferCopy]) {
        let (Some((src_memory, src_base, _)), Some((dst_memory, dst_base, _))) =
            (self.buffer_binding(src), self.buffer_binding(dst))
        else {
            return;
        };
        for region in regions {
            let from = (src_base + region.src_offset) as usize;
            let staged = match self.memory_mut(src_memory) {
                Some(bytes) => bytes[from..from + region.size as usize].to_vec(),
                None => return,
            };
            let to = (dst_base + region.dst_offset) as usize;
            if let Some(bytes) = self.memory_mut(dst_memory) {
                bytes[to..to + staged.len()].copy_from_slice(&staged);
            }
        }
    }

    fn clear(&mut self, image: u64, color: [f32; 4]) {
        let (width, height, memory, base) = match self.objects.get(&image) {
            Some(Object::Image {
                width,
                height,
                binding: Some((memory, offset)),
            }) => (*width as usize, *height as usize, *memory, *offset as usize),
            _ => return,
        };
        let texel = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        if let Some(bytes) = self.memory_mut(memory) {
            for pixel in bytes[base..base + width * height * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&texel);
            }
        }
    }

    fn lookup(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        let name = name.to_str().ok()?;
        if self.missing.contains(name) {
            return None;
        }
        macro_rules! entry {
            ($f:ident: $pfn:ty) => {
                Some(unsafe { transmute::<$pfn, VoidFunction>($f) })
            };
        }
        match name {
            "vkGetInstanceProcAddr" => entry!(get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr),
            "vkCreateInstance" => entry!(create_instance: vk::PFN_vkCreateInstance),
            "vkDestroyInstance" => entry!(destroy_instance: vk::PFN_vkDestroyInstance),
            "vkEnumeratePhysicalDevices" => entry!(enumerate_physical_devices: vk::PFN_vkEnumeratePhysicalDevices),
            "vkGetPhysicalDeviceProperties" => {
                entry!(get_physical_device_properties: vk::PFN_vkGetPhysicalDeviceProperties)
            }
            "vkGetPhysicalDeviceMemoryProperties" => {
                entry!(get_physical_device_memory_properties: vk::PFN_vkGetPhysicalDeviceMemoryProperties)
            }
            "vkGetPhysicalDeviceFormatProperties" => {
                entry!(get_physical_device_format_properties: vk::PFN_vkGetPhysicalDeviceFormatProperties)
            }
            "vkGetPhysicalDeviceQueueFamilyProperties" => entry!(
                get_physical_device_queue_family_properties: vk::PFN_vkGetPhysicalDeviceQueueFamilyProperties
            ),
            "vkGetDeviceProcAddr" => entry!(get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr),
            "vkCreateDevice" => entry!(create_device: vk::PFN_vkCreateDevice),
            "vkDestroyDevice" => entry!(destroy_device: vk::PFN_vkDestroyDevice),
            "vkGetDeviceQueue" => entry!(get_device_queue: vk::PFN_vkGetDeviceQueue),
            "vkCreateBuffer" => entry!(create_buffer: vk::PFN_vkCreateBuffer),
            "vkDestroyBuffer" => entry!(destroy_buffer: vk::PFN_vkDestroyBuffer),
            "vkGetBufferMemoryRequirements" => {
                entry!(get_buffer_memory_requirements: vk::PFN_vkGetBufferMemoryRequirements)
            }
            "vkBindBufferMemory" => entry!(bind_buffer_memory: vk::PFN_vkBindBufferMemory),
            "vkCreateImage" => entry!(create_image: vk::PFN_vkCreateImage),
            "vkDestroyImage" => entry!(destroy_image: vk::PFN_vkDestroyImage),
            "vkGetImageMemoryRequirements" => {
                entry!(get_image_memory_requirements: vk::PFN_vkGetImageMemoryRequirements)
            }
            "vkBindImageMemory" => entry!(bind_image_memory: vk::PFN_vkBindImageMemory),
            "vkGetImageSubresourceLayout" => {
                entry!(get_image_subresource_layout: vk::PFN_vkGetImageSubresourceLayout)
            }
            "vkCreateImageView" => entry!(create_image_view: vk::PFN_vkCreateImageView),
            "vkDestroyImageView" => entry!(destroy_image_view: vk::PFN_vkDestroyImageView),
            "vkAllocateMemory" => entry!(allocate_memory: vk::PFN_vkAllocateMemory),
            "vkFreeMemory" => entry!(free_memory: vk::PFN_vkFreeMemory),
            "vkMapMemory" => entry!(map_memory: vk::PFN_vkMapMemory),
            "vkUnmapMemory" => entry!(unmap_memory: vk::PFN_vkUnmapMemory),
            "vkCreateCommandPool" => entry!(create_command_pool: vk::PFN_vkCreateCommandPool),
            "vkDestroyCommandPool" => entry!(destroy_command_pool: vk::PFN_vkDestroyCommandPool),
            "vkAllocateCommandBuffers" => entry!(allocate_command_buffers: vk::PFN_vkAllocateCommandBuffers),
            "vkFreeCommandBuffers" => entry!(free_command_buffers: vk::PFN_vkFreeCommandBuffers),
            "vkResetCommandBuffer" => entry!(reset_command_buffer: vk::PFN_vkResetCommandBuffer),
            "vkBeginCommandBuffer" => entry!(begin_command_buffer: vk::PFN_vkBeginCommandBuffer),
            "vkEndCommandBuffer" => entry!(end_command_buffer: vk::PFN_vkEndCommandBuffer),
            "vkCmdFillBuffer" => entry!(cmd_fill_buffer: vk::PFN_vkCmdFillBuffer),
            "vkCmdCopyBuffer" => entry!(cmd_copy_buffer: vk::PFN_vkCmdCopyBuffer),
            "vkCmdPipelineBarrier" => entry!(cmd_pipeline_barrier: vk::PFN_vkCmdPipelineBarrier),
            "vkCmdClearColorImage" => entry!(cmd_clear_color_image: vk::PFN_vkCmdClearColorImage),
            "vkCreateFence" => entry!(create_fence: vk::PFN_vkCreateFence),
            "vkDestroyFence" => entry!(destroy_fence: vk::PFN_vkDestroyFence),
            "vkResetFences" => entry!(reset_fences: vk::PFN_vkResetFences),
            "vkWaitForFences" => entry!(wait_for_fences: vk::PFN_vkWaitForFences),
            "vkQueueSubmit" => entry!(queue_submit: vk::PFN_vkQueueSubmit),
            _ => None,
        }
    }
}

fn record(cmd: vk::CommandBuffer, command: Command) {
    with(|fake| {
        if let Some(Object::CommandBuffer {
            commands,
            recording: true,
        }) = fake.objects.get_mut(&cmd.as_raw())
        {
            commands.push(command);
        }
    })
}

unsafe fn write_counted<T: Copy>(values: &[T], count: *mut u32, out: *mut T) -> vk::Result {
    if out.is_null() {
        *count = values.len() as u32;
        return vk::Result::SUCCESS;
    }
    let n = (*count as usize).min(values.len());
    for (i, value) in values.iter().take(n).enumerate() {
        *out.add(i) = *value;
    }
    *count = n as u32;
    if n < values.len() {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

pub unsafe extern "system" fn get_instance_proc_addr(
    _instance: vk::Instance,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = CStr::from_ptr(name);
    with(|fake| fake.lookup(name))
}

unsafe extern "system" fn get_device_proc_addr(_device: vk::Device, name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = CStr::from_ptr(name);
    with(|fake| fake.lookup(name))
}

unsafe extern "system" fn create_instance(
    create_info: *const vk::InstanceCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    instance: *mut vk::Instance,
) -> vk::Result {
    let info = &*create_info;
    let extension_mentions = if info.enabled_extension_count == 0 {
        0
    } else {
        slice::from_raw_parts(info.pp_enabled_extension_names, info.enabled_extension_count as usize)
            .iter()
            .filter(|&&name| CStr::from_ptr(name) == c"VK_LUNARG_direct_driver_loading")
            .count()
    };
    let mut seen = None;
    let mut next = info.p_next.cast::<vk::BaseInStructure>();
    while !next.is_null() {
        if (*next).s_type == vk::StructureType::DIRECT_DRIVER_LOADING_LIST_LUNARG {
            let list = &*next.cast::<vk::DirectDriverLoadingListLUNARG>();
            if list.driver_count == 0 || list.p_drivers.is_null() {
                return vk::Result::ERROR_INITIALIZATION_FAILED;
            }
            let drivers = slice::from_raw_parts(list.p_drivers, list.driver_count as usize);
            if drivers.iter().any(|d| d.pfn_get_instance_proc_addr.is_none()) {
                return vk::Result::ERROR_INITIALIZATION_FAILED;
            }
            seen = Some(DirectDriverLoadingSeen {
                mode: list.mode,
                driver_count: list.driver_count,
                extension_mentions,
            });
        }
        next = (*next).p_next;
    }
    with(|fake| {
        let result = fake.call("vkCreateInstance");
        if result != vk::Result::SUCCESS {
            return result;
        }
        fake.direct_driver_loading = seen;
        *instance = vk::Instance::from_raw(fake.create(Object::Instance));
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn destroy_instance(instance: vk::Instance, _allocator: *const vk::AllocationCallbacks) {
    with(|fake| {
        fake.calls.push("vkDestroyInstance");
        fake.destroy(instance.as_raw());
    })
}

unsafe extern "system" fn enumerate_physical_devices(
    _instance: vk::Instance,
    count: *mut u32,
    devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkEnumeratePhysicalDevices");
        if result != vk::Result::SUCCESS {
            return result;
        }
        let mut available = fake.physical_device_count;
        if !devices.is_null() && fake.short_enumeration {
            available = available.saturating_sub(1);
        }
        let handles: Vec<vk::PhysicalDevice> = (0..available as u64)
            .map(|i| vk::PhysicalDevice::from_raw(PHYSICAL_DEVICE_BASE + i))
            .collect();
        write_counted(&handles, count, devices)
    })
}

unsafe extern "system" fn get_physical_device_properties(
    physical_device: vk::PhysicalDevice,
    properties: *mut vk::PhysicalDeviceProperties,
) {
    let mut props = vk::PhysicalDeviceProperties {
        api_version: vk::make_api_version(0, 1, 3, 0),
        vendor_id: 0xfa4e,
        device_id: (physical_device.as_raw() - PHYSICAL_DEVICE_BASE) as u32,
        device_type: vk::PhysicalDeviceType::VIRTUAL_GPU,
        ..Default::default()
    };
    for (dst, src) in props.device_name.iter_mut().zip(FAKE_DEVICE_NAME.bytes()) {
        *dst = src as c_char;
    }
    *properties = props;
}

unsafe extern "system" fn get_physical_device_memory_properties(
    _physical_device: vk::PhysicalDevice,
    properties: *mut vk::PhysicalDeviceMemoryProperties,
) {
    let mut props = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        memory_heap_count: 1,
        ..Default::default()
    };
    props.memory_types[MEMORY_TYPE_DEVICE_LOCAL as usize] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        heap_index: 0,
    };
    props.memory_types[MEMORY_TYPE_HOST_VISIBLE as usize] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        heap_index: 0,
    };
    props.memory_heaps[0] = vk::MemoryHeap {
        size: 256 << 20,
        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
    };
    *properties = props;
}

unsafe extern "system" fn get_physical_device_format_properties(
    _physical_device: vk::PhysicalDevice,
    format: vk::Format,
    properties: *mut vk::FormatProperties,
) {
    let linear_sampled = with(|fake| {
        fake.calls.push("vkGetPhysicalDeviceFormatProperties");
        fake.linear_sampled
    });
    let transfer = vk::FormatFeatureFlags::TRANSFER_SRC | vk::FormatFeatureFlags::TRANSFER_DST;
    let mut linear = transfer;
    if linear_sampled && format == vk::Format::R8G8B8A8_UNORM {
        linear |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    *properties = vk::FormatProperties {
        linear_tiling_features: linear,
        optimal_tiling_features: transfer | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        buffer_features: vk::FormatFeatureFlags::empty(),
    };
}

unsafe extern "system" fn get_physical_device_queue_family_properties(
    _physical_device: vk::PhysicalDevice,
    count: *mut u32,
    properties: *mut vk::QueueFamilyProperties,
) {
    let graphics = with(|fake| fake.graphics_queue);
    let queue_flags = if graphics {
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
    } else {
        vk::QueueFlags::TRANSFER
    };
    let families = [vk::QueueFamilyProperties {
        queue_flags,
        queue_count: 1,
        timestamp_valid_bits: 64,
        min_image_transfer_granularity: vk::Extent3D {
            width: 1,
            height: 1,
            depth: 1,
        },
    }];
    write_counted(&families, count, properties);
}

unsafe extern "system" fn create_device(
    _physical_device: vk::PhysicalDevice,
    _create_info: *const vk::DeviceCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    device: *mut vk::Device,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkCreateDevice");
        if result == vk::Result::SUCCESS {
            *device = vk::Device::from_raw(fake.create(Object::Device));
        }
        result
    })
}

unsafe extern "system" fn destroy_device(device: vk::Device, _allocator: *const vk::AllocationCallbacks) {
    with(|fake| {
        fake.calls.push("vkDestroyDevice");
        fake.destroy(device.as_raw());
    })
}

unsafe extern "system" fn get_device_queue(_device: vk::Device, _family: u32, _index: u32, queue: *mut vk::Queue) {
    with(|fake| fake.calls.push("vkGetDeviceQueue"));
    *queue = vk::Queue::from_raw(QUEUE_HANDLE);
}

unsafe extern "system" fn create_buffer(
    _device: vk::Device,
    create_info: *const vk::BufferCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    buffer: *mut vk::Buffer,
) -> vk::Result {
    let size = (*create_info).size;
    with(|fake| {
        let result = fake.call("vkCreateBuffer");
        if result == vk::Result::SUCCESS {
            *buffer = vk::Buffer::from_raw(fake.create(Object::Buffer { size, binding: None }));
        }
        result
    })
}

unsafe extern "system" fn destroy_buffer(
    _device: vk::Device,
    buffer: vk::Buffer,
    _allocator: *const vk::AllocationCallbacks,
) {
    with(|fake| {
        fake.calls.push("vkDestroyBuffer");
        fake.destroy(buffer.as_raw());
    })
}

unsafe extern "system" fn get_buffer_memory_requirements(
    _device: vk::Device,
    buffer: vk::Buffer,
    requirements: *mut vk::MemoryRequirements,
) {
    let size = with(|fake| match fake.objects.get(&buffer.as_raw()) {
        Some(Object::Buffer { size, .. }) => *size,
        _ => 0,
    });
    *requirements = FakeIcd::memory_requirements(size, 64);
}

unsafe extern "system" fn bind_buffer_memory(
    _device: vk::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkBindBufferMemory");
        if result != vk::Result::SUCCESS {
            return result;
        }
        match fake.objects.get_mut(&buffer.as_raw()) {
            Some(Object::Buffer { binding, .. }) => {
                *binding = Some((memory.as_raw(), offset));
                vk::Result::SUCCESS
            }
            _ => vk::Result::ERROR_UNKNOWN,
        }
    })
}

unsafe extern "system" fn create_image(
    _device: vk::Device,
    create_info: *const vk::ImageCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    image: *mut vk::Image,
) -> vk::Result {
    let extent = (*create_info).extent;
    with(|fake| {
        let result = fake.call("vkCreateImage");
        if result == vk::Result::SUCCESS {
            *image = vk::Image::from_raw(fake.create(Object::Image {
                width: extent.width,
                height: extent.height,
                binding: None,
            }));
        }
        result
    })
}

unsafe extern "system" fn destroy_image(_device: vk::Device, image: vk::Image, _allocator: *const vk::AllocationCallbacks) {
    with(|fake| {
        fake.calls.push("vkDestroyImage");
        fake.destroy(image.as_raw());
    })
}

unsafe extern "system" fn get_image_memory_requirements(
    _device: vk::Device,
    image: vk::Image,
    requirements: *mut vk::MemoryRequirements,
) {
    let size = with(|fake| match fake.objects.get(&image.as_raw()) {
        Some(Object::Image { width, height, .. }) => *width as u64 * *height as u64 * 4,
        _ => 0,
    });
    *requirements = FakeIcd::memory_requirements(size, 256);
}

unsafe extern "system" fn bind_image_memory(
    _device: vk::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkBindImageMemory");
        if result != vk::Result::SUCCESS {
            return result;
        }
        match fake.objects.get_mut(&image.as_raw()) {
            Some(Object::Image { binding, .. }) => {
                *binding = Some((memory.as_raw(), offset));
                vk::Result::SUCCESS
            }
            _ => vk::Result::ERROR_UNKNOWN,
        }
    })
}

unsafe extern "system" fn get_image_subresource_layout(
    _device: vk::Device,
    image: vk::Image,
    _subresource: *const vk::ImageSubresource,
    layout: *mut vk::SubresourceLayout,
) {
    let (width, height) = with(|fake| match fake.objects.get(&image.as_raw()) {
        Some(Object::Image { width, height, .. }) => (*width as u64, *height as u64),
        _ => (0, 0),
    });
    *layout = vk::SubresourceLayout {
        offset: 0,
        size: width * height * 4,
        row_pitch: width * 4,
        array_pitch: width * height * 4,
        depth_pitch: width * height * 4,
    };
}

unsafe extern "system" fn create_image_view(
    _device: vk::Device,
    _create_info: *const vk::ImageViewCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    view: *mut vk::ImageView,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkCreateImageView");
        if result == vk::Result::SUCCESS {
            *view = vk::ImageView::from_raw(fake.create(Object::ImageView));
        }
        result
    })
}

unsafe extern "system" fn destroy_image_view(
    _device: vk::Device,
    view: vk::ImageView,
    _allocator: *const vk::AllocationCallbacks,
) {
    with(|fake| {
        fake.calls.push("vkDestroyImageView");
        fake.destroy(view.as_raw());
    })
}

unsafe extern "system" fn allocate_memory(
    _device: vk::Device,
    allocate_info: *const vk::MemoryAllocateInfo,
    _allocator: *const vk::AllocationCallbacks,
    memory: *mut vk::DeviceMemory,
) -> vk::Result {
    let info = &*allocate_info;
    with(|fake| {
        let result = fake.call("vkAllocateMemory");
        if result != vk::Result::SUCCESS {
            return result;
        }
        if info.memory_type_index > MEMORY_TYPE_HOST_VISIBLE {
            return vk::Result::ERROR_OUT_OF_DEVICE_MEMORY;
        }
        let data = vec![0u8; info.allocation_size as usize];
        *memory = vk::DeviceMemory::from_raw(fake.create(Object::Memory {
            data,
            memory_type: info.memory_type_index,
        }));
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn free_memory(
    _device: vk::Device,
    memory: vk::DeviceMemory,
    _allocator: *const vk::AllocationCallbacks,
) {
    with(|fake| {
        fake.calls.push("vkFreeMemory");
        fake.destroy(memory.as_raw());
    })
}

unsafe extern "system" fn map_memory(
    _device: vk::Device,
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    _flags: vk::MemoryMapFlags,
    data: *mut *mut c_void,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkMapMemory");
        if result != vk::Result::SUCCESS {
            return result;
        }
        match fake.objects.get_mut(&memory.as_raw()) {
            Some(Object::Memory { data: bytes, memory_type }) => {
                let end = if size == vk::WHOLE_SIZE { bytes.len() as u64 } else { offset + size };
                if *memory_type != MEMORY_TYPE_HOST_VISIBLE || end > bytes.len() as u64 {
                    return vk::Result::ERROR_MEMORY_MAP_FAILED;
                }
                *data = bytes.as_mut_ptr().add(offset as usize).cast();
                vk::Result::SUCCESS
            }
            _ => vk::Result::ERROR_MEMORY_MAP_FAILED,
        }
    })
}

unsafe extern "system" fn unmap_memory(_device: vk::Device, _memory: vk::DeviceMemory) {
    with(|fake| fake.calls.push("vkUnmapMemory"));
}

unsafe extern "system" fn create_command_pool(
    _device: vk::Device,
    _create_info: *const vk::CommandPoolCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    pool: *mut vk::CommandPool,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkCreateCommandPool");
        if result == vk::Result::SUCCESS {
            *pool = vk::CommandPool::from_raw(fake.create(Object::CommandPool));
        }
        result
    })
}

unsafe extern "system" fn destroy_command_pool(
    _device: vk::Device,
    pool: vk::CommandPool,
    _allocator: *const vk::AllocationCallbacks,
) {
    with(|fake| {
        fake.calls.push("vkDestroyCommandPool");
        fake.destroy(pool.as_raw());
    })
}

unsafe extern "system" fn allocate_command_buffers(
    _device: vk::Device,
    allocate_info: *const vk::CommandBufferAllocateInfo,
    buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let count = (*allocate_info).command_buffer_count as usize;
    with(|fake| {
        let result = fake.call("vkAllocateCommandBuffers");
        if result != vk::Result::SUCCESS {
            return result;
        }
        for i in 0..count {
            let handle = fake.create(Object::CommandBuffer {
                commands: Vec::new(),
                recording: false,
            });
            *buffers.add(i) = vk::CommandBuffer::from_raw(handle);
        }
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn free_command_buffers(
    _device: vk::Device,
    _pool: vk::CommandPool,
    count: u32,
    buffers: *const vk::CommandBuffer,
) {
    let buffers = slice::from_raw_parts(buffers, count as usize);
    with(|fake| {
        fake.calls.push("vkFreeCommandBuffers");
        for buffer in buffers {
            fake.destroy(buffer.as_raw());
        }
    })
}

unsafe extern "system" fn reset_command_buffer(
    cmd: vk::CommandBuffer,
    _flags: vk::CommandBufferResetFlags,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkResetCommandBuffer");
        if let Some(Object::CommandBuffer { commands, recording }) = fake.objects.get_mut(&cmd.as_raw()) {
            commands.clear();
            *recording = false;
        }
        result
    })
}

unsafe extern "system" fn begin_command_buffer(
    cmd: vk::CommandBuffer,
    _begin_info: *const vk::CommandBufferBeginInfo,
) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkBeginCommandBuffer");
        if let Some(Object::CommandBuffer { commands, recording }) = fake.objects.get_mut(&cmd.as_raw()) {
            commands.clear();
            *recording = true;
        }
        result
    })
}

unsafe extern "system" fn end_command_buffer(cmd: vk::CommandBuffer) -> vk::Result {
    with(|fake| {
        let result = fake.call("vkEndCommandBuffer");
        if let Some(Object::CommandBuffer { recording, .. }) = fake.objects.get_mut(&cmd.as_raw()) {
            *recording = false;
        }
        result
    })
}

unsafe extern "system" fn cmd_fill_buffer(
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    data: u32,
) {
    with(|fake| fake.calls.push("vkCmdFillBuffer"));
    record(
        cmd,
        Command::Fill {
            buffer: buffer.as_raw(),
            offset,
            size,
            data,
        },
    );
}

unsafe extern "system" fn cmd_copy_buffer(
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    region_count: u32,
    regions: *const vk::BufferCopy,
) {
    let regions = slice::from_raw_parts(regions, region_count as usize).to_vec();
    with(|fake| fake.calls.push("vkCmdCopyBuffer"));
    record(
        cmd,
        Command::Copy {
            src: src.as_raw(),
            dst: dst.as_raw(),
            regions,
        },
    );
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn cmd_pipeline_barrier(
    cmd: vk::CommandBuffer,
    _src_stage: vk::PipelineStageFlags,
    _dst_stage: vk::PipelineStageFlags,
    _dependency_flags: vk::DependencyFlags,
    _memory_barrier_count: u32,
    _memory_barriers: *const vk::MemoryBarrier,
    _buffer_barrier_count: u32,
    _buffer_barriers: *const vk::BufferMemoryBarrier,
    _image_barrier_count: u32,
    _image_barriers: *const vk::ImageMemoryBarrier,
) {
    with(|fake| fake.calls.push("vkCmdPipelineBarrier"));
    record(cmd, Command::Barrier);
}

unsafe extern "system" fn cmd_clear_color_image(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    _layout: vk::ImageLayout,
    color: *const vk::ClearColorValue,
    _range_count: u32,
    _ranges: *const vk::ImageSubresourceRange,
) {
    let color = (*color).float32;
    with(|fake| fake.calls.push("vkCmdClearColorImage"));
    record(
        cmd,
        Command::Clear {
            image: image.as_raw(),
            color,
        },
    );
}

unsafe extern "system" fn create_fence(
    _device: vk::Device,
    create_info: *const vk::FenceCreateInfo,
    _allocator: *const vk::AllocationCallbacks,
    fence: *mut vk::Fence,
) -> vk::Result {
    let signaled = (*create_info).flags.contains(vk::FenceCreateFlags::SIGNALED);
    with(|fake| {
        let result = fake.call("vkCreateFence");
        if result == vk::Result::SUCCESS {
            *fence = vk::Fence::from_raw(fake.create(Object::Fence { signaled }));
        }
        result
    })
}

unsafe extern "system" fn destroy_fence(_device: vk::Device, fence: vk::Fence, _allocator: *const vk::AllocationCallbacks) {
    with(|fake| {
        fake.calls.push("vkDestroyFence");
        fake.destroy(fence.as_raw());
    })
}

unsafe extern "system" fn reset_fences(_device: vk::Device, count: u32, fences: *const vk::Fence) -> vk::Result {
    let fences = slice::from_raw_parts(fences, count as usize);
    with(|fake| {
        let result = fake.call("vkResetFences");
        for fence in fences {
            if let Some(Object::Fence { signaled }) = fake.objects.get_mut(&fence.as_raw()) {
                *signaled = false;
            }
        }
        result
    })
}

unsafe extern "system" fn wait_for_fences(
    _device: vk::Device,
    count: u32,
    fences: *const vk::Fence,
    _wait_all: vk::Bool32,
    _timeout: u64,
) -> vk::Result {
    let fences = slice::from_raw_parts(fences, count as usize);
    with(|fake| {
        let result = fake.call("vkWaitForFences");
        if result != vk::Result::SUCCESS {
            return result;
        }
        let all_signaled = fences
            .iter()
            .all(|f| matches!(fake.objects.get(&f.as_raw()), Some(Object::Fence { signaled: true })));
        if all_signaled {
            vk::Result::SUCCESS
        } else {
            vk::Result::TIMEOUT
        }
    })
}

unsafe extern "system" fn queue_submit(
    _queue: vk::Queue,
    submit_count: u32,
    submits: *const vk::SubmitInfo,
    fence: vk::Fence,
) -> vk::Result {
    let mut buffers = Vec::new();
    for submit in slice::from_raw_parts(submits, submit_count as usize) {
        if submit.command_buffer_count > 0 {
            buffers.extend(
                slice::from_raw_parts(submit.p_command_buffers, submit.command_buffer_count as usize)
                    .iter()
                    .map(|b| b.as_raw()),
            );
        }
    }
    with(|fake| {
        let result = fake.call("vkQueueSubmit");
        if result != vk::Result::SUCCESS {
            return result;
        }
        fake.submissions += 1;
        for buffer in buffers {
            fake.execute(buffer);
        }
        if !fake.never_signal {
            if let Some(Object::Fence { signaled }) = fake.objects.get_mut(&fence.as_raw()) {
                *signaled = true;
            }
        }
        vk::Result::SUCCESS
    })
}
