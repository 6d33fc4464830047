//! Memory-type selection, allocation and host mapping.

use super::{DeviceObject, Session};
use crate::error::{HarnessError, VkResultExt};
use ash::vk;

/// Where a resource's backing memory must live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Mappable and coherent; used for everything the host reads back.
    HostVisible,
    DeviceLocal,
}

impl MemoryLocation {
    pub fn required_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryLocation::HostVisible => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            MemoryLocation::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

/// Lowest memory type allowed by `type_bits` whose properties contain `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count).find(|i| {
        let suitable = (type_bits & (1 << i)) != 0;
        let mem_type = &props.memory_types[*i as usize];
        suitable && mem_type.property_flags.contains(flags)
    })
}

/// One dedicated allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub memory_type: u32,
}

impl Session {
    /// Allocate memory satisfying `requirements` in `location`. The allocation is tracked and freed
    /// at teardown, after every resource.
    pub fn allocate(
        &mut self,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> Result<Allocation, HarnessError> {
        let flags = location.required_flags();
        let props = self
            .physical_device()
            .map(|p| p.memory_properties)
            .ok_or(HarnessError::NoPhysicalDevice)?;
        let memory_type = find_memory_type(&props, requirements.memory_type_bits, flags).ok_or(
            HarnessError::NoMemoryType {
                type_bits: requirements.memory_type_bits,
                flags,
            },
        )?;
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { self.device()?.allocate_memory(&allocate_info, None) }.vk_call("vkAllocateMemory")?;
        self.track(DeviceObject::Memory(memory));
        log::debug!(
            "allocated {} bytes of type {} ({:?})",
            requirements.size,
            memory_type,
            location
        );
        Ok(Allocation {
            memory,
            size: requirements.size,
            memory_type,
        })
    }

    /// Map `size` bytes at `offset`, hand them to `read`, unmap.
    pub fn read_mapped<R>(
        &self,
        memory: vk::DeviceMemory,
        offset: u64,
        size: u64,
        read: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, HarnessError> {
        let device = self.device()?;
        let len = usize::try_from(size)
            .map_err(|_| HarnessError::Config(format!("mapping of {} bytes exceeds address space", size)))?;
        unsafe {
            let ptr = device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
                .vk_call("vkMapMemory")?;
            let bytes = std::slice::from_raw_parts(ptr.cast::<u8>().cast_const(), len);
            let out = read(bytes);
            device.unmap_memory(memory);
            Ok(out)
        }
    }
}
