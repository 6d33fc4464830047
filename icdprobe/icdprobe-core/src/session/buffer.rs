//! Buffers with dedicated, bound memory.

use super::{DeviceObject, MemoryLocation, Session};
use crate::error::{HarnessError, VkResultExt};
use ash::vk;
use ash::vk::Handle;

bitflags::bitflags! {
    /// How a harness buffer is used; combine for buffers that are both filled and copied from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
    }
}

impl BufferUsage {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if self.contains(BufferUsage::COPY_SRC) {
            flags |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if self.contains(BufferUsage::COPY_DST) {
            flags |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        flags
    }
}

/// A buffer and the allocation bound to it at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Size requested at creation; the allocation may be larger.
    pub size: u64,
    pub memory_type: u32,
    pub location: MemoryLocation,
}

impl Session {
    /// Create → query requirements → pick type → allocate → bind.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> Result<BoundBuffer, HarnessError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage.to_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device()?.create_buffer(&create_info, None) }.vk_call("vkCreateBuffer")?;
        self.track(DeviceObject::Buffer(buffer));

        let requirements = unsafe { self.device()?.get_buffer_memory_requirements(buffer) };
        let allocation = self.allocate(requirements, location)?;
        unsafe { self.device()?.bind_buffer_memory(buffer, allocation.memory, 0) }.vk_call("vkBindBufferMemory")?;
        log::info!(
            "buffer {:#x}: {} bytes, {:?}, memory type {}",
            buffer.as_raw(),
            size,
            usage,
            allocation.memory_type
        );
        Ok(BoundBuffer {
            buffer,
            memory: allocation.memory,
            size,
            memory_type: allocation.memory_type,
            location,
        })
    }

    /// Read back a host-visible buffer as native-endian 32-bit words.
    pub fn read_buffer_words(&self, buffer: &BoundBuffer, offset: u64, size: u64) -> Result<Vec<u32>, HarnessError> {
        self.read_mapped(buffer.memory, offset, size, |bytes| {
            bytes
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect()
        })
    }
}
