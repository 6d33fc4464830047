//! Record of device-owned objects and the fixed order they are released in.

use crate::error::HarnessError;
use ash::vk;
use ash::vk::Handle;

/// Release classes, in release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TeardownClass {
    Fence,
    CommandBuffer,
    CommandPool,
    ImageView,
    Resource,
    Memory,
    Device,
    Instance,
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceObject {
    Fence(vk::Fence),
    CommandBuffer {
        pool: vk::CommandPool,
        buffer: vk::CommandBuffer,
    },
    CommandPool(vk::CommandPool),
    ImageView(vk::ImageView),
    Buffer(vk::Buffer),
    Image(vk::Image),
    Memory(vk::DeviceMemory),
}

impl DeviceObject {
    pub fn class(&self) -> TeardownClass {
        match self {
            DeviceObject::Fence(_) => TeardownClass::Fence,
            DeviceObject::CommandBuffer { .. } => TeardownClass::CommandBuffer,
            DeviceObject::CommandPool(_) => TeardownClass::CommandPool,
            DeviceObject::ImageView(_) => TeardownClass::ImageView,
            DeviceObject::Buffer(_) | DeviceObject::Image(_) => TeardownClass::Resource,
            DeviceObject::Memory(_) => TeardownClass::Memory,
        }
    }

    /// Name of the command that releases the object.
    pub fn release_call(&self) -> &'static str {
        match self {
            DeviceObject::Fence(_) => "vkDestroyFence",
            DeviceObject::CommandBuffer { .. } => "vkFreeCommandBuffers",
            DeviceObject::CommandPool(_) => "vkDestroyCommandPool",
            DeviceObject::ImageView(_) => "vkDestroyImageView",
            DeviceObject::Buffer(_) => "vkDestroyBuffer",
            DeviceObject::Image(_) => "vkDestroyImage",
            DeviceObject::Memory(_) => "vkFreeMemory",
        }
    }

    pub fn raw(&self) -> u64 {
        match *self {
            DeviceObject::Fence(h) => h.as_raw(),
            DeviceObject::CommandBuffer { buffer, .. } => buffer.as_raw(),
            DeviceObject::CommandPool(h) => h.as_raw(),
            DeviceObject::ImageView(h) => h.as_raw(),
            DeviceObject::Buffer(h) => h.as_raw(),
            DeviceObject::Image(h) => h.as_raw(),
            DeviceObject::Memory(h) => h.as_raw(),
        }
    }

    unsafe fn release(self, device: &ash::Device) {
        match self {
            DeviceObject::Fence(h) => device.destroy_fence(h, None),
            DeviceObject::CommandBuffer { pool, buffer } => device.free_command_buffers(pool, &[buffer]),
            DeviceObject::CommandPool(h) => device.destroy_command_pool(h, None),
            DeviceObject::ImageView(h) => device.destroy_image_view(h, None),
            DeviceObject::Buffer(h) => device.destroy_buffer(h, None),
            DeviceObject::Image(h) => device.destroy_image(h, None),
            DeviceObject::Memory(h) => device.free_memory(h, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub class: TeardownClass,
    pub call: &'static str,
    pub raw: u64,
}

/// Everything a teardown released, in the order it was released, and what it had to leave alive.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub released: Vec<Released>,
    /// Objects kept because work referencing them may still be executing.
    pub leaked: Vec<Released>,
}

impl TeardownReport {
    pub(crate) fn push(&mut self, class: TeardownClass, call: &'static str, raw: u64) {
        log::debug!("teardown: {} {:#x}", call, raw);
        self.released.push(Released { class, call, raw });
    }

    pub(crate) fn leak(&mut self, class: TeardownClass, call: &'static str, raw: u64) {
        log::error!("teardown: {:?} {:#x} leaked, {} skipped", class, raw, call);
        self.leaked.push(Released { class, call, raw });
    }

    pub fn leaked_classes(&self) -> Vec<TeardownClass> {
        self.leaked.iter().map(|r| r.class).collect()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.released.iter().map(|r| r.call).collect()
    }

    /// True when no class is released after a later class.
    pub fn is_class_ordered(&self) -> bool {
        self.released.windows(2).all(|w| w[0].class <= w[1].class)
    }

    pub fn count(&self, class: TeardownClass) -> usize {
        self.released.iter().filter(|r| r.class == class).count()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ObjectLedger {
    objects: Vec<DeviceObject>,
    in_flight: Vec<vk::Fence>,
}

impl ObjectLedger {
    pub fn track(&mut self, object: DeviceObject) {
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn submitted(&mut self, fence: vk::Fence) {
        self.in_flight.push(fence);
    }

    pub fn waited(&mut self, fence: vk::Fence) {
        self.in_flight.retain(|f| *f != fence);
    }

    pub fn in_flight(&self) -> &[vk::Fence] {
        &self.in_flight
    }

    /// Class order first, newest first within a class.
    pub fn release_order(&self) -> Vec<DeviceObject> {
        let mut order: Vec<DeviceObject> = self.objects.iter().rev().copied().collect();
        order.sort_by_key(DeviceObject::class);
        order
    }

    /// Wait out pending submissions, then release every object. If the wait fails nothing is
    /// released: every object goes into the report as leaked and the wait error is returned.
    pub fn release_all(
        &mut self,
        device: &ash::Device,
        timeout_ns: u64,
        report: &mut TeardownReport,
    ) -> Result<(), HarnessError> {
        if !self.in_flight.is_empty() {
            log::warn!(
                "teardown: waiting on {} unwaited submission(s)",
                self.in_flight.len()
            );
            let waited = unsafe { device.wait_for_fences(&self.in_flight, true, timeout_ns) };
            if let Err(result) = waited {
                let err = match result {
                    vk::Result::TIMEOUT => HarnessError::FenceTimeout {
                        timeout_ms: timeout_ns / 1_000_000,
                    },
                    result => HarnessError::Vulkan {
                        call: "vkWaitForFences",
                        result,
                    },
                };
                log::error!("teardown: {}", err);
                for object in self.release_order() {
                    report.leak(object.class(), object.release_call(), object.raw());
                }
                self.objects.clear();
                self.in_flight.clear();
                return Err(err);
            }
            self.in_flight.clear();
        }
        for object in self.release_order() {
            unsafe { object.release(device) };
            report.push(object.class(), object.release_call(), object.raw());
        }
        self.objects.clear();
        Ok(())
    }
}
