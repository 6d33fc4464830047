//! Command pools, command buffers, fences and queue submission.

use super::{BootstrapState, DeviceObject, Session};
use crate::error::{HarnessError, VkResultExt};
use ash::vk;
use ash::vk::Handle;

/// The queue retrieved from the graphics family at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsQueue {
    pub handle: vk::Queue,
    pub family: u32,
}

impl Session {
    /// The graphics queue. Fails for sessions bootstrapped with the bare device profile.
    pub fn queue(&self) -> Result<GraphicsQueue, HarnessError> {
        self.queue.ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: BootstrapState::DeviceResolved,
        })
    }

    /// A pool on the graphics family whose buffers can be reset one by one.
    pub fn create_command_pool(&mut self) -> Result<vk::CommandPool, HarnessError> {
        let family = self.queue()?.family;
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family);
        let pool =
            unsafe { self.device()?.create_command_pool(&create_info, None) }.vk_call("vkCreateCommandPool")?;
        self.track(DeviceObject::CommandPool(pool));
        Ok(pool)
    }

    pub fn allocate_command_buffer(&mut self, pool: vk::CommandPool) -> Result<vk::CommandBuffer, HarnessError> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device()?.allocate_command_buffers(&allocate_info) }
            .vk_call("vkAllocateCommandBuffers")?;
        let buffer = buffers.first().copied().ok_or(HarnessError::Vulkan {
            call: "vkAllocateCommandBuffers",
            result: vk::Result::ERROR_UNKNOWN,
        })?;
        self.track(DeviceObject::CommandBuffer { pool, buffer });
        Ok(buffer)
    }

    /// Reset, then begin a one-time-submit recording.
    pub fn begin_recording(&self, cmd: vk::CommandBuffer) -> Result<(), HarnessError> {
        let device = self.device()?;
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .vk_call("vkResetCommandBuffer")?;
            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .vk_call("vkBeginCommandBuffer")
        }
    }

    pub fn end_recording(&self, cmd: vk::CommandBuffer) -> Result<(), HarnessError> {
        unsafe { self.device()?.end_command_buffer(cmd) }.vk_call("vkEndCommandBuffer")
    }

    /// An unsignaled fence.
    pub fn create_fence(&mut self) -> Result<vk::Fence, HarnessError> {
        let create_info = vk::FenceCreateInfo::default();
        let fence = unsafe { self.device()?.create_fence(&create_info, None) }.vk_call("vkCreateFence")?;
        self.track(DeviceObject::Fence(fence));
        Ok(fence)
    }

    /// Submit one command buffer, signalling `fence` on completion.
    pub fn submit(&mut self, cmd: vk::CommandBuffer, fence: vk::Fence) -> Result<(), HarnessError> {
        let queue = self.queue()?;
        let buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe { self.device()?.queue_submit(queue.handle, &[submit], fence) }.vk_call("vkQueueSubmit")?;
        log::debug!("submitted {:#x} with fence {:#x}", cmd.as_raw(), fence.as_raw());
        self.ledger.submitted(fence);
        Ok(())
    }

    /// Block on `fence` using the configured timeout.
    pub fn wait_fence(&mut self, fence: vk::Fence) -> Result<(), HarnessError> {
        let timeout_ns = self.fence_timeout_ns;
        let waited = unsafe { self.device()?.wait_for_fences(&[fence], true, timeout_ns) };
        match waited {
            Ok(()) => {
                self.ledger.waited(fence);
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => Err(HarnessError::FenceTimeout {
                timeout_ms: timeout_ns / 1_000_000,
            }),
            Err(result) => Err(HarnessError::Vulkan {
                call: "vkWaitForFences",
                result,
            }),
        }
    }
}
