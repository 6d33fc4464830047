//! Linear-tiled colour images that the host can map directly.

use super::{DeviceObject, MemoryLocation, Session};
use crate::error::{HarnessError, VkResultExt};
use ash::vk;
use ash::vk::Handle;

pub const RGBA8_BYTES_PER_PIXEL: u32 = 4;
pub const LINEAR_IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// A 2-D RGBA8 image and the allocation bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: Option<vk::ImageView>,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub memory_type: u32,
}

pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Copy `height` rows of `row_bytes` out of a pitched mapping into a packed buffer.
pub(crate) fn pack_rows(mapped: &[u8], row_pitch: usize, row_bytes: usize, height: usize) -> Vec<u8> {
    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * row_pitch;
        packed.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    packed
}

impl Session {
    /// Linear-tiling features of [`LINEAR_IMAGE_FORMAT`] on the selected device. `None` when the
    /// driver does not export `vkGetPhysicalDeviceFormatProperties`.
    pub fn linear_format_features(&self) -> Result<Option<vk::FormatFeatureFlags>, HarnessError> {
        let exported = self
            .instance_table
            .as_ref()
            .is_some_and(|t| t.contains(c"vkGetPhysicalDeviceFormatProperties"));
        if !exported {
            return Ok(None);
        }
        let instance = self.loaded_instance()?;
        let physical = self.physical.as_ref().ok_or(HarnessError::OutOfOrder {
            current: self.state,
            requested: super::BootstrapState::PhysicalDeviceSelected,
        })?;
        let properties =
            unsafe { instance.get_physical_device_format_properties(physical.handle, LINEAR_IMAGE_FORMAT) };
        Ok(Some(properties.linear_tiling_features))
    }

    /// Create a single-mip, single-layer RGBA8 image with linear tiling and bind memory to it.
    pub fn create_linear_image(
        &mut self,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        location: MemoryLocation,
    ) -> Result<BoundImage, HarnessError> {
        let format = LINEAR_IMAGE_FORMAT;
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: width.max(1),
                height: height.max(1),
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device()?.create_image(&create_info, None) }.vk_call("vkCreateImage")?;
        self.track(DeviceObject::Image(image));

        let requirements = unsafe { self.device()?.get_image_memory_requirements(image) };
        let allocation = self.allocate(requirements, location)?;
        unsafe { self.device()?.bind_image_memory(image, allocation.memory, 0) }.vk_call("vkBindImageMemory")?;
        log::info!(
            "image {:#x}: {}x{} {:?} linear, memory type {}",
            image.as_raw(),
            width,
            height,
            format,
            allocation.memory_type
        );
        Ok(BoundImage {
            image,
            memory: allocation.memory,
            view: None,
            width,
            height,
            format,
            memory_type: allocation.memory_type,
        })
    }

    /// Create a 2-D colour view of `image`.
    pub fn create_color_view(&mut self, image: &BoundImage) -> Result<vk::ImageView, HarnessError> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .subresource_range(color_range());
        let view = unsafe { self.device()?.create_image_view(&create_info, None) }.vk_call("vkCreateImageView")?;
        self.track(DeviceObject::ImageView(view));
        Ok(view)
    }

    /// Map the image and return its pixels tightly packed, row by row.
    pub fn read_linear_rgba8(&self, image: &BoundImage) -> Result<Vec<u8>, HarnessError> {
        let subresource = vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        };
        let layout = unsafe { self.device()?.get_image_subresource_layout(image.image, subresource) };
        let row_bytes = (image.width * RGBA8_BYTES_PER_PIXEL) as usize;
        let row_pitch = layout.row_pitch as usize;
        if row_pitch < row_bytes {
            return Err(HarnessError::Verification {
                scenario: "image_readback",
                detail: format!("row pitch {} is smaller than a row of {} bytes", row_pitch, row_bytes),
            });
        }
        let height = image.height as usize;
        let mapped_len = row_pitch * height.saturating_sub(1) + row_bytes;
        log::debug!(
            "image layout: offset {}, size {}, row pitch {}",
            layout.offset,
            layout.size,
            layout.row_pitch
        );
        self.read_mapped(image.memory, layout.offset, mapped_len as u64, |mapped| {
            pack_rows(mapped, row_pitch, row_bytes, height)
        })
    }
}
