use super::{transfer_barrier, Scenario, Verification};
use crate::error::HarnessError;
use crate::session::{BoundImage, MemoryLocation, Session, LINEAR_IMAGE_FORMAT, RGBA8_BYTES_PER_PIXEL};
use ash::vk;
use std::ffi::CStr;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENT: u32 = 256;
pub const PNG_FILE_NAME: &str = "image_readback.png";

const IMAGE_COMMANDS: &[&CStr] = &[
    c"vkCreateImage",
    c"vkDestroyImage",
    c"vkGetImageMemoryRequirements",
    c"vkBindImageMemory",
    c"vkGetImageSubresourceLayout",
    c"vkAllocateMemory",
    c"vkFreeMemory",
    c"vkMapMemory",
    c"vkUnmapMemory",
];

const CLEAR_COMMANDS: &[&CStr] = &[c"vkCmdClearColorImage", c"vkCmdPipelineBarrier"];

/// Create a linear RGBA8 image in host-visible memory, map it after a submission and write the
/// pixels out as PNG.
#[derive(Debug, Clone)]
pub struct ImageReadback {
    pub width: u32,
    pub height: u32,
    /// Cleared to this colour when set; otherwise the submission is empty and contents are
    /// whatever the driver left.
    pub clear_color: Option<[f32; 4]>,
    output: PathBuf,
    image: Option<BoundImage>,
}

impl ImageReadback {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            width: IMAGE_EXTENT,
            height: IMAGE_EXTENT,
            clear_color: None,
            output: output_dir.as_ref().join(PNG_FILE_NAME),
            image: None,
        }
    }

    pub fn with_clear(mut self, color: [f32; 4]) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn image(&self) -> Option<&BoundImage> {
        self.image.as_ref()
    }

    fn bound(&self) -> Result<&BoundImage, HarnessError> {
        self.image.as_ref().ok_or(HarnessError::Verification {
            scenario: "image_readback",
            detail: "image was never built".into(),
        })
    }
}

/// RGBA8 UNORM encoding of a clear colour.
pub(crate) fn unorm8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

impl Scenario for ImageReadback {
    fn name(&self) -> &'static str {
        "image_readback"
    }

    fn required_commands(&self) -> &'static [&'static CStr] {
        if self.clear_color.is_some() {
            CLEAR_COMMANDS
        } else {
            &[]
        }
    }

    fn required_command_sets(&self) -> &'static [&'static [&'static CStr]] {
        &[IMAGE_COMMANDS]
    }

    fn build(&mut self, session: &mut Session) -> Result<(), HarnessError> {
        let view_exported = session
            .device_table()
            .is_some_and(|t| t.contains(c"vkCreateImageView") && t.contains(c"vkDestroyImageView"));
        let linear_sampled = session
            .linear_format_features()?
            .is_some_and(|f| f.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE));
        let with_view = view_exported && linear_sampled;
        let mut usage = vk::ImageUsageFlags::TRANSFER_DST;
        if with_view {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        let mut image = session.create_linear_image(self.width, self.height, usage, MemoryLocation::HostVisible)?;
        if with_view {
            image.view = Some(session.create_color_view(&image)?);
        } else if !view_exported {
            log::info!("vkCreateImageView not exported, skipping the image view");
        } else {
            log::info!("linear {:?} cannot be sampled, skipping the image view", LINEAR_IMAGE_FORMAT);
        }
        self.image = Some(image);
        Ok(())
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, _pass: u32) -> Result<(), HarnessError> {
        let Some(color) = self.clear_color else {
            return Ok(());
        };
        let image = self.bound()?;
        let range = crate::session::color_range();
        let to_general = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(range);
        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_general],
            );
            device.cmd_clear_color_image(cmd, image.image, vk::ImageLayout::GENERAL, &clear, &[range]);
            transfer_barrier(device, cmd, vk::AccessFlags::HOST_READ);
        }
        Ok(())
    }

    fn verify(&mut self, session: &Session, _pass: u32) -> Result<Verification, HarnessError> {
        let image = *self.bound()?;
        let pixels = session.read_linear_rgba8(&image)?;

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image::save_buffer(&self.output, &pixels, image.width, image.height, image::ColorType::Rgba8)?;
        log::info!("wrote {}", self.output.display());

        let written = image::open(&self.output)?;
        let channels = written.color().channel_count() as u32;
        if written.width() != image.width || written.height() != image.height || channels != RGBA8_BYTES_PER_PIXEL {
            return Err(HarnessError::Verification {
                scenario: "image_readback",
                detail: format!(
                    "{} reads back as {}x{} with {} channel(s)",
                    self.output.display(),
                    written.width(),
                    written.height(),
                    channels
                ),
            });
        }

        Ok(match self.clear_color {
            Some(color) => {
                let expected = u32::from_ne_bytes(unorm8(color));
                let texels: Vec<u32> = pixels.chunks_exact(4).map(bytemuck::pod_read_unaligned::<u32>).collect();
                Verification::compare_words(0, &texels, expected)
            }
            None => Verification::unchecked(),
        })
    }
}
