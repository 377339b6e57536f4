use std::{ops::BitOr, sync::Arc};

use crate::error::{Result, TracerError, VkResultExt};
use crate::utility::find_memorytype_index;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::context::Context;
use ash::vk::{
    self, AccessFlags2, Extent3D, Format, ImageCreateFlags, ImageLayout, ImageMemoryBarrier2,
    ImageSubresourceRange, ImageTiling, ImageType, ImageUsageFlags, PipelineStageFlags2,
    SampleCountFlags, SharingMode,
};

pub struct Image {
    pub inner: vk::Image,
    pub memory: vk::DeviceMemory,

    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,

    context: Arc<Context>,
}

impl Image {
    pub fn new(
        context: Arc<Context>,
        create_info: &vk::ImageCreateInfo,
        memory_property_flags: vk::MemoryPropertyFlags,
    ) -> Result<Image> {
        let device = &context.device;

        let image =
            unsafe { device.create_image(create_info, None) }.or_resource_error("image")?;

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };

        let Some(image_memorytype_index) = find_memorytype_index(
            &memory_requirements,
            &context.device_memory_properties,
            memory_property_flags,
        ) else {
            unsafe { device.destroy_image(image, None) };
            return Err(TracerError::resource(
                "image memory",
                format!("no memory type with {memory_property_flags:?}"),
            ));
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(image_memorytype_index);

        let memory = match unsafe { device.allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { device.destroy_image(image, None) };
                return Err(TracerError::resource("image memory", error));
            }
        };

        let image = Self {
            inner: image,
            memory,
            format: create_info.format,
            extent: create_info.extent,
            mip_levels: create_info.mip_levels,
            array_layers: create_info.array_layers,
            context,
        };

        unsafe { image.context.device.bind_image_memory(image.inner, memory, 0) }
            .or_resource_error("image memory binding")?;

        Ok(image)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Whether mip levels of `format` can be generated by blitting on this device.
    pub fn supports_mip_generation(context: &Context, format: vk::Format) -> bool {
        let format_properties = unsafe {
            context
                .instance
                .get_physical_device_format_properties(context.physical_device, format)
        };

        format_properties.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        )
    }

    /// Copies tightly packed layers from `buffer` into level 0 of every array layer,
    /// fills the remaining mip levels by blitting and leaves the whole image in
    /// SHADER_READ_ONLY_OPTIMAL.
    pub fn copy_from_buffer_for_texture<T>(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: &Buffer<T>,
    ) {
        let num_levels = self.mip_levels;
        let device = &self.context.device;

        // prepare copying base image to level 0
        // we use a full subresource range to transition the imagelayout of all mipmapping levels to TRANSFER_DST_OPTIMAL
        self.insert_image_memory_barrier(
            command_buffer,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            PipelineStageFlags2::NONE,
            PipelineStageFlags2::COPY,
            AccessFlags2::empty(),
            AccessFlags2::TRANSFER_WRITE,
            self.full_subresource_range(vk::ImageAspectFlags::COLOR),
        );

        let buffer_image_copy = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: self.level_layers(0),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: self.extent,
        };

        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer.inner,
                self.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&buffer_image_copy),
            )
        };

        for level in 1..num_levels {
            let src_size = Self::extent_to_offset(Self::mip_extent(self.extent, level - 1));
            let dst_size = Self::extent_to_offset(Self::mip_extent(self.extent, level));

            // transition image layout src level from TRANSFER_DST_OPTIMAL to TRANSFER_SRC_OPTIMAL
            self.insert_image_memory_barrier(
                command_buffer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                PipelineStageFlags2::ALL_TRANSFER,
                PipelineStageFlags2::BLIT,
                AccessFlags2::TRANSFER_WRITE,
                AccessFlags2::TRANSFER_READ,
                self.level_range(level - 1),
            );

            let blit = vk::ImageBlit::builder()
                .src_offsets([vk::Offset3D::default(), src_size])
                .src_subresource(self.level_layers(level - 1))
                .dst_offsets([vk::Offset3D::default(), dst_size])
                .dst_subresource(self.level_layers(level))
                .build();

            unsafe {
                device.cmd_blit_image(
                    command_buffer,
                    self.inner,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.inner,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&blit),
                    vk::Filter::LINEAR,
                )
            }

            // previous level is final now
            self.insert_image_memory_barrier(
                command_buffer,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                PipelineStageFlags2::BLIT,
                PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                AccessFlags2::TRANSFER_READ,
                AccessFlags2::SHADER_READ,
                self.level_range(level - 1),
            );
        }

        // transition image layout of last mipmapping level from TRANSFER_DST_OPTIMAL to SHADER_READ_ONLY_OPTIMAL
        self.insert_image_memory_barrier(
            command_buffer,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            PipelineStageFlags2::ALL_TRANSFER,
            PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            AccessFlags2::TRANSFER_WRITE,
            AccessFlags2::SHADER_READ,
            self.level_range(num_levels - 1),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_image_memory_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage_mask: PipelineStageFlags2,
        dst_stage_mask: PipelineStageFlags2,
        src_access_mask: vk::AccessFlags2,
        dst_access_mask: vk::AccessFlags2,
        subresource_range: ImageSubresourceRange,
    ) {
        let barrier = vk::ImageMemoryBarrier2 {
            old_layout,
            new_layout,
            src_stage_mask,
            dst_stage_mask,
            src_access_mask,
            dst_access_mask,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.inner,
            subresource_range,
            ..ImageMemoryBarrier2::default()
        };

        let dependency_info =
            vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe {
            self.context
                .synchronisation2_loader
                .cmd_pipeline_barrier2(command_buffer, &dependency_info)
        };
    }

    pub fn max_mip_levels(extent: vk::Extent3D) -> u32 {
        // The number of levels in a complete mipmap chain is:
        // ⌊log2(max(width_0, height_0, depth_0))⌋ + 1

        32 - [extent.width, extent.height, extent.depth]
            .into_iter()
            .fold(0, BitOr::bitor)
            .leading_zeros()
    }

    pub fn mip_extent(base_extent: vk::Extent3D, level: u32) -> vk::Extent3D {
        Extent3D {
            width: (base_extent.width >> level).max(1),
            height: (base_extent.height >> level).max(1),
            depth: (base_extent.depth >> level).max(1),
        }
    }

    pub fn extent_to_offset(extent: vk::Extent3D) -> vk::Offset3D {
        vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: extent.depth as i32,
        }
    }

    pub fn full_subresource_range(
        &self,
        aspect_mask: vk::ImageAspectFlags,
    ) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    fn level_range(&self, level: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    fn level_layers(&self, level: u32) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: level,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

pub fn simple_image_create_info() -> vk::ImageCreateInfo {
    vk::ImageCreateInfo {
        flags: ImageCreateFlags::empty(),
        image_type: ImageType::TYPE_2D,
        format: Format::UNDEFINED,
        extent: Extent3D {
            width: 0,
            height: 0,
            depth: 0,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: SampleCountFlags::TYPE_1,
        tiling: ImageTiling::OPTIMAL,
        usage: ImageUsageFlags::empty(),
        sharing_mode: SharingMode::EXCLUSIVE,
        initial_layout: ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_image(self.inner, None) };
        unsafe { self.context.device.free_memory(self.memory, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent3D {
        vk::Extent3D {
            width,
            height,
            depth: 1,
        }
    }

    #[test]
    fn full_mip_chain_length() {
        assert_eq!(Image::max_mip_levels(extent(1, 1)), 1);
        assert_eq!(Image::max_mip_levels(extent(256, 256)), 9);
        assert_eq!(Image::max_mip_levels(extent(300, 20)), 9);
    }

    #[test]
    fn mip_extents_never_reach_zero() {
        let last = Image::mip_extent(extent(64, 4), 6);
        assert_eq!((last.width, last.height, last.depth), (1, 1, 1));
        let second = Image::mip_extent(extent(64, 4), 1);
        assert_eq!((second.width, second.height), (32, 2));
    }
}
