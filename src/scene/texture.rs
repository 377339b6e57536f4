use std::sync::Arc;

use ash::vk;

use crate::error::Result;
use crate::loader::TextureData;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_buffer::execute_one_time_commands;
use crate::vulkan::command_pool::CommandPool;
use crate::vulkan::image::{simple_image_create_info, Image};
use crate::vulkan::image_view::ImageView;
use crate::utility::ReverseDropVec;
use crate::vulkan::sampler::Sampler;

/// A sampled image with one view per array layer and its own sampler.
pub struct Texture {
    pub sampler: Sampler,
    pub layer_views: ReverseDropVec<ImageView>,
    pub image: Arc<Image>,
}

impl Texture {
    pub fn create(command_pool: &CommandPool, data: &TextureData, mipmapped: bool) -> Result<Self> {
        let context = command_pool.context();
        let format = data.format.vk_format();

        let mip_levels = if mipmapped && Image::supports_mip_generation(context, format) {
            Image::max_mip_levels(data.extent())
        } else {
            1
        };

        let image_info = vk::ImageCreateInfo {
            format,
            extent: data.extent(),
            mip_levels,
            array_layers: data.layers,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            ..simple_image_create_info()
        };
        let image = Image::new(
            context.clone(),
            &image_info,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let staging = Buffer::staging(context.clone(), &data.bytes)?;
        execute_one_time_commands(command_pool, |command_buffer| {
            image.copy_from_buffer_for_texture(command_buffer, &staging)
        })?;
        drop(staging);

        let image = Arc::new(image);
        let layer_views = (0..data.layers)
            .map(|layer| ImageView::new_layer(context.clone(), image.clone(), layer))
            .collect::<Result<ReverseDropVec<_>>>()?;

        let sampler = Sampler::new_linear(context.clone(), mip_levels)?;

        Ok(Self {
            sampler,
            layer_views,
            image,
        })
    }

    /// Combined image sampler info for one layer, in SHADER_READ_ONLY_OPTIMAL.
    pub fn descriptor_info(&self, layer: u32) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.inner,
            image_view: self.layer_views[layer as usize].inner,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}
