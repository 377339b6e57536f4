use std::sync::Arc;

use crate::error::{Result, VkResultExt};
use crate::vulkan::context::Context;
use crate::vulkan::image::Image;
use ash::vk;

pub struct ImageView {
    pub inner: vk::ImageView,

    pub image: Arc<Image>,
    context: Arc<Context>,
}

impl ImageView {
    pub fn new_default(context: Arc<Context>, image: Arc<Image>) -> Result<Self> {
        let subresource_range = image.full_subresource_range(vk::ImageAspectFlags::COLOR);
        Self::new(context, image, subresource_range)
    }

    /// A 2D view onto a single array layer with all of its mip levels.
    pub fn new_layer(context: Arc<Context>, image: Arc<Image>, layer: u32) -> Result<Self> {
        let subresource_range = vk::ImageSubresourceRange {
            base_array_layer: layer,
            layer_count: 1,
            ..image.full_subresource_range(vk::ImageAspectFlags::COLOR)
        };
        Self::new(context, image, subresource_range)
    }

    fn new(
        context: Arc<Context>,
        image: Arc<Image>,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Result<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(subresource_range)
            .image(image.inner);

        let imageview = unsafe { context.device.create_image_view(&create_info, None) }
            .or_resource_error("image view")?;

        Ok(Self {
            inner: imageview,
            image,
            context,
        })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_image_view(self.inner, None) };
    }
}
