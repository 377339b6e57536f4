use std::sync::Arc;

use crate::error::{Result, VkResultExt};
use crate::vulkan::context::Context;
use ash::vk;

pub struct DescriptorSetLayout {
    pub inner: vk::DescriptorSetLayout,
    context: Arc<Context>,
}

impl DescriptorSetLayout {
    pub fn new(context: Arc<Context>, bindings: &[vk::DescriptorSetLayoutBinding]) -> Result<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        let inner = unsafe { context.device.create_descriptor_set_layout(&create_info, None) }
            .or_resource_error("descriptor set layout")?;

        Ok(Self { inner, context })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_descriptor_set_layout(self.inner, None)
        };
    }
}

/// Owns the pool; the sets allocated from it are released together with it.
pub struct DescriptorPool {
    pub inner: vk::DescriptorPool,
    context: Arc<Context>,
}

impl DescriptorPool {
    pub fn new(
        context: Arc<Context>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let inner = unsafe { context.device.create_descriptor_pool(&create_info, None) }
            .or_resource_error("descriptor pool")?;

        Ok(Self { inner, context })
    }

    pub fn allocate(&self, set_layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.inner)
            .set_layouts(set_layouts);

        unsafe { self.context.device.allocate_descriptor_sets(&allocate_info) }
            .or_resource_error("descriptor sets")
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_descriptor_pool(self.inner, None) };
    }
}

/// Sums the descriptor counts of all bindings per descriptor type, in order of first appearance.
pub fn pool_sizes(bindings: &[vk::DescriptorSetLayoutBinding]) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = vec![];
    for binding in bindings {
        match sizes.iter_mut().find(|size| size.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += binding.descriptor_count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: binding.descriptor_count,
            }),
        }
    }
    sizes
}

pub struct WriteDescriptorSet {
    pub binding: u32,
    pub info: DescriptorInfo,
}

pub enum DescriptorInfo {
    UniformBuffer(vk::DescriptorBufferInfo),
    StorageBuffers(Vec<vk::DescriptorBufferInfo>),
    SampledImages(Vec<vk::DescriptorImageInfo>),
    StorageImage(vk::DescriptorImageInfo),
    AccelerationStructure(vk::AccelerationStructureNV),
}

impl DescriptorInfo {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorInfo::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorInfo::StorageBuffers(_) => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorInfo::SampledImages(_) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorInfo::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorInfo::AccelerationStructure(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_NV
            }
        }
    }

    pub fn descriptor_count(&self) -> usize {
        match self {
            DescriptorInfo::StorageBuffers(infos) => infos.len(),
            DescriptorInfo::SampledImages(infos) => infos.len(),
            DescriptorInfo::UniformBuffer(_)
            | DescriptorInfo::StorageImage(_)
            | DescriptorInfo::AccelerationStructure(_) => 1,
        }
    }
}

impl WriteDescriptorSet {
    pub fn uniform_buffer(binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        Self {
            binding,
            info: DescriptorInfo::UniformBuffer(info),
        }
    }

    pub fn storage_buffers(binding: u32, infos: Vec<vk::DescriptorBufferInfo>) -> Self {
        Self {
            binding,
            info: DescriptorInfo::StorageBuffers(infos),
        }
    }

    pub fn image_view_samplers(binding: u32, infos: Vec<vk::DescriptorImageInfo>) -> Self {
        Self {
            binding,
            info: DescriptorInfo::SampledImages(infos),
        }
    }

    pub fn storage_image_view_with_layout(
        binding: u32,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    ) -> Self {
        let info = vk::DescriptorImageInfo::builder()
            .image_view(image_view)
            .image_layout(image_layout)
            .build();

        Self {
            binding,
            info: DescriptorInfo::StorageImage(info),
        }
    }

    pub fn acceleration_structure(binding: u32, inner: vk::AccelerationStructureNV) -> Self {
        Self {
            binding,
            info: DescriptorInfo::AccelerationStructure(inner),
        }
    }
}

/// Issues all `writes` against `descriptor_set` in a single update call.
pub fn update_descriptor_set(
    context: &Context,
    descriptor_set: vk::DescriptorSet,
    writes: &[WriteDescriptorSet],
) {
    let mut acceleration_structure_infos: Vec<vk::WriteDescriptorSetAccelerationStructureNV> =
        writes
            .iter()
            .filter_map(|write| match &write.info {
                DescriptorInfo::AccelerationStructure(inner) => Some(
                    vk::WriteDescriptorSetAccelerationStructureNV::builder()
                        .acceleration_structures(std::slice::from_ref(inner))
                        .build(),
                ),
                _ => None,
            })
            .collect();
    let mut acceleration_structure_infos = acceleration_structure_infos.iter_mut();

    let write_descriptor_sets: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .map(|write| {
            let mut vk_write = vk::WriteDescriptorSet::builder()
                .dst_set(descriptor_set)
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(write.info.descriptor_type());

            match &write.info {
                DescriptorInfo::UniformBuffer(info) => {
                    vk_write = vk_write.buffer_info(std::slice::from_ref(info))
                }
                DescriptorInfo::StorageBuffers(infos) => vk_write = vk_write.buffer_info(infos),
                DescriptorInfo::SampledImages(infos) => vk_write = vk_write.image_info(infos),
                DescriptorInfo::StorageImage(info) => {
                    vk_write = vk_write.image_info(std::slice::from_ref(info))
                }
                DescriptorInfo::AccelerationStructure(_) => {
                    if let Some(info) = acceleration_structure_infos.next() {
                        vk_write = vk_write.push_next(info);
                    }
                    // the count is not derived from the extension struct
                    vk_write.descriptor_count = 1;
                }
            }
            vk_write.build()
        })
        .collect();

    unsafe {
        context
            .device
            .update_descriptor_sets(&write_descriptor_sets, &[])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
    ) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(descriptor_count)
            .build()
    }

    #[test]
    fn pool_sizes_merge_bindings_of_the_same_type() {
        let bindings = [
            binding(0, vk::DescriptorType::STORAGE_BUFFER, 3),
            binding(1, vk::DescriptorType::STORAGE_BUFFER, 3),
            binding(2, vk::DescriptorType::UNIFORM_BUFFER, 1),
            binding(3, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
            binding(4, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
        ];
        let sizes = pool_sizes(&bindings);
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 6);
        assert_eq!(sizes[1].descriptor_count, 1);
        assert_eq!(sizes[2].descriptor_count, 3);
    }

    #[test]
    fn descriptor_counts_follow_array_lengths() {
        let write = WriteDescriptorSet::storage_buffers(
            0,
            vec![vk::DescriptorBufferInfo::default(); 4],
        );
        assert_eq!(write.info.descriptor_count(), 4);
        assert_eq!(write.info.descriptor_type(), vk::DescriptorType::STORAGE_BUFFER);

        let write = WriteDescriptorSet::acceleration_structure(1, vk::AccelerationStructureNV::null());
        assert_eq!(write.info.descriptor_count(), 1);
    }
}
