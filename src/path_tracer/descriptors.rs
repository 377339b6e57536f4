use std::sync::Arc;

use ash::vk;
use log::debug;

use crate::error::{Result, TracerError};
use crate::scene::GpuScene;
use crate::vulkan::context::Context;
use crate::vulkan::descriptor_set::{
    pool_sizes, update_descriptor_set, DescriptorPool, DescriptorSetLayout, WriteDescriptorSet,
};

// set 0
pub const OUTPUT_IMAGE_BINDING: u32 = 0;
pub const ACCELERATION_STRUCTURE_BINDING: u32 = 1;

// set 1
pub const ATTRIBUTE_BUFFERS_BINDING: u32 = 0;
pub const INDEX_BUFFERS_BINDING: u32 = 1;
pub const MATERIAL_BUFFER_BINDING: u32 = 2;
pub const ALBEDO_BINDING: u32 = 3;
pub const EMISSION_BINDING: u32 = 4;
pub const ROUGHNESS_METALLIC_ALPHA_BINDING: u32 = 5;
pub const NORMAL_BINDING: u32 = 6;
pub const ENVIRONMENT_BINDING: u32 = 7;

fn binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    descriptor_count: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(descriptor_count)
        .stage_flags(stage_flags)
        .build()
}

pub fn output_set_bindings() -> Vec<vk::DescriptorSetLayoutBinding> {
    vec![
        binding(
            OUTPUT_IMAGE_BINDING,
            vk::DescriptorType::STORAGE_IMAGE,
            1,
            vk::ShaderStageFlags::RAYGEN_NV,
        ),
        binding(
            ACCELERATION_STRUCTURE_BINDING,
            vk::DescriptorType::ACCELERATION_STRUCTURE_NV,
            1,
            vk::ShaderStageFlags::RAYGEN_NV | vk::ShaderStageFlags::CLOSEST_HIT_NV,
        ),
    ]
}

pub fn scene_set_bindings(mesh_count: u32, material_count: u32) -> Vec<vk::DescriptorSetLayoutBinding> {
    let closest_hit = vk::ShaderStageFlags::CLOSEST_HIT_NV;
    let texture_array = |index| {
        binding(
            index,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            material_count,
            closest_hit,
        )
    };

    vec![
        binding(
            ATTRIBUTE_BUFFERS_BINDING,
            vk::DescriptorType::STORAGE_BUFFER,
            mesh_count,
            closest_hit,
        ),
        binding(
            INDEX_BUFFERS_BINDING,
            vk::DescriptorType::STORAGE_BUFFER,
            mesh_count,
            closest_hit,
        ),
        binding(
            MATERIAL_BUFFER_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            closest_hit,
        ),
        texture_array(ALBEDO_BINDING),
        texture_array(EMISSION_BINDING),
        texture_array(ROUGHNESS_METALLIC_ALPHA_BINDING),
        texture_array(NORMAL_BINDING),
        binding(
            ENVIRONMENT_BINDING,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            vk::ShaderStageFlags::MISS_NV,
        ),
    ]
}

/// Descriptor infos for every scene resource, gathered before anything is written.
#[derive(Default)]
pub struct SceneBindings {
    pub attribute_buffers: Vec<vk::DescriptorBufferInfo>,
    pub index_buffers: Vec<vk::DescriptorBufferInfo>,
    pub material_buffer: vk::DescriptorBufferInfo,
    pub albedo: Vec<vk::DescriptorImageInfo>,
    pub emission: Vec<vk::DescriptorImageInfo>,
    pub roughness_metallic_alpha: Vec<vk::DescriptorImageInfo>,
    pub normal: Vec<vk::DescriptorImageInfo>,
    pub environment: vk::DescriptorImageInfo,
}

impl SceneBindings {
    pub fn from_scene(scene: &GpuScene) -> Self {
        Self {
            attribute_buffers: scene
                .meshes
                .iter()
                .map(|mesh| mesh.attribute_buffer.descriptor_info())
                .collect(),
            index_buffers: scene
                .meshes
                .iter()
                .map(|mesh| mesh.index_buffer.descriptor_info())
                .collect(),
            material_buffer: scene.material_buffer.descriptor_info(),
            albedo: scene.materials.iter().map(|m| m.albedo_info()).collect(),
            emission: scene.materials.iter().map(|m| m.emission_info()).collect(),
            roughness_metallic_alpha: scene
                .materials
                .iter()
                .map(|m| m.roughness_metallic_alpha_info())
                .collect(),
            normal: scene.materials.iter().map(|m| m.normal_info()).collect(),
            environment: scene.environment.descriptor_info(0),
        }
    }

    /// Checks every array against the mesh and material counts, then turns the infos
    /// into writes. Nothing is written when a count is off.
    pub fn into_writes(self, mesh_count: usize, material_count: usize) -> Result<Vec<WriteDescriptorSet>> {
        let check_count = |what: &str, actual: usize, expected: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(TracerError::Configuration(format!(
                    "{what}: {actual} descriptors for {expected} resources"
                )))
            }
        };
        if mesh_count == 0 || material_count == 0 {
            return Err(TracerError::Configuration(format!(
                "cannot bind a scene with {mesh_count} meshes and {material_count} materials"
            )));
        }
        check_count("attribute buffers", self.attribute_buffers.len(), mesh_count)?;
        check_count("index buffers", self.index_buffers.len(), mesh_count)?;
        check_count("albedo textures", self.albedo.len(), material_count)?;
        check_count("emission textures", self.emission.len(), material_count)?;
        check_count(
            "roughness/metallic/alpha textures",
            self.roughness_metallic_alpha.len(),
            material_count,
        )?;
        check_count("normal textures", self.normal.len(), material_count)?;

        Ok(vec![
            WriteDescriptorSet::storage_buffers(ATTRIBUTE_BUFFERS_BINDING, self.attribute_buffers),
            WriteDescriptorSet::storage_buffers(INDEX_BUFFERS_BINDING, self.index_buffers),
            WriteDescriptorSet::uniform_buffer(MATERIAL_BUFFER_BINDING, self.material_buffer),
            WriteDescriptorSet::image_view_samplers(ALBEDO_BINDING, self.albedo),
            WriteDescriptorSet::image_view_samplers(EMISSION_BINDING, self.emission),
            WriteDescriptorSet::image_view_samplers(
                ROUGHNESS_METALLIC_ALPHA_BINDING,
                self.roughness_metallic_alpha,
            ),
            WriteDescriptorSet::image_view_samplers(NORMAL_BINDING, self.normal),
            WriteDescriptorSet::image_view_samplers(ENVIRONMENT_BINDING, vec![self.environment]),
        ])
    }
}

/// The two descriptor sets of the pipeline. The sets are freed with the pool.
pub struct Descriptors {
    pub sets: [vk::DescriptorSet; 2],
    pub pool: DescriptorPool,
    pub scene_layout: DescriptorSetLayout,
    pub output_layout: DescriptorSetLayout,
}

impl Descriptors {
    pub fn new(
        context: Arc<Context>,
        output_image_view: vk::ImageView,
        top_level: vk::AccelerationStructureNV,
        scene: &GpuScene,
    ) -> Result<Self> {
        let mesh_count = scene.meshes.len();
        let material_count = scene.materials.len();
        let scene_writes =
            SceneBindings::from_scene(scene).into_writes(mesh_count, material_count)?;
        let output_writes = vec![
            WriteDescriptorSet::storage_image_view_with_layout(
                OUTPUT_IMAGE_BINDING,
                output_image_view,
                vk::ImageLayout::GENERAL,
            ),
            WriteDescriptorSet::acceleration_structure(ACCELERATION_STRUCTURE_BINDING, top_level),
        ];

        let output_bindings = output_set_bindings();
        let scene_bindings = scene_set_bindings(mesh_count as u32, material_count as u32);

        let output_layout = DescriptorSetLayout::new(context.clone(), &output_bindings)?;
        let scene_layout = DescriptorSetLayout::new(context.clone(), &scene_bindings)?;

        let all_bindings: Vec<_> = output_bindings.into_iter().chain(scene_bindings).collect();
        let pool = DescriptorPool::new(context.clone(), 2, &pool_sizes(&all_bindings))?;

        let sets = pool.allocate(&[output_layout.inner, scene_layout.inner])?;
        let sets = [sets[0], sets[1]];

        update_descriptor_set(&context, sets[0], &output_writes);
        update_descriptor_set(&context, sets[1], &scene_writes);
        debug!("descriptor sets written for {mesh_count} meshes and {material_count} materials");

        Ok(Self {
            sets,
            pool,
            scene_layout,
            output_layout,
        })
    }

    pub fn set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.output_layout.inner, self.scene_layout.inner]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(mesh_count: usize, material_count: usize) -> SceneBindings {
        SceneBindings {
            attribute_buffers: vec![vk::DescriptorBufferInfo::default(); mesh_count],
            index_buffers: vec![vk::DescriptorBufferInfo::default(); mesh_count],
            albedo: vec![vk::DescriptorImageInfo::default(); material_count],
            emission: vec![vk::DescriptorImageInfo::default(); material_count],
            roughness_metallic_alpha: vec![vk::DescriptorImageInfo::default(); material_count],
            normal: vec![vk::DescriptorImageInfo::default(); material_count],
            ..Default::default()
        }
    }

    #[test]
    fn write_counts_match_resource_counts() {
        let writes = bindings(3, 2).into_writes(3, 2).unwrap();

        let counts: Vec<usize> = writes
            .iter()
            .map(|write| write.info.descriptor_count())
            .collect();
        assert_eq!(counts, vec![3, 3, 1, 2, 2, 2, 2, 1]);
        let texture_total: usize = counts[3..7].iter().sum();
        assert_eq!(texture_total, 2 * 4);
    }

    #[test]
    fn mismatched_mesh_count_is_rejected() {
        let mut scene = bindings(3, 2);
        scene.index_buffers.pop();
        assert!(matches!(
            scene.into_writes(3, 2),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn mismatched_material_count_is_rejected() {
        assert!(matches!(
            bindings(1, 2).into_writes(1, 3),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn empty_scene_is_rejected() {
        assert!(matches!(
            bindings(0, 0).into_writes(0, 0),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn layouts_size_arrays_by_scene() {
        let scene = scene_set_bindings(4, 3);
        assert_eq!(scene.len(), 8);
        assert_eq!(scene[ATTRIBUTE_BUFFERS_BINDING as usize].descriptor_count, 4);
        assert_eq!(scene[INDEX_BUFFERS_BINDING as usize].descriptor_count, 4);
        assert_eq!(scene[MATERIAL_BUFFER_BINDING as usize].descriptor_count, 1);
        for binding in ALBEDO_BINDING..=NORMAL_BINDING {
            assert_eq!(scene[binding as usize].descriptor_count, 3);
        }
        assert_eq!(
            scene[ENVIRONMENT_BINDING as usize].stage_flags,
            vk::ShaderStageFlags::MISS_NV
        );

        let output = output_set_bindings();
        assert_eq!(
            output[ACCELERATION_STRUCTURE_BINDING as usize].descriptor_type,
            vk::DescriptorType::ACCELERATION_STRUCTURE_NV
        );
    }
}
