use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use serde::{Deserialize, Serialize};

use super::sbt::RAY_TYPE_COUNT;
use crate::error::{Result, TracerError, VkResultExt};
use crate::utility::ReverseDropVec;
use crate::vulkan::context::Context;
use crate::vulkan::shader::{ShaderKind, ShaderModule};

pub const RAYGEN_STAGE: u32 = 0;
pub const MISS_STAGE: u32 = 1;
pub const CLOSEST_HIT_STAGE: u32 = 2;

/// Locations of the precompiled SPIR-V binaries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShaderPaths {
    pub raygen: PathBuf,
    pub miss: PathBuf,
    pub closest_hit: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            raygen: "assets/shaders/path_tracer.rgen.spv".into(),
            miss: "assets/shaders/path_tracer.rmiss.spv".into(),
            closest_hit: "assets/shaders/path_tracer.rchit.spv".into(),
        }
    }
}

/// The three stage modules, indexed by the `*_STAGE` constants.
pub struct ShaderStages {
    pub modules: ReverseDropVec<ShaderModule>,
}

impl ShaderStages {
    pub fn load(context: Arc<Context>, paths: &ShaderPaths) -> Result<Self> {
        let modules = vec![
            ShaderModule::from_file(context.clone(), ShaderKind::RayGeneration, &paths.raygen)?,
            ShaderModule::from_file(context.clone(), ShaderKind::Miss, &paths.miss)?,
            ShaderModule::from_file(context, ShaderKind::ClosestHit, &paths.closest_hit)?,
        ];
        Ok(Self {
            modules: modules.into(),
        })
    }

    pub fn stage_create_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo> {
        self.modules
            .iter()
            .map(ShaderModule::stage_create_info)
            .collect()
    }
}

/// One general group for ray generation, one for miss, then a triangle hit group per
/// mesh sharing the closest hit stage. The order matches the shader binding table.
pub fn shader_groups(mesh_count: u32) -> Vec<vk::RayTracingShaderGroupCreateInfoNV> {
    let general = |stage: u32| {
        vk::RayTracingShaderGroupCreateInfoNV::builder()
            .ty(vk::RayTracingShaderGroupTypeNV::GENERAL)
            .general_shader(stage)
            .closest_hit_shader(vk::SHADER_UNUSED_NV)
            .any_hit_shader(vk::SHADER_UNUSED_NV)
            .intersection_shader(vk::SHADER_UNUSED_NV)
            .build()
    };

    let hit_group = vk::RayTracingShaderGroupCreateInfoNV::builder()
        .ty(vk::RayTracingShaderGroupTypeNV::TRIANGLES_HIT_GROUP)
        .general_shader(vk::SHADER_UNUSED_NV)
        .closest_hit_shader(CLOSEST_HIT_STAGE)
        .any_hit_shader(vk::SHADER_UNUSED_NV)
        .intersection_shader(vk::SHADER_UNUSED_NV)
        .build();

    let mut groups = vec![general(RAYGEN_STAGE), general(MISS_STAGE)];
    groups.extend(std::iter::repeat(hit_group).take((mesh_count * RAY_TYPE_COUNT) as usize));
    groups
}

pub struct RayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    context: Arc<Context>,
}

impl RayTracingPipeline {
    pub fn new(
        context: Arc<Context>,
        stages: &ShaderStages,
        groups: &[vk::RayTracingShaderGroupCreateInfoNV],
        set_layouts: &[vk::DescriptorSetLayout],
        max_recursion_depth: u32,
    ) -> Result<Self> {
        let hardware_depth = context.context_raytracing.properties.max_recursion_depth;
        if max_recursion_depth > hardware_depth {
            return Err(TracerError::Capability(format!(
                "recursion depth {max_recursion_depth} exceeds the maximum of {hardware_depth}"
            )));
        }

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe { context.device.create_pipeline_layout(&layout_info, None) }
            .or_resource_error("ray tracing pipeline layout")?;

        // Drop destroys the layout if the pipeline cannot be created
        let mut pipeline = Self {
            pipeline: vk::Pipeline::null(),
            layout,
            context: context.clone(),
        };

        let stage_infos = stages.stage_create_infos();
        let create_info = vk::RayTracingPipelineCreateInfoNV::builder()
            .stages(&stage_infos)
            .groups(groups)
            .max_recursion_depth(max_recursion_depth)
            .layout(layout)
            .build();

        pipeline.pipeline = unsafe {
            context.context_raytracing.ray_tracing.create_ray_tracing_pipelines(
                vk::PipelineCache::null(),
                &[create_info],
                None,
            )
        }
        .or_resource_error("ray tracing pipeline")?[0];

        Ok(pipeline)
    }
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_pipeline(self.pipeline, None);
            self.context
                .device
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hit_group_per_mesh() {
        let groups = shader_groups(3);

        assert_eq!(groups.len(), 2 + 3);
        assert_eq!(groups[0].ty, vk::RayTracingShaderGroupTypeNV::GENERAL);
        assert_eq!(groups[0].general_shader, RAYGEN_STAGE);
        assert_eq!(groups[1].ty, vk::RayTracingShaderGroupTypeNV::GENERAL);
        assert_eq!(groups[1].general_shader, MISS_STAGE);
        for group in &groups[2..] {
            assert_eq!(group.ty, vk::RayTracingShaderGroupTypeNV::TRIANGLES_HIT_GROUP);
            assert_eq!(group.closest_hit_shader, CLOSEST_HIT_STAGE);
            assert_eq!(group.general_shader, vk::SHADER_UNUSED_NV);
        }
    }
}
