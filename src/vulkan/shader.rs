use std::{ffi::CStr, io::Cursor, path::Path, sync::Arc};

use ash::vk;

use super::context::Context;
use crate::error::{Result, TracerError, VkResultExt};

const SHADER_ENTRY_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    RayGeneration,
    Miss,
    ClosestHit,
}

impl ShaderKind {
    pub fn stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderKind::RayGeneration => vk::ShaderStageFlags::RAYGEN_NV,
            ShaderKind::Miss => vk::ShaderStageFlags::MISS_NV,
            ShaderKind::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_NV,
        }
    }
}

/// A compiled SPIR-V module for one ray tracing stage.
pub struct ShaderModule {
    pub inner: vk::ShaderModule,
    pub kind: ShaderKind,
    context: Arc<Context>,
}

impl ShaderModule {
    pub fn new(context: Arc<Context>, kind: ShaderKind, bytes: &[u8]) -> Result<Self> {
        let mut spv_file = Cursor::new(bytes);

        let shader_code = ash::util::read_spv(&mut spv_file).map_err(|error| {
            TracerError::resource(format!("{kind:?} shader module"), error)
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&shader_code);
        let shader_module = unsafe { context.device.create_shader_module(&create_info, None) }
            .or_resource_error("shader module")?;

        Ok(Self {
            inner: shader_module,
            kind,
            context,
        })
    }

    pub fn from_file(context: Arc<Context>, kind: ShaderKind, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|error| TracerError::asset(path, error))?;
        Self::new(context, kind, &bytes)
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .module(self.inner)
            .name(SHADER_ENTRY_NAME)
            .stage(self.kind.stage_flags())
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_shader_module(self.inner, None);
        }
    }
}
