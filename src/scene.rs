mod assembly;
mod material;
mod mesh;
mod texture;
mod vertex;

pub use assembly::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;
pub use vertex::*;

use std::path::Path;

use ash::vk;
use log::debug;

use crate::error::{Result, TracerError};
use crate::loader;
use crate::observer::LoadObserver;
use crate::utility::ReverseDropVec;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_pool::CommandPool;

/// Everything the scene owns on the device.
/// Fields are declared in reverse creation order and the per-mesh and per-material
/// resources drop last to first, so dropping releases everything in reverse.
pub struct GpuScene {
    pub environment: Texture,
    pub materials: ReverseDropVec<RenderMaterial>,
    pub material_buffer: Buffer<u8>,
    pub meshes: ReverseDropVec<RenderMesh>,
}

impl GpuScene {
    /// Uploads all meshes, then the material parameters and textures, then the environment map.
    pub fn create(
        command_pool: &CommandPool,
        scene: &SceneData,
        environment_path: &Path,
        observer: &dyn LoadObserver,
    ) -> Result<Self> {
        if scene.meshes.is_empty() {
            return Err(TracerError::Configuration(
                "the scene contains no meshes".into(),
            ));
        }

        let meshes = scene
            .meshes
            .iter()
            .map(|scene_mesh| RenderMesh::upload(command_pool, scene_mesh))
            .collect::<Result<ReverseDropVec<_>>>()?;
        debug!("uploaded {} meshes", meshes.len());

        let material_buffer = Buffer::device_local_with_data(
            command_pool,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &material_uniform_bytes(&scene.materials),
        )?;

        let materials = scene
            .materials
            .iter()
            .map(|material| RenderMaterial::create(command_pool, material, observer))
            .collect::<Result<ReverseDropVec<_>>>()?;
        debug!("created {} materials", materials.len());

        let environment_data = loader::load_hdr_texture(environment_path, observer)?;
        let environment = Texture::create(command_pool, &environment_data, false)?;

        Ok(Self {
            environment,
            materials,
            material_buffer,
            meshes,
        })
    }
}
