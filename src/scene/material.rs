use ash::vk;
use crevice::std140::{AsStd140, Std140};

use super::Texture;
use crate::error::Result;
use crate::loader::{
    self, LoadedMaterial, ALBEDO_LAYER, NORMAL_LAYER, ROUGHNESS_METALLIC_ALPHA_LAYER,
};
use crate::observer::LoadObserver;
use crate::utility::aligned_size;
use crate::vulkan::command_pool::CommandPool;

/// Non-texture material parameters, one array element per material id.
#[derive(AsStd140)]
pub struct MaterialUniform {
    pub ior: f32,
}

/// std140 array stride of [`MaterialUniform`].
pub fn material_uniform_stride() -> usize {
    aligned_size(MaterialUniform::std140_size_static() as u32, 16) as usize
}

pub fn material_uniform_bytes(materials: &[LoadedMaterial]) -> Vec<u8> {
    let stride = material_uniform_stride();
    let mut bytes = vec![0u8; stride * materials.len()];
    for (material, element) in materials.iter().zip(bytes.chunks_exact_mut(stride)) {
        let uniform = MaterialUniform { ior: material.ior }.as_std140();
        let uniform_bytes = uniform.as_bytes();
        element[..uniform_bytes.len()].copy_from_slice(uniform_bytes);
    }
    bytes
}

pub struct RenderMaterial {
    /// Albedo, roughness/metallic/alpha and normal layers.
    pub surface: Texture,
    pub emission: Texture,
}

impl RenderMaterial {
    pub fn create(
        command_pool: &CommandPool,
        material: &LoadedMaterial,
        observer: &dyn LoadObserver,
    ) -> Result<Self> {
        let emission_data = loader::load_emission_texture(material, observer)?;
        let emission = Texture::create(command_pool, &emission_data, true)?;

        let surface_data = loader::load_surface_texture(material, observer)?;
        let surface = Texture::create(command_pool, &surface_data, true)?;

        Ok(Self { surface, emission })
    }

    pub fn albedo_info(&self) -> vk::DescriptorImageInfo {
        self.surface.descriptor_info(ALBEDO_LAYER)
    }

    pub fn emission_info(&self) -> vk::DescriptorImageInfo {
        self.emission.descriptor_info(0)
    }

    pub fn roughness_metallic_alpha_info(&self) -> vk::DescriptorImageInfo {
        self.surface.descriptor_info(ROUGHNESS_METALLIC_ALPHA_LAYER)
    }

    pub fn normal_info(&self) -> vk::DescriptorImageInfo {
        self.surface.descriptor_info(NORMAL_LAYER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_elements_use_std140_array_stride() {
        let mut glass = LoadedMaterial::missing_material();
        glass.ior = 1.5;
        let mut water = LoadedMaterial::missing_material();
        water.ior = 1.33;

        let bytes = material_uniform_bytes(&[glass, water]);

        assert_eq!(material_uniform_stride(), 16);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1.33f32.to_le_bytes());
    }
}
