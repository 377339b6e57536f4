use ash::vk;
use bytemuck::{Pod, Zeroable};
use log::info;
use ultraviolet::Mat4;

use crate::error::{Result, TracerError};
use crate::scene::GpuScene;
use crate::vulkan::acceleration_structure::AccelerationStructure;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_pool::CommandPool;

/// Instance record consumed by a top-level build, laid out as the NV extension reads it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GeometryInstance {
    /// Row-major 3x4 object to world transform.
    pub transform: [f32; 12],
    pub instance_custom_index_and_mask: u32,
    pub instance_offset_and_flags: u32,
    pub acceleration_structure_handle: u64,
}

impl GeometryInstance {
    pub fn new(
        transform: Mat4,
        custom_index: u32,
        mask: u8,
        hit_group_offset: u32,
        flags: vk::GeometryInstanceFlagsKHR,
        acceleration_structure_handle: u64,
    ) -> Self {
        let rows = transform.transposed();
        let mut packed = [0.0; 12];
        packed.copy_from_slice(&rows.as_array()[..12]);

        Self {
            transform: packed,
            instance_custom_index_and_mask: (custom_index & 0x00ff_ffff) | (u32::from(mask) << 24),
            instance_offset_and_flags: (hit_group_offset & 0x00ff_ffff)
                | ((flags.as_raw() & 0xff) << 24),
            acceleration_structure_handle,
        }
    }

    /// The single static instance of the scene: identity transform, visible to every ray.
    pub fn scene_instance(acceleration_structure_handle: u64) -> Self {
        Self::new(
            Mat4::identity(),
            0,
            0xff,
            0,
            vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE,
            acceleration_structure_handle,
        )
    }

    pub fn custom_index(&self) -> u32 {
        self.instance_custom_index_and_mask & 0x00ff_ffff
    }

    pub fn mask(&self) -> u8 {
        (self.instance_custom_index_and_mask >> 24) as u8
    }

    pub fn hit_group_offset(&self) -> u32 {
        self.instance_offset_and_flags & 0x00ff_ffff
    }

    pub fn flags(&self) -> vk::GeometryInstanceFlagsKHR {
        vk::GeometryInstanceFlagsKHR::from_raw(self.instance_offset_and_flags >> 24)
    }
}

/// The bottom-level structure over all meshes and the top-level structure over its one instance.
/// Fields are declared in reverse creation order.
pub struct SceneAccelerationStructures {
    pub top_level: AccelerationStructure,
    pub instance_buffer: Buffer<GeometryInstance>,
    pub bottom_level: AccelerationStructure,
}

impl SceneAccelerationStructures {
    pub fn build(command_pool: &CommandPool, scene: &GpuScene) -> Result<Self> {
        let geometries: Vec<vk::GeometryNV> =
            scene.meshes.iter().map(|mesh| mesh.geometry()).collect();

        let bottom_level_info = vk::AccelerationStructureInfoNV::builder()
            .ty(vk::AccelerationStructureTypeNV::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
            .geometries(&geometries)
            .build();
        let bottom_level = AccelerationStructure::build(
            command_pool,
            &bottom_level_info,
            vk::Buffer::null(),
            "blas",
        )?;
        info!(
            "built bottom level acceleration structure over {} geometries",
            geometries.len()
        );

        let instance = GeometryInstance::scene_instance(bottom_level.handle);
        let instance_buffer = Buffer::device_local_with_data(
            command_pool,
            vk::BufferUsageFlags::RAY_TRACING_NV,
            std::slice::from_ref(&instance),
        )
        .map_err(|error| TracerError::resource("instance", error))?;

        let top_level_info = vk::AccelerationStructureInfoNV::builder()
            .ty(vk::AccelerationStructureTypeNV::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
            .instance_count(1)
            .build();
        let top_level = AccelerationStructure::build(
            command_pool,
            &top_level_info,
            instance_buffer.inner,
            "tlas",
        )?;
        info!("built top level acceleration structure");

        Ok(Self {
            top_level,
            instance_buffer,
            bottom_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_matches_the_device_layout() {
        assert_eq!(std::mem::size_of::<GeometryInstance>(), 64);
        assert_eq!(std::mem::offset_of!(GeometryInstance, instance_custom_index_and_mask), 48);
        assert_eq!(std::mem::offset_of!(GeometryInstance, acceleration_structure_handle), 56);
    }

    #[test]
    fn scene_instance_uses_identity_and_full_mask() {
        let instance = GeometryInstance::scene_instance(0xdead_beef_0000_0001);

        assert_eq!(
            instance.transform,
            [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(instance.custom_index(), 0);
        assert_eq!(instance.mask(), 0xff);
        assert_eq!(instance.hit_group_offset(), 0);
        assert_eq!(instance.flags(), vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE);
        assert_eq!(instance.acceleration_structure_handle, 0xdead_beef_0000_0001);
    }

    #[test]
    fn translation_lands_in_the_last_column() {
        let transform = Mat4::from_translation(ultraviolet::Vec3::new(1.0, 2.0, 3.0));
        let instance = GeometryInstance::new(
            transform,
            7,
            0x0f,
            2,
            vk::GeometryInstanceFlagsKHR::empty(),
            0,
        );

        assert_eq!(instance.transform[3], 1.0);
        assert_eq!(instance.transform[7], 2.0);
        assert_eq!(instance.transform[11], 3.0);
        assert_eq!(instance.custom_index(), 7);
        assert_eq!(instance.mask(), 0x0f);
        assert_eq!(instance.hit_group_offset(), 2);
    }
}
