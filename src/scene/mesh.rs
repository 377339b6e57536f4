use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::{interleave_attributes, SceneMesh, VertexAttributes};
use crate::error::Result;
use crate::vulkan::buffer::{Buffer, StagingUploads};
use crate::vulkan::command_pool::CommandPool;

/// Per geometry parameters appended to every shader binding table record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RecordParameter {
    pub geometry_id: u32,
    pub material_id: u32,
}

/// What the acceleration structure build needs to know about a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshProperties {
    pub vertex_count: u32,
    pub vertex_format: vk::Format,
    pub vertex_stride: vk::DeviceSize,
    pub index_count: u32,
    pub geometry_id: u32,
    pub material_id: u32,
}

impl MeshProperties {
    pub fn record_parameter(&self) -> RecordParameter {
        RecordParameter {
            geometry_id: self.geometry_id,
            material_id: self.material_id,
        }
    }
}

pub struct RenderMesh {
    pub index_buffer: Buffer<u32>,
    pub attribute_buffer: Buffer<VertexAttributes>,
    pub vertex_buffer: Buffer<f32>,
    pub properties: MeshProperties,
}

impl RenderMesh {
    /// Uploads positions, interleaved attributes and indices with one staged submission.
    pub fn upload(command_pool: &CommandPool, scene_mesh: &SceneMesh) -> Result<Self> {
        let mesh = &scene_mesh.mesh;
        let mut uploads = StagingUploads::new(command_pool.context().clone());

        let vertex_buffer = uploads.device_local_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
            &mesh.positions,
        )?;
        let attribute_buffer = uploads.device_local_buffer(
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &interleave_attributes(mesh),
        )?;
        let index_buffer = uploads.device_local_buffer(
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
            &mesh.indices,
        )?;
        uploads.submit(command_pool)?;

        Ok(Self {
            index_buffer,
            attribute_buffer,
            vertex_buffer,
            properties: scene_mesh.properties,
        })
    }

    /// Opaque triangle geometry referencing this mesh's vertex and index buffers.
    pub fn geometry(&self) -> vk::GeometryNV {
        let properties = &self.properties;
        let triangles = vk::GeometryTrianglesNV::builder()
            .vertex_data(self.vertex_buffer.inner)
            .vertex_offset(0)
            .vertex_count(properties.vertex_count)
            .vertex_stride(properties.vertex_stride)
            .vertex_format(properties.vertex_format)
            .index_data(self.index_buffer.inner)
            .index_offset(0)
            .index_count(properties.index_count)
            .index_type(vk::IndexType::UINT32)
            .transform_data(vk::Buffer::null())
            .transform_offset(0)
            .build();

        vk::GeometryNV::builder()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(
                vk::GeometryDataNV::builder()
                    .triangles(triangles)
                    .aabbs(vk::GeometryAABBNV::default())
                    .build(),
            )
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .build()
    }
}
