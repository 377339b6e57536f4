use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::loader::LoadedMesh;

pub const VERTEX_FORMAT: vk::Format = vk::Format::R32G32B32_SFLOAT;
pub const VERTEX_STRIDE: vk::DeviceSize = 3 * std::mem::size_of::<f32>() as vk::DeviceSize;

/// Per vertex shading attributes, read by the hit shader from a storage buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct VertexAttributes {
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Interleaves normals and texture coordinates. Missing data is zero filled.
pub fn interleave_attributes(mesh: &LoadedMesh) -> Vec<VertexAttributes> {
    (0..mesh.vertex_count())
        .map(|vertex| {
            let mut attributes = VertexAttributes::default();
            if let Some(normal) = mesh.normals.get(vertex * 3..vertex * 3 + 3) {
                attributes.normal.copy_from_slice(normal);
            }
            if let Some(uv) = mesh.tex_coords.get(vertex * 2..vertex * 2 + 2) {
                attributes.uv.copy_from_slice(uv);
            }
            attributes
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<VertexAttributes>(), 20);
        assert_eq!(std::mem::offset_of!(VertexAttributes, uv), 12);
    }

    #[test]
    fn normals_and_uvs_are_interleaved() {
        let mesh = LoadedMesh {
            positions: vec![0.0; 6],
            normals: vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0],
            tex_coords: vec![0.25, 0.5, 0.75, 1.0],
            indices: vec![0, 1, 0],
            ..Default::default()
        };

        let attributes = interleave_attributes(&mesh);

        assert_eq!(
            attributes,
            vec![
                VertexAttributes {
                    normal: [0.0, 0.0, 1.0],
                    uv: [0.25, 0.5],
                },
                VertexAttributes {
                    normal: [0.0, 1.0, 0.0],
                    uv: [0.75, 1.0],
                },
            ]
        );
    }

    #[test]
    fn missing_attributes_are_zero() {
        let mesh = LoadedMesh {
            positions: vec![1.0; 9],
            tex_coords: vec![0.5; 6],
            ..Default::default()
        };

        let attributes = interleave_attributes(&mesh);

        assert_eq!(attributes.len(), 3);
        assert!(attributes.iter().all(|a| a.normal == [0.0; 3] && a.uv == [0.5; 2]));
    }
}
