use std::mem::size_of;

use ash::vk;
use log::debug;

use crate::error::{Result, TracerError, VkResultExt};
use crate::scene::RecordParameter;
use crate::utility::align_up;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_pool::CommandPool;
use crate::vulkan::context::RayTracingLimits;

pub const RAY_TYPE_COUNT: u32 = 1;
pub const RAYGEN_COUNT: u32 = 1;
pub const RECORD_PARAMETER_SIZE: u64 = size_of::<RecordParameter>() as u64;

/// Byte layout of the shader binding table: ray generation records first, then miss
/// records, then one hit group record per mesh and ray type. Every record is a group
/// handle followed by a [`RecordParameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbtLayout {
    pub handle_size: u64,
    pub record_stride: u64,
    pub rgen_offset: u64,
    pub miss_offset: u64,
    pub hitgroup_offset: u64,
    pub total_size: u64,
    pub rgen_count: u32,
    pub miss_count: u32,
    pub hitgroup_count: u32,
}

impl SbtLayout {
    pub fn compute(limits: &RayTracingLimits, group_count: u32, mesh_count: u32) -> Result<Self> {
        let handle_size = limits.shader_group_handle_size as u64;
        let base_alignment = limits.shader_group_base_alignment as u64;
        if handle_size == 0 || base_alignment == 0 {
            return Err(TracerError::Capability(format!(
                "unusable shader group handle size {handle_size} or base alignment {base_alignment}"
            )));
        }

        let hitgroup_count = mesh_count * RAY_TYPE_COUNT;
        let rgen_count = RAYGEN_COUNT;
        let miss_count = group_count
            .checked_sub(hitgroup_count + rgen_count)
            .ok_or_else(|| {
                TracerError::Configuration(format!(
                    "{group_count} shader groups cannot hold {rgen_count} ray generation and {hitgroup_count} hit groups"
                ))
            })?;

        let record_stride = align_up(handle_size + RECORD_PARAMETER_SIZE, handle_size);
        if record_stride > limits.max_shader_group_stride as u64 {
            return Err(TracerError::Capability(format!(
                "shader binding table stride {record_stride} exceeds the maximum of {}",
                limits.max_shader_group_stride
            )));
        }

        let rgen_offset = 0;
        let miss_offset = align_up(rgen_offset + rgen_count as u64 * record_stride, base_alignment);
        let hitgroup_offset =
            align_up(miss_offset + miss_count as u64 * record_stride, base_alignment);
        let total_size = hitgroup_offset + hitgroup_count as u64 * record_stride;

        Ok(Self {
            handle_size,
            record_stride,
            rgen_offset,
            miss_offset,
            hitgroup_offset,
            total_size,
            rgen_count,
            miss_count,
            hitgroup_count,
        })
    }

    pub fn group_count(&self) -> u32 {
        self.rgen_count + self.miss_count + self.hitgroup_count
    }

    /// Byte offset of the record belonging to shader group `group`.
    pub fn record_offset(&self, group: u32) -> u64 {
        let stride = self.record_stride;
        if group < self.rgen_count {
            self.rgen_offset + group as u64 * stride
        } else if group < self.rgen_count + self.miss_count {
            self.miss_offset + (group - self.rgen_count) as u64 * stride
        } else {
            self.hitgroup_offset + (group - self.rgen_count - self.miss_count) as u64 * stride
        }
    }

    /// Fills the table with the queried group handles. Ray generation and miss records
    /// carry zeroed parameters, hit group records the parameters of their mesh.
    pub fn write_records(
        &self,
        group_handles: &[u8],
        hit_parameters: &[RecordParameter],
    ) -> Result<Vec<u8>> {
        let handle_size = self.handle_size as usize;
        if group_handles.len() != self.group_count() as usize * handle_size {
            return Err(TracerError::Configuration(format!(
                "expected {} bytes of shader group handles, got {}",
                self.group_count() as usize * handle_size,
                group_handles.len()
            )));
        }
        if hit_parameters.len() != self.hitgroup_count as usize {
            return Err(TracerError::Configuration(format!(
                "{} hit groups but {} record parameters",
                self.hitgroup_count,
                hit_parameters.len()
            )));
        }

        let mut table = vec![0u8; self.total_size as usize];
        let first_hitgroup = self.rgen_count + self.miss_count;
        for (group, handle) in (0..self.group_count()).zip(group_handles.chunks_exact(handle_size)) {
            let offset = self.record_offset(group) as usize;
            let parameter = match group.checked_sub(first_hitgroup) {
                Some(hitgroup) => hit_parameters[hitgroup as usize],
                None => RecordParameter::default(),
            };

            table[offset..offset + handle_size].copy_from_slice(handle);
            let parameter_bytes = bytemuck::bytes_of(&parameter);
            table[offset + handle_size..offset + handle_size + parameter_bytes.len()]
                .copy_from_slice(parameter_bytes);
        }
        Ok(table)
    }
}

pub struct ShaderBindingTable {
    pub buffer: Buffer<u8>,
    pub layout: SbtLayout,
}

impl ShaderBindingTable {
    pub fn new(
        command_pool: &CommandPool,
        pipeline: vk::Pipeline,
        layout: SbtLayout,
        hit_parameters: &[RecordParameter],
    ) -> Result<Self> {
        let context = command_pool.context();

        let mut group_handles = vec![0u8; layout.group_count() as usize * layout.handle_size as usize];
        unsafe {
            context
                .context_raytracing
                .ray_tracing
                .get_ray_tracing_shader_group_handles(
                    pipeline,
                    0,
                    layout.group_count(),
                    &mut group_handles,
                )
        }
        .or_resource_error("shader group handles")?;

        let table = layout.write_records(&group_handles, hit_parameters)?;
        let buffer = Buffer::device_local_with_data(
            command_pool,
            vk::BufferUsageFlags::RAY_TRACING_NV,
            &table,
        )?;
        debug!("shader binding table: {layout:?}");

        Ok(Self { buffer, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(handle_size: u32, base_alignment: u32) -> RayTracingLimits {
        RayTracingLimits {
            shader_group_handle_size: handle_size,
            shader_group_base_alignment: base_alignment,
            max_shader_group_stride: 4096,
            max_recursion_depth: 31,
        }
    }

    #[test]
    fn two_meshes_one_model() {
        let layout = SbtLayout::compute(&limits(16, 64), 4, 2).unwrap();

        assert_eq!(layout.hitgroup_count, 2);
        assert_eq!(layout.rgen_count, 1);
        assert_eq!(layout.miss_count, 1);
        assert_eq!(layout.record_stride, 32);
        assert_eq!(layout.rgen_offset, 0);
        assert_eq!(layout.miss_offset, align_up(layout.record_stride, 64));
        assert_eq!(
            layout.hitgroup_offset,
            align_up(layout.miss_offset + layout.record_stride, 64)
        );
        assert_eq!(layout.total_size, 192);
    }

    #[test]
    fn layout_invariants_hold_for_many_limits() {
        for handle_size in [8, 16, 32, 64] {
            for base_alignment in [16, 32, 64, 256] {
                for mesh_count in 1..6 {
                    let group_count = RAYGEN_COUNT + 1 + mesh_count;
                    let layout =
                        SbtLayout::compute(&limits(handle_size, base_alignment), group_count, mesh_count)
                            .unwrap();

                    assert_eq!(layout.record_stride % handle_size as u64, 0);
                    assert!(layout.record_stride >= handle_size as u64 + RECORD_PARAMETER_SIZE);
                    assert_eq!(layout.miss_offset % base_alignment as u64, 0);
                    assert_eq!(layout.hitgroup_offset % base_alignment as u64, 0);
                    assert_eq!(
                        layout.total_size,
                        layout.hitgroup_offset
                            + (mesh_count * RAY_TYPE_COUNT) as u64 * layout.record_stride
                    );
                }
            }
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let first = SbtLayout::compute(&limits(32, 64), 7, 5).unwrap();
        let second = SbtLayout::compute(&limits(32, 64), 7, 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stride_above_hardware_maximum_is_rejected() {
        let limits = RayTracingLimits {
            max_shader_group_stride: 32,
            ..limits(32, 64)
        };
        assert!(matches!(
            SbtLayout::compute(&limits, 3, 1),
            Err(TracerError::Capability(_))
        ));
    }

    #[test]
    fn too_few_groups_is_a_configuration_error() {
        assert!(matches!(
            SbtLayout::compute(&limits(16, 64), 2, 2),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn records_hold_handles_and_parameters() {
        let layout = SbtLayout::compute(&limits(4, 8), 4, 2).unwrap();
        assert_eq!(layout.record_stride, 12);
        assert_eq!(
            (layout.miss_offset, layout.hitgroup_offset, layout.total_size),
            (16, 32, 56)
        );

        let handles: Vec<u8> = (1..=4u8).flat_map(|group| [group; 4]).collect();
        let parameters = [
            RecordParameter {
                geometry_id: 0,
                material_id: 7,
            },
            RecordParameter {
                geometry_id: 1,
                material_id: 3,
            },
        ];

        let table = layout.write_records(&handles, &parameters).unwrap();

        assert_eq!(table.len(), 56);
        assert_eq!(&table[0..4], &[1; 4]);
        assert_eq!(&table[4..12], &[0; 8]);
        assert_eq!(&table[16..20], &[2; 4]);
        assert_eq!(&table[20..28], &[0; 8]);
        assert_eq!(&table[32..36], &[3; 4]);
        assert_eq!(&table[36..40], &0u32.to_le_bytes());
        assert_eq!(&table[40..44], &7u32.to_le_bytes());
        assert_eq!(&table[44..48], &[4; 4]);
        assert_eq!(&table[48..52], &1u32.to_le_bytes());
        assert_eq!(&table[52..56], &3u32.to_le_bytes());
    }

    #[test]
    fn parameter_count_must_match_hit_groups() {
        let layout = SbtLayout::compute(&limits(4, 8), 4, 2).unwrap();
        let handles = vec![0u8; 16];
        assert!(matches!(
            layout.write_records(&handles, &[RecordParameter::default()]),
            Err(TracerError::Configuration(_))
        ));
    }
}
