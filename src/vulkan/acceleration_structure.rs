use std::sync::Arc;

use ash::vk;
use log::debug;

use super::{
    buffer::Buffer, command_buffer::execute_one_time_commands, command_pool::CommandPool,
    context::Context,
};
use crate::error::{Result, TracerError, VkResultExt};
use crate::utility::find_memorytype_index;

/// An NV acceleration structure with its bound object memory and the opaque
/// handle that top-level instances use to reference it.
pub struct AccelerationStructure {
    pub inner: vk::AccelerationStructureNV,
    pub memory: vk::DeviceMemory,
    pub handle: u64,
    context: Arc<Context>,
}

impl AccelerationStructure {
    /// Creates the structure described by `info`, binds dedicated memory to it and
    /// builds it synchronously. `instance_data` holds the instances of a top-level build.
    pub fn build(
        command_pool: &CommandPool,
        info: &vk::AccelerationStructureInfoNV,
        instance_data: vk::Buffer,
        stage: &str,
    ) -> Result<Self> {
        let context = command_pool.context().clone();
        let ray_tracing = &context.context_raytracing.ray_tracing;

        let create_info = vk::AccelerationStructureCreateInfoNV::builder().info(*info);
        let inner = unsafe { ray_tracing.create_acceleration_structure(&create_info, None) }
            .or_resource_error(stage)?;

        // Drop releases the structure from here on, and the memory once it is set
        let mut acceleration_structure = Self {
            inner,
            memory: vk::DeviceMemory::null(),
            handle: 0,
            context: context.clone(),
        };

        let object_requirements = acceleration_structure
            .memory_requirements(vk::AccelerationStructureMemoryRequirementsTypeNV::OBJECT);
        let scratch_requirements = acceleration_structure
            .memory_requirements(vk::AccelerationStructureMemoryRequirementsTypeNV::BUILD_SCRATCH);
        debug!(
            "{stage}: {} bytes object memory, {} bytes scratch",
            object_requirements.size, scratch_requirements.size
        );

        let memory_type_index = find_memorytype_index(
            &object_requirements,
            &context.device_memory_properties,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or_else(|| TracerError::resource(stage, "no device local memory type"))?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(object_requirements.size)
            .memory_type_index(memory_type_index);
        acceleration_structure.memory =
            unsafe { context.device.allocate_memory(&allocate_info, None) }
                .or_resource_error(&format!("{stage} memory"))?;

        let bind_info = vk::BindAccelerationStructureMemoryInfoNV::builder()
            .acceleration_structure(inner)
            .memory(acceleration_structure.memory)
            .memory_offset(0)
            .build();
        unsafe { ray_tracing.bind_acceleration_structure_memory(&[bind_info]) }
            .or_resource_error(&format!("{stage} memory binding"))?;

        let scratch_buffer: Buffer<u8> = Buffer::new(
            context.clone(),
            scratch_requirements.size,
            vk::BufferUsageFlags::RAY_TRACING_NV,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .map_err(|error| TracerError::resource(format!("{stage} scratch buffer"), error))?;

        execute_one_time_commands(command_pool, |command_buffer| unsafe {
            ray_tracing.cmd_build_acceleration_structure(
                command_buffer,
                info,
                instance_data,
                0,
                false,
                inner,
                vk::AccelerationStructureNV::null(),
                scratch_buffer.inner,
                0,
            );
        })
        .map_err(|error| TracerError::resource(format!("{stage} build"), error))?;

        acceleration_structure.handle =
            unsafe { ray_tracing.get_acceleration_structure_handle(inner) }
                .or_resource_error(&format!("{stage} handle"))?;

        Ok(acceleration_structure)
    }

    fn memory_requirements(
        &self,
        ty: vk::AccelerationStructureMemoryRequirementsTypeNV,
    ) -> vk::MemoryRequirements {
        let info = vk::AccelerationStructureMemoryRequirementsInfoNV::builder()
            .ty(ty)
            .acceleration_structure(self.inner);

        unsafe {
            self.context
                .context_raytracing
                .ray_tracing
                .get_acceleration_structure_memory_requirements(&info)
        }
        .memory_requirements
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.context
                .context_raytracing
                .ray_tracing
                .destroy_acceleration_structure(self.inner, None);
            self.context.device.free_memory(self.memory, None);
        }
    }
}
