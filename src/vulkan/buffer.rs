use std::sync::Arc;
use std::{marker::PhantomData, ops::Deref};

use ash::{self, vk};
use bytemuck::Pod;

use crate::error::{Result, TracerError, VkResultExt};
use crate::utility::find_memorytype_index;
use crate::vulkan::command_buffer::execute_one_time_commands;
use crate::vulkan::command_pool::CommandPool;
use crate::vulkan::context::Context;

/// A buffer with its own dedicated memory allocation, typed by the element it holds.
pub struct Buffer<T> {
    pub inner: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes.
    pub size: vk::DeviceSize,
    context: Arc<Context>,
    _marker: PhantomData<T>,
}

impl<T> Buffer<T> {
    pub fn new(
        context: Arc<Context>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
    ) -> Result<Buffer<T>> {
        if size == 0 {
            return Err(TracerError::Configuration(
                "cannot create an empty buffer".into(),
            ));
        }
        let device = &context.device;

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer =
            unsafe { device.create_buffer(&create_info, None) }.or_resource_error("buffer")?;

        let buffer_memory_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let Some(buffer_memorytype_index) = find_memorytype_index(
            &buffer_memory_requirements,
            &context.device_memory_properties,
            memory_property_flags,
        ) else {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(TracerError::resource(
                "buffer memory",
                format!("no memory type with {memory_property_flags:?}"),
            ));
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(buffer_memory_requirements.size)
            .memory_type_index(buffer_memorytype_index);

        let memory = match unsafe { device.allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(TracerError::resource("buffer memory", error));
            }
        };

        // from here on Drop takes care of both handles
        let buffer = Buffer {
            inner: buffer,
            usage,
            memory,
            size,
            context,
            _marker: PhantomData,
        };

        unsafe { buffer.context.device.bind_buffer_memory(buffer.inner, memory, 0) }
            .or_resource_error("buffer memory binding")?;

        Ok(buffer)
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.inner,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }
}

impl<T: Pod> Buffer<T> {
    /// Writes `data` through a host mapping. The buffer must live in host-visible memory.
    pub fn copy_data(&self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(TracerError::Configuration(format!(
                "{} bytes do not fit into a buffer of {} bytes",
                bytes.len(),
                self.size
            )));
        }
        let device = &self.context.device;

        let buffer_ptr = unsafe {
            device.map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .or_resource_error("buffer mapping")? as *mut u8;

        unsafe { buffer_ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len()) };

        unsafe { device.unmap_memory(self.memory) };
        Ok(())
    }

    /// Creates a host-visible staging buffer already filled with `data`.
    pub fn staging(context: Arc<Context>, data: &[T]) -> Result<Buffer<T>> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let staging = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.copy_data(data)?;
        Ok(staging)
    }

    /// Creates a device-local buffer and fills it from the host through a staging copy.
    pub fn device_local_with_data(
        command_pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Buffer<T>> {
        let mut uploads = StagingUploads::new(command_pool.context().clone());
        let buffer = uploads.device_local_buffer(usage, data)?;
        uploads.submit(command_pool)?;
        Ok(buffer)
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_buffer(self.inner, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}

impl<T> Deref for Buffer<T> {
    type Target = vk::Buffer;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Collects host to device copies so several buffers can be filled with a single submission.
/// Staging buffers are released once the copies completed.
pub struct StagingUploads {
    context: Arc<Context>,
    staging_buffers: Vec<Buffer<u8>>,
    copies: Vec<(vk::Buffer, vk::Buffer, vk::BufferCopy)>,
}

impl StagingUploads {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            staging_buffers: vec![],
            copies: vec![],
        }
    }

    /// Creates a device-local buffer with `usage | TRANSFER_DST` and schedules its upload.
    pub fn device_local_buffer<T: Pod>(
        &mut self,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Buffer<T>> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Buffer::new(
            self.context.clone(),
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let staging = Buffer::staging(self.context.clone(), bytes)?;

        self.copies.push((
            staging.inner,
            buffer.inner,
            vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: bytes.len() as vk::DeviceSize,
            },
        ));
        self.staging_buffers.push(staging);
        Ok(buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    pub fn submit(self, command_pool: &CommandPool) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let device = &self.context.device;
        execute_one_time_commands(command_pool, |command_buffer| {
            for (src, dst, region) in &self.copies {
                unsafe {
                    device.cmd_copy_buffer(command_buffer, *src, *dst, std::slice::from_ref(region))
                };
            }
        })
    }
}
