use std::ops::Deref;

use ash::vk;

use super::command_pool::CommandPool;
use crate::error::{Result, VkResultExt};

/// A primary command buffer that is recorded once, submitted, and waited upon.
/// Freed when dropped, whether or not it was ever submitted.
pub struct OneTimeCommandBuffer {
    inner: vk::CommandBuffer,
    command_pool: CommandPool,
}

impl OneTimeCommandBuffer {
    pub fn begin(command_pool: &CommandPool) -> Result<Self> {
        let device = &command_pool.context().device;

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(1)
            .command_pool(**command_pool)
            .level(vk::CommandBufferLevel::PRIMARY);

        let inner = unsafe { device.allocate_command_buffers(&allocate_info) }
            .or_resource_error("command buffer")?[0];

        let command_buffer = Self {
            inner,
            command_pool: command_pool.clone(),
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(inner, &begin_info) }
            .or_resource_error("command buffer recording")?;

        Ok(command_buffer)
    }

    /// Ends recording, submits to the context queue and blocks until the queue is idle.
    pub fn submit_and_wait(self) -> Result<()> {
        let context = self.command_pool.context();
        let device = &context.device;

        unsafe { device.end_command_buffer(self.inner) }
            .or_resource_error("command buffer recording")?;

        let submit_info =
            vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&self.inner));

        unsafe { device.queue_submit(context.queue, &[submit_info.build()], vk::Fence::null()) }
            .or_resource_error("queue submission")?;

        unsafe { device.queue_wait_idle(context.queue) }.or_resource_error("queue idle wait")
    }
}

/// Records `record` into a fresh command buffer and executes it synchronously.
pub fn execute_one_time_commands<F>(command_pool: &CommandPool, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let command_buffer = OneTimeCommandBuffer::begin(command_pool)?;
    record(*command_buffer);
    command_buffer.submit_and_wait()
}

impl Deref for OneTimeCommandBuffer {
    type Target = vk::CommandBuffer;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for OneTimeCommandBuffer {
    fn drop(&mut self) {
        let device = &self.command_pool.context().device;
        unsafe { device.free_command_buffers(*self.command_pool, &[self.inner]) };
    }
}
