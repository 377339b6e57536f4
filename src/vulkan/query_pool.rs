use std::sync::Arc;

use ash::vk;

use crate::error::{Result, VkResultExt};
use crate::vulkan::context::Context;

const START: u32 = 0;
const END: u32 = 1;

/// Two timestamp slots bracketing the work recorded between them.
pub struct TimerQueryPool {
    pub inner: vk::QueryPool,
    context: Arc<Context>,
}

impl TimerQueryPool {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let create_info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(2);

        let query_pool = unsafe { context.device.create_query_pool(&create_info, None) }
            .or_resource_error("timestamp query pool")?;

        Ok(Self {
            inner: query_pool,
            context,
        })
    }

    pub fn cmd_reset(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.context
                .device
                .cmd_reset_query_pool(command_buffer, self.inner, 0, 2)
        };
    }

    pub fn cmd_write_start(&self, command_buffer: vk::CommandBuffer, stage: vk::PipelineStageFlags) {
        unsafe {
            self.context
                .device
                .cmd_write_timestamp(command_buffer, stage, self.inner, START)
        };
    }

    pub fn cmd_write_end(&self, command_buffer: vk::CommandBuffer, stage: vk::PipelineStageFlags) {
        unsafe {
            self.context
                .device
                .cmd_write_timestamp(command_buffer, stage, self.inner, END)
        };
    }

    /// Blocks until both timestamps are available and returns the elapsed nanoseconds.
    pub fn elapsed_nanoseconds(&self) -> Result<u64> {
        let mut timestamps = [0u64; 2];
        unsafe {
            self.context.device.get_query_pool_results(
                self.inner,
                0,
                2,
                &mut timestamps,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .or_resource_error("timestamp readback")?;

        Ok(elapsed_nanoseconds(
            timestamps[START as usize],
            timestamps[END as usize],
            self.context.timestamp_period,
            self.context.timestamp_valid_bits,
        ))
    }
}

impl Drop for TimerQueryPool {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_query_pool(self.inner, None) };
    }
}

/// Converts two raw timestamps into nanoseconds, ignoring bits the queue does not write.
pub fn elapsed_nanoseconds(start: u64, end: u64, period: f32, valid_bits: u32) -> u64 {
    let mask = if valid_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    };
    let ticks = (end & mask).wrapping_sub(start & mask) & mask;
    (ticks as f64 * period as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_scaled_by_the_period() {
        assert_eq!(elapsed_nanoseconds(1_000, 3_000, 1.0, 64), 2_000);
        assert_eq!(elapsed_nanoseconds(10, 20, 52.08, 64), 521);
    }

    #[test]
    fn invalid_bits_are_masked_off() {
        let garbage = 0xFFFF_0000_0000_0000;
        assert_eq!(elapsed_nanoseconds(garbage | 5, garbage | 9, 1.0, 48), 4);
    }

    #[test]
    fn counter_wrap_is_handled() {
        let max = (1u64 << 36) - 1;
        assert_eq!(elapsed_nanoseconds(max, 2, 1.0, 36), 3);
    }
}
