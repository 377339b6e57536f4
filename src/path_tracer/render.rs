use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use ash::vk::{AccessFlags2, PipelineStageFlags2};
use log::debug;

use super::pipeline::RayTracingPipeline;
use super::sbt::ShaderBindingTable;
use crate::error::{Result, TracerError};
use crate::vulkan::command_buffer::OneTimeCommandBuffer;
use crate::vulkan::command_pool::CommandPool;
use crate::vulkan::context::Context;
use crate::vulkan::image::{simple_image_create_info, Image};
use crate::vulkan::image_view::ImageView;
use crate::vulkan::query_pool::TimerQueryPool;

pub const RENDER_TARGET_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const COMPONENT_COUNT: usize = 4;

/// The storage image the ray generation shader writes, and the linear host-visible
/// image it is copied into. Fields are declared in reverse creation order.
pub struct RenderTargets {
    pub output_image: Image,
    pub storage_view: ImageView,
    pub storage_image: Arc<Image>,
    pub extent: vk::Extent2D,
    mapping: MappingState,
}

impl RenderTargets {
    pub fn new(context: Arc<Context>, width: u32, height: u32) -> Result<Self> {
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };

        let storage_image = Arc::new(Image::new(
            context.clone(),
            &vk::ImageCreateInfo {
                format: RENDER_TARGET_FORMAT,
                extent,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
                ..simple_image_create_info()
            },
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?);
        let storage_view = ImageView::new_default(context.clone(), storage_image.clone())?;

        let output_image = Image::new(
            context,
            &vk::ImageCreateInfo {
                format: RENDER_TARGET_FORMAT,
                extent,
                tiling: vk::ImageTiling::LINEAR,
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..simple_image_create_info()
            },
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        debug!("render targets {width}x{height}");

        Ok(Self {
            output_image,
            storage_view,
            storage_image,
            extent: vk::Extent2D { width, height },
            mapping: MappingState::default(),
        })
    }

    /// Maps the output image. Only meaningful after a render copied into it.
    pub fn map(&mut self) -> Result<MappedImage<'_>> {
        MappedImage::new(&self.output_image, &self.mapping)
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_mapped()
    }
}

/// Whether the output memory is mapped. Vulkan allows one mapping per allocation at a time.
#[derive(Default)]
struct MappingState {
    mapped: Cell<bool>,
}

impl MappingState {
    fn acquire(&self) -> Result<()> {
        if self.mapped.replace(true) {
            return Err(TracerError::Configuration(
                "the output image is already mapped".into(),
            ));
        }
        Ok(())
    }

    fn release(&self) {
        self.mapped.set(false);
    }

    fn is_mapped(&self) -> bool {
        self.mapped.get()
    }
}

/// Borrowed state needed to record a frame.
pub struct RenderPass<'a> {
    pub command_pool: &'a CommandPool,
    pub timer: &'a TimerQueryPool,
    pub targets: &'a RenderTargets,
    pub pipeline: &'a RayTracingPipeline,
    pub descriptor_sets: &'a [vk::DescriptorSet],
    pub sbt: &'a ShaderBindingTable,
}

impl RenderPass<'_> {
    /// Records and submits one trace over the whole render target, waits for it, then
    /// returns the device time between the two timestamps in nanoseconds.
    pub fn execute(&self) -> Result<u64> {
        let context = self.command_pool.context();
        let device = &context.device;
        let command_buffer = OneTimeCommandBuffer::begin(self.command_pool)?;
        let cb = *command_buffer;

        let storage = &self.targets.storage_image;
        let output = &self.targets.output_image;
        let color_range = storage.full_subresource_range(vk::ImageAspectFlags::COLOR);

        self.timer.cmd_reset(cb);

        // previous contents are discarded
        storage.insert_image_memory_barrier(
            cb,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            PipelineStageFlags2::TOP_OF_PIPE,
            PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            AccessFlags2::NONE,
            AccessFlags2::SHADER_WRITE,
            color_range,
        );
        output.insert_image_memory_barrier(
            cb,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            PipelineStageFlags2::TOP_OF_PIPE,
            PipelineStageFlags2::TRANSFER,
            AccessFlags2::NONE,
            AccessFlags2::TRANSFER_WRITE,
            color_range,
        );

        unsafe {
            device.cmd_bind_pipeline(
                cb,
                vk::PipelineBindPoint::RAY_TRACING_NV,
                self.pipeline.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::RAY_TRACING_NV,
                self.pipeline.layout,
                0,
                self.descriptor_sets,
                &[],
            );
        }

        self.timer
            .cmd_write_start(cb, vk::PipelineStageFlags::RAY_TRACING_SHADER_NV);

        let table = self.sbt.buffer.inner;
        let layout = &self.sbt.layout;
        let extent = self.targets.extent;
        unsafe {
            context.context_raytracing.ray_tracing.cmd_trace_rays(
                cb,
                table,
                layout.rgen_offset,
                table,
                layout.miss_offset,
                layout.record_stride,
                table,
                layout.hitgroup_offset,
                layout.record_stride,
                vk::Buffer::null(),
                0,
                0,
                extent.width,
                extent.height,
                1,
            );
        }

        self.timer
            .cmd_write_end(cb, vk::PipelineStageFlags::RAY_TRACING_SHADER_NV);

        storage.insert_image_memory_barrier(
            cb,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            PipelineStageFlags2::TRANSFER,
            AccessFlags2::SHADER_WRITE,
            AccessFlags2::TRANSFER_READ,
            color_range,
        );

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent: storage.extent,
        };
        unsafe {
            device.cmd_copy_image(
                cb,
                storage.inner,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                output.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };

        // linear images are only read by the host in GENERAL
        output.insert_image_memory_barrier(
            cb,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::GENERAL,
            PipelineStageFlags2::TRANSFER,
            PipelineStageFlags2::HOST,
            AccessFlags2::TRANSFER_WRITE,
            AccessFlags2::HOST_READ,
            color_range,
        );

        command_buffer.submit_and_wait()?;
        self.timer.elapsed_nanoseconds()
    }
}

/// Host view of the rendered RGBA8 image. The memory is unmapped when this is dropped.
pub struct MappedImage<'a> {
    data: &'a [u8],
    pub row_stride: usize,
    pub component_count: usize,
    pub width: u32,
    pub height: u32,
    image: &'a Image,
    mapping: &'a MappingState,
}

impl<'a> MappedImage<'a> {
    fn new(image: &'a Image, mapping: &'a MappingState) -> Result<Self> {
        mapping.acquire()?;
        let device = &image.context().device;
        let subresource = vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        };
        let layout = unsafe { device.get_image_subresource_layout(image.inner, subresource) };

        let pointer = match unsafe {
            device.map_memory(image.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        } {
            Ok(pointer) => pointer,
            Err(error) => {
                mapping.release();
                return Err(TracerError::resource("output image mapping", error));
            }
        };

        let height = image.extent.height;
        let row_stride = layout.row_pitch as usize;
        let len = mapped_len(row_stride, image.extent.width, height);
        let data = unsafe {
            std::slice::from_raw_parts((pointer as *const u8).add(layout.offset as usize), len)
        };

        Ok(Self {
            data,
            row_stride,
            component_count: COMPONENT_COUNT,
            width: image.extent.width,
            height,
            image,
            mapping,
        })
    }

    /// All rows, each `row_stride` bytes apart.
    pub fn data(&self) -> &[u8] {
        self.data
    }

    /// The visible pixels of row `y`, without any row padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_stride;
        &self.data[start..start + tight_row_stride(self.width)]
    }

    /// The image as tightly packed RGBA rows.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(tight_row_stride(self.width) * self.height as usize);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

impl Drop for MappedImage<'_> {
    fn drop(&mut self) {
        unsafe { self.image.context().device.unmap_memory(self.image.memory) };
        self.mapping.release();
    }
}

pub fn tight_row_stride(width: u32) -> usize {
    width as usize * COMPONENT_COUNT
}

/// Bytes spanned by `height` rows, the last one without trailing padding.
fn mapped_len(row_stride: usize, width: u32, height: u32) -> usize {
    match height {
        0 => 0,
        _ => row_stride * (height as usize - 1) + tight_row_stride(width),
    }
}
