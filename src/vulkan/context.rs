use std::ffi::{c_char, CStr};

use ash::{
    extensions::{khr::Synchronization2, nv::RayTracing},
    vk::{self, ApplicationInfo, DeviceCreateInfo, DeviceQueueCreateInfo, InstanceCreateInfo},
};
use log::{debug, info};

use crate::error::{Result, TracerError, VkResultExt};

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

pub struct Context {
    _entry: ash::Entry,
    pub instance: ash::Instance,

    pub context_raytracing: ContextRaytracing,
    pub synchronisation2_loader: Synchronization2,

    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
    pub timestamp_valid_bits: u32,
    pub timestamp_period: f32,

    pub device: ash::Device,
    pub queue: vk::Queue,

    pub device_memory_properties: vk::PhysicalDeviceMemoryProperties,
}

/// The NV ray tracing entry points and the hardware limits that go with them,
/// resolved once per device.
pub struct ContextRaytracing {
    pub ray_tracing: RayTracing,
    pub properties: vk::PhysicalDeviceRayTracingPropertiesNV,
}

/// Hardware limits that shape the shader binding table and the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayTracingLimits {
    pub shader_group_handle_size: u32,
    pub shader_group_base_alignment: u32,
    pub max_shader_group_stride: u32,
    pub max_recursion_depth: u32,
}

impl ContextRaytracing {
    pub fn limits(&self) -> RayTracingLimits {
        RayTracingLimits {
            shader_group_handle_size: self.properties.shader_group_handle_size,
            shader_group_base_alignment: self.properties.shader_group_base_alignment,
            max_shader_group_stride: self.properties.max_shader_group_stride,
            max_recursion_depth: self.properties.max_recursion_depth,
        }
    }
}

impl Context {
    pub fn new(enable_validation: bool) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }?;

        let instance = {
            let app_name = unsafe { CStr::from_bytes_with_nul_unchecked(b"round-tracer\0") };
            let app_info = ApplicationInfo::builder()
                .application_name(app_name)
                .api_version(vk::API_VERSION_1_3);

            let layers: Vec<*const c_char> = if enable_validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = InstanceCreateInfo::builder()
                .application_info(&app_info)
                .enabled_layer_names(&layers);
            unsafe { entry.create_instance(&create_info, None) }.or_resource_error("instance")?
        };

        let (physical_device, queue_family_index, timestamp_valid_bits) =
            match find_physical_device(&instance) {
                Ok(found) => found,
                Err(error) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(error);
                }
            };

        let device = match create_logical_device(&instance, physical_device, queue_family_index) {
            Ok(device) => device,
            Err(error) => {
                unsafe { instance.destroy_instance(None) };
                return Err(error);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let synchronisation2_loader = Synchronization2::new(&instance, &device);

        let ray_tracing = RayTracing::new(&instance, &device);
        let properties = unsafe { RayTracing::get_properties(&instance, physical_device) };
        let context_raytracing = ContextRaytracing {
            ray_tracing,
            properties,
        };

        let device_properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device_name =
            unsafe { CStr::from_ptr(device_properties.device_name.as_ptr()) }.to_string_lossy();
        info!(
            "using {} ({:?}), queue family {}",
            device_name, device_properties.device_type, queue_family_index
        );
        info!("ray tracing limits: {:?}", context_raytracing.limits());

        Ok(Self {
            _entry: entry,
            instance,

            context_raytracing,
            synchronisation2_loader,

            physical_device,
            queue_family_index,
            timestamp_valid_bits,
            timestamp_period: device_properties.limits.timestamp_period,

            device,
            queue,
            device_memory_properties,
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.or_resource_error("device idle wait")
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        debug!("destroying device and instance");
        unsafe { self.device.destroy_device(None) };

        unsafe { self.instance.destroy_instance(None) };
    }
}

fn find_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, u32)> {
    let ray_tracing_extension = RayTracing::name();
    let required_queue_flags =
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;

    let physical_devices = unsafe { instance.enumerate_physical_devices() }
        .or_resource_error("physical device list")?;

    physical_devices
        .into_iter()
        .filter(|pd| {
            let Ok(extension_properties) =
                (unsafe { instance.enumerate_device_extension_properties(*pd) })
            else {
                return false;
            };
            let mut supported_extensions = extension_properties
                .iter()
                .map(|property| unsafe { CStr::from_ptr(property.extension_name.as_ptr()) });

            supported_extensions.any(|ext| ray_tracing_extension == ext)
        })
        .filter_map(|pd| {
            unsafe { instance.get_physical_device_queue_family_properties(pd) }
                .iter()
                .enumerate()
                .find(|(_, info)| {
                    info.queue_flags.contains(required_queue_flags) && info.timestamp_valid_bits > 0
                })
                .map(|(index, info)| (pd, index as u32, info.timestamp_valid_bits))
        })
        .min_by_key(|(pd, _, _)| {
            let device_type = unsafe { instance.get_physical_device_properties(*pd) }.device_type;

            match device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 3,
                vk::PhysicalDeviceType::OTHER => 4,
                _ => 5,
            }
        })
        .ok_or_else(|| {
            TracerError::Capability(
                "no device supports VK_NV_ray_tracing with a timestamped graphics queue".into(),
            )
        })
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
) -> Result<ash::Device> {
    let device_extensions = [
        RayTracing::name().as_ptr(),
        Synchronization2::name().as_ptr(),
    ];

    let queue_priorities = [1.0];
    let queue_create_info = DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities);

    let mut physical_device_vulkan12_features = vk::PhysicalDeviceVulkan12Features {
        descriptor_indexing: vk::TRUE,
        runtime_descriptor_array: vk::TRUE,
        shader_storage_buffer_array_non_uniform_indexing: vk::TRUE,
        shader_sampled_image_array_non_uniform_indexing: vk::TRUE,
        ..vk::PhysicalDeviceVulkan12Features::default()
    };

    let mut physical_device_vulkan13_features = vk::PhysicalDeviceVulkan13Features {
        synchronization2: vk::TRUE,
        ..vk::PhysicalDeviceVulkan13Features::default()
    };

    let create_info = DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&device_extensions)
        .push_next(&mut physical_device_vulkan12_features)
        .push_next(&mut physical_device_vulkan13_features)
        .build();

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .or_resource_error("logical device")
}
