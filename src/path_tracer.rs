pub mod acceleration;
pub mod descriptors;
pub mod pipeline;
pub mod render;
pub mod sbt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};

use self::acceleration::SceneAccelerationStructures;
use self::descriptors::Descriptors;
use self::pipeline::{shader_groups, RayTracingPipeline, ShaderPaths, ShaderStages};
use self::render::{MappedImage, RenderPass, RenderTargets};
use self::sbt::{SbtLayout, ShaderBindingTable};
use crate::error::{Result, TracerError};
use crate::lifecycle::Lifecycle;
use crate::observer::LoadObserver;
use crate::scene::{GpuScene, SceneData};
use crate::vulkan::command_pool::CommandPool;
use crate::vulkan::context::Context;
use crate::vulkan::query_pool::TimerQueryPool;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    /// Maximum ray recursion depth of the pipeline.
    pub iterations: u32,
    pub shaders: ShaderPaths,
}

/// The files an initialization pass reads.
struct Intents<'a> {
    model_paths: &'a [PathBuf],
    environment_path: &'a Path,
}

/// Every device object of an initialized tracer.
/// Declared in reverse creation order, so dropping releases in exact reverse.
/// Stages holding several objects keep them in a [`ReverseDropVec`](crate::utility::ReverseDropVec).
pub struct TracerResources {
    sbt: ShaderBindingTable,
    pipeline: RayTracingPipeline,
    descriptors: Descriptors,
    _shader_stages: ShaderStages,
    _acceleration_structures: SceneAccelerationStructures,
    _scene: GpuScene,
    targets: RenderTargets,
    timer: TimerQueryPool,
    command_pool: CommandPool,
}

impl TracerResources {
    fn create(
        context: &Arc<Context>,
        settings: &RenderSettings,
        intents: Intents,
        observer: &dyn LoadObserver,
    ) -> Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(TracerError::Configuration(format!(
                "render extent {}x{} is empty",
                settings.width, settings.height
            )));
        }

        let command_pool = CommandPool::new(context.clone())?;
        let timer = TimerQueryPool::new(context.clone())?;
        debug!("created pools");

        let targets = RenderTargets::new(context.clone(), settings.width, settings.height)?;

        let scene_data = SceneData::load(intents.model_paths, observer)?;
        let scene = GpuScene::create(&command_pool, &scene_data, intents.environment_path, observer)?;
        info!(
            "scene has {} meshes and {} materials",
            scene_data.mesh_count(),
            scene_data.material_count()
        );

        let acceleration_structures = SceneAccelerationStructures::build(&command_pool, &scene)?;

        let mesh_count = scene.meshes.len() as u32;
        let shader_stages = ShaderStages::load(context.clone(), &settings.shaders)?;
        let groups = shader_groups(mesh_count);
        debug!("created {} shader groups", groups.len());

        let descriptors = Descriptors::new(
            context.clone(),
            targets.storage_view.inner,
            acceleration_structures.top_level.inner,
            &scene,
        )?;

        let pipeline = RayTracingPipeline::new(
            context.clone(),
            &shader_stages,
            &groups,
            &descriptors.set_layouts(),
            settings.iterations,
        )?;
        debug!("created ray tracing pipeline");

        let layout = SbtLayout::compute(
            &context.context_raytracing.limits(),
            groups.len() as u32,
            mesh_count,
        )?;
        let sbt = ShaderBindingTable::new(
            &command_pool,
            pipeline.pipeline,
            layout,
            &scene_data.record_parameters(),
        )?;

        Ok(Self {
            sbt,
            pipeline,
            descriptors,
            _shader_stages: shader_stages,
            _acceleration_structures: acceleration_structures,
            _scene: scene,
            targets,
            timer,
            command_pool,
        })
    }
}

/// Offline path tracer rendering one scene into a host-readable image.
///
/// `load_model` and `load_environment` only record what the next [`PathTracer::init`]
/// reads. Device objects exist between a successful `init` and `destroy`.
pub struct PathTracer {
    resources: Lifecycle<TracerResources>,
    observer: Box<dyn LoadObserver>,
    model_paths: Vec<PathBuf>,
    environment_path: Option<PathBuf>,
    settings: RenderSettings,
    context: Arc<Context>,
}

impl PathTracer {
    pub fn new(context: Arc<Context>, settings: RenderSettings) -> Self {
        Self {
            resources: Lifecycle::new(),
            observer: Box::new(()),
            model_paths: vec![],
            environment_path: None,
            settings,
            context,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn LoadObserver>) {
        self.observer = observer;
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn load_model(&mut self, path: impl Into<PathBuf>) {
        self.model_paths.push(path.into());
    }

    pub fn load_environment(&mut self, path: impl Into<PathBuf>) {
        self.environment_path = Some(path.into());
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_initialized()
    }

    /// Creates every device object. On failure everything created so far is released
    /// and the recorded models and environment are kept for another attempt.
    pub fn init(&mut self) -> Result<()> {
        let environment_path = self.environment_path.as_deref().ok_or_else(|| {
            TracerError::Configuration("no environment map was loaded".into())
        })?;
        let intents = Intents {
            model_paths: &self.model_paths,
            environment_path,
        };

        let context = &self.context;
        let settings = &self.settings;
        let observer = self.observer.as_ref();
        let created = self
            .resources
            .init(|| TracerResources::create(context, settings, intents, observer))?;

        if created {
            self.model_paths.clear();
            self.environment_path = None;
            info!("path tracer initialized");
        }
        Ok(())
    }

    /// Waits for the device and releases every object in reverse creation order.
    /// Does nothing when not initialized.
    pub fn destroy(&mut self) -> Result<()> {
        let mut idle = Ok(());
        let context = &self.context;
        if self.resources.destroy(|_| idle = context.wait_idle()) {
            debug!("path tracer resources released");
        }
        idle
    }

    /// Renders one frame and returns the device time it took in nanoseconds.
    pub fn run(&self) -> Result<u64> {
        let resources = self.initialized("run")?;
        RenderPass {
            command_pool: &resources.command_pool,
            timer: &resources.timer,
            targets: &resources.targets,
            pipeline: &resources.pipeline,
            descriptor_sets: &resources.descriptors.sets,
            sbt: &resources.sbt,
        }
        .execute()
    }

    /// Maps the last rendered image for reading. The mapping borrows the tracer
    /// mutably, so nothing can render or map again until it is dropped.
    pub fn map_image(&mut self) -> Result<MappedImage<'_>> {
        self.resources
            .get_mut()
            .ok_or_else(|| TracerError::Configuration("map_image called before init".into()))?
            .targets
            .map()
    }

    fn initialized(&self, operation: &str) -> Result<&TracerResources> {
        self.resources.get().ok_or_else(|| {
            TracerError::Configuration(format!("{operation} called before init"))
        })
    }
}

impl Drop for PathTracer {
    fn drop(&mut self) {
        if let Err(error) = self.destroy() {
            error!("failed to release path tracer: {error}");
        }
    }
}
