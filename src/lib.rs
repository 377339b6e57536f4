pub mod config_loader;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod observer;
pub mod path_tracer;
pub mod scene;
pub mod utility;
pub mod vulkan;

pub use error::{Result, TracerError};
pub use path_tracer::{PathTracer, RenderSettings};
