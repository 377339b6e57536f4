use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TracerError>;

#[derive(Error, Debug)]
pub enum TracerError {
    /// Collection sizes disagree, or the caller supplied an unusable setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A device object or its memory could not be created.
    #[error("failed to create {stage}: {reason}")]
    ResourceCreation { stage: String, reason: String },

    /// A hardware limit would be exceeded.
    #[error("device capability exceeded: {0}")]
    Capability(String),

    /// A model or texture could not be read or decoded.
    #[error("failed to load asset {}: {reason}", path.display())]
    Asset { path: PathBuf, reason: String },

    #[error("could not load the vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
}

impl TracerError {
    pub fn resource(stage: impl Into<String>, reason: impl ToString) -> Self {
        TracerError::ResourceCreation {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    pub fn asset(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TracerError::Asset {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Turns a raw `vk::Result` into a [`TracerError::ResourceCreation`] naming the failing stage.
pub trait VkResultExt<T> {
    fn or_resource_error(self, stage: &str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_resource_error(self, stage: &str) -> Result<T> {
        self.map_err(|result| TracerError::resource(stage, result))
    }
}
