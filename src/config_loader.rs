use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TracerError};
use crate::path_tracer::pipeline::ShaderPaths;
use crate::path_tracer::RenderSettings;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    /// Maximum ray recursion depth.
    pub iterations: u32,
    pub environment_path: PathBuf,
    pub model_paths: Vec<PathBuf>,
    pub shaders: ShaderPaths,
    pub output_path: PathBuf,
    pub enable_validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            iterations: 5,
            environment_path: "assets/environment/environment.hdr".into(),
            model_paths: vec!["assets/models/scene.obj".into()],
            shaders: ShaderPaths::default(),
            output_path: "render.png".into(),
            enable_validation: false,
        }
    }
}

impl Config {
    pub fn from_str(value: &str) -> Result<Self> {
        serde_json::from_str(value)
            .map_err(|error| TracerError::Configuration(format!("malformed config: {error}")))
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            width: self.width,
            height: self.height,
            iterations: self.iterations,
            shaders: self.shaders.clone(),
        }
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    /// Reads the config file. A missing file is created with the defaults.
    pub fn load_config(&mut self) -> Result<&Config> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => Config::from_str(&content)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!("no config at {}, writing defaults", self.path.display());
                let config = Config::default();
                self.save(&config)?;
                config
            }
            Err(error) => {
                return Err(TracerError::Configuration(format!(
                    "cannot read {}: {error}",
                    self.path.display()
                )))
            }
        };
        Ok(self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> Result<&Config> {
        if self.config.is_none() {
            self.load_config()?;
        }
        self.config
            .as_ref()
            .ok_or_else(|| TracerError::Configuration("config was not loaded".into()))
    }

    fn save(&self, config: &Config) -> Result<()> {
        let content = serde_json::to_string_pretty(config)
            .map_err(|error| TracerError::Configuration(error.to_string()))?;
        std::fs::write(&self.path, content).map_err(|error| {
            TracerError::Configuration(format!("cannot write {}: {error}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut loader = ConfigFileLoader::new(&path);

        let config = loader.load_config().unwrap().clone();
        assert_eq!(config, Config::default());
        assert_eq!((config.width, config.height, config.iterations), (3840, 2160, 5));

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(Config::from_str(&written).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"width\": ").unwrap();

        let mut loader = ConfigFileLoader::new(&path);
        assert!(matches!(
            loader.load_config(),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = Config::from_str(r#"{ "width": 64, "height": 32 }"#).unwrap();
        let settings = config.render_settings();

        assert_eq!((settings.width, settings.height), (64, 32));
        assert_eq!(settings.iterations, 5);
        assert_eq!(settings.shaders, ShaderPaths::default());
    }

    #[test]
    fn cached_config_is_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "iterations": 2 }"#).unwrap();

        let mut loader = ConfigFileLoader::new(&path);
        loader.load_config().unwrap();
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(loader.get_or_load_config().unwrap().iterations, 2);
    }
}
