use std::path::PathBuf;

use ultraviolet::Vec3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialMaps {
    pub albedo: Option<PathBuf>,
    pub emission: Option<PathBuf>,
    pub roughness: Option<PathBuf>,
    pub metallic: Option<PathBuf>,
    pub alpha: Option<PathBuf>,
    pub normal: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMaterial {
    pub name: String,
    pub ior: f32,
    /// HDR emission used when there is no emission map.
    pub emission: Vec3,
    pub maps: MaterialMaps,
}

impl LoadedMaterial {
    pub fn missing_material() -> Self {
        Self {
            name: "missing".to_string(),
            ior: 1.0,
            emission: Vec3::zero(),
            maps: MaterialMaps::default(),
        }
    }
}
