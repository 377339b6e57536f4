use std::path::{Path, PathBuf};

use log::{debug, warn};
use ultraviolet::Vec3;

use super::{LoadedMaterial, LoadedMesh, MaterialMaps};
use crate::error::{Result, TracerError};

/// Meshes and materials of one model file. Mesh material indices refer to `materials`.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub meshes: Vec<LoadedMesh>,
    pub materials: Vec<LoadedMaterial>,
}

/// Reads a Wavefront OBJ file together with its MTL library.
/// Texture paths are resolved relative to the directory of the model.
pub fn load_model(path: &Path) -> Result<LoadedModel> {
    let load_options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };

    let (models, materials) =
        tobj::load_obj(path, &load_options).map_err(|error| TracerError::asset(path, error))?;
    let materials = materials.map_err(|error| TracerError::asset(path, error))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut materials: Vec<LoadedMaterial> = materials
        .iter()
        .map(|material| convert_material(material, base))
        .collect();

    let mut missing_material = None;
    let mut meshes = vec![];
    for model in models {
        let mesh = model.mesh;
        if mesh.indices.is_empty() {
            warn!("skipping mesh {} of {}: no triangles", model.name, path.display());
            continue;
        }

        let material_index = match mesh.material_id {
            Some(index) => index,
            None => *missing_material.get_or_insert_with(|| {
                materials.push(LoadedMaterial::missing_material());
                materials.len() - 1
            }),
        };

        meshes.push(LoadedMesh {
            name: model.name,
            positions: mesh.positions,
            normals: mesh.normals,
            tex_coords: mesh.texcoords,
            indices: mesh.indices,
            material_index,
        });
    }

    debug!(
        "{}: {} meshes, {} materials",
        path.display(),
        meshes.len(),
        materials.len()
    );

    Ok(LoadedModel {
        path: path.to_path_buf(),
        meshes,
        materials,
    })
}

fn convert_material(material: &tobj::Material, base: &Path) -> LoadedMaterial {
    let param = |key: &str| material.unknown_param.get(key);
    let texture = |value: Option<&String>| value.and_then(|value| texture_path(base, value));

    LoadedMaterial {
        name: material.name.clone(),
        ior: material.optical_density.unwrap_or(1.0),
        emission: param("Ke")
            .and_then(|value| parse_color(value))
            .unwrap_or(Vec3::zero()),
        maps: MaterialMaps {
            albedo: texture(material.diffuse_texture.as_ref()),
            emission: texture(param("map_Ke")),
            roughness: texture(param("map_Pr")),
            metallic: texture(param("map_Pm")),
            alpha: texture(material.dissolve_texture.as_ref()),
            normal: texture(material.normal_texture.as_ref().or(param("norm"))),
        },
    }
}

/// The file name is the last token of a map statement, options like `-bm 0.5` come before it.
fn texture_path(base: &Path, value: &str) -> Option<PathBuf> {
    value
        .split_whitespace()
        .last()
        .map(|file_name| base.join(file_name))
}

/// Parses `r g b`, or a single value used for all three channels.
fn parse_color(value: &str) -> Option<Vec3> {
    let components = value
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;

    match components[..] {
        [value] => Some(Vec3::broadcast(value)),
        [r, g, b, ..] => Some(Vec3::new(r, g, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn colors_parse_from_one_or_three_values() {
        assert_eq!(parse_color("1 2 3"), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(parse_color("4"), Some(Vec3::broadcast(4.0)));
        assert_eq!(parse_color(""), None);
        assert_eq!(parse_color("a b c"), None);
    }

    #[test]
    fn texture_options_are_skipped() {
        let base = Path::new("models");
        assert_eq!(
            texture_path(base, "-bm 0.5 brick_normal.png"),
            Some(PathBuf::from("models/brick_normal.png"))
        );
        assert_eq!(texture_path(base, "   "), None);
    }

    #[test]
    fn missing_model_is_an_asset_error() {
        let path = Path::new("does/not/exist.obj");
        match load_model(path) {
            Err(TracerError::Asset { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn obj_meshes_and_materials_are_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("quad.mtl"),
            "newmtl glass\nNi 1.5\nmap_Kd albedo.png\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("quad.obj"),
            "mtllib quad.mtl\n\
             o loose\n\
             v 2 2 2\nv 3 2 2\nv 3 3 2\n\
             f 1 2 3\n\
             o quad\n\
             v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vn 0 0 1\n\
             usemtl glass\n\
             f 4//1 5//1 6//1 7//1\n",
        )
        .unwrap();

        let model = load_model(&dir.path().join("quad.obj")).unwrap();

        assert_eq!(model.meshes.len(), 2);
        let quad = &model.meshes[1];
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.vertex_count() * 3, quad.normals.len());
        assert_eq!(quad.material_index, 0);

        // the first object has no material and gets the appended default
        assert_eq!(model.materials.len(), 2);
        assert_eq!(model.meshes[0].material_index, 1);
        assert_eq!(model.materials[1], LoadedMaterial::missing_material());

        let glass = &model.materials[0];
        assert_eq!(glass.ior, 1.5);
        assert_eq!(glass.maps.albedo, Some(dir.path().join("albedo.png")));
        assert_eq!(glass.maps.emission, None);
    }
}
