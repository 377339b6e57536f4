use std::path::PathBuf;

use log::debug;

use super::{MeshProperties, RecordParameter, VERTEX_FORMAT, VERTEX_STRIDE};
use crate::error::{Result, TracerError};
use crate::loader::{self, LoadedMaterial, LoadedMesh, LoadedModel};
use crate::observer::{notify_model_loaded, LoadObserver};

pub struct SceneMesh {
    pub mesh: LoadedMesh,
    pub properties: MeshProperties,
}

/// All meshes of all models in load order, with their identifiers assigned,
/// and one flat array of every model's materials.
pub struct SceneData {
    pub meshes: Vec<SceneMesh>,
    pub materials: Vec<LoadedMaterial>,
}

impl SceneData {
    /// Loads every model file, reporting each one that loaded successfully.
    pub fn load(model_paths: &[PathBuf], observer: &dyn LoadObserver) -> Result<Self> {
        let models = model_paths
            .iter()
            .map(|path| {
                let model = loader::load_model(path)?;
                notify_model_loaded(observer, path);
                Ok(model)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::assemble(models)
    }

    /// Numbers the meshes sequentially and moves every material index
    /// behind the materials of the models before it.
    pub fn assemble(models: Vec<LoadedModel>) -> Result<Self> {
        let mut meshes: Vec<SceneMesh> = vec![];
        let mut materials: Vec<LoadedMaterial> = vec![];

        for model in models {
            let material_offset = materials.len();
            let material_count = model.materials.len();

            for mesh in model.meshes {
                if mesh.material_index >= material_count {
                    return Err(TracerError::asset(
                        &model.path,
                        format!(
                            "mesh {} uses material {} but only {} exist",
                            mesh.name, mesh.material_index, material_count
                        ),
                    ));
                }

                let properties = MeshProperties {
                    vertex_count: count_u32(mesh.vertex_count(), "vertex count")?,
                    vertex_format: VERTEX_FORMAT,
                    vertex_stride: VERTEX_STRIDE,
                    index_count: count_u32(mesh.index_count(), "index count")?,
                    geometry_id: count_u32(meshes.len(), "geometry id")?,
                    material_id: count_u32(material_offset + mesh.material_index, "material id")?,
                };
                meshes.push(SceneMesh { mesh, properties });
            }

            materials.extend(model.materials);
        }

        debug!(
            "scene has {} meshes and {} materials",
            meshes.len(),
            materials.len()
        );
        Ok(Self { meshes, materials })
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Hit group record parameters, one per mesh in geometry id order.
    pub fn record_parameters(&self) -> Vec<RecordParameter> {
        self.meshes
            .iter()
            .map(|mesh| mesh.properties.record_parameter())
            .collect()
    }
}

fn count_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| TracerError::Configuration(format!("{what} {value} does not fit into 32 bits")))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::observer::tests::RecordingObserver;

    fn mesh(material_index: usize) -> LoadedMesh {
        LoadedMesh {
            positions: vec![0.0; 9],
            indices: vec![0, 1, 2],
            material_index,
            ..Default::default()
        }
    }

    fn model(path: &str, material_indices: &[usize], material_count: usize) -> LoadedModel {
        LoadedModel {
            path: path.into(),
            meshes: material_indices.iter().map(|index| mesh(*index)).collect(),
            materials: vec![LoadedMaterial::missing_material(); material_count],
        }
    }

    #[test]
    fn geometry_ids_are_contiguous_across_models() {
        let scene = SceneData::assemble(vec![
            model("a.obj", &[0, 1], 2),
            model("b.obj", &[0], 1),
            model("c.obj", &[0, 0, 0], 1),
        ])
        .unwrap();

        let ids: Vec<u32> = scene
            .meshes
            .iter()
            .map(|mesh| mesh.properties.geometry_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn material_ids_are_offset_by_previous_models() {
        let scene = SceneData::assemble(vec![
            model("a.obj", &[1, 0], 2),
            model("b.obj", &[2, 0], 3),
            model("c.obj", &[0, 0], 1),
        ])
        .unwrap();

        let ids: Vec<u32> = scene
            .meshes
            .iter()
            .map(|mesh| mesh.properties.material_id)
            .collect();
        assert_eq!(ids, vec![1, 0, 4, 2, 5, 5]);
        assert_eq!(scene.material_count(), 6);
    }

    #[test]
    fn record_parameters_follow_mesh_order() {
        let scene = SceneData::assemble(vec![model("a.obj", &[0, 1], 2)]).unwrap();

        assert_eq!(
            scene.record_parameters(),
            vec![
                RecordParameter {
                    geometry_id: 0,
                    material_id: 0
                },
                RecordParameter {
                    geometry_id: 1,
                    material_id: 1
                },
            ]
        );
    }

    #[test]
    fn mesh_properties_describe_the_vertex_layout() {
        let scene = SceneData::assemble(vec![model("a.obj", &[0], 1)]).unwrap();
        let properties = scene.meshes[0].properties;

        assert_eq!(properties.vertex_count, 3);
        assert_eq!(properties.index_count, 3);
        assert_eq!(properties.vertex_stride, 12);
        assert_eq!(properties.vertex_format, VERTEX_FORMAT);
    }

    #[test]
    fn out_of_range_material_is_an_asset_error() {
        match SceneData::assemble(vec![model("a.obj", &[0], 1), model("b.obj", &[1], 1)]) {
            Err(TracerError::Asset { path, .. }) => assert_eq!(path, Path::new("b.obj")),
            other => panic!("unexpected result {:?}", other.err()),
        }
    }

    #[test]
    fn loaded_models_are_reported_once_each() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        };
        write("a.mtl", "newmtl red\nKe 1 0 0\n");
        write("b.mtl", "newmtl blue\nNi 1.3\n");
        let a = write(
            "a.obj",
            "mtllib a.mtl\n\
             usemtl red\n\
             o first\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f 1 2 3\n\
             o second\n\
             v 0 0 1\nv 1 0 1\nv 0 1 1\n\
             f 4 5 6\n",
        );
        let b = write(
            "b.obj",
            "mtllib b.mtl\n\
             usemtl blue\n\
             o third\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f 1 2 3\n",
        );
        let observer = RecordingObserver::default();

        let scene = SceneData::load(&[a.clone(), b.clone()], &observer).unwrap();

        assert_eq!(*observer.models.borrow(), vec![a, b]);
        let geometry_ids: Vec<u32> = scene
            .meshes
            .iter()
            .map(|mesh| mesh.properties.geometry_id)
            .collect();
        assert_eq!(geometry_ids, vec![0, 1, 2]);
        let material_ids: Vec<u32> = scene
            .meshes
            .iter()
            .map(|mesh| mesh.properties.material_id)
            .collect();
        assert_eq!(material_ids, vec![0, 0, 1]);
    }

    #[test]
    fn failed_model_is_not_reported() {
        let observer = RecordingObserver::default();
        let result = SceneData::load(&[PathBuf::from("missing/model.obj")], &observer);

        assert!(matches!(result, Err(TracerError::Asset { .. })));
        assert!(observer.models.borrow().is_empty());
    }
}
