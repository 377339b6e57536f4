/// Triangle mesh as read from a model file. All attribute arrays are flat and indexed
/// by the same vertex index.
#[derive(Debug, Clone, Default)]
pub struct LoadedMesh {
    pub name: String,
    pub positions: Vec<f32>,
    /// Empty when the file has no normals.
    pub normals: Vec<f32>,
    /// Empty when the file has no texture coordinates.
    pub tex_coords: Vec<f32>,
    pub indices: Vec<u32>,
    /// Index into the materials of the same model.
    pub material_index: usize,
}

impl LoadedMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}
