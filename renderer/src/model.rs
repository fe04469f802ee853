//! Geometry models, their binary file format and the arena that owns them.
//!
//! File layout (little-endian):
//!
//! | field    | type                         |
//! |----------|------------------------------|
//! | magic    | `b"FMDL"`                    |
//! | version  | `u32`                        |
//! | path     | length-prefixed UTF-8        |
//! | scale    | `f32`                        |
//! | indices  | length-prefixed `u32`        |
//! | vertices | length-prefixed vertex array |

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use forge_rhi::{Device, IndexBuffer, VertexBuffer, VertexPosTexNorTan};

use crate::error::{RendererError, RendererResult};
use crate::file_stream::{FileStreamReader, FileStreamWriter};
use crate::geometry::{BoundingBox, MeshData};

pub const MODEL_MAGIC: [u8; 4] = *b"FMDL";
pub const MODEL_VERSION: u32 = 1;

pub struct Model {
    path: String,
    normalized_scale: f32,
    indices: Vec<u32>,
    vertices: Vec<VertexPosTexNorTan>,
    bounds: BoundingBox,
    vertex_buffer: Option<Arc<VertexBuffer>>,
    index_buffer: Option<Arc<IndexBuffer>>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("path", &self.path)
            .field("indices", &self.indices.len())
            .field("vertices", &self.vertices.len())
            .field("uploaded", &self.is_uploaded())
            .finish()
    }
}

impl Model {
    pub fn new(
        path: impl Into<String>,
        indices: Vec<u32>,
        vertices: Vec<VertexPosTexNorTan>,
    ) -> Self {
        let bounds = BoundingBox::from_vertices(&vertices);
        let normalized_scale = normalized_scale(&bounds);
        Self {
            path: path.into(),
            normalized_scale,
            indices,
            vertices,
            bounds,
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    pub fn from_mesh(path: impl Into<String>, mesh: MeshData) -> Self {
        Self::new(path, mesh.indices, mesh.vertices)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Scale that fits the model into a unit cube.
    pub fn normalized_scale(&self) -> f32 {
        self.normalized_scale
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertices(&self) -> &[VertexPosTexNorTan] {
        &self.vertices
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Append geometry, returning the index and vertex offsets it landed at.
    pub fn append(&mut self, indices: &[u32], vertices: &[VertexPosTexNorTan]) -> (u32, u32) {
        let offsets = (self.indices.len() as u32, self.vertices.len() as u32);
        self.indices.extend_from_slice(indices);
        self.vertices.extend_from_slice(vertices);
        self.bounds = self.bounds.merge(BoundingBox::from_vertices(vertices));
        self.normalized_scale = normalized_scale(&self.bounds);
        self.vertex_buffer = None;
        self.index_buffer = None;
        offsets
    }

    /// Create GPU buffers for the current geometry.
    pub fn upload(&mut self, device: &Arc<Device>) -> RendererResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(RendererError::ModelFormat(format!(
                "model '{}' has no geometry",
                self.path
            )));
        }
        let vertex_buffer = VertexBuffer::new(device, &self.vertices, &self.path)?;
        let index_buffer = IndexBuffer::new(device, &self.indices, &self.path)?;
        self.vertex_buffer = Some(Arc::new(vertex_buffer));
        self.index_buffer = Some(Arc::new(index_buffer));
        Ok(())
    }

    pub fn is_uploaded(&self) -> bool {
        self.vertex_buffer.is_some() && self.index_buffer.is_some()
    }

    pub fn vertex_buffer(&self) -> Option<&Arc<VertexBuffer>> {
        self.vertex_buffer.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&Arc<IndexBuffer>> {
        self.index_buffer.as_ref()
    }

    pub fn save_to(&self, writer: impl Write) -> RendererResult<()> {
        let mut stream = FileStreamWriter::new(writer);
        stream.write_bytes(&MODEL_MAGIC)?;
        stream.write(&MODEL_VERSION.to_le())?;
        stream.write_str(&self.path)?;
        stream.write(&self.normalized_scale)?;
        stream.write_vec(&self.indices)?;
        stream.write_vec(&self.vertices)?;
        stream.flush()
    }

    pub fn load_from(reader: impl Read) -> RendererResult<Self> {
        let mut stream = FileStreamReader::new(reader);
        let magic = stream.read_bytes(MODEL_MAGIC.len())?;
        if magic != MODEL_MAGIC {
            return Err(RendererError::ModelFormat(format!(
                "bad magic {magic:?}, expected {MODEL_MAGIC:?}"
            )));
        }
        let version = u32::from_le(stream.read::<u32>()?);
        if version != MODEL_VERSION {
            return Err(RendererError::ModelFormat(format!(
                "unsupported version {version}, expected {MODEL_VERSION}"
            )));
        }

        let path = stream.read_string()?;
        let normalized_scale = stream.read::<f32>()?;
        let indices = stream.read_vec::<u32>()?;
        let vertices = stream.read_vec::<VertexPosTexNorTan>()?;
        if let Some(index) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(RendererError::ModelFormat(format!(
                "index {index} out of range for {} vertices",
                vertices.len()
            )));
        }

        let mut model = Self::new(path, indices, vertices);
        model.normalized_scale = normalized_scale;
        Ok(model)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> RendererResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.save_to(std::io::BufWriter::new(file))?;
        log::debug!("Saved model '{}' to {}", self.path, path.as_ref().display());
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> RendererResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::load_from(std::io::BufReader::new(file)).inspect_err(|e| {
            log::error!("Failed to load model {}: {}", path.as_ref().display(), e);
        })
    }
}

fn normalized_scale(bounds: &BoundingBox) -> f32 {
    if !bounds.is_defined() {
        return 1.0;
    }
    let largest = bounds.extents().max_element() * 2.0;
    if largest > f32::EPSILON {
        1.0 / largest
    } else {
        1.0
    }
}

/// Generation-checked reference to a model in a [`ModelArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle {
    index: u32,
    generation: u32,
}

impl ModelHandle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

struct Slot {
    generation: u32,
    model: Option<Model>,
}

/// Owns every loaded model. Removing a model bumps its slot's generation so
/// stale handles resolve to `None`.
#[derive(Default)]
pub struct ModelArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ModelArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Model) -> ModelHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.model = Some(model);
            return ModelHandle {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            model: Some(model),
        });
        ModelHandle {
            index: self.slots.len() as u32 - 1,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ModelHandle) -> Option<&Model> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.model.as_ref())
    }

    pub fn get_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.model.as_mut())
    }

    pub fn remove(&mut self, handle: ModelHandle) -> Option<Model> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let model = slot.model.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(model)
    }

    pub fn find_by_path(&self, path: &str) -> Option<ModelHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.model
                .as_ref()
                .filter(|model| model.path() == path)
                .map(|_| ModelHandle {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.model.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.model.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use std::io::Cursor;

    #[test]
    fn test_model_round_trip() {
        let model = Model::from_mesh("meshes/cube.fmdl", geometry::cube());
        let mut bytes = Vec::new();
        model.save_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"FMDL");

        let loaded = Model::load_from(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.path(), "meshes/cube.fmdl");
        assert_eq!(loaded.indices(), model.indices());
        assert_eq!(loaded.vertices(), model.vertices());
        assert_eq!(loaded.normalized_scale(), 1.0);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let model = Model::from_mesh("quad", geometry::quad());
        let mut bytes = Vec::new();
        model.save_to(&mut bytes).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Model::load_from(Cursor::new(bytes)),
            Err(RendererError::ModelFormat(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let model = Model::from_mesh("quad", geometry::quad());
        let mut bytes = Vec::new();
        model.save_to(&mut bytes).unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        let err = Model::load_from(Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("unsupported version 2"));
    }

    #[test]
    fn test_arena_generations() {
        let mut arena = ModelArena::new();
        let first = arena.insert(Model::from_mesh("a", geometry::quad()));
        assert!(arena.get(first).is_some());

        arena.remove(first).unwrap();
        assert!(arena.get(first).is_none());

        let second = arena.insert(Model::from_mesh("b", geometry::quad()));
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second).map(Model::path), Some("b"));
        assert_eq!(arena.find_by_path("b"), Some(second));
    }

    #[test]
    fn test_append_offsets() {
        let mut model = Model::from_mesh("combined", geometry::quad());
        let cube = geometry::cube();
        let (index_offset, vertex_offset) = model.append(&cube.indices, &cube.vertices);
        assert_eq!((index_offset, vertex_offset), (6, 4));
        assert_eq!(model.indices().len(), 42);
    }
}
