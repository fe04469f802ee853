//! UI draw lists composited over the final frame.
//!
//! The editor tessellates its widgets into a [`UiDrawList`] and hands it to
//! the renderer, which draws it straight into the swap chain after the scene.

use std::sync::Arc;

use forge_rhi::{Rect, Texture, VertexPos2dTexCol8};

/// One textured, clipped range of a [`UiDrawList`].
#[derive(Debug, Clone)]
pub struct UiDrawCommand {
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub clip: Rect,
    /// `None` samples the frame output.
    pub texture: Option<Arc<Texture>>,
}

#[derive(Debug, Clone, Default)]
pub struct UiDrawList {
    pub vertices: Vec<VertexPos2dTexCol8>,
    pub indices: Vec<u32>,
    pub commands: Vec<UiDrawCommand>,
    /// Logical screen size the vertices are expressed in.
    pub screen_size: [f32; 2],
}

impl UiDrawList {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            screen_size: [width, height],
            ..Default::default()
        }
    }

    /// Append a mesh; its indices are relative to its own vertices.
    pub fn push_mesh(
        &mut self,
        vertices: &[VertexPos2dTexCol8],
        indices: &[u32],
        clip: Rect,
        texture: Option<Arc<Texture>>,
    ) {
        if indices.is_empty() {
            return;
        }
        self.commands.push(UiDrawCommand {
            index_offset: self.indices.len() as u32,
            index_count: indices.len() as u32,
            vertex_offset: self.vertices.len() as u32,
            clip,
            texture,
        });
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex() -> VertexPos2dTexCol8 {
        VertexPos2dTexCol8 {
            pos: [0.0, 0.0],
            tex: [0.0, 0.0],
            col: 0xffff_ffff,
        }
    }

    #[test]
    fn test_push_mesh_offsets() {
        let mut list = UiDrawList::new(800.0, 600.0);
        let clip = Rect::new(0, 0, 800, 600);
        list.push_mesh(&[vertex(); 4], &[0, 1, 2, 0, 2, 3], clip, None);
        list.push_mesh(&[vertex(); 3], &[0, 1, 2], clip, None);

        assert_eq!(list.commands.len(), 2);
        assert_eq!(list.commands[1].index_offset, 6);
        assert_eq!(list.commands[1].vertex_offset, 4);
        assert_eq!(list.indices.len(), 9);
    }

    #[test]
    fn test_empty_mesh_ignored() {
        let mut list = UiDrawList::new(1.0, 1.0);
        list.push_mesh(&[], &[], Rect::new(0, 0, 1, 1), None);
        assert!(list.is_empty());
    }
}
