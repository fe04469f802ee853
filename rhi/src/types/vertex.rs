//! Vertex layouts.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Mesh vertex: position, texcoord, normal, tangent.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPosTexNorTan {
    pub pos: [f32; 3],
    pub tex: [f32; 2],
    pub nor: [f32; 3],
    pub tan: [f32; 3],
}

impl VertexPosTexNorTan {
    pub fn new(pos: [f32; 3], tex: [f32; 2], nor: [f32; 3], tan: [f32; 3]) -> Self {
        Self { pos, tex, nor, tan }
    }
}

/// Colored line vertex used by debug primitives.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPosCol {
    pub pos: [f32; 3],
    pub col: [f32; 4],
}

impl VertexPosCol {
    pub fn new(pos: [f32; 3], col: [f32; 4]) -> Self {
        Self { pos, col }
    }
}

/// UI vertex: 2D position, texcoord and packed RGBA8 color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPos2dTexCol8 {
    pub pos: [f32; 2],
    pub tex: [f32; 2],
    pub col: u32,
}

const_assert_eq!(std::mem::size_of::<VertexPosTexNorTan>(), 44);
const_assert_eq!(std::mem::size_of::<VertexPosCol>(), 28);
const_assert_eq!(std::mem::size_of::<VertexPos2dTexCol8>(), 20);
