//! Common types and descriptors for RHI resources.
//!
//! Formats, usage flags, fixed-function enums and the vertex layouts shared by
//! the renderer and the backends.

mod buffer;
mod common;
mod sampler;
mod state;
mod texture;
mod vertex;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use common::{Color, Extent, LoadOp, Rect, ShaderStage, Viewport};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use state::{
    BlendFactor, BlendOperation, CullMode, PolygonMode, PrimitiveTopology, StencilOperation,
};
pub use texture::{ImageLayout, TextureDescriptor, TextureFlags, TextureFormat, MAX_MIP_LEVELS};
pub use vertex::{VertexPos2dTexCol8, VertexPosCol, VertexPosTexNorTan};
