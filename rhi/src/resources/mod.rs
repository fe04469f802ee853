//! RHI resource family.
//!
//! Thin wrappers that own a backend object (keyed by [`ObjectId`](crate::ObjectId))
//! plus the CPU-side metadata the renderer needs: dimensions, formats, flags,
//! tracked image layouts and ring-buffer offsets.

mod buffer;
mod sampler;
mod shader;
mod state;
mod texture;

pub use buffer::{ConstantBuffer, IndexBuffer, StructuredBuffer, VertexBuffer};
pub use sampler::Sampler;
pub use shader::{CompilationState, Shader, ShaderCompiler, ShaderDescriptor};
pub use state::{BlendState, DepthStencilState, RasterizerState};
pub use texture::{Texture, TextureSlice};
