//! Pipeline state: the value a render pass is described by.
//!
//! A [`PipelineState`] aggregates shaders, fixed-function state objects and
//! render target bindings. Its hash covers every knob that forces a distinct
//! native pipeline object and is used to deduplicate them in the device cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::id::ObjectId;
use crate::resources::{BlendState, DepthStencilState, RasterizerState, Shader, Texture};
use crate::swap_chain::SwapChain;
use crate::types::{Color, Extent, LoadOp, PrimitiveTopology, Rect, Viewport};

/// Maximum simultaneous color render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub name: &'static str,

    pub shader_vertex: Option<Arc<Shader>>,
    pub shader_pixel: Option<Arc<Shader>>,
    pub shader_compute: Option<Arc<Shader>>,

    pub rasterizer_state: Option<Arc<RasterizerState>>,
    pub blend_state: Option<Arc<BlendState>>,
    pub depth_stencil_state: Option<Arc<DepthStencilState>>,
    pub primitive_topology: Option<PrimitiveTopology>,

    pub render_target_color_textures: [Option<Arc<Texture>>; MAX_RENDER_TARGETS],
    pub render_target_color_array_index: u32,
    pub render_target_depth_texture: Option<Arc<Texture>>,
    pub render_target_depth_array_index: u32,
    /// Render straight into the swap chain instead of textures.
    pub render_target_swapchain: Option<SwapChainTarget>,

    pub clear_color: [LoadOp<Color>; MAX_RENDER_TARGETS],
    pub clear_depth: LoadOp<f32>,
    pub clear_stencil: LoadOp<u32>,

    pub viewport: Viewport,
    pub scissor: Option<Rect>,
    pub dynamic_scissor: bool,
    pub vertex_buffer_stride: u32,
}

/// Swap chain identity as bound to a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapChainTarget {
    pub id: ObjectId,
    pub extent: Extent,
}

impl SwapChainTarget {
    pub fn of(swap_chain: &SwapChain) -> Self {
        Self {
            id: swap_chain.id(),
            extent: swap_chain.extent(),
        }
    }
}

impl PipelineState {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub fn is_compute(&self) -> bool {
        self.shader_compute.is_some()
    }

    pub fn has_render_targets(&self) -> bool {
        self.render_target_color_textures.iter().any(Option::is_some)
            || self.render_target_depth_texture.is_some()
    }

    /// Check the state describes either a complete graphics or a pure compute pipeline.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.shader_compute.is_some() {
            if self.shader_vertex.is_some() || self.shader_pixel.is_some() {
                return Err("compute pipeline also has graphics shaders");
            }
            return Ok(());
        }

        if self.shader_vertex.is_none() {
            return Err("graphics pipeline has no vertex shader");
        }
        if self.rasterizer_state.is_none() {
            return Err("graphics pipeline has no rasterizer state");
        }
        if self.blend_state.is_none() {
            return Err("graphics pipeline has no blend state");
        }
        if self.depth_stencil_state.is_none() {
            return Err("graphics pipeline has no depth-stencil state");
        }
        if self.primitive_topology.is_none() {
            return Err("graphics pipeline has no primitive topology");
        }
        match (self.has_render_targets(), self.render_target_swapchain.is_some()) {
            (true, true) => Err("graphics pipeline targets both textures and the swap chain"),
            (false, false) => Err("graphics pipeline has no render target"),
            _ => Ok(()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// True when every shader the state references has finished compiling.
    pub fn shaders_compiled(&self) -> bool {
        [&self.shader_vertex, &self.shader_pixel, &self.shader_compute]
            .into_iter()
            .flatten()
            .all(|shader| shader.is_compiled())
    }

    /// Hash of everything that requires a distinct native pipeline.
    ///
    /// Clear values are excluded, only the load-op class of each attachment
    /// counts. The viewport is dynamic state and is excluded as well.
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.primitive_topology.hash(&mut hasher);
        self.dynamic_scissor.hash(&mut hasher);
        self.vertex_buffer_stride.hash(&mut hasher);

        for clear in &self.clear_color {
            clear.class().hash(&mut hasher);
        }
        self.clear_depth.class().hash(&mut hasher);
        self.clear_stencil.class().hash(&mut hasher);

        for shader in [&self.shader_vertex, &self.shader_pixel, &self.shader_compute] {
            shader.as_ref().map(|s| s.id()).hash(&mut hasher);
        }
        self.rasterizer_state.as_ref().map(|s| s.id()).hash(&mut hasher);
        self.blend_state.as_ref().map(|s| s.id()).hash(&mut hasher);
        self.depth_stencil_state.as_ref().map(|s| s.id()).hash(&mut hasher);

        for texture in &self.render_target_color_textures {
            texture.as_ref().map(|t| t.id()).hash(&mut hasher);
        }
        self.render_target_color_array_index.hash(&mut hasher);
        self.render_target_depth_texture.as_ref().map(|t| t.id()).hash(&mut hasher);
        self.render_target_depth_array_index.hash(&mut hasher);
        self.render_target_swapchain.map(|s| s.id).hash(&mut hasher);

        hasher.finish()
    }

    /// Size of the first bound render target, used as the default viewport.
    pub fn render_target_extent(&self) -> Option<Extent> {
        if let Some(swap_chain) = &self.render_target_swapchain {
            return Some(swap_chain.extent);
        }
        self.render_target_color_textures
            .iter()
            .flatten()
            .chain(self.render_target_depth_texture.iter())
            .next()
            .map(|t| t.extent())
    }
}
