//! # Forge Renderer
//!
//! Deferred renderer built on [`forge_rhi`]. It owns the device, swap chain and
//! every GPU resource the pass pipeline needs, and records one frame of a
//! [`bevy_ecs::world::World`] per [`Renderer::update`].
//!
//! ## Overview
//!
//! - [`Renderer`] - render-thread side: resources, frame recording, world events
//! - [`RendererHandle`] - thread-safe side: queued requests, published state, flush
//! - [`Options`] / [`RendererOption`] / [`OptionValue`] - toggles and scalar settings
//! - [`RenderTarget`] - the render target table the passes read and write
//! - [`ShaderLibrary`] - shader programs, compiled inline or in the background
//! - [`Model`] / [`ModelArena`] - geometry and its binary file format
//! - Components: [`Camera`], [`Light`], [`Renderable`], [`ReflectionProbe`], [`Transform`]
//!
//! ## Example
//!
//! ```ignore
//! use forge_renderer::{Renderer, RendererConfig};
//!
//! let mut renderer = Renderer::new(RendererConfig::headless(1280, 720))?;
//! renderer.on_world_resolved(&world);
//! renderer.update(1.0 / 60.0, &world)?;
//! let frame = renderer.frame_texture();
//! ```

pub mod camera;
pub mod config;
pub mod constant_buffers;
pub mod debug_draw;
pub mod entities;
pub mod error;
pub mod file_stream;
pub mod geometry;
pub mod model;
pub mod options;
pub mod render_targets;
pub mod renderer;
pub mod requests;
pub mod samplers;
pub mod shaders;
pub mod states;
pub mod ui;

pub use camera::{Camera, CameraMatrices, Projection};
pub use config::RendererConfig;
pub use debug_draw::{DebugDraw, LineLists};
pub use entities::{
    EntityCache, GeometryType, Light, LightType, MaterialRef, ObjectType, ReflectionProbe,
    Renderable, Selected, Transform,
};
pub use error::{RendererError, RendererResult};
pub use file_stream::{FileStreamReader, FileStreamWriter};
pub use geometry::{BoundingBox, MeshData};
pub use model::{Model, ModelArena, ModelHandle};
pub use options::{OptionChange, OptionValue, Options, RendererOption, Tonemapping};
pub use render_targets::{RenderTarget, RenderTargets};
pub use renderer::{
    reflection_probe_faces, FrameStatistics, Renderer, RendererHandle, ResourceCounters,
    REFLECTION_PROBE_FACE_MODULUS,
};
pub use requests::{FlushHandshake, Request, RequestQueue};
pub use shaders::{
    DirectorySourceProvider, MemorySourceProvider, ShaderId, ShaderLibrary, ShaderSourceProvider,
};
pub use ui::{UiDrawCommand, UiDrawList};

/// Renderer library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the renderer and RHI versions.
pub fn init() {
    forge_rhi::init();
    log::info!("Forge Renderer v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
