//! # Forge RHI
//!
//! Backend-agnostic render hardware interface used by the Forge renderer.
//!
//! ## Overview
//!
//! - [`Device`] - physical device selection, pipeline cache, descriptor capacity
//! - Resources - [`Texture`], buffers, [`Sampler`], [`Shader`] and state objects
//! - [`PipelineState`] - the hashed description of a render or compute pass
//! - [`DescriptorSetLayout`] - binding tracking with content-hashed set reuse
//! - [`CommandPool`] / [`CommandList`] - double-buffered command recording
//! - [`SwapChain`] - presentation images with tracked layouts
//! - [`RhiBackend`] - strategy trait implemented by [`NullBackend`] and, with the
//!   `wgpu-backend` feature, a headless wgpu backend
//!
//! ## Example
//!
//! ```ignore
//! use forge_rhi::{Device, DeviceDescriptor, PipelineState};
//!
//! let device = Device::new(&DeviceDescriptor::default())?;
//! let mut pool = device.allocate_command_pool("main", swap_chain.id(), 2)?;
//! pool.update()?;
//! let cmd = pool.current_mut();
//! cmd.begin()?;
//! if cmd.begin_render_pass(&state)? {
//!     cmd.draw(3, 0)?;
//!     cmd.end_render_pass();
//! }
//! cmd.end()?;
//! cmd.submit()?;
//! ```

pub mod backend;
pub mod command;
pub mod command_list;
pub mod command_pool;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod pipeline_state;
pub mod resources;
pub mod swap_chain;
pub mod types;

pub use backend::{
    create_backend, BackendType, DeviceLimits, NullBackend, NullObjectKind, PhysicalDevice,
    PhysicalDeviceType, RhiBackend,
};
pub use command::{Command, QueueType, SubmissionId};
pub use command_list::{CommandList, CommandListCounters, CommandListState, TimeBlock};
pub use command_pool::CommandPool;
pub use descriptor::{
    Descriptor, DescriptorBinding, DescriptorSet, DescriptorSetLayout, DescriptorType,
    MipSelection,
};
pub use device::{Device, DeviceDescriptor};
pub use error::{RhiError, RhiResult};
pub use id::ObjectId;
pub use pipeline::Pipeline;
pub use pipeline_state::{PipelineState, SwapChainTarget, MAX_RENDER_TARGETS};
pub use resources::{
    BlendState, CompilationState, ConstantBuffer, DepthStencilState, IndexBuffer,
    RasterizerState, Sampler, Shader, ShaderCompiler, ShaderDescriptor, StructuredBuffer,
    Texture, TextureSlice, VertexBuffer,
};
pub use swap_chain::SwapChain;
pub use types::*;

/// RHI library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the RHI version and the backends compiled in.
pub fn init() {
    log::info!(
        "Forge RHI v{} initialized (gpu backend: {})",
        VERSION,
        if backend::has_gpu_backend() { "wgpu" } else { "none" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_device_is_null() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        assert_eq!(device.backend().backend_type(), BackendType::Null);
    }
}
