//! Shared fixtures for RHI integration tests.

use std::sync::Arc;

use forge_rhi::{
    BlendState, CompareFunction, CullMode, DepthStencilState, DescriptorBinding, DescriptorType,
    Device, DeviceDescriptor, NullBackend, PipelineState, PolygonMode, PrimitiveTopology,
    RasterizerState, Shader, ShaderDescriptor, ShaderStage, Texture, TextureDescriptor,
    TextureFlags, TextureFormat,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A device over a null backend the test keeps a handle to.
pub struct TestContext {
    pub backend: Arc<NullBackend>,
    pub device: Arc<Device>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_descriptor(DeviceDescriptor {
            debug_labels: false,
            ..Default::default()
        })
    }

    pub fn with_descriptor(descriptor: DeviceDescriptor) -> Self {
        init_logging();
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(backend.clone(), &descriptor).expect("null device");
        Self { backend, device }
    }

    pub fn shader(&self, name: &str, stage: ShaderStage, bindings: Vec<DescriptorBinding>) -> Arc<Shader> {
        let shader = Shader::new(
            &self.device,
            ShaderDescriptor::new(name, stage, format!("// {name}")).with_bindings(bindings),
        );
        shader.compile().expect("shader compiles");
        shader
    }

    pub fn render_target(&self, name: &str, format: TextureFormat) -> Arc<Texture> {
        let flags = if format.is_depth() {
            TextureFlags::DEPTH_STENCIL | TextureFlags::SRV
        } else {
            TextureFlags::RENDER_TARGET | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT
        };
        Texture::new(
            &self.device,
            TextureDescriptor::new_2d(64, 64, format, flags).with_label(name),
        )
        .expect("render target")
    }

    /// A complete graphics state rendering into `target`, with one constant
    /// buffer and one texture slot on the pixel shader.
    pub fn graphics_state(&self, name: &'static str, target: Arc<Texture>) -> PipelineState {
        let bindings = vec![
            DescriptorBinding::new("frame", DescriptorType::ConstantBuffer, 0, ShaderStage::PIXEL),
            DescriptorBinding::new("albedo", DescriptorType::Texture, 1, ShaderStage::PIXEL),
        ];
        let mut state = PipelineState::new(name);
        state.shader_vertex = Some(self.shader("quad_vs", ShaderStage::VERTEX, Vec::new()));
        state.shader_pixel = Some(self.shader("quad_ps", ShaderStage::PIXEL, bindings));
        state.rasterizer_state = Some(RasterizerState::new(CullMode::Back, PolygonMode::Solid, true));
        state.blend_state = Some(BlendState::disabled());
        state.depth_stencil_state = Some(DepthStencilState::new(false, false, CompareFunction::Always));
        state.primitive_topology = Some(PrimitiveTopology::TriangleList);
        state.render_target_color_textures[0] = Some(target);
        state
    }
}
