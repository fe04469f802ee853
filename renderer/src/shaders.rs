//! Shader programs used by the pass pipeline.
//!
//! Every program is identified by a [`ShaderId`]. Sources come from a
//! [`ShaderSourceProvider`]; compilation runs either inline or on the RHI's
//! background [`ShaderCompiler`], and passes poll [`ShaderLibrary::is_compiled`]
//! to decide whether they can run this frame.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use forge_rhi::{
    Device, DescriptorBinding, DescriptorType, Shader, ShaderCompiler, ShaderDescriptor,
    ShaderStage,
};

use crate::constant_buffers::slot as cb_slot;
use crate::error::{RendererError, RendererResult};
use crate::samplers::slot as sampler_slot;

/// Texture, storage and structured buffer slots shared by every program.
pub mod slot {
    pub const TEX_ALBEDO: u32 = 11;
    pub const TEX_NORMAL: u32 = 12;
    pub const TEX_MATERIAL: u32 = 13;
    pub const TEX_VELOCITY: u32 = 14;
    pub const TEX_DEPTH: u32 = 15;
    pub const TEX_SSAO: u32 = 16;
    pub const TEX_SSR: u32 = 17;
    pub const TEX_LIGHT_DIFFUSE: u32 = 18;
    pub const TEX_LIGHT_SPECULAR: u32 = 19;
    pub const TEX_LIGHT_VOLUMETRIC: u32 = 20;
    pub const TEX_FRAME: u32 = 21;
    pub const TEX_FRAME_BLURRED: u32 = 22;
    pub const TEX_ENVIRONMENT: u32 = 23;
    pub const TEX_LUT: u32 = 24;
    pub const TEX_SHADOW: u32 = 25;
    pub const TEX: u32 = 26;
    pub const TEX2: u32 = 27;
    pub const LAST_TEXTURE: u32 = 27;

    pub const STORAGE_OUT: u32 = 30;
    pub const STORAGE_OUT2: u32 = 31;

    pub const STRUCTURED: u32 = 40;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    // Geometry
    DepthPrepassV,
    DepthPrepassP,
    DepthLightV,
    DepthLightP,
    GbufferV,
    GbufferP,
    ReflectionProbeV,
    ReflectionProbeP,
    // Lighting
    LightC,
    LightCompositionC,
    LightImageBasedP,
    BrdfSpecularLutC,
    // Screen space
    SsaoC,
    SsrC,
    BlurGaussianC,
    BlurGaussianBilateralC,
    // Post processing
    DepthOfFieldC,
    TaaC,
    FsrUpsampleC,
    MotionBlurC,
    BloomLuminanceC,
    BloomUpsampleBlendMipC,
    BloomBlendFrameC,
    CasC,
    ToneMappingGammaC,
    DebandingC,
    FxaaC,
    ChromaticAberrationC,
    FilmGrainC,
    AmdSpdC,
    CopyC,
    // Overlays
    QuadV,
    TextureP,
    LinesV,
    LinesP,
    OutlineV,
    OutlineP,
    FontV,
    FontP,
    UiV,
    UiP,
}

impl ShaderId {
    pub const ALL: [Self; 41] = [
        Self::DepthPrepassV,
        Self::DepthPrepassP,
        Self::DepthLightV,
        Self::DepthLightP,
        Self::GbufferV,
        Self::GbufferP,
        Self::ReflectionProbeV,
        Self::ReflectionProbeP,
        Self::LightC,
        Self::LightCompositionC,
        Self::LightImageBasedP,
        Self::BrdfSpecularLutC,
        Self::SsaoC,
        Self::SsrC,
        Self::BlurGaussianC,
        Self::BlurGaussianBilateralC,
        Self::DepthOfFieldC,
        Self::TaaC,
        Self::FsrUpsampleC,
        Self::MotionBlurC,
        Self::BloomLuminanceC,
        Self::BloomUpsampleBlendMipC,
        Self::BloomBlendFrameC,
        Self::CasC,
        Self::ToneMappingGammaC,
        Self::DebandingC,
        Self::FxaaC,
        Self::ChromaticAberrationC,
        Self::FilmGrainC,
        Self::AmdSpdC,
        Self::CopyC,
        Self::QuadV,
        Self::TextureP,
        Self::LinesV,
        Self::LinesP,
        Self::OutlineV,
        Self::OutlineP,
        Self::FontV,
        Self::FontP,
        Self::UiV,
        Self::UiP,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DepthPrepassV => "depth_prepass_v",
            Self::DepthPrepassP => "depth_prepass_p",
            Self::DepthLightV => "depth_light_v",
            Self::DepthLightP => "depth_light_p",
            Self::GbufferV => "gbuffer_v",
            Self::GbufferP => "gbuffer_p",
            Self::ReflectionProbeV => "reflection_probe_v",
            Self::ReflectionProbeP => "reflection_probe_p",
            Self::LightC => "light_c",
            Self::LightCompositionC => "light_composition_c",
            Self::LightImageBasedP => "light_image_based_p",
            Self::BrdfSpecularLutC => "brdf_specular_lut_c",
            Self::SsaoC => "ssao_c",
            Self::SsrC => "ssr_c",
            Self::BlurGaussianC => "blur_gaussian_c",
            Self::BlurGaussianBilateralC => "blur_gaussian_bilateral_c",
            Self::DepthOfFieldC => "depth_of_field_c",
            Self::TaaC => "taa_c",
            Self::FsrUpsampleC => "fsr_upsample_c",
            Self::MotionBlurC => "motion_blur_c",
            Self::BloomLuminanceC => "bloom_luminance_c",
            Self::BloomUpsampleBlendMipC => "bloom_upsample_blend_mip_c",
            Self::BloomBlendFrameC => "bloom_blend_frame_c",
            Self::CasC => "cas_c",
            Self::ToneMappingGammaC => "tone_mapping_gamma_c",
            Self::DebandingC => "debanding_c",
            Self::FxaaC => "fxaa_c",
            Self::ChromaticAberrationC => "chromatic_aberration_c",
            Self::FilmGrainC => "film_grain_c",
            Self::AmdSpdC => "amd_spd_c",
            Self::CopyC => "copy_c",
            Self::QuadV => "quad_v",
            Self::TextureP => "texture_p",
            Self::LinesV => "lines_v",
            Self::LinesP => "lines_p",
            Self::OutlineV => "outline_v",
            Self::OutlineP => "outline_p",
            Self::FontV => "font_v",
            Self::FontP => "font_p",
            Self::UiV => "ui_v",
            Self::UiP => "ui_p",
        }
    }

    pub fn stage(self) -> ShaderStage {
        match self.name().as_bytes().last() {
            Some(b'v') => ShaderStage::VERTEX,
            Some(b'p') => ShaderStage::PIXEL,
            _ => ShaderStage::COMPUTE,
        }
    }

    /// Source file, relative to the shader directory. Vertex and pixel
    /// programs of the same technique share a file.
    pub fn file(self) -> &'static str {
        match self {
            Self::DepthPrepassV | Self::DepthPrepassP => "depth_prepass.wgsl",
            Self::DepthLightV | Self::DepthLightP => "depth_light.wgsl",
            Self::GbufferV | Self::GbufferP => "gbuffer.wgsl",
            Self::ReflectionProbeV | Self::ReflectionProbeP => "reflection_probe.wgsl",
            Self::LightC => "light.wgsl",
            Self::LightCompositionC => "light_composition.wgsl",
            Self::LightImageBasedP => "light_image_based.wgsl",
            Self::BrdfSpecularLutC => "brdf_specular_lut.wgsl",
            Self::SsaoC => "ssao.wgsl",
            Self::SsrC => "ssr.wgsl",
            Self::BlurGaussianC | Self::BlurGaussianBilateralC => "blur.wgsl",
            Self::DepthOfFieldC => "depth_of_field.wgsl",
            Self::TaaC => "taa.wgsl",
            Self::FsrUpsampleC => "fsr.wgsl",
            Self::MotionBlurC => "motion_blur.wgsl",
            Self::BloomLuminanceC | Self::BloomUpsampleBlendMipC | Self::BloomBlendFrameC => {
                "bloom.wgsl"
            }
            Self::CasC => "cas.wgsl",
            Self::ToneMappingGammaC => "tone_mapping_gamma.wgsl",
            Self::DebandingC => "debanding.wgsl",
            Self::FxaaC => "fxaa.wgsl",
            Self::ChromaticAberrationC => "chromatic_aberration.wgsl",
            Self::FilmGrainC => "film_grain.wgsl",
            Self::AmdSpdC => "amd_spd.wgsl",
            Self::CopyC => "copy.wgsl",
            Self::QuadV | Self::TextureP => "quad.wgsl",
            Self::LinesV | Self::LinesP => "lines.wgsl",
            Self::OutlineV | Self::OutlineP => "outline.wgsl",
            Self::FontV | Self::FontP => "font.wgsl",
            Self::UiV | Self::UiP => "ui.wgsl",
        }
    }

    /// Preprocessor defines selecting a variant within a shared file.
    pub fn defines(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::BlurGaussianBilateralC => &[("PASS_BLUR_BILATERAL_GAUSSIAN", "1")],
            Self::BlurGaussianC => &[("PASS_BLUR_GAUSSIAN", "1")],
            Self::BloomLuminanceC => &[("LUMINANCE", "1")],
            Self::BloomUpsampleBlendMipC => &[("UPSAMPLE_BLEND_MIP", "1")],
            Self::BloomBlendFrameC => &[("BLEND_FRAME", "1")],
            _ => &[],
        }
    }

    /// Bindings every program declares: constant buffers, samplers, the
    /// shared texture slots, storage outputs and one structured buffer.
    pub fn bindings(self) -> Vec<DescriptorBinding> {
        let stages = self.stage();
        let mut bindings = Vec::new();
        for (name, slot) in [
            ("cb_frame", cb_slot::FRAME),
            ("cb_uber", cb_slot::UBER),
            ("cb_light", cb_slot::LIGHT),
            ("cb_material", cb_slot::MATERIAL),
        ] {
            bindings.push(DescriptorBinding::new(name, DescriptorType::ConstantBuffer, slot, stages));
        }
        for slot in sampler_slot::COMPARE_DEPTH..=sampler_slot::ANISOTROPIC_WRAP {
            bindings.push(DescriptorBinding::new(
                format!("sampler_{slot}"),
                DescriptorType::Sampler,
                slot,
                stages,
            ));
        }
        for slot in slot::TEX_ALBEDO..=slot::LAST_TEXTURE {
            bindings.push(DescriptorBinding::new(
                format!("tex_{slot}"),
                DescriptorType::Texture,
                slot,
                stages,
            ));
        }
        if stages.contains(ShaderStage::COMPUTE) {
            for slot in [slot::STORAGE_OUT, slot::STORAGE_OUT2] {
                bindings.push(DescriptorBinding::new(
                    format!("tex_uav_{slot}"),
                    DescriptorType::TextureStorage,
                    slot,
                    stages,
                ));
            }
        }
        bindings.push(DescriptorBinding::new(
            "structured",
            DescriptorType::StructuredBuffer,
            slot::STRUCTURED,
            stages,
        ));
        bindings
    }

    pub fn descriptor(self, source: String) -> ShaderDescriptor {
        let mut descriptor = ShaderDescriptor::new(self.name(), self.stage(), source)
            .with_bindings(self.bindings());
        for (name, value) in self.defines() {
            descriptor = descriptor.with_define(*name, *value);
        }
        descriptor
    }
}

/// Supplies shader source text.
pub trait ShaderSourceProvider: Send + Sync {
    fn source(&self, id: ShaderId) -> Option<String>;
}

/// Reads sources from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySourceProvider {
    root: PathBuf,
}

impl DirectorySourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSourceProvider for DirectorySourceProvider {
    fn source(&self, id: ShaderId) -> Option<String> {
        let path = self.root.join(id.file());
        match std::fs::read_to_string(&path) {
            Ok(source) => Some(source),
            Err(e) => {
                log::error!("Failed to read shader {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// In-memory sources.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    sources: HashMap<ShaderId, String>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A minimal entry point for every program.
    pub fn placeholders() -> Self {
        let sources = ShaderId::ALL
            .into_iter()
            .map(|id| {
                let entry = id.descriptor(String::new()).entry_point;
                (id, format!("// {}\nfn {}() {{}}\n", id.name(), entry))
            })
            .collect();
        Self { sources }
    }

    pub fn with_source(mut self, id: ShaderId, source: impl Into<String>) -> Self {
        self.sources.insert(id, source.into());
        self
    }

    pub fn without(mut self, id: ShaderId) -> Self {
        self.sources.remove(&id);
        self
    }
}

impl ShaderSourceProvider for MemorySourceProvider {
    fn source(&self, id: ShaderId) -> Option<String> {
        self.sources.get(&id).cloned()
    }
}

/// Every compiled program, keyed by id.
pub struct ShaderLibrary {
    device: Arc<Device>,
    provider: Box<dyn ShaderSourceProvider>,
    compiler: Option<ShaderCompiler>,
    shaders: HashMap<ShaderId, Arc<Shader>>,
}

impl ShaderLibrary {
    pub fn new(
        device: &Arc<Device>,
        provider: Box<dyn ShaderSourceProvider>,
        compile_async: bool,
    ) -> RendererResult<Self> {
        let compiler = if compile_async {
            Some(ShaderCompiler::new()?)
        } else {
            None
        };
        let mut library = Self {
            device: device.clone(),
            provider,
            compiler,
            shaders: HashMap::new(),
        };
        library.reload_all();
        Ok(library)
    }

    /// Recreate and recompile every program from its current source.
    ///
    /// Programs without a source are logged and left out; passes depending
    /// on them are skipped.
    pub fn reload_all(&mut self) {
        self.shaders.clear();
        for id in ShaderId::ALL {
            if let Err(e) = self.load(id) {
                log::error!("Shader '{}' unavailable: {}", id.name(), e);
            }
        }
        log::info!(
            "Loaded {} of {} shaders ({})",
            self.shaders.len(),
            ShaderId::ALL.len(),
            if self.compiler.is_some() { "async" } else { "sync" }
        );
    }

    fn load(&mut self, id: ShaderId) -> RendererResult<()> {
        let source = self
            .provider
            .source(id)
            .ok_or(RendererError::MissingShaderSource(id.name()))?;
        let shader = Shader::new(&self.device, id.descriptor(source));
        match &self.compiler {
            Some(compiler) => compiler.compile_async(shader.clone())?,
            // Failures are recorded on the shader and keep the pass skipped.
            None => {
                let _ = shader.compile();
            }
        }
        self.shaders.insert(id, shader);
        Ok(())
    }

    pub fn get(&self, id: ShaderId) -> Option<&Arc<Shader>> {
        self.shaders.get(&id)
    }

    /// The shader, only once it compiled successfully.
    pub fn compiled(&self, id: ShaderId) -> Option<&Arc<Shader>> {
        self.get(id).filter(|shader| shader.is_compiled())
    }

    pub fn is_compiled(&self, id: ShaderId) -> bool {
        self.compiled(id).is_some()
    }

    pub fn all_compiled(&self, ids: &[ShaderId]) -> bool {
        ids.iter().all(|id| self.is_compiled(*id))
    }

    pub fn compiled_count(&self) -> usize {
        self.shaders.values().filter(|s| s.is_compiled()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_rhi::DeviceDescriptor;

    #[test]
    fn test_stage_from_name() {
        assert_eq!(ShaderId::GbufferV.stage(), ShaderStage::VERTEX);
        assert_eq!(ShaderId::GbufferP.stage(), ShaderStage::PIXEL);
        assert_eq!(ShaderId::LightC.stage(), ShaderStage::COMPUTE);
        assert_eq!(ShaderId::GbufferP.descriptor(String::new()).entry_point, "main_ps");
    }

    #[test]
    fn test_names_unique() {
        let mut names: Vec<_> = ShaderId::ALL.iter().map(|id| id.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ShaderId::ALL.len());
    }

    #[test]
    fn test_sync_library_compiles_placeholders() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let library =
            ShaderLibrary::new(&device, Box::new(MemorySourceProvider::placeholders()), false)
                .unwrap();
        assert_eq!(library.compiled_count(), ShaderId::ALL.len());
    }

    #[test]
    fn test_missing_and_broken_sources() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let provider = MemorySourceProvider::placeholders()
            .without(ShaderId::SsaoC)
            .with_source(ShaderId::SsrC, "");
        let library = ShaderLibrary::new(&device, Box::new(provider), false).unwrap();
        assert!(library.get(ShaderId::SsaoC).is_none());
        assert!(library.get(ShaderId::SsrC).is_some());
        assert!(!library.is_compiled(ShaderId::SsrC));
        assert!(library.is_compiled(ShaderId::LightC));
    }
}
