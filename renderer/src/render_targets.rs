//! Render target table.
//!
//! Render-resolution targets hold everything rasterized or lit before
//! upscaling. Output-resolution targets hold the post-processing chain.

use std::sync::Arc;

use forge_rhi::{Device, Extent, RhiResult, Texture, TextureDescriptor, TextureFlags, TextureFormat};

use crate::options::{Options, RendererOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    GbufferAlbedo,
    GbufferNormal,
    GbufferMaterial,
    GbufferVelocity,
    GbufferDepth,
    LightDiffuse,
    LightDiffuseTransparent,
    LightSpecular,
    LightSpecularTransparent,
    LightVolumetric,
    Ssao,
    SsaoBlurred,
    Ssr,
    FrameRender,
    FrameRender2,
    FrameRenderOpaqueBlurred,
    FrameOutput,
    FrameOutput2,
    TaaHistory,
    Bloom,
    DepthOfField,
    BrdfSpecularLut,
}

impl RenderTarget {
    pub const COUNT: usize = 22;

    pub const ALL: [Self; Self::COUNT] = [
        Self::GbufferAlbedo,
        Self::GbufferNormal,
        Self::GbufferMaterial,
        Self::GbufferVelocity,
        Self::GbufferDepth,
        Self::LightDiffuse,
        Self::LightDiffuseTransparent,
        Self::LightSpecular,
        Self::LightSpecularTransparent,
        Self::LightVolumetric,
        Self::Ssao,
        Self::SsaoBlurred,
        Self::Ssr,
        Self::FrameRender,
        Self::FrameRender2,
        Self::FrameRenderOpaqueBlurred,
        Self::FrameOutput,
        Self::FrameOutput2,
        Self::TaaHistory,
        Self::Bloom,
        Self::DepthOfField,
        Self::BrdfSpecularLut,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GbufferAlbedo => "rt_gbuffer_albedo",
            Self::GbufferNormal => "rt_gbuffer_normal",
            Self::GbufferMaterial => "rt_gbuffer_material",
            Self::GbufferVelocity => "rt_gbuffer_velocity",
            Self::GbufferDepth => "rt_gbuffer_depth",
            Self::LightDiffuse => "rt_light_diffuse",
            Self::LightDiffuseTransparent => "rt_light_diffuse_transparent",
            Self::LightSpecular => "rt_light_specular",
            Self::LightSpecularTransparent => "rt_light_specular_transparent",
            Self::LightVolumetric => "rt_light_volumetric",
            Self::Ssao => "rt_ssao",
            Self::SsaoBlurred => "rt_ssao_blurred",
            Self::Ssr => "rt_ssr",
            Self::FrameRender => "rt_frame_render",
            Self::FrameRender2 => "rt_frame_render_2",
            Self::FrameRenderOpaqueBlurred => "rt_frame_render_opaque_blurred",
            Self::FrameOutput => "rt_frame_output",
            Self::FrameOutput2 => "rt_frame_output_2",
            Self::TaaHistory => "rt_taa_history",
            Self::Bloom => "rt_bloom",
            Self::DepthOfField => "rt_dof",
            Self::BrdfSpecularLut => "rt_brdf_specular_lut",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Size of the precomputed BRDF lookup table.
pub const BRDF_LUT_SIZE: u32 = 512;

/// Every render target the pass pipeline reads or writes.
#[derive(Default)]
pub struct RenderTargets {
    textures: [Option<Arc<Texture>>; RenderTarget::COUNT],
    generation: u64,
}

impl RenderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: RenderTarget) -> Option<&Arc<Texture>> {
        self.textures[target.index()].as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.textures.iter().all(Option::is_some)
    }

    /// Bumped every time the table is rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn swap(&mut self, a: RenderTarget, b: RenderTarget) {
        self.textures.swap(a.index(), b.index());
    }

    /// Rebuild every target for the given resolutions.
    ///
    /// The table is replaced only when every texture was created; on failure
    /// the previous targets stay in place.
    pub fn create(
        &mut self,
        device: &Arc<Device>,
        render: Extent,
        output: Extent,
        options: &Options,
    ) -> RhiResult<()> {
        let mut textures: [Option<Arc<Texture>>; RenderTarget::COUNT] = Default::default();
        for target in RenderTarget::ALL {
            let descriptor = describe(target, render, output, options).with_label(target.name());
            textures[target.index()] = Some(Texture::new(device, descriptor)?);
        }
        self.textures = textures;
        self.generation += 1;
        log::debug!(
            "Created render targets (render {}x{}, output {}x{})",
            render.width,
            render.height,
            output.width,
            output.height
        );
        Ok(())
    }

    pub fn clear(&mut self) {
        self.textures = Default::default();
    }
}

fn describe(
    target: RenderTarget,
    render: Extent,
    output: Extent,
    options: &Options,
) -> TextureDescriptor {
    use RenderTarget as Rt;

    let color = TextureFlags::RENDER_TARGET | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT;
    let storage = TextureFlags::UAV | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT;
    let mipped = storage | TextureFlags::PER_MIP_VIEWS;
    let half = Extent::new((render.width / 2).max(1), (render.height / 2).max(1));

    let (extent, format, flags, mips) = match target {
        Rt::GbufferAlbedo => (render, TextureFormat::Rgba8Unorm, color, false),
        Rt::GbufferNormal => (render, TextureFormat::Rgba16Float, color, false),
        Rt::GbufferMaterial => (render, TextureFormat::Rgba8Unorm, color, false),
        Rt::GbufferVelocity => (render, TextureFormat::Rg16Float, color, false),
        Rt::GbufferDepth => (
            render,
            TextureFormat::D32Float,
            TextureFlags::DEPTH_STENCIL | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT,
            false,
        ),
        Rt::LightDiffuse
        | Rt::LightDiffuseTransparent
        | Rt::LightSpecular
        | Rt::LightSpecularTransparent
        | Rt::LightVolumetric => (render, TextureFormat::R11g11b10Float, storage, false),
        Rt::Ssao | Rt::SsaoBlurred => (render, TextureFormat::Rgba16Snorm, storage, false),
        Rt::Ssr => (render, TextureFormat::Rgba16Float, mipped, true),
        Rt::FrameRender | Rt::FrameRender2 => {
            (render, TextureFormat::Rgba16Float, color | storage, false)
        }
        Rt::FrameRenderOpaqueBlurred => (half, TextureFormat::Rgba16Float, mipped, true),
        Rt::FrameOutput | Rt::FrameOutput2 => {
            (output, TextureFormat::Rgba16Float, color | storage, false)
        }
        Rt::TaaHistory => {
            let extent = if options.get(RendererOption::UPSAMPLE_TAA) {
                output
            } else {
                render
            };
            (extent, TextureFormat::Rgba16Float, storage, false)
        }
        Rt::Bloom => (output, TextureFormat::Rgba16Float, mipped, true),
        Rt::DepthOfField => (half, TextureFormat::Rgba16Float, storage, false),
        Rt::BrdfSpecularLut => (
            Extent::new(BRDF_LUT_SIZE, BRDF_LUT_SIZE),
            TextureFormat::Rg16Float,
            storage,
            false,
        ),
    };

    let descriptor = TextureDescriptor::new_2d(extent.width, extent.height, format, flags);
    if mips {
        descriptor.with_mips(TextureDescriptor::full_mip_count(extent.width, extent.height))
    } else {
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_rhi::DeviceDescriptor;

    #[test]
    fn test_all_targets_created() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let options = Options::new(RendererOption::UPSAMPLE_TAA, 16384);
        let mut targets = RenderTargets::new();
        targets
            .create(
                &device,
                Extent::new(640, 360),
                Extent::new(1280, 720),
                &options,
            )
            .unwrap();

        assert!(targets.is_created());
        assert_eq!(targets.generation(), 1);
        let output = targets.get(RenderTarget::FrameOutput).unwrap();
        assert_eq!(output.extent(), Extent::new(1280, 720));
        let history = targets.get(RenderTarget::TaaHistory).unwrap();
        assert_eq!(history.extent(), Extent::new(1280, 720));
        let blurred = targets.get(RenderTarget::FrameRenderOpaqueBlurred).unwrap();
        assert_eq!(blurred.extent(), Extent::new(320, 180));
        assert!(blurred.mip_count() > 1);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = RenderTarget::ALL.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RenderTarget::COUNT);
    }
}
