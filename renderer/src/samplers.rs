//! Shared samplers.

use std::sync::Arc;

use forge_rhi::{
    AddressMode, CompareFunction, Device, Extent, FilterMode, RhiResult, Sampler,
    SamplerDescriptor,
};

use crate::options::{OptionValue, Options, RendererOption};

/// Sampler slots, following the constant buffer slots.
pub mod slot {
    pub const COMPARE_DEPTH: u32 = 4;
    pub const POINT_CLAMP: u32 = 5;
    pub const POINT_WRAP: u32 = 6;
    pub const BILINEAR_CLAMP: u32 = 7;
    pub const BILINEAR_WRAP: u32 = 8;
    pub const TRILINEAR_CLAMP: u32 = 9;
    pub const ANISOTROPIC_WRAP: u32 = 10;
}

/// Mip bias compensating for sampling at render resolution while presenting
/// at output resolution.
pub fn mip_lod_bias(render: Extent, output: Extent) -> f32 {
    if render.width == 0 || output.width == 0 {
        return 0.0;
    }
    -(output.width as f32 / render.width as f32).log2()
}

pub struct Samplers {
    pub compare_depth: Arc<Sampler>,
    pub point_clamp: Arc<Sampler>,
    pub point_wrap: Arc<Sampler>,
    pub bilinear_clamp: Arc<Sampler>,
    pub bilinear_wrap: Arc<Sampler>,
    pub trilinear_clamp: Arc<Sampler>,
    pub anisotropic_wrap: Arc<Sampler>,
}

impl Samplers {
    pub fn new(
        device: &Arc<Device>,
        options: &Options,
        render: Extent,
        output: Extent,
    ) -> RhiResult<Self> {
        let compare = if options.get(RendererOption::REVERSE_Z) {
            CompareFunction::GreaterEqual
        } else {
            CompareFunction::LessEqual
        };
        let anisotropy = options
            .value(OptionValue::Anisotropy)
            .min(device.limits().max_anisotropy as f32);
        let bias = mip_lod_bias(render, output);

        let samplers = Self {
            compare_depth: Sampler::new(
                device,
                SamplerDescriptor::new(FilterMode::Linear, AddressMode::Clamp)
                    .with_label("compare_depth")
                    .with_compare(compare),
            )?,
            point_clamp: Sampler::new(
                device,
                SamplerDescriptor::new(FilterMode::Nearest, AddressMode::Clamp)
                    .with_label("point_clamp"),
            )?,
            point_wrap: Sampler::new(
                device,
                SamplerDescriptor::new(FilterMode::Nearest, AddressMode::Wrap)
                    .with_label("point_wrap"),
            )?,
            bilinear_clamp: Sampler::new(
                device,
                SamplerDescriptor {
                    mipmap_filter: FilterMode::Nearest,
                    ..SamplerDescriptor::new(FilterMode::Linear, AddressMode::Clamp)
                }
                .with_label("bilinear_clamp"),
            )?,
            bilinear_wrap: Sampler::new(
                device,
                SamplerDescriptor {
                    mipmap_filter: FilterMode::Nearest,
                    ..SamplerDescriptor::new(FilterMode::Linear, AddressMode::Wrap)
                }
                .with_label("bilinear_wrap"),
            )?,
            trilinear_clamp: Sampler::new(
                device,
                SamplerDescriptor::new(FilterMode::Linear, AddressMode::Clamp)
                    .with_label("trilinear_clamp"),
            )?,
            anisotropic_wrap: Sampler::new(
                device,
                SamplerDescriptor::new(FilterMode::Linear, AddressMode::Wrap)
                    .with_label("anisotropic_wrap")
                    .with_anisotropy(anisotropy, bias),
            )?,
        };
        log::debug!(
            "Created samplers (anisotropy {}, mip bias {:.3})",
            anisotropy,
            bias
        );
        Ok(samplers)
    }

    pub fn bindings(&self) -> [(u32, &Arc<Sampler>); 7] {
        [
            (slot::COMPARE_DEPTH, &self.compare_depth),
            (slot::POINT_CLAMP, &self.point_clamp),
            (slot::POINT_WRAP, &self.point_wrap),
            (slot::BILINEAR_CLAMP, &self.bilinear_clamp),
            (slot::BILINEAR_WRAP, &self.bilinear_wrap),
            (slot::TRILINEAR_CLAMP, &self.trilinear_clamp),
            (slot::ANISOTROPIC_WRAP, &self.anisotropic_wrap),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_rhi::DeviceDescriptor;

    #[test]
    fn test_mip_lod_bias() {
        assert_eq!(mip_lod_bias(Extent::new(1920, 1080), Extent::new(1920, 1080)), 0.0);
        assert_eq!(mip_lod_bias(Extent::new(960, 540), Extent::new(1920, 1080)), -1.0);
        assert_eq!(mip_lod_bias(Extent::new(0, 0), Extent::new(1920, 1080)), 0.0);
    }

    #[test]
    fn test_anisotropic_sampler_bias() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let options = Options::new(RendererOption::REVERSE_Z, 16384);
        let samplers = Samplers::new(
            &device,
            &options,
            Extent::new(640, 360),
            Extent::new(1280, 720),
        )
        .unwrap();
        assert_eq!(samplers.anisotropic_wrap.mip_lod_bias(), -1.0);
        assert_eq!(samplers.anisotropic_wrap.anisotropy(), 16.0);
        assert_eq!(
            samplers.compare_depth.descriptor().compare,
            Some(CompareFunction::GreaterEqual)
        );
    }
}
