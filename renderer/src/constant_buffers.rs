//! CPU mirrors of the constant buffers the passes bind.
//!
//! Layouts are `#[repr(C)]` and sized to multiples of 16 bytes so they can be
//! uploaded as-is. Each mirror is written through a ring [`ConstantBuffer`]
//! that skips unchanged uploads.

use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use forge_rhi::{ConstantBuffer, Device, RhiResult};
use glam::Mat4;
use static_assertions::const_assert_eq;

/// Slots shared by every shader program.
pub mod slot {
    pub const FRAME: u32 = 0;
    pub const UBER: u32 = 1;
    pub const LIGHT: u32 = 2;
    pub const MATERIAL: u32 = 3;
}

bitflags! {
    /// Feature bits packed into [`CbFrame::options`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        const SSR = 1 << 0;
        const TAA_UPSAMPLE = 1 << 1;
        const SSAO = 1 << 2;
        const VOLUMETRIC_FOG = 1 << 3;
        const SCREEN_SPACE_SHADOWS = 1 << 4;
        const SSAO_GI = 1 << 5;
        const REVERSE_Z = 1 << 6;
    }
}

bitflags! {
    /// Per-light bits packed into [`CbLight::flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LightFlags: u32 {
        const DIRECTIONAL = 1 << 0;
        const POINT = 1 << 1;
        const SPOT = 1 << 2;
        const SHADOWS = 1 << 3;
        const SHADOWS_TRANSPARENT = 1 << 4;
        const SCREEN_SPACE_SHADOWS = 1 << 5;
        const VOLUMETRIC = 1 << 6;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub view_projection_inverted: Mat4,
    pub view_projection_previous: Mat4,
    pub view_projection_unjittered: Mat4,

    pub resolution_render: [f32; 2],
    pub resolution_output: [f32; 2],

    pub taa_jitter_current: [f32; 2],
    pub taa_jitter_previous: [f32; 2],

    pub camera_position: [f32; 3],
    pub camera_near: f32,

    pub camera_direction: [f32; 3],
    pub camera_far: f32,

    pub delta_time: f32,
    pub time: f32,
    pub frame: u32,
    pub options: u32,

    pub gamma: f32,
    pub exposure: f32,
    pub tonemapping: u32,
    pub fog_density: f32,

    pub sharpen_strength: f32,
    pub bloom_intensity: f32,
    pub film_grain_intensity: f32,
    pub chromatic_aberration_intensity: f32,
}

impl Default for CbFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl CbFrame {
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_truncate(self.options)
    }

    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.options = flags.bits();
    }
}

/// Per-draw and per-dispatch parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbUber {
    pub transform: Mat4,
    pub transform_previous: Mat4,

    pub color: [f32; 4],

    pub resolution_in: [f32; 2],
    pub resolution_out: [f32; 2],

    pub blur_direction: [f32; 2],
    pub blur_sigma: f32,
    pub is_transparent: u32,

    pub mip_level: u32,
    pub array_index: u32,
    pub work_groups: u32,
    pub _padding: f32,
}

impl Default for CbUber {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            transform_previous: Mat4::IDENTITY,
            ..Self::zeroed()
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbLight {
    pub view_projection: [Mat4; 6],
    pub color: [f32; 4],
    /// xyz position, w range.
    pub position: [f32; 4],
    /// xyz direction, w outer angle in radians.
    pub direction: [f32; 4],

    pub intensity: f32,
    pub bias: f32,
    pub normal_bias: f32,
    pub shadow_resolution: f32,

    pub flags: u32,
    pub index: u32,
    pub _padding: [u32; 2],
}

impl Default for CbLight {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbMaterial {
    pub color: [f32; 4],

    pub tiling: [f32; 2],
    pub offset: [f32; 2],

    pub roughness: f32,
    pub metallic: f32,
    pub normal: f32,
    pub height: f32,

    pub flags: u32,
    pub clearcoat: f32,
    pub sheen: f32,
    pub _padding: f32,
}

impl Default for CbMaterial {
    fn default() -> Self {
        Self {
            color: [1.0; 4],
            tiling: [1.0; 2],
            roughness: 1.0,
            ..Self::zeroed()
        }
    }
}

const_assert_eq!(std::mem::size_of::<CbFrame>(), 496);
const_assert_eq!(std::mem::size_of::<CbUber>(), 192);
const_assert_eq!(std::mem::size_of::<CbLight>(), 464);
const_assert_eq!(std::mem::size_of::<CbMaterial>(), 64);

/// Ring buffers plus the last value written to each.
pub struct ConstantBuffers {
    pub frame: ConstantBuffer,
    pub uber: ConstantBuffer,
    pub light: ConstantBuffer,
    pub material: ConstantBuffer,
    pub cpu_frame: CbFrame,
    pub cpu_uber: CbUber,
    pub cpu_light: CbLight,
    pub cpu_material: CbMaterial,
}

impl ConstantBuffers {
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            frame: ConstantBuffer::new(device, "frame", std::mem::size_of::<CbFrame>(), 64)?,
            uber: ConstantBuffer::new(device, "uber", std::mem::size_of::<CbUber>(), 1024)?,
            light: ConstantBuffer::new(device, "light", std::mem::size_of::<CbLight>(), 256)?,
            material: ConstantBuffer::new(
                device,
                "material",
                std::mem::size_of::<CbMaterial>(),
                256,
            )?,
            cpu_frame: CbFrame::default(),
            cpu_uber: CbUber::default(),
            cpu_light: CbLight::default(),
            cpu_material: CbMaterial::default(),
        })
    }

    /// Rewind every ring; only valid once the frames reading them have retired.
    pub fn reset_offsets(&mut self) {
        self.frame.reset_offset();
        self.uber.reset_offset();
        self.light.reset_offset();
        self.material.reset_offset();
    }

    pub fn update_frame(&mut self) -> RhiResult<bool> {
        self.frame.update(&self.cpu_frame)
    }

    pub fn update_uber(&mut self) -> RhiResult<bool> {
        self.uber.update(&self.cpu_uber)
    }

    pub fn update_light(&mut self) -> RhiResult<bool> {
        self.light.update(&self.cpu_light)
    }

    pub fn update_material(&mut self) -> RhiResult<bool> {
        self.material.update(&self.cpu_material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_rhi::DeviceDescriptor;

    #[test]
    fn test_frame_flags_pack() {
        let mut frame = CbFrame::default();
        frame.set_flags(FrameFlags::SSR | FrameFlags::SSAO_GI);
        assert_eq!(frame.options, 0b100001);
        assert!(frame.flags().contains(FrameFlags::SSAO_GI));
    }

    #[test]
    fn test_unchanged_frame_is_not_uploaded() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let mut buffers = ConstantBuffers::new(&device).unwrap();
        buffers.cpu_frame.frame = 1;
        assert!(buffers.update_frame().unwrap());
        assert!(!buffers.update_frame().unwrap());

        buffers.cpu_frame.frame = 2;
        assert!(buffers.update_frame().unwrap());
        assert_eq!(buffers.frame.offset(), buffers.frame.stride());

        buffers.reset_offsets();
        buffers.cpu_frame.frame = 3;
        assert!(buffers.update_frame().unwrap());
        assert_eq!(buffers.frame.offset(), 0);
    }
}
