//! Camera component and per-frame camera matrices.

use bevy_ecs::prelude::*;
use forge_rhi::{Color, Extent};
use glam::{Mat4, Vec2, Vec3};

use crate::entities::Transform;

/// Jitter sequence length for temporal anti-aliasing.
pub const TAA_SAMPLE_COUNT: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32 },
    Orthographic { height: f32 },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_3,
        }
    }
}

/// Camera component. The view comes from the entity's [`Transform`].
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
    pub clear_color: Color,
    pub aperture: f32,
    pub shutter_speed: f32,
    pub iso: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            near: 0.3,
            far: 2500.0,
            clear_color: Color::new(0.396, 0.611, 0.937, 1.0),
            aperture: 2.8,
            shutter_speed: 1.0 / 60.0,
            iso: 500.0,
        }
    }
}

impl Camera {
    pub fn with_clear_color(mut self, clear_color: Color) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Projection matrix; reverse-z swaps the depth range so far maps to 0.
    pub fn projection_matrix(&self, aspect: f32, reverse_z: bool) -> Mat4 {
        let (near, far) = if reverse_z {
            (self.far, self.near)
        } else {
            (self.near, self.far)
        };
        match self.projection {
            Projection::Perspective { fov_y } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }
}

/// Element `index` of the Halton low-discrepancy sequence in `base`.
pub fn halton(mut index: u64, base: u64) -> f32 {
    let mut fraction = 1.0;
    let mut result = 0.0;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel jitter in NDC for `frame`, cycling over [`TAA_SAMPLE_COUNT`]
/// samples of the Halton(2, 3) sequence.
pub fn taa_jitter(frame: u64, resolution: Extent) -> Vec2 {
    if resolution.is_empty() {
        return Vec2::ZERO;
    }
    let index = (frame % TAA_SAMPLE_COUNT) + 1;
    let sample = Vec2::new(halton(index, 2) - 0.5, halton(index, 3) - 0.5);
    sample * 2.0 / Vec2::new(resolution.width as f32, resolution.height as f32)
}

/// Matrices derived from the active camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub projection_unjittered: Mat4,
    pub view_projection: Mat4,
    pub view_projection_inverted: Mat4,
    pub view_projection_unjittered: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
    pub near: f32,
    pub far: f32,
    pub jitter: Vec2,
}

impl CameraMatrices {
    pub fn compute(
        camera: &Camera,
        transform: &Transform,
        aspect: f32,
        reverse_z: bool,
        jitter: Vec2,
    ) -> Self {
        let forward = transform.forward();
        let view = Mat4::look_to_rh(transform.position, forward, transform.up());
        let projection_unjittered = camera.projection_matrix(aspect, reverse_z);
        let projection = Mat4::from_translation(jitter.extend(0.0)) * projection_unjittered;
        let view_projection = projection * view;
        Self {
            view,
            projection,
            projection_unjittered,
            view_projection,
            view_projection_inverted: view_projection.inverse(),
            view_projection_unjittered: projection_unjittered * view,
            position: transform.position,
            forward,
            near: camera.near,
            far: camera.far,
            jitter,
        }
    }

    /// Squared distance from the camera, used for depth sorting.
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        self.position.distance_squared(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_sequence() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(2, 3) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_cycles_and_scales() {
        let resolution = Extent::new(1920, 1080);
        assert_eq!(taa_jitter(0, resolution), taa_jitter(TAA_SAMPLE_COUNT, resolution));
        let jitter = taa_jitter(0, resolution);
        assert_eq!(jitter.x, 0.0);
        assert!((jitter.y - (1.0 / 3.0 - 0.5) * 2.0 / 1080.0).abs() < 1e-7);
        assert!(jitter.x.abs() <= 1.0 / 1920.0);
        assert_eq!(taa_jitter(3, Extent::new(0, 0)), Vec2::ZERO);
    }

    #[test]
    fn test_reverse_z_maps_near_to_one() {
        let camera = Camera::default();
        let forward = camera.projection_matrix(1.0, false);
        let reversed = camera.projection_matrix(1.0, true);
        let near_point = glam::Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let depth = |m: Mat4| {
            let clip = m * near_point;
            clip.z / clip.w
        };
        assert!(depth(forward).abs() < 1e-4);
        assert!((depth(reversed) - 1.0).abs() < 1e-4);
    }
}
