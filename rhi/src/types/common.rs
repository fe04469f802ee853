//! Small value types shared across the RHI.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Linear RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// How an attachment's previous contents are treated when a render pass begins.
///
/// Only the class of the operation participates in pipeline hashing; the clear
/// value itself does not require a distinct native pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    /// Contents are undefined and may be discarded.
    DontCare,
    /// Contents are preserved.
    Load,
    /// Contents are cleared to the given value.
    Clear(T),
}

impl<T> Default for LoadOp<T> {
    fn default() -> Self {
        Self::DontCare
    }
}

impl<T> LoadOp<T> {
    /// Hashable class of the operation: dont-care = 0, load = 1, clear = 2.
    pub fn class(&self) -> u8 {
        match self {
            Self::DontCare => 0,
            Self::Load => 1,
            Self::Clear(_) => 2,
        }
    }

    pub fn clear_value(&self) -> Option<&T> {
        match self {
            Self::Clear(value) => Some(value),
            _ => None,
        }
    }
}

/// 2D extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A viewport for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn from_extent(extent: Extent) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// Integer rectangle, used for scissors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

bitflags! {
    /// Shader stages a resource or program is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStage: u32 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const PIXEL = 1 << 3;
        const COMPUTE = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_op_class() {
        assert_eq!(LoadOp::<Color>::DontCare.class(), 0);
        assert_eq!(LoadOp::<Color>::Load.class(), 1);
        assert_eq!(LoadOp::Clear(Color::BLACK).class(), 2);
        assert_eq!(LoadOp::Clear(Color::WHITE).class(), 2);
    }

    #[test]
    fn test_viewport_aspect() {
        let viewport = Viewport::from_extent(Extent::new(1920, 1080));
        assert!((viewport.aspect_ratio() - 16.0 / 9.0).abs() < 1e-5);
        assert_eq!(Viewport::default().aspect_ratio(), 1.0);
    }
}
