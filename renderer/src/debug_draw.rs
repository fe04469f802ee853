//! Immediate-mode debug primitives.
//!
//! Lines accumulate on the CPU between frames and are flushed once per frame
//! by the line pass. Depth-tested lines are occluded by the scene, overlay
//! lines draw on top of it.

use forge_rhi::{Color, VertexPosCol};
use glam::Vec3;

use crate::geometry::BoundingBox;

const CIRCLE_SEGMENTS_MIN: u32 = 3;

/// Accumulated line vertices, two per segment.
#[derive(Debug, Default, Clone)]
pub struct LineLists {
    pub depth: Vec<VertexPosCol>,
    pub overlay: Vec<VertexPosCol>,
}

impl LineLists {
    pub fn is_empty(&self) -> bool {
        self.depth.is_empty() && self.overlay.is_empty()
    }

    pub fn line_count(&self) -> usize {
        (self.depth.len() + self.overlay.len()) / 2
    }
}

#[derive(Debug)]
pub struct DebugDraw {
    lines: LineLists,
    capacity: usize,
}

impl DebugDraw {
    /// `capacity` is the initial vertex capacity of each list.
    pub fn new(capacity: u32) -> Self {
        Self {
            lines: LineLists {
                depth: Vec::with_capacity(capacity as usize),
                overlay: Vec::with_capacity(capacity as usize),
            },
            capacity: capacity as usize,
        }
    }

    /// Continue drawing into lines taken from another drawer.
    pub fn with_lines(lines: LineLists) -> Self {
        let capacity = lines.depth.capacity().max(lines.overlay.capacity());
        Self { lines, capacity }
    }

    pub fn draw_line(&mut self, from: Vec3, to: Vec3, color_from: Color, color_to: Color, depth: bool) {
        let list = if depth {
            &mut self.lines.depth
        } else {
            &mut self.lines.overlay
        };
        list.push(VertexPosCol::new(from.to_array(), color_from.to_array()));
        list.push(VertexPosCol::new(to.to_array(), color_to.to_array()));
    }

    /// Twelve edges of `bounds`.
    pub fn draw_box(&mut self, bounds: &BoundingBox, color: Color, depth: bool) {
        if !bounds.is_defined() {
            return;
        }
        let c = bounds.corners();
        const EDGES: [(usize, usize); 12] = [
            (0, 1),
            (1, 2),
            (2, 3),
            (3, 0),
            (4, 5),
            (5, 6),
            (6, 7),
            (7, 4),
            (0, 4),
            (1, 5),
            (2, 6),
            (3, 7),
        ];
        for (a, b) in EDGES {
            self.draw_line(c[a], c[b], color, color, depth);
        }
    }

    /// Circle around `axis` through `center`.
    pub fn draw_circle(
        &mut self,
        center: Vec3,
        axis: Vec3,
        radius: f32,
        segments: u32,
        color: Color,
        depth: bool,
    ) {
        let segments = segments.max(CIRCLE_SEGMENTS_MIN);
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return;
        }
        let (u, v) = axis.any_orthonormal_pair();
        let point = |i: u32| {
            let angle = i as f32 * std::f32::consts::TAU / segments as f32;
            let (sin, cos) = angle.sin_cos();
            center + (u * cos + v * sin) * radius
        };
        for i in 0..segments {
            self.draw_line(point(i), point(i + 1), color, color, depth);
        }
    }

    /// Four edges of the rectangle spanned by `min` and `max` on the plane z = `min.z`.
    pub fn draw_rectangle(&mut self, min: Vec3, max: Vec3, color: Color, depth: bool) {
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
        ];
        for i in 0..4 {
            self.draw_line(corners[i], corners[(i + 1) % 4], color, color, depth);
        }
    }

    pub fn lines(&self) -> &LineLists {
        &self.lines
    }

    /// Hand the accumulated lines to the renderer and start a new frame.
    pub fn take(&mut self) -> LineLists {
        std::mem::replace(
            &mut self.lines,
            LineLists {
                depth: Vec::with_capacity(self.capacity),
                overlay: Vec::with_capacity(self.capacity),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_has_twelve_edges() {
        let mut draw = DebugDraw::new(16);
        draw.draw_box(
            &BoundingBox::new(Vec3::ZERO, Vec3::ONE),
            Color::GREEN,
            true,
        );
        assert_eq!(draw.lines().depth.len(), 24);
        assert!(draw.lines().overlay.is_empty());
    }

    #[test]
    fn test_circle_segments() {
        let mut draw = DebugDraw::new(16);
        draw.draw_circle(Vec3::ZERO, Vec3::Y, 2.0, 32, Color::RED, false);
        assert_eq!(draw.lines().line_count(), 32);
        for vertex in &draw.lines().overlay {
            let p = Vec3::from_array(vertex.pos);
            assert!((p.length() - 2.0).abs() < 1e-4);
            assert!(p.y.abs() < 1e-5);
        }
    }

    #[test]
    fn test_take_clears() {
        let mut draw = DebugDraw::new(4);
        draw.draw_rectangle(Vec3::ZERO, Vec3::ONE, Color::WHITE, false);
        let lines = draw.take();
        assert_eq!(lines.line_count(), 4);
        assert!(draw.lines().is_empty());
    }
}
