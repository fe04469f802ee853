//! Built-in meshes and bounding volumes.

use bytemuck::{Pod, Zeroable};
use forge_rhi::VertexPosTexNorTan;
use glam::{Mat4, Vec2, Vec3};

/// Axis-aligned bounding box.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl BoundingBox {
    /// Inverted box that any merge replaces.
    pub const UNDEFINED: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_vertices(vertices: &[VertexPosTexNorTan]) -> Self {
        vertices.iter().fold(Self::UNDEFINED, |bounds, vertex| {
            bounds.merge_point(Vec3::from_array(vertex.pos))
        })
    }

    pub fn is_defined(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn merge_point(self, point: Vec3) -> Self {
        Self::new(self.min.min(point), self.max.max(point))
    }

    pub fn merge(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, b.z),
            Vec3::new(a.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after `transform`.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        if !self.is_defined() {
            return *self;
        }
        self.corners()
            .into_iter()
            .fold(Self::UNDEFINED, |bounds, corner| {
                bounds.merge_point(transform.transform_point3(corner))
            })
    }
}

/// CPU-side vertices and indices of a generated mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<VertexPosTexNorTan>,
    pub indices: Vec<u32>,
}

fn vertex(position: Vec3, uv: Vec2, normal: Vec3, tangent: Vec3) -> VertexPosTexNorTan {
    VertexPosTexNorTan::new(
        position.to_array(),
        uv.to_array(),
        normal.to_array(),
        tangent.to_array(),
    )
}

/// Unit cube centered at the origin, four vertices per face.
pub fn cube() -> MeshData {
    let faces = [
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
    ];

    let mut mesh = MeshData::default();
    for (face, (normal, tangent)) in faces.into_iter().enumerate() {
        let bitangent = normal.cross(tangent);
        let corners = [
            (Vec2::new(-0.5, -0.5), Vec2::new(0.0, 1.0)),
            (Vec2::new(0.5, -0.5), Vec2::new(1.0, 1.0)),
            (Vec2::new(0.5, 0.5), Vec2::new(1.0, 0.0)),
            (Vec2::new(-0.5, 0.5), Vec2::new(0.0, 0.0)),
        ];
        for (offset, uv) in corners {
            let position = normal * 0.5 + tangent * offset.x + bitangent * offset.y;
            mesh.vertices.push(vertex(position, uv, normal, tangent));
        }
        let base = face as u32 * 4;
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Unit quad on the XZ plane facing +Y.
pub fn quad() -> MeshData {
    let positions = [
        (Vec3::new(-0.5, 0.0, 0.5), Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, 0.0, 0.5), Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, 0.0, -0.5), Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, 0.0, -0.5), Vec2::new(0.0, 0.0)),
    ];
    MeshData {
        vertices: positions
            .into_iter()
            .map(|(position, uv)| vertex(position, uv, Vec3::Y, Vec3::X))
            .collect(),
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// UV sphere of diameter one.
pub fn sphere(segments: u32, rings: u32) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let segment_angle = std::f32::consts::TAU / segments as f32;
    let ring_angle = std::f32::consts::PI / rings as f32;

    let mut mesh = MeshData::default();
    for ring in 0..=rings {
        let phi = ring as f32 * ring_angle;
        let (ring_radius, y) = phi.sin_cos();
        for segment in 0..=segments {
            let theta = segment as f32 * segment_angle;
            let (sin, cos) = theta.sin_cos();
            let normal = Vec3::new(ring_radius * cos, y, ring_radius * sin).normalize_or_zero();
            let uv = Vec2::new(
                segment as f32 / segments as f32,
                ring as f32 / rings as f32,
            );
            mesh.vertices
                .push(vertex(normal * 0.5, uv, normal, Vec3::new(-sin, 0.0, cos)));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            mesh.indices.extend_from_slice(&[
                current,
                next,
                current + 1,
                current + 1,
                next,
                next + 1,
            ]);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_bounds() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        let bounds = BoundingBox::from_vertices(&mesh.vertices);
        assert_eq!(bounds.min, Vec3::splat(-0.5));
        assert_eq!(bounds.max, Vec3::splat(0.5));
    }

    #[test]
    fn test_sphere_indices_in_range() {
        let mesh = sphere(16, 8);
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|i| *i < count));
    }

    #[test]
    fn test_transformed_bounds() {
        let bounds = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = bounds.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(10.0, 0.0, 0.0));
        assert!(!BoundingBox::UNDEFINED.is_defined());
    }
}
