//! Components the renderer reads from the world, and the per-type entity
//! cache rebuilt on every world-resolve event.

use std::collections::HashMap;
use std::io::{Read, Write};

use bevy_ecs::prelude::*;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::camera::{Camera, CameraMatrices};
use crate::error::{RendererError, RendererResult};
use crate::file_stream::{FileStreamReader, FileStreamWriter};
use crate::geometry::BoundingBox;
use crate::model::{ModelArena, ModelHandle};

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let forward = (target - position).normalize_or_zero();
        let rotation = if forward == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::NEG_Z, forward)
        };
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightType {
    #[default]
    Directional,
    Point,
    Spot,
}

impl LightType {
    /// Shadow map slices: cascades, cube faces or a single view.
    pub fn shadow_slice_count(self) -> u32 {
        match self {
            Self::Directional => 2,
            Self::Point => 6,
            Self::Spot => 1,
        }
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Outer cone angle in radians, spot lights only.
    pub angle: f32,
    pub shadows: bool,
    pub shadows_transparent: bool,
    pub shadows_screen_space: bool,
    pub volumetric: bool,
    pub bias: f32,
    pub normal_bias: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Directional,
            color: Vec3::ONE,
            intensity: 10.0,
            range: 10.0,
            angle: 0.5,
            shadows: true,
            shadows_transparent: true,
            shadows_screen_space: true,
            volumetric: true,
            bias: 0.0,
            normal_bias: 5.0,
        }
    }
}

impl Light {
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            ..Default::default()
        }
    }

    /// View-projection of each shadow slice.
    pub fn view_projections(&self, transform: &Transform, reverse_z: bool) -> Vec<Mat4> {
        let depth = |near: f32, far: f32| if reverse_z { (far, near) } else { (near, far) };
        match self.light_type {
            LightType::Directional => {
                let forward = transform.forward();
                let up = if forward.abs().abs_diff_eq(Vec3::Y, 1e-3) {
                    Vec3::Z
                } else {
                    Vec3::Y
                };
                [10.0f32, 50.0]
                    .into_iter()
                    .map(|extent| {
                        let eye = -forward * extent * 2.0;
                        let view = Mat4::look_to_rh(eye, forward, up);
                        let (near, far) = depth(0.0, extent * 4.0);
                        Mat4::orthographic_rh(-extent, extent, -extent, extent, near, far) * view
                    })
                    .collect()
            }
            LightType::Point => {
                let (near, far) = depth(0.3, self.range.max(0.31));
                let projection =
                    Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
                [
                    (Vec3::X, Vec3::NEG_Y),
                    (Vec3::NEG_X, Vec3::NEG_Y),
                    (Vec3::Y, Vec3::Z),
                    (Vec3::NEG_Y, Vec3::NEG_Z),
                    (Vec3::Z, Vec3::NEG_Y),
                    (Vec3::NEG_Z, Vec3::NEG_Y),
                ]
                .into_iter()
                .map(|(direction, up)| {
                    projection * Mat4::look_to_rh(transform.position, direction, up)
                })
                .collect()
            }
            LightType::Spot => {
                let (near, far) = depth(0.3, self.range.max(0.31));
                let projection = Mat4::perspective_rh(self.angle * 2.0, 1.0, near, far);
                vec![projection * Mat4::look_to_rh(transform.position, transform.forward(), transform.up())]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum GeometryType {
    #[default]
    Custom = 0,
    Cube = 1,
    Quad = 2,
    Sphere = 3,
}

impl GeometryType {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Custom),
            1 => Some(Self::Cube),
            2 => Some(Self::Quad),
            3 => Some(Self::Sphere),
            _ => None,
        }
    }
}

/// Material reference carried by a renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRef {
    pub path: String,
    pub color: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub transparent: bool,
}

impl Default for MaterialRef {
    fn default() -> Self {
        Self {
            path: String::from("standard"),
            color: [1.0; 4],
            roughness: 1.0,
            metallic: 0.0,
            transparent: false,
        }
    }
}

/// Geometry the renderer draws: a range of a model's index and vertex data.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Renderable {
    /// Resolved at runtime, not serialized.
    pub model: Option<ModelHandle>,
    pub model_path: String,
    pub geometry_type: GeometryType,
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub bounding_box: BoundingBox,
    pub material: MaterialRef,
    pub cast_shadows: bool,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            model: None,
            model_path: String::new(),
            geometry_type: GeometryType::Custom,
            index_offset: 0,
            index_count: 0,
            vertex_offset: 0,
            vertex_count: 0,
            bounding_box: BoundingBox::UNDEFINED,
            material: MaterialRef::default(),
            cast_shadows: true,
        }
    }
}

/// Fixed-size part of a serialized [`Renderable`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RenderableHeader {
    geometry_type: u32,
    index_offset: u32,
    index_count: u32,
    vertex_offset: u32,
    vertex_count: u32,
    bounding_box: BoundingBox,
    color: [f32; 4],
    roughness: f32,
    metallic: f32,
    flags: u32,
}

const FLAG_TRANSPARENT: u32 = 1 << 0;
const FLAG_CAST_SHADOWS: u32 = 1 << 1;

impl Renderable {
    pub fn is_transparent(&self) -> bool {
        self.material.transparent
    }

    /// World-space bounds under `transform`.
    pub fn world_bounds(&self, transform: &Transform) -> BoundingBox {
        self.bounding_box.transformed(&transform.matrix())
    }

    pub fn serialize(&self, writer: impl Write) -> RendererResult<()> {
        let mut stream = FileStreamWriter::new(writer);
        let mut flags = 0;
        if self.material.transparent {
            flags |= FLAG_TRANSPARENT;
        }
        if self.cast_shadows {
            flags |= FLAG_CAST_SHADOWS;
        }
        stream.write(&RenderableHeader {
            geometry_type: self.geometry_type as u32,
            index_offset: self.index_offset,
            index_count: self.index_count,
            vertex_offset: self.vertex_offset,
            vertex_count: self.vertex_count,
            bounding_box: self.bounding_box,
            color: self.material.color,
            roughness: self.material.roughness,
            metallic: self.material.metallic,
            flags,
        })?;
        stream.write_str(&self.model_path)?;
        stream.write_str(&self.material.path)?;
        stream.flush()
    }

    /// Read a renderable written by [`serialize`](Self::serialize); the model
    /// handle is left unresolved.
    pub fn deserialize(reader: impl Read) -> RendererResult<Self> {
        let mut stream = FileStreamReader::new(reader);
        let header = stream.read::<RenderableHeader>()?;
        let geometry_type = GeometryType::from_u32(header.geometry_type).ok_or_else(|| {
            RendererError::ModelFormat(format!("unknown geometry type {}", header.geometry_type))
        })?;
        let model_path = stream.read_string()?;
        let material_path = stream.read_string()?;
        Ok(Self {
            model: None,
            model_path,
            geometry_type,
            index_offset: header.index_offset,
            index_count: header.index_count,
            vertex_offset: header.vertex_offset,
            vertex_count: header.vertex_count,
            bounding_box: header.bounding_box,
            material: MaterialRef {
                path: material_path,
                color: header.color,
                roughness: header.roughness,
                metallic: header.metallic,
                transparent: header.flags & FLAG_TRANSPARENT != 0,
            },
            cast_shadows: header.flags & FLAG_CAST_SHADOWS != 0,
        })
    }

    /// Look the model up by path. Returns whether a model was found.
    pub fn resolve(&mut self, models: &ModelArena) -> bool {
        self.model = models.find_by_path(&self.model_path);
        self.model.is_some()
    }
}

/// Captures the scene into a cubemap for image based lighting.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ReflectionProbe {
    pub resolution: u32,
    pub extents: Vec3,
    /// Frames between updates; 0 updates every frame.
    pub update_interval_frames: u32,
    /// Faces rendered per update, clamped to `1..=6`.
    pub faces_per_frame: u32,
    pub plane_near: f32,
    pub plane_far: f32,
}

impl Default for ReflectionProbe {
    fn default() -> Self {
        Self {
            resolution: 512,
            extents: Vec3::ONE,
            update_interval_frames: 0,
            faces_per_frame: 1,
            plane_near: 0.3,
            plane_far: 1000.0,
        }
    }
}

/// Marks the entity the editor has selected.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Selected;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    GeometryOpaque,
    GeometryTransparent,
    Light,
    Camera,
    ReflectionProbe,
}

impl ObjectType {
    pub const ALL: [Self; 5] = [
        Self::GeometryOpaque,
        Self::GeometryTransparent,
        Self::Light,
        Self::Camera,
        Self::ReflectionProbe,
    ];
}

/// Entities grouped by what the renderer does with them.
#[derive(Debug, Default)]
pub struct EntityCache {
    entities: HashMap<ObjectType, Vec<Entity>>,
    camera: Option<Entity>,
    selected: Option<Entity>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reclassify every entity of `world`.
    pub fn rebuild(&mut self, world: &World) {
        self.clear();
        for entity in world.iter_entities() {
            let id = entity.id();
            if let Some(renderable) = entity.get::<Renderable>() {
                let ty = if renderable.is_transparent() {
                    ObjectType::GeometryTransparent
                } else {
                    ObjectType::GeometryOpaque
                };
                self.push(ty, id);
            }
            if entity.contains::<Light>() {
                self.push(ObjectType::Light, id);
            }
            if entity.contains::<Camera>() {
                self.push(ObjectType::Camera, id);
                self.camera.get_or_insert(id);
            }
            if entity.contains::<ReflectionProbe>() {
                self.push(ObjectType::ReflectionProbe, id);
            }
            if entity.contains::<Selected>() {
                self.selected = Some(id);
            }
        }
        log::debug!(
            "Entity cache rebuilt: {} opaque, {} transparent, {} lights, {} cameras, {} probes",
            self.get(ObjectType::GeometryOpaque).len(),
            self.get(ObjectType::GeometryTransparent).len(),
            self.get(ObjectType::Light).len(),
            self.get(ObjectType::Camera).len(),
            self.get(ObjectType::ReflectionProbe).len(),
        );
    }

    fn push(&mut self, ty: ObjectType, entity: Entity) {
        self.entities.entry(ty).or_default().push(entity);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.camera = None;
        self.selected = None;
    }

    pub fn get(&self, ty: ObjectType) -> &[Entity] {
        self.entities.get(&ty).map_or(&[], Vec::as_slice)
    }

    pub fn camera(&self) -> Option<Entity> {
        self.camera
    }

    pub fn selected(&self) -> Option<Entity> {
        self.selected
    }

    pub fn has_geometry(&self) -> bool {
        !self.get(ObjectType::GeometryOpaque).is_empty()
            || !self.get(ObjectType::GeometryTransparent).is_empty()
    }

    /// Sort opaque geometry front to back and transparent geometry back to
    /// front relative to the camera. Entities no longer in the world sort last.
    pub fn sort_by_depth(&mut self, world: &World, camera: &CameraMatrices) {
        let distance = |entity: Entity| {
            world
                .get::<Transform>(entity)
                .zip(world.get::<Renderable>(entity))
                .map_or(f32::MAX, |(transform, renderable)| {
                    let bounds = renderable.world_bounds(transform);
                    let center = if bounds.is_defined() {
                        bounds.center()
                    } else {
                        transform.position
                    };
                    camera.distance_squared(center)
                })
        };

        if let Some(opaque) = self.entities.get_mut(&ObjectType::GeometryOpaque) {
            opaque.sort_by(|a, b| distance(*a).total_cmp(&distance(*b)));
        }
        if let Some(transparent) = self.entities.get_mut(&ObjectType::GeometryTransparent) {
            transparent.sort_by(|a, b| distance(*b).total_cmp(&distance(*a)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use std::io::Cursor;

    fn renderable(transparent: bool) -> Renderable {
        Renderable {
            model_path: "cube".into(),
            geometry_type: GeometryType::Cube,
            index_count: 36,
            vertex_count: 24,
            bounding_box: BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            material: MaterialRef {
                transparent,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_classification() {
        let mut world = World::new();
        world.spawn((Transform::default(), renderable(false)));
        world.spawn((Transform::default(), renderable(true)));
        world.spawn((Transform::default(), Light::default()));
        let camera = world.spawn((Transform::default(), Camera::default())).id();

        let mut cache = EntityCache::new();
        cache.rebuild(&world);
        assert_eq!(cache.get(ObjectType::GeometryOpaque).len(), 1);
        assert_eq!(cache.get(ObjectType::GeometryTransparent).len(), 1);
        assert_eq!(cache.get(ObjectType::Light).len(), 1);
        assert_eq!(cache.camera(), Some(camera));
        assert!(cache.get(ObjectType::ReflectionProbe).is_empty());
    }

    #[test]
    fn test_depth_sorting() {
        let mut world = World::new();
        let far = world
            .spawn((Transform::from_position(Vec3::new(0.0, 0.0, -50.0)), renderable(false)))
            .id();
        let near = world
            .spawn((Transform::from_position(Vec3::new(0.0, 0.0, -5.0)), renderable(false)))
            .id();
        let far_t = world
            .spawn((Transform::from_position(Vec3::new(0.0, 0.0, -50.0)), renderable(true)))
            .id();
        let near_t = world
            .spawn((Transform::from_position(Vec3::new(0.0, 0.0, -5.0)), renderable(true)))
            .id();

        let mut cache = EntityCache::new();
        cache.rebuild(&world);
        let camera = CameraMatrices::compute(
            &Camera::default(),
            &Transform::default(),
            1.0,
            false,
            Vec2::ZERO,
        );
        cache.sort_by_depth(&world, &camera);
        assert_eq!(cache.get(ObjectType::GeometryOpaque), [near, far]);
        assert_eq!(cache.get(ObjectType::GeometryTransparent), [far_t, near_t]);
    }

    #[test]
    fn test_light_slices() {
        let transform = Transform::default();
        for (ty, count) in [
            (LightType::Directional, 2),
            (LightType::Point, 6),
            (LightType::Spot, 1),
        ] {
            let light = Light::new(ty);
            assert_eq!(light.view_projections(&transform, true).len(), count);
            assert_eq!(ty.shadow_slice_count() as usize, count);
        }
    }

    #[test]
    fn test_unknown_geometry_type() {
        let mut bytes = Vec::new();
        renderable(false).serialize(&mut bytes).unwrap();
        bytes[..4].copy_from_slice(&9u32.to_ne_bytes());
        assert!(Renderable::deserialize(Cursor::new(bytes)).is_err());
    }
}
