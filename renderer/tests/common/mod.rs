//! Shared fixtures for renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use forge_renderer::{
    BoundingBox, Camera, GeometryType, Light, LightType, MaterialRef, Renderable, Renderer,
    RendererConfig, Transform,
};
use forge_rhi::{Color, Device, DeviceDescriptor, NullBackend};
use glam::Vec3;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 360;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A renderer over a null backend the test keeps a handle to.
pub struct TestRenderer {
    pub backend: Arc<NullBackend>,
    pub renderer: Renderer,
}

impl TestRenderer {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::headless(WIDTH, HEIGHT))
    }

    pub fn with_config(config: RendererConfig) -> Self {
        Self::with_descriptor(
            config,
            DeviceDescriptor {
                debug_labels: false,
                ..Default::default()
            },
        )
    }

    /// A renderer whose descriptor pool holds only `capacity` sets.
    pub fn with_descriptor_capacity(capacity: u32) -> Self {
        Self::with_descriptor(
            RendererConfig::headless(WIDTH, HEIGHT),
            DeviceDescriptor {
                descriptor_set_capacity: Some(capacity),
                debug_labels: false,
                ..Default::default()
            },
        )
    }

    pub fn with_descriptor(config: RendererConfig, descriptor: DeviceDescriptor) -> Self {
        init_logging();
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(backend.clone(), &descriptor).expect("null device");
        let renderer = Renderer::with_device(config, device).expect("renderer");
        Self { backend, renderer }
    }

    /// Resolve `world` and record one frame of it, with nothing recorded before.
    pub fn render(&mut self, world: &World) {
        self.renderer.on_world_resolved(world);
        self.backend.clear_recorded();
        self.renderer.update(1.0 / 60.0, world).expect("frame");
    }
}

/// Camera, one opaque cube and a directional light.
pub fn geometry_world() -> World {
    let mut world = World::new();
    spawn_camera(&mut world, Color::BLACK);
    spawn_cube(&mut world, Vec3::ZERO, false);
    spawn_light(&mut world, LightType::Directional);
    world
}

pub fn spawn_camera(world: &mut World, clear_color: Color) -> Entity {
    world
        .spawn((
            Camera::default().with_clear_color(clear_color),
            Transform::looking_at(Vec3::new(0.0, 2.0, -5.0), Vec3::ZERO),
        ))
        .id()
}

pub fn spawn_cube(world: &mut World, position: Vec3, transparent: bool) -> Entity {
    world
        .spawn((
            Renderable {
                geometry_type: GeometryType::Cube,
                bounding_box: BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
                material: MaterialRef {
                    transparent,
                    ..Default::default()
                },
                ..Default::default()
            },
            Transform::from_position(position),
        ))
        .id()
}

pub fn spawn_light(world: &mut World, light_type: LightType) -> Entity {
    world
        .spawn((
            Light::new(light_type),
            Transform::looking_at(Vec3::new(1.0, 4.0, 1.0), Vec3::ZERO),
        ))
        .id()
}
