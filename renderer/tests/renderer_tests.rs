//! Frame recording, options and resolution handling over the null backend.

mod common;

use std::io::Cursor;

use bevy_ecs::world::World;
use rstest::rstest;

use common::{
    geometry_world, spawn_camera, spawn_cube, spawn_light, TestRenderer, HEIGHT, WIDTH,
};
use forge_renderer::{
    GeometryType, LightType, MaterialRef, OptionChange, OptionValue, RenderTarget, Renderable,
    RendererConfig, RendererError, RendererOption,
};
use forge_rhi::{Color, Command, Texture, TextureDescriptor, TextureFlags, TextureFormat};
use glam::Vec3;

fn clears(commands: &[Command]) -> Vec<Command> {
    commands
        .iter()
        .filter(|command| matches!(command, Command::ClearRenderTarget { .. }))
        .cloned()
        .collect()
}

#[test]
fn test_empty_scene_clears_to_camera_color() {
    let mut test = TestRenderer::new();
    let clear_color = Color::new(0.1, 0.2, 0.3, 1.0);
    let mut world = World::new();
    spawn_camera(&mut world, clear_color);

    test.render(&world);

    let output = test.renderer.frame_texture().expect("frame output").id();
    let clears = clears(&test.backend.commands());
    assert_eq!(clears.len(), 1, "unexpected clears: {clears:?}");
    match &clears[0] {
        Command::ClearRenderTarget { texture, color, .. } => {
            assert_eq!(*texture, output);
            assert_eq!(*color, Some(clear_color));
        }
        other => panic!("unexpected command {other:?}"),
    }

    let stats = test.renderer.frame_statistics();
    assert!(stats.passes.contains(&"clear"));
    assert!(!stats.passes.contains(&"gbuffer"));
    assert!(!stats.passes.contains(&"light"));
}

#[test]
fn test_no_camera_clears_to_black() {
    let mut test = TestRenderer::new();
    let mut world = World::new();
    spawn_cube(&mut world, Vec3::ZERO, false);

    test.render(&world);

    let output = test.renderer.frame_texture().expect("frame output").id();
    let clears = clears(&test.backend.commands());
    assert_eq!(clears.len(), 1);
    assert!(matches!(
        &clears[0],
        Command::ClearRenderTarget { texture, color: Some(color), .. }
            if *texture == output && *color == Color::BLACK
    ));
    assert!(test.renderer.camera().is_none());
}

#[test]
fn test_geometry_scene_runs_deferred_pipeline() {
    let mut test = TestRenderer::new();
    let mut world = World::new();
    spawn_camera(&mut world, Color::BLACK);
    spawn_cube(&mut world, Vec3::ZERO, false);
    spawn_light(&mut world, LightType::Directional);

    test.render(&world);

    let stats = test.renderer.frame_statistics();
    for pass in ["shadow_map", "gbuffer", "light", "light_composition", "tone_mapping_gamma"] {
        assert!(stats.passes.contains(&pass), "missing {pass} in {:?}", stats.passes);
    }
    assert!(!stats.passes.contains(&"gbuffer_transparent"));
    assert!(stats.counters.draw_calls > 0);
    assert_eq!(stats.frame, 1);

    let gbuffer = stats.passes.iter().position(|p| *p == "gbuffer");
    let tone_mapping = stats.passes.iter().position(|p| *p == "tone_mapping_gamma");
    assert!(gbuffer < tone_mapping);
}

#[test]
fn test_transparent_geometry_gets_second_pass() {
    let mut test = TestRenderer::new();
    let mut world = World::new();
    spawn_camera(&mut world, Color::BLACK);
    spawn_cube(&mut world, Vec3::ZERO, false);
    spawn_cube(&mut world, Vec3::new(0.0, 0.0, 2.0), true);
    spawn_light(&mut world, LightType::Point);

    test.render(&world);

    let stats = test.renderer.frame_statistics();
    assert!(stats.passes.contains(&"frame_opaque_blit"));
    assert!(stats.passes.contains(&"gbuffer_transparent"));
    assert!(stats.passes.contains(&"light_composition_transparent"));
}

#[test]
fn test_fullscreen_copies_to_swap_chain() {
    let mut test = TestRenderer::new();
    let mut world = World::new();
    spawn_camera(&mut world, Color::BLACK);
    test.renderer.on_fullscreen_toggled(true);

    test.render(&world);

    let stats = test.renderer.frame_statistics();
    assert!(stats.passes.contains(&"copy_to_swap_chain"));
    assert!(!stats.passes.contains(&"frame_to_swap_chain"));
    assert!(test
        .backend
        .commands()
        .iter()
        .any(|command| matches!(command, Command::CopyToSwapChain { .. })));
}

#[test]
fn test_option_side_effects_run_once() {
    let mut test = TestRenderer::new();
    let renderer = &mut test.renderer;
    let before = renderer.resource_counters();

    let changed = renderer.set_option(RendererOption::UPSAMPLE_TAA, true);
    assert!(changed.contains(RendererOption::UPSAMPLE_TAA));
    let after_first = renderer.resource_counters();
    assert_eq!(
        after_first.render_textures_created,
        before.render_textures_created + 1
    );

    assert!(renderer.set_option(RendererOption::UPSAMPLE_TAA, true).is_empty());
    assert_eq!(renderer.resource_counters(), after_first);
}

#[test]
fn test_reverse_z_rebuilds_depth_state() {
    let mut test = TestRenderer::new();
    let renderer = &mut test.renderer;
    assert!(renderer.get_option(RendererOption::REVERSE_Z));
    let before = renderer.resource_counters();

    renderer.set_option(RendererOption::REVERSE_Z, false);
    let after = renderer.resource_counters();
    assert_eq!(
        after.depth_stencil_states_created,
        before.depth_stencil_states_created + 1
    );
    assert_eq!(after.samplers_created, before.samplers_created + 1);
    assert_eq!(after.shadow_maps_invalidated, before.shadow_maps_invalidated + 1);
    assert_eq!(after.render_textures_created, before.render_textures_created);
}

#[test]
fn test_option_value_changes() {
    let mut test = TestRenderer::new();
    let renderer = &mut test.renderer;
    let before = renderer.resource_counters();

    assert!(renderer.set_option_value(OptionValue::Anisotropy, 4.0).changed());
    assert_eq!(
        renderer.set_option_value(OptionValue::Anisotropy, 4.0),
        OptionChange::Unchanged
    );
    assert_eq!(
        renderer.resource_counters().samplers_created,
        before.samplers_created + 1
    );
}

#[test]
fn test_resolution_snaps_to_even() {
    let mut test = TestRenderer::new();
    let renderer = &mut test.renderer;

    assert!(renderer.set_resolution_render(1920, 1080).unwrap());
    let counters = renderer.resource_counters();
    assert!(!renderer.set_resolution_render(1921, 1081).unwrap());
    assert_eq!(renderer.resource_counters(), counters);
    assert_eq!(renderer.resolution_render().width, 1920);
    assert_eq!(renderer.resolution_render().height, 1080);

    let gbuffer = renderer
        .render_target(RenderTarget::GbufferAlbedo)
        .expect("gbuffer");
    assert_eq!(gbuffer.width(), 1920);
}

/// Render one frame and check the pipeline and descriptor caches against
/// the first frame's size.
fn update_bounded(
    test: &mut TestRenderer,
    world: &World,
    frame: usize,
    baseline: &mut Option<usize>,
) {
    test.renderer
        .update(1.0 / 60.0, world)
        .unwrap_or_else(|e| panic!("frame {frame} failed: {e}"));

    let device = test.renderer.device();
    let pipelines = device.pipeline_count();
    let bound = *baseline.get_or_insert(pipelines);
    assert!(
        pipelines <= bound + bound / 2,
        "frame {frame}: {pipelines} pipelines, first frame had {bound}"
    );
    assert_eq!(test.backend.pipeline_count(), pipelines);
    assert!(device.descriptor_sets_allocated() <= device.descriptor_set_capacity());
}

#[test]
fn test_resolution_changes_release_pipelines() {
    let mut test = TestRenderer::with_descriptor_capacity(512);
    let world = geometry_world();
    test.render(&world);

    let mut baseline = None;
    for frame in 0..120 {
        let width = if frame % 2 == 0 { WIDTH + 2 } else { WIDTH };
        assert!(test.renderer.set_resolution_render(width, HEIGHT).unwrap());
        assert!(test.renderer.set_resolution_output(width, HEIGHT).unwrap());
        update_bounded(&mut test, &world, frame, &mut baseline);
    }
    assert!(test.renderer.frame_statistics().passes.contains(&"gbuffer"));
}

#[test]
fn test_option_changes_release_pipelines() {
    let mut test = TestRenderer::with_descriptor_capacity(512);
    let world = geometry_world();
    test.render(&world);

    let mut baseline = None;
    for frame in 0..100 {
        let option = if frame % 2 == 0 {
            RendererOption::UPSAMPLE_TAA
        } else {
            RendererOption::REVERSE_Z
        };
        let enabled = !test.renderer.get_option(option);
        assert!(!test.renderer.set_option(option, enabled).is_empty());
        update_bounded(&mut test, &world, frame, &mut baseline);
    }
}

#[test]
fn test_small_descriptor_pool_recovers() {
    let mut test = TestRenderer::with_descriptor_capacity(16);
    let world = geometry_world();
    test.renderer.on_world_resolved(&world);

    for frame in 0..20 {
        test.renderer
            .update(1.0 / 60.0, &world)
            .unwrap_or_else(|e| panic!("frame {frame} failed: {e}"));
        let device = test.renderer.device();
        assert!(device.descriptor_sets_allocated() <= 16);
    }
    let passes = test.renderer.frame_statistics().passes;
    for pass in ["gbuffer", "light", "tone_mapping_gamma"] {
        assert!(passes.contains(&pass), "missing {pass} in {passes:?}");
    }
}

#[rstest]
#[case::too_small(4, 720)]
#[case::zero_height(1280, 0)]
#[case::too_large(40_000, 720)]
fn test_invalid_resolution_rejected(#[case] width: u32, #[case] height: u32) {
    let mut test = TestRenderer::new();
    let renderer = &mut test.renderer;
    let previous = renderer.resolution_output();
    let counters = renderer.resource_counters();

    let result = renderer.set_resolution_output(width, height);
    assert!(matches!(result, Err(RendererError::InvalidResolution { .. })));
    assert_eq!(renderer.resolution_output(), previous);
    assert_eq!(renderer.resource_counters(), counters);
}

#[test]
fn test_invalid_initial_resolution() {
    common::init_logging();
    let result = forge_renderer::Renderer::with_device(
        RendererConfig::headless(2, 2),
        forge_rhi::Device::with_backend(
            std::sync::Arc::new(forge_rhi::NullBackend::new()),
            &Default::default(),
        )
        .unwrap(),
    );
    assert!(matches!(result, Err(RendererError::InvalidResolution { .. })));
}

#[test]
fn test_mip_generation_request() {
    let mut test = TestRenderer::new();
    let texture = Texture::new(
        test.renderer.device(),
        TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::Rgba8Unorm,
            TextureFlags::SRV | TextureFlags::UAV | TextureFlags::PER_MIP_VIEWS,
        )
        .with_mips(4)
        .with_label("albedo"),
    )
    .unwrap();

    test.renderer.request_texture_mip_generation(texture);
    assert_eq!(test.renderer.pending_mip_generations(), 1);

    test.render(&World::new());

    assert_eq!(test.renderer.pending_mip_generations(), 0);
    assert_eq!(test.renderer.resource_counters().mips_generated, 1);
    assert!(test
        .renderer
        .frame_statistics()
        .passes
        .contains(&"generate_mips"));
}

#[test]
fn test_mip_generation_needs_storage_views() {
    let mut test = TestRenderer::new();
    let texture = Texture::new(
        test.renderer.device(),
        TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureFlags::SRV)
            .with_mips(3),
    )
    .unwrap();

    test.renderer.request_texture_mip_generation(texture);
    assert_eq!(test.renderer.pending_mip_generations(), 0);
}

#[test]
fn test_renderable_stream_round_trip() {
    let renderable = Renderable {
        model_path: String::from("models/crate.fmdl"),
        geometry_type: GeometryType::Custom,
        index_offset: 36,
        index_count: 120,
        vertex_offset: 24,
        vertex_count: 80,
        material: MaterialRef {
            path: String::from("materials/wood"),
            color: [0.5, 0.4, 0.3, 1.0],
            roughness: 0.7,
            metallic: 0.1,
            transparent: true,
        },
        cast_shadows: false,
        ..Default::default()
    };

    let mut bytes = Vec::new();
    renderable.serialize(&mut bytes).unwrap();
    let loaded = Renderable::deserialize(Cursor::new(bytes)).unwrap();

    assert_eq!(loaded, renderable);
    assert!(loaded.model.is_none());
}

#[test]
fn test_world_pre_clear_forgets_entities() {
    let mut test = TestRenderer::new();
    let mut world = World::new();
    spawn_camera(&mut world, Color::BLACK);
    spawn_cube(&mut world, Vec3::ZERO, false);
    spawn_light(&mut world, LightType::Spot);
    test.render(&world);
    assert!(test.renderer.camera().is_some());

    test.renderer.on_world_pre_clear().unwrap();
    assert!(test.renderer.camera().is_none());
    assert!(!test.renderer.entities().has_geometry());

    world.clear_entities();
    test.render(&world);
    assert!(test.renderer.frame_statistics().passes.contains(&"clear"));
}
