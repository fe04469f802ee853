//! Requests, published state and flushes from threads other than the render thread.

mod common;

use std::thread;
use std::time::Duration;

use bevy_ecs::world::World;

use common::TestRenderer;
use forge_renderer::{OptionValue, RendererError, RendererOption};
use forge_rhi::{Color, Texture, TextureDescriptor, TextureFlags, TextureFormat};
use glam::Vec3;

const MAX_FRAMES: usize = 8;

#[test]
fn test_environment_texture_from_other_thread() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();
    let texture = Texture::new(
        test.renderer.device(),
        TextureDescriptor::new_2d(
            512,
            256,
            TextureFormat::Rgba16Float,
            TextureFlags::SRV,
        )
        .with_label("environment"),
    )
    .unwrap();
    let id = texture.id();

    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            assert!(handle.is_calling_from_other_thread());
            handle.set_environment_texture(Some(texture));
        })
    };
    producer.join().unwrap();
    assert!(handle.environment_texture().is_none());
    assert_eq!(handle.pending_requests(), 1);

    let world = World::new();
    for _ in 0..MAX_FRAMES {
        test.renderer.update(1.0 / 60.0, &world).unwrap();
        if handle.environment_texture().is_some() {
            break;
        }
    }

    assert_eq!(handle.environment_texture().map(|t| t.id()), Some(id));
    assert_eq!(test.renderer.environment_texture().map(|t| t.id()), Some(id));
    assert_eq!(handle.pending_requests(), 0);
}

#[test]
fn test_option_requests_are_published() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();

    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            handle.set_option(RendererOption::SSAO, false);
            handle.set_option_value(OptionValue::Exposure, 2.5);
            handle.set_resolution_render(1024, 576);
        })
    };
    producer.join().unwrap();
    assert!(handle.get_option(RendererOption::SSAO));

    let world = World::new();
    for _ in 0..MAX_FRAMES {
        test.renderer.update(1.0 / 60.0, &world).unwrap();
        if handle.pending_requests() == 0 {
            break;
        }
    }

    assert!(!handle.get_option(RendererOption::SSAO));
    assert_eq!(handle.get_option_value(OptionValue::Exposure), 2.5);
    assert_eq!(handle.resolution_render().width, 1024);
    assert_eq!(test.renderer.resolution_render().height, 576);
}

#[test]
fn test_rejected_request_keeps_state() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();
    let previous = handle.resolution_output();

    handle.set_resolution_output(3, 3);
    test.renderer.update(1.0 / 60.0, &World::new()).unwrap();

    assert_eq!(handle.pending_requests(), 0);
    assert_eq!(handle.resolution_output(), previous);
}

#[test]
fn test_flush_from_other_thread() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();

    let waiter = {
        let handle = handle.clone();
        thread::spawn(move || handle.flush(Some(Duration::from_secs(10))))
    };

    let world = World::new();
    while !waiter.is_finished() {
        test.renderer.update(1.0 / 60.0, &world).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    assert!(waiter.join().unwrap().unwrap());
    assert!(handle.is_rendering_allowed());
}

#[test]
fn test_failed_flush_still_releases_waiter() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();
    let world = World::new();
    test.renderer.update(1.0 / 60.0, &world).unwrap();
    test.backend.set_fail_wait(true);

    let waiter = {
        let handle = handle.clone();
        thread::spawn(move || handle.flush(Some(Duration::from_secs(10))))
    };

    let mut failed = false;
    while !waiter.is_finished() {
        failed |= test.renderer.update(1.0 / 60.0, &world).is_err();
        thread::sleep(Duration::from_millis(1));
    }

    assert!(failed);
    assert!(waiter.join().unwrap().unwrap(), "waiter timed out");
    assert!(handle.is_rendering_allowed());
}

#[test]
fn test_flush_on_render_thread_rejected() {
    let test = TestRenderer::new();
    let handle = test.renderer.handle();

    assert!(!handle.is_calling_from_other_thread());
    assert!(matches!(
        handle.flush(Some(Duration::from_millis(10))),
        Err(RendererError::OnRenderThread)
    ));
}

#[test]
fn test_debug_lines_are_consumed_by_frame() {
    let mut test = TestRenderer::new();
    let handle = test.renderer.handle();
    let mut world = World::new();
    common::spawn_camera(&mut world, Color::BLACK);

    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            handle.draw_line(Vec3::ZERO, Vec3::X, Color::RED, false);
            handle.draw_line(Vec3::ZERO, Vec3::Y, Color::GREEN, true);
        })
    };
    producer.join().unwrap();
    test.render(&world);

    let stats = handle.frame_statistics();
    assert!(stats.passes.contains(&"lines_overlay"));
}
