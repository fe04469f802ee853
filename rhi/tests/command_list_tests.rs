//! Command list state machine, descriptor binding and pool cycling.

mod common;

use std::thread;
use std::time::Duration;

use rstest::rstest;

use common::TestContext;
use forge_rhi::{
    Command, CommandList, CommandListState, CompilationState, ConstantBuffer, DeviceDescriptor,
    NullObjectKind, ObjectId, QueueType, Shader, ShaderDescriptor, ShaderStage, TextureFormat,
};

#[test]
fn test_wait_blocks_until_signalled() {
    let ctx = TestContext::new();
    ctx.backend.set_auto_complete(false);

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    cmd.end().unwrap();
    cmd.submit().unwrap();
    assert!(cmd.is_executing());

    let submission = cmd.submission().unwrap();
    let backend = ctx.backend.clone();
    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        backend.signal(submission);
    });

    cmd.wait().unwrap();
    assert_eq!(cmd.state(), CommandListState::Idle);
    assert!(!cmd.is_executing());
    signaller.join().unwrap();
}

#[rstest]
#[case::end_from_idle(CommandListState::Idle)]
#[case::submit_while_recording(CommandListState::Recording)]
#[case::begin_when_ended(CommandListState::Ended)]
fn test_invalid_transitions_keep_state(#[case] start: CommandListState) {
    let ctx = TestContext::new();
    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    if start != CommandListState::Idle {
        cmd.begin().unwrap();
    }
    if start == CommandListState::Ended {
        cmd.end().unwrap();
    }

    let result = match start {
        CommandListState::Idle => cmd.end(),
        CommandListState::Recording => cmd.submit(),
        _ => cmd.begin(),
    };
    assert!(result.is_err());
    assert_eq!(cmd.state(), start);
}

#[test]
fn test_reset_returns_to_idle_from_any_state() {
    let ctx = TestContext::new();
    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    cmd.reset().unwrap();
    assert_eq!(cmd.state(), CommandListState::Idle);

    cmd.begin().unwrap();
    cmd.end().unwrap();
    cmd.submit().unwrap();
    cmd.reset().unwrap();
    assert_eq!(cmd.state(), CommandListState::Idle);
}

#[test]
fn test_render_pass_skipped_while_shader_compiling() {
    let ctx = TestContext::new();
    let target = ctx.render_target("color", TextureFormat::Rgba8Unorm);
    let mut state = ctx.graphics_state("pending", target);
    state.shader_pixel = Some(Shader::new(
        &ctx.device,
        ShaderDescriptor::new("pending_ps", ShaderStage::PIXEL, "// pending"),
    ));
    assert_eq!(
        state.shader_pixel.as_ref().unwrap().compilation_state(),
        CompilationState::Idle
    );

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    assert!(!cmd.begin_render_pass(&state).unwrap());
    assert!(cmd.commands().is_empty());
    assert_eq!(ctx.device.pipeline_count(), 0);
}

#[test]
fn test_identical_bindings_reuse_descriptor_set() {
    let ctx = TestContext::new();
    let target = ctx.render_target("color", TextureFormat::Rgba8Unorm);
    let albedo = ctx.render_target("albedo", TextureFormat::Rgba8Unorm);
    let state = ctx.graphics_state("lit", target);
    let mut frame = ConstantBuffer::new(&ctx.device, "frame", 64, 4).unwrap();
    frame.update(&[1.0f32; 16]).unwrap();

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    assert!(cmd.begin_render_pass(&state).unwrap());
    cmd.set_constant_buffer(0, &frame).unwrap();
    cmd.set_texture(1, &albedo).unwrap();
    cmd.draw(3, 0).unwrap();

    // Same resources again: no new bind.
    cmd.set_constant_buffer(0, &frame).unwrap();
    cmd.set_texture(1, &albedo).unwrap();
    cmd.draw(3, 0).unwrap();
    cmd.end_render_pass();
    cmd.end().unwrap();

    let counters = *cmd.counters();
    assert_eq!(counters.draw_calls, 2);
    assert_eq!(counters.descriptor_set_binds, 1);
    assert_eq!(counters.render_passes, 1);

    let binds = cmd
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::BindDescriptorSet { .. }))
        .count();
    assert_eq!(binds, 1);
}

#[test]
fn test_exhausted_pool_reset_while_recording() {
    let ctx = TestContext::with_descriptor(DeviceDescriptor {
        descriptor_set_capacity: Some(1),
        debug_labels: false,
        ..Default::default()
    });
    let target = ctx.render_target("color", TextureFormat::Rgba8Unorm);
    let first = ctx.render_target("first", TextureFormat::Rgba8Unorm);
    let second = ctx.render_target("second", TextureFormat::Rgba8Unorm);
    let state = ctx.graphics_state("lit", target);
    let mut frame = ConstantBuffer::new(&ctx.device, "frame", 64, 4).unwrap();
    frame.update(&[1.0f32; 16]).unwrap();

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    assert!(cmd.begin_render_pass(&state).unwrap());
    cmd.set_constant_buffer(0, &frame).unwrap();
    cmd.set_texture(1, &first).unwrap();
    cmd.draw(3, 0).unwrap();
    cmd.set_texture(1, &second).unwrap();
    cmd.draw(3, 0).unwrap();
    cmd.end_render_pass();
    cmd.end().unwrap();

    assert_eq!(cmd.counters().descriptor_set_binds, 2);
    assert_eq!(ctx.device.descriptor_sets_allocated(), 1);
    assert_eq!(ctx.backend.created_count(NullObjectKind::DescriptorSet), 2);
}

#[test]
fn test_clear_pipelines_releases_sets() {
    let ctx = TestContext::new();
    let target = ctx.render_target("color", TextureFormat::Rgba8Unorm);
    let albedo = ctx.render_target("albedo", TextureFormat::Rgba8Unorm);
    let state = ctx.graphics_state("lit", target);
    let mut frame = ConstantBuffer::new(&ctx.device, "frame", 64, 4).unwrap();
    frame.update(&[1.0f32; 16]).unwrap();

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    assert!(cmd.begin_render_pass(&state).unwrap());
    cmd.set_constant_buffer(0, &frame).unwrap();
    cmd.set_texture(1, &albedo).unwrap();
    cmd.draw(3, 0).unwrap();
    cmd.end_render_pass();
    cmd.end().unwrap();
    cmd.submit().unwrap();
    cmd.wait().unwrap();
    assert_eq!(ctx.device.descriptor_sets_allocated(), 1);

    assert_eq!(ctx.device.clear_pipelines(), 1);
    assert_eq!(ctx.device.pipeline_count(), 0);
    assert_eq!(ctx.backend.pipeline_count(), 0);
    assert_eq!(ctx.device.descriptor_sets_allocated(), 0);
    assert_eq!(ctx.backend.live_count(NullObjectKind::DescriptorSet), 0);
}

#[test]
fn test_render_pass_transitions_targets() {
    let ctx = TestContext::new();
    let target = ctx.render_target("color", TextureFormat::Rgba8Unorm);
    let state = ctx.graphics_state("lit", target.clone());

    let mut cmd = CommandList::new(ctx.device.clone(), "frame", QueueType::Graphics);
    cmd.begin().unwrap();
    assert!(cmd.begin_render_pass(&state).unwrap());
    assert!(target.is_in_layout(forge_rhi::ImageLayout::ColorAttachment, 0, 1));

    let kinds: Vec<&str> = cmd.commands().iter().map(Command::kind).collect();
    let barrier = kinds.iter().position(|k| *k == "TextureBarrier").unwrap();
    let pass = kinds.iter().position(|k| *k == "BeginRenderPass").unwrap();
    assert!(barrier < pass);
}

#[test]
fn test_pool_cycles_and_resets() {
    let ctx = TestContext::new();
    let mut pool = ctx
        .device
        .allocate_command_pool("frames", ObjectId::new(), 3)
        .unwrap();

    let mut wraps = 0;
    for _ in 0..7 {
        if pool.update().unwrap() {
            wraps += 1;
        }
        let cmd = pool.current_mut();
        assert_eq!(cmd.state(), CommandListState::Idle);
        cmd.begin().unwrap();
        cmd.end().unwrap();
        cmd.submit().unwrap();
    }
    // Updates 1, 4 and 7 wrap.
    assert_eq!(wraps, 3);
    assert_eq!(ctx.backend.submissions().len(), 7);
}
