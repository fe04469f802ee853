//! Pipeline state hashing, validation and the device pipeline cache.

mod common;

use rstest::rstest;

use common::TestContext;
use forge_rhi::{
    Color, LoadOp, PipelineState, PrimitiveTopology, Rect, ShaderStage, SwapChain, SwapChainTarget,
    TextureFormat, Viewport,
};

fn base() -> (TestContext, PipelineState) {
    let ctx = TestContext::new();
    let target = ctx.render_target("color", TextureFormat::Rgba16Float);
    let state = ctx.graphics_state("base", target);
    (ctx, state)
}

#[rstest]
#[case::red(Color::RED)]
#[case::black(Color::BLACK)]
#[case::custom(Color::new(0.1, 0.2, 0.3, 1.0))]
fn test_clear_color_does_not_change_hash(#[case] color: Color) {
    let (_ctx, mut state) = base();
    state.clear_color[0] = LoadOp::Clear(Color::WHITE);
    let reference = state.compute_hash();

    state.clear_color[0] = LoadOp::Clear(color);
    assert_eq!(state.compute_hash(), reference);
}

#[rstest]
#[case::dont_care_to_load(LoadOp::DontCare, LoadOp::Load)]
#[case::load_to_clear(LoadOp::Load, LoadOp::Clear(Color::BLACK))]
#[case::clear_to_dont_care(LoadOp::Clear(Color::BLACK), LoadOp::DontCare)]
fn test_load_op_class_changes_hash(#[case] before: LoadOp<Color>, #[case] after: LoadOp<Color>) {
    let (_ctx, mut state) = base();
    state.clear_color[0] = before;
    let reference = state.compute_hash();
    state.clear_color[0] = after;
    assert_ne!(state.compute_hash(), reference);
}

#[test]
fn test_viewport_is_not_hashed() {
    let (_ctx, mut state) = base();
    let reference = state.compute_hash();
    state.viewport = Viewport::new(0.0, 0.0, 320.0, 200.0);
    assert_eq!(state.compute_hash(), reference);
}

#[test]
fn test_pipeline_knobs_change_hash() {
    let (ctx, state) = base();
    let reference = state.compute_hash();

    let mut topology = state.clone();
    topology.primitive_topology = Some(PrimitiveTopology::LineList);
    assert_ne!(topology.compute_hash(), reference);

    let mut scissor = state.clone();
    scissor.dynamic_scissor = true;
    assert_ne!(scissor.compute_hash(), reference);

    let mut target = state.clone();
    target.render_target_color_textures[0] = Some(ctx.render_target("other", TextureFormat::Rgba16Float));
    assert_ne!(target.compute_hash(), reference);

    let mut depth_clear = state.clone();
    depth_clear.clear_depth = LoadOp::Clear(0.0);
    assert_ne!(depth_clear.compute_hash(), reference);

    // Static scissor rectangles are dynamic state.
    let mut rect = state;
    rect.scissor = Some(Rect::new(0, 0, 8, 8));
    assert_eq!(rect.compute_hash(), reference);
}

#[test]
fn test_validation() {
    let (ctx, state) = base();
    assert!(state.is_valid());

    let mut no_raster = state.clone();
    no_raster.rasterizer_state = None;
    assert!(!no_raster.is_valid());

    let mut no_target = state.clone();
    no_target.render_target_color_textures[0] = None;
    assert!(!no_target.is_valid());

    let swap_chain =
        SwapChain::new(&ctx.device, "main", 64, 64, TextureFormat::Bgra8Unorm, 2, true).unwrap();
    let mut both = state.clone();
    both.render_target_swapchain = Some(SwapChainTarget::of(&swap_chain));
    assert!(!both.is_valid());

    let mut swap_chain_only = no_target;
    swap_chain_only.render_target_swapchain = Some(SwapChainTarget::of(&swap_chain));
    assert!(swap_chain_only.is_valid());

    let mut compute = PipelineState::new("compute");
    compute.shader_compute = Some(ctx.shader("cs", ShaderStage::COMPUTE, Vec::new()));
    assert!(compute.is_valid());

    let mut mixed = compute;
    mixed.shader_vertex = state.shader_vertex.clone();
    assert!(!mixed.is_valid());
}

#[test]
fn test_equal_states_share_a_pipeline() {
    let (ctx, state) = base();
    let mut other = state.clone();
    other.clear_color[0] = LoadOp::DontCare;
    let mut recolored = other.clone();
    recolored.viewport = Viewport::new(0.0, 0.0, 1.0, 1.0);

    let first = ctx.device.get_or_create_pipeline(&other).unwrap();
    let second = ctx.device.get_or_create_pipeline(&recolored).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(ctx.device.pipeline_count(), 1);
    assert_eq!(ctx.backend.pipeline_count(), 1);

    ctx.device.get_or_create_pipeline(&state).unwrap();
    assert_eq!(ctx.device.pipeline_count(), 2);
}

#[test]
fn test_invalid_state_is_rejected_by_cache() {
    let (ctx, mut state) = base();
    state.blend_state = None;
    assert!(ctx.device.get_or_create_pipeline(&state).is_err());
    assert_eq!(ctx.device.pipeline_count(), 0);
}
