//! Fixed-function state objects.
//!
//! These have no native object of their own; their ids and parameters are
//! folded into the pipeline they are used with.

use std::sync::Arc;

use crate::id::ObjectId;
use crate::types::{
    BlendFactor, BlendOperation, CompareFunction, CullMode, PolygonMode, StencilOperation,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RasterizerState {
    id: ObjectId,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub depth_clip_enabled: bool,
    pub depth_bias: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_scaled: f32,
    pub line_width: f32,
}

impl RasterizerState {
    pub fn new(cull_mode: CullMode, polygon_mode: PolygonMode, depth_clip_enabled: bool) -> Arc<Self> {
        Self::with_depth_bias(cull_mode, polygon_mode, depth_clip_enabled, 0.0, 0.0, 0.0)
    }

    pub fn with_depth_bias(
        cull_mode: CullMode,
        polygon_mode: PolygonMode,
        depth_clip_enabled: bool,
        depth_bias: f32,
        depth_bias_clamp: f32,
        depth_bias_slope_scaled: f32,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            cull_mode,
            polygon_mode,
            depth_clip_enabled,
            depth_bias,
            depth_bias_clamp,
            depth_bias_slope_scaled,
            line_width: 1.0,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendState {
    id: ObjectId,
    pub blend_enabled: bool,
    pub source_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOperation,
    pub source_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOperation,
    pub blend_factor: f32,
}

impl BlendState {
    pub fn disabled() -> Arc<Self> {
        Self::new(false, BlendFactor::One, BlendFactor::Zero, BlendOperation::Add)
    }

    /// Classic `src * a + dst * (1 - a)`.
    pub fn alpha() -> Arc<Self> {
        Self::new(
            true,
            BlendFactor::SrcAlpha,
            BlendFactor::InvSrcAlpha,
            BlendOperation::Add,
        )
    }

    pub fn additive() -> Arc<Self> {
        Self::new(true, BlendFactor::One, BlendFactor::One, BlendOperation::Add)
    }

    pub fn new(
        blend_enabled: bool,
        source_blend: BlendFactor,
        dest_blend: BlendFactor,
        blend_op: BlendOperation,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            blend_enabled,
            source_blend,
            dest_blend,
            blend_op,
            source_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::One,
            blend_op_alpha: BlendOperation::Add,
            blend_factor: 1.0,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilState {
    id: ObjectId,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_function: CompareFunction,
    pub stencil_test: bool,
    pub stencil_write: bool,
    pub stencil_function: CompareFunction,
    pub stencil_pass_op: StencilOperation,
}

impl DepthStencilState {
    pub fn new(depth_test: bool, depth_write: bool, depth_function: CompareFunction) -> Arc<Self> {
        Self::with_stencil(
            depth_test,
            depth_write,
            depth_function,
            false,
            false,
            CompareFunction::Always,
            StencilOperation::Keep,
        )
    }

    pub fn with_stencil(
        depth_test: bool,
        depth_write: bool,
        depth_function: CompareFunction,
        stencil_test: bool,
        stencil_write: bool,
        stencil_function: CompareFunction,
        stencil_pass_op: StencilOperation,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            depth_test,
            depth_write,
            depth_function,
            stencil_test,
            stencil_write,
            stencil_function,
            stencil_pass_op,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_depth_read_only(&self) -> bool {
        self.depth_test && !self.depth_write
    }
}
