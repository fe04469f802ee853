//! Recorded command stream.
//!
//! Command lists record [`Command`]s on the CPU and hand the whole stream to the
//! backend on submit. Backends translate the stream into native API calls.

use crate::id::ObjectId;
use crate::types::{Color, ImageLayout, IndexFormat, Rect, Viewport};

/// Identifier of a queue submission, used to poll or wait for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

/// Hardware queue a submission goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Copy,
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub texture: ObjectId,
    pub array_index: u32,
    /// `None` preserves or discards contents, `Some` clears them.
    pub clear: Option<Color>,
    pub load: bool,
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    pub texture: ObjectId,
    pub array_index: u32,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u32>,
    pub load: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        name: String,
        pipeline: u64,
        color: Vec<ColorAttachment>,
        depth: Option<DepthAttachment>,
        swap_chain: Option<ObjectId>,
        viewport: Viewport,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: u64,
        compute: bool,
    },
    BindDescriptorSet {
        set: ObjectId,
        dynamic_offsets: Vec<u32>,
    },
    SetViewport(Viewport),
    SetScissor(Rect),
    SetVertexBuffer {
        buffer: ObjectId,
        stride: u32,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: ObjectId,
        format: IndexFormat,
        offset: u64,
    },
    Draw {
        vertex_count: u32,
        vertex_offset: u32,
    },
    DrawIndexed {
        index_count: u32,
        index_offset: u32,
        vertex_offset: i32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ClearRenderTarget {
        texture: ObjectId,
        color: Option<Color>,
        depth: Option<f32>,
        stencil: Option<u32>,
    },
    Blit {
        source: ObjectId,
        destination: ObjectId,
        bilinear: bool,
    },
    Copy {
        source: ObjectId,
        destination: ObjectId,
    },
    CopyToSwapChain {
        source: ObjectId,
        swap_chain: ObjectId,
        image_index: u32,
    },
    TextureBarrier {
        texture: ObjectId,
        mip_start: u32,
        mip_count: u32,
        from: ImageLayout,
        to: ImageLayout,
    },
    SwapChainBarrier {
        swap_chain: ObjectId,
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    },
    BeginMarker(String),
    EndMarker,
    Timestamp {
        query: u32,
    },
}

impl Command {
    /// Short name used in trace logs and test assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BeginRenderPass { .. } => "BeginRenderPass",
            Self::EndRenderPass => "EndRenderPass",
            Self::BindPipeline { .. } => "BindPipeline",
            Self::BindDescriptorSet { .. } => "BindDescriptorSet",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissor(_) => "SetScissor",
            Self::SetVertexBuffer { .. } => "SetVertexBuffer",
            Self::SetIndexBuffer { .. } => "SetIndexBuffer",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::Dispatch { .. } => "Dispatch",
            Self::ClearRenderTarget { .. } => "ClearRenderTarget",
            Self::Blit { .. } => "Blit",
            Self::Copy { .. } => "Copy",
            Self::CopyToSwapChain { .. } => "CopyToSwapChain",
            Self::TextureBarrier { .. } => "TextureBarrier",
            Self::SwapChainBarrier { .. } => "SwapChainBarrier",
            Self::BeginMarker(_) => "BeginMarker",
            Self::EndMarker => "EndMarker",
            Self::Timestamp { .. } => "Timestamp",
        }
    }
}
