//! Command lists: the submission state machine and the recording API every
//! pass uses.
//!
//! ```text
//! Idle --begin--> Recording --end--> Ended --submit--> Submitted --wait/reset--> Idle
//! ```
//!
//! Transitions out of order return [`RhiError::InvalidState`] and leave the
//! list untouched. [`CommandList::discard`] makes a later `wait` return without
//! blocking.

use std::sync::Arc;

use crate::command::{ColorAttachment, Command, DepthAttachment, QueueType, SubmissionId};
use crate::descriptor::MipSelection;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::pipeline::Pipeline;
use crate::pipeline_state::PipelineState;
use crate::resources::{ConstantBuffer, IndexBuffer, Sampler, StructuredBuffer, Texture, VertexBuffer};
use crate::swap_chain::SwapChain;
use crate::types::{Color, ImageLayout, LoadOp, Rect, TextureFlags, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    Idle,
    Recording,
    Ended,
    Submitted,
}

impl CommandListState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Recording => "Recording",
            Self::Ended => "Ended",
            Self::Submitted => "Submitted",
        }
    }
}

/// Per-list profiling counters, reset by `begin`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandListCounters {
    pub draw_calls: u32,
    pub dispatches: u32,
    pub pipeline_binds: u32,
    pub descriptor_set_binds: u32,
    pub render_passes: u32,
    pub clears: u32,
    pub barriers: u32,
}

impl CommandListCounters {
    pub fn accumulate(&mut self, other: &Self) {
        self.draw_calls += other.draw_calls;
        self.dispatches += other.dispatches;
        self.pipeline_binds += other.pipeline_binds;
        self.descriptor_set_binds += other.descriptor_set_binds;
        self.render_passes += other.render_passes;
        self.clears += other.clears;
        self.barriers += other.barriers;
    }
}

/// A named GPU time range delimited by two timestamp queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBlock {
    pub name: String,
    pub start_query: u32,
    pub end_query: Option<u32>,
}

pub struct CommandList {
    device: Arc<Device>,
    name: String,
    queue: QueueType,
    state: CommandListState,
    discard: bool,
    commands: Vec<Command>,
    submission: Option<SubmissionId>,
    pipeline: Option<Arc<Pipeline>>,
    render_pass_active: bool,
    marker_open: bool,
    counters: CommandListCounters,
    time_blocks: Vec<TimeBlock>,
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("discard", &self.discard)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl CommandList {
    pub fn new(device: Arc<Device>, name: impl Into<String>, queue: QueueType) -> Self {
        Self {
            device,
            name: name.into(),
            queue,
            state: CommandListState::Idle,
            discard: false,
            commands: Vec::new(),
            submission: None,
            pipeline: None,
            render_pass_active: false,
            marker_open: false,
            counters: CommandListCounters::default(),
            time_blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn counters(&self) -> &CommandListCounters {
        &self.counters
    }

    /// Commands recorded since `begin` and not yet submitted.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn submission(&self) -> Option<SubmissionId> {
        self.submission
    }

    pub fn is_discarded(&self) -> bool {
        self.discard
    }

    pub fn is_render_pass_active(&self) -> bool {
        self.render_pass_active
    }

    pub fn time_blocks(&self) -> &[TimeBlock] {
        &self.time_blocks
    }

    fn require(&self, expected: CommandListState) -> RhiResult<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = RhiError::InvalidState {
            expected: expected.name(),
            actual: self.state.name(),
        };
        log::error!("Command list '{}': {}", self.name, err);
        Err(err)
    }

    // State machine

    pub fn begin(&mut self) -> RhiResult<()> {
        self.require(CommandListState::Idle)?;
        self.commands.clear();
        self.counters = CommandListCounters::default();
        self.time_blocks.clear();
        self.pipeline = None;
        self.state = CommandListState::Recording;
        Ok(())
    }

    pub fn end(&mut self) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.end_render_pass();
        self.state = CommandListState::Ended;
        Ok(())
    }

    pub fn submit(&mut self) -> RhiResult<()> {
        self.require(CommandListState::Ended)?;
        let commands = std::mem::take(&mut self.commands);
        match self.device.submit(self.queue, commands) {
            Ok(submission) => {
                self.submission = Some(submission);
                self.state = CommandListState::Submitted;
                Ok(())
            }
            Err(e) => {
                log::error!("Command list '{}' failed to submit: {}", self.name, e);
                self.state = CommandListState::Idle;
                Err(e)
            }
        }
    }

    /// Block until the submitted work retires, then return to `Idle`.
    ///
    /// Returns immediately for discarded lists.
    pub fn wait(&mut self) -> RhiResult<()> {
        self.require(CommandListState::Submitted)?;
        if !self.discard {
            if let Some(submission) = self.submission {
                self.device.wait_submission(submission)?;
            }
        }
        self.submission = None;
        self.discard = false;
        self.state = CommandListState::Idle;
        Ok(())
    }

    /// Treat outstanding work as unrecoverable: a later `wait` will not block.
    pub fn discard(&mut self) {
        self.discard = true;
    }

    /// Submitted and not yet retired.
    pub fn is_executing(&self) -> bool {
        self.state == CommandListState::Submitted
            && self
                .submission
                .is_some_and(|s| !self.device.is_submission_complete(s))
    }

    /// Return to `Idle` from any state, waiting for in-flight work unless discarded.
    pub fn reset(&mut self) -> RhiResult<()> {
        if self.state == CommandListState::Submitted {
            self.wait()?;
        }
        self.commands.clear();
        self.pipeline = None;
        self.render_pass_active = false;
        self.marker_open = false;
        self.discard = false;
        self.state = CommandListState::Idle;
        Ok(())
    }

    // Render passes

    /// Bind `state` and, for graphics, begin its render pass.
    ///
    /// Returns `Ok(false)` when the pass should be skipped this frame: the state
    /// is incomplete or one of its shaders is still compiling.
    pub fn begin_render_pass(&mut self, state: &PipelineState) -> RhiResult<bool> {
        self.require(CommandListState::Recording)?;

        if let Err(reason) = state.validate() {
            log::trace!("Skipping '{}': {}", state.name, reason);
            return Ok(false);
        }
        if !state.shaders_compiled() {
            log::trace!("Skipping '{}': shaders not compiled", state.name);
            return Ok(false);
        }

        self.end_render_pass();
        let pipeline = self.device.get_or_create_pipeline(state)?;
        self.bind_pipeline(pipeline);

        if state.is_compute() {
            return Ok(true);
        }

        if self.device.debug_labels() {
            self.commands.push(Command::BeginMarker(state.name.to_string()));
            self.marker_open = true;
        }

        let mut color = Vec::new();
        for (texture, clear) in state
            .render_target_color_textures
            .iter()
            .zip(state.clear_color.iter())
        {
            let Some(texture) = texture else { continue };
            texture.set_layout(ImageLayout::ColorAttachment, self, Some((0, 1)))?;
            color.push(ColorAttachment {
                texture: texture.id(),
                array_index: state.render_target_color_array_index,
                clear: clear.clear_value().copied(),
                load: matches!(clear, LoadOp::Load),
            });
        }

        let mut depth = None;
        if let Some(texture) = &state.render_target_depth_texture {
            let read_only = state
                .depth_stencil_state
                .as_ref()
                .is_some_and(|s| s.is_depth_read_only());
            let layout = if read_only {
                ImageLayout::DepthStencilReadOnly
            } else {
                ImageLayout::DepthAttachment
            };
            texture.set_layout(layout, self, Some((0, 1)))?;
            depth = Some(DepthAttachment {
                texture: texture.id(),
                array_index: state.render_target_depth_array_index,
                clear_depth: state.clear_depth.clear_value().copied(),
                clear_stencil: state.clear_stencil.clear_value().copied(),
                load: matches!(state.clear_depth, LoadOp::Load),
                read_only,
            });
        }

        let viewport = if state.viewport.width > 0.0 && state.viewport.height > 0.0 {
            state.viewport
        } else {
            state
                .render_target_extent()
                .map(Viewport::from_extent)
                .unwrap_or_default()
        };

        self.commands.push(Command::BeginRenderPass {
            name: state.name.to_string(),
            pipeline: state.compute_hash(),
            color,
            depth,
            swap_chain: state.render_target_swapchain.map(|s| s.id),
            viewport,
        });
        if let Some(scissor) = state.scissor {
            self.commands.push(Command::SetScissor(scissor));
        }
        self.render_pass_active = true;
        self.counters.render_passes += 1;
        Ok(true)
    }

    pub fn end_render_pass(&mut self) {
        if self.render_pass_active {
            self.commands.push(Command::EndRenderPass);
            self.render_pass_active = false;
        }
        if self.marker_open {
            self.commands.push(Command::EndMarker);
            self.marker_open = false;
        }
    }

    fn bind_pipeline(&mut self, pipeline: Arc<Pipeline>) {
        if self
            .pipeline
            .as_ref()
            .is_some_and(|current| current.hash() == pipeline.hash())
        {
            return;
        }
        pipeline.descriptor_set_layout().lock().mark_needs_to_bind();
        self.commands.push(Command::BindPipeline {
            pipeline: pipeline.hash(),
            compute: pipeline.is_compute(),
        });
        self.counters.pipeline_binds += 1;
        self.pipeline = Some(pipeline);
    }

    fn bind_descriptor_set_if_needed(&mut self) -> RhiResult<()> {
        let Some(pipeline) = self.pipeline.clone() else {
            return Err(RhiError::InvalidState {
                expected: "pipeline bound",
                actual: "no pipeline",
            });
        };
        let mut layout = pipeline.descriptor_set_layout().lock();
        if layout.descriptors().is_empty() || !layout.needs_to_bind() {
            return Ok(());
        }
        let set = match layout.get_descriptor_set(&self.device) {
            Err(RhiError::DescriptorPoolExhausted { capacity }) => {
                drop(layout);
                log::warn!("Descriptor pool exhausted ({} sets), resetting", capacity);
                self.device.reset_descriptor_sets();
                layout = pipeline.descriptor_set_layout().lock();
                layout.get_descriptor_set(&self.device)?
            }
            result => result?,
        };
        let dynamic_offsets = layout.dynamic_offsets();
        drop(layout);

        self.commands.push(Command::BindDescriptorSet {
            set: set.id(),
            dynamic_offsets,
        });
        self.counters.descriptor_set_binds += 1;
        Ok(())
    }

    // Dynamic state

    pub fn set_viewport(&mut self, viewport: Viewport) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::SetViewport(viewport));
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: Rect) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::SetScissor(scissor));
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, buffer: &VertexBuffer) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::SetVertexBuffer {
            buffer: buffer.id(),
            stride: buffer.stride(),
            offset: 0,
        });
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &IndexBuffer) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::SetIndexBuffer {
            buffer: buffer.id(),
            format: buffer.format(),
            offset: 0,
        });
        Ok(())
    }

    // Resource bindings, routed to the bound pipeline's layout

    fn with_layout<R>(
        &self,
        f: impl FnOnce(&mut crate::descriptor::DescriptorSetLayout) -> R,
    ) -> Option<R> {
        match &self.pipeline {
            Some(pipeline) => Some(f(&mut pipeline.descriptor_set_layout().lock())),
            None => {
                log::trace!("Command list '{}': binding with no pipeline", self.name);
                None
            }
        }
    }

    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &ConstantBuffer) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.with_layout(|layout| layout.set_constant_buffer(slot, buffer));
        Ok(())
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: &Sampler) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.with_layout(|layout| layout.set_sampler(slot, sampler));
        Ok(())
    }

    pub fn set_structured_buffer(&mut self, slot: u32, buffer: &StructuredBuffer) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.with_layout(|layout| layout.set_structured_buffer(slot, buffer));
        Ok(())
    }

    /// Bind a texture for sampling, transitioning it to a readable layout.
    pub fn set_texture(&mut self, slot: u32, texture: &Texture) -> RhiResult<()> {
        self.set_texture_mips(slot, texture, None)
    }

    pub fn set_texture_mips(&mut self, slot: u32, texture: &Texture, mips: MipSelection) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        let layout = if texture.is_depth_stencil() {
            ImageLayout::DepthStencilReadOnly
        } else {
            ImageLayout::ShaderReadOnly
        };
        texture.set_layout(layout, self, mips)?;
        self.with_layout(|l| l.set_texture(slot, texture, mips))
            .transpose()?;
        Ok(())
    }

    /// Bind a texture for compute writes.
    pub fn set_texture_storage(&mut self, slot: u32, texture: &Texture, mips: MipSelection) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        if !texture.is_uav() {
            return Err(RhiError::InvalidArgument(format!(
                "texture '{}' was not created with UAV access",
                texture.name()
            )));
        }
        texture.set_layout(ImageLayout::General, self, mips)?;
        self.with_layout(|l| l.set_texture(slot, texture, mips))
            .transpose()?;
        Ok(())
    }

    // Work

    pub fn draw(&mut self, vertex_count: u32, vertex_offset: u32) -> RhiResult<()> {
        self.require_render_pass()?;
        self.bind_descriptor_set_if_needed()?;
        self.commands.push(Command::Draw {
            vertex_count,
            vertex_offset,
        });
        self.counters.draw_calls += 1;
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32, index_offset: u32, vertex_offset: i32) -> RhiResult<()> {
        self.require_render_pass()?;
        self.bind_descriptor_set_if_needed()?;
        self.commands.push(Command::DrawIndexed {
            index_count,
            index_offset,
            vertex_offset,
        });
        self.counters.draw_calls += 1;
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        if !self.pipeline.as_ref().is_some_and(|p| p.is_compute()) {
            return Err(RhiError::InvalidState {
                expected: "compute pipeline",
                actual: "graphics or no pipeline",
            });
        }
        self.bind_descriptor_set_if_needed()?;
        self.commands.push(Command::Dispatch { x, y, z });
        self.counters.dispatches += 1;
        Ok(())
    }

    /// Dispatch enough 8x8 groups to cover `texture`'s `mip`.
    pub fn dispatch_for(&mut self, texture: &Texture, mip: u32) -> RhiResult<()> {
        const GROUP_SIZE: u32 = 8;
        let extent = texture.mip_extent(mip);
        self.dispatch(
            extent.width.div_ceil(GROUP_SIZE),
            extent.height.div_ceil(GROUP_SIZE),
            1,
        )
    }

    fn require_render_pass(&self) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        if !self.render_pass_active {
            return Err(RhiError::InvalidState {
                expected: "render pass active",
                actual: "no render pass",
            });
        }
        Ok(())
    }

    /// Clear a render target outside of a render pass.
    pub fn clear_render_target(
        &mut self,
        texture: &Texture,
        color: Option<Color>,
        depth: Option<f32>,
        stencil: Option<u32>,
    ) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        let clearable = TextureFlags::RENDER_TARGET
            | TextureFlags::DEPTH_STENCIL
            | TextureFlags::CLEAR_OR_BLIT
            | TextureFlags::UAV;
        if !texture.flags().intersects(clearable) {
            return Err(RhiError::InvalidArgument(format!(
                "texture '{}' cannot be cleared",
                texture.name()
            )));
        }
        self.end_render_pass();

        let layout = if texture.is_depth_stencil() {
            ImageLayout::DepthAttachment
        } else {
            ImageLayout::TransferDestination
        };
        texture.set_layout(layout, self, None)?;
        self.commands.push(Command::ClearRenderTarget {
            texture: texture.id(),
            color,
            depth,
            stencil,
        });
        self.counters.clears += 1;
        Ok(())
    }

    /// Scaled copy between textures of the same format.
    pub fn blit(&mut self, source: &Texture, destination: &Texture, bilinear: bool) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        if source.format() != destination.format() {
            return Err(RhiError::InvalidArgument(format!(
                "blit format mismatch: '{}' is {:?}, '{}' is {:?}",
                source.name(),
                source.format(),
                destination.name(),
                destination.format()
            )));
        }
        self.transfer(source, destination)?;
        self.commands.push(Command::Blit {
            source: source.id(),
            destination: destination.id(),
            bilinear,
        });
        Ok(())
    }

    /// Exact copy between textures of identical size and format.
    pub fn copy(&mut self, source: &Texture, destination: &Texture) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        if source.format() != destination.format() || source.extent() != destination.extent() {
            return Err(RhiError::InvalidArgument(format!(
                "copy mismatch: '{}' {:?} {:?}, '{}' {:?} {:?}",
                source.name(),
                source.extent(),
                source.format(),
                destination.name(),
                destination.extent(),
                destination.format()
            )));
        }
        self.transfer(source, destination)?;
        self.commands.push(Command::Copy {
            source: source.id(),
            destination: destination.id(),
        });
        Ok(())
    }

    fn transfer(&mut self, source: &Texture, destination: &Texture) -> RhiResult<()> {
        self.end_render_pass();
        source.set_layout(ImageLayout::TransferSource, self, None)?;
        destination.set_layout(ImageLayout::TransferDestination, self, None)?;
        Ok(())
    }

    /// Copy a texture into the current swap chain image and leave it ready to present.
    pub fn copy_to_swap_chain(&mut self, source: &Texture, swap_chain: &mut SwapChain) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.end_render_pass();
        source.set_layout(ImageLayout::TransferSource, self, None)?;
        swap_chain.set_layout(ImageLayout::TransferDestination, self)?;
        self.commands.push(Command::CopyToSwapChain {
            source: source.id(),
            swap_chain: swap_chain.id(),
            image_index: swap_chain.image_index(),
        });
        swap_chain.set_layout(ImageLayout::PresentSource, self)
    }

    pub fn insert_texture_barrier(
        &mut self,
        texture: ObjectId,
        mip_start: u32,
        mip_count: u32,
        from: ImageLayout,
        to: ImageLayout,
    ) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::TextureBarrier {
            texture,
            mip_start,
            mip_count,
            from,
            to,
        });
        self.counters.barriers += 1;
        Ok(())
    }

    pub fn insert_swap_chain_barrier(
        &mut self,
        swap_chain: ObjectId,
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    ) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        self.commands.push(Command::SwapChainBarrier {
            swap_chain,
            image_index,
            from,
            to,
        });
        self.counters.barriers += 1;
        Ok(())
    }

    // Markers and timing

    pub fn begin_marker(&mut self, name: &str) {
        if self.state == CommandListState::Recording && self.device.debug_labels() {
            self.commands.push(Command::BeginMarker(name.to_string()));
        }
    }

    pub fn end_marker(&mut self) {
        if self.state == CommandListState::Recording && self.device.debug_labels() {
            self.commands.push(Command::EndMarker);
        }
    }

    /// Open a GPU time block; returns its index in [`time_blocks`](Self::time_blocks).
    pub fn begin_timeblock(&mut self, name: &str) -> RhiResult<usize> {
        self.require(CommandListState::Recording)?;
        let query = self.device.allocate_query();
        self.commands.push(Command::Timestamp { query });
        self.time_blocks.push(TimeBlock {
            name: name.to_string(),
            start_query: query,
            end_query: None,
        });
        self.begin_marker(name);
        Ok(self.time_blocks.len() - 1)
    }

    /// Close the most recently opened time block.
    pub fn end_timeblock(&mut self) -> RhiResult<()> {
        self.require(CommandListState::Recording)?;
        let Some(index) = self.time_blocks.iter().rposition(|b| b.end_query.is_none()) else {
            return Err(RhiError::InvalidState {
                expected: "open time block",
                actual: "none open",
            });
        };
        self.end_marker();
        let query = self.device.allocate_query();
        self.commands.push(Command::Timestamp { query });
        self.time_blocks[index].end_query = Some(query);
        Ok(())
    }

    /// Duration of a closed time block once its submission retired.
    pub fn timeblock_duration_ms(&self, index: usize) -> Option<f32> {
        let block = self.time_blocks.get(index)?;
        self.device
            .timestamp_delta_ms(block.start_query, block.end_query?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::device::DeviceDescriptor;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn setup() -> (Arc<NullBackend>, Arc<Device>) {
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(backend.clone(), &DeviceDescriptor::default()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_state_machine_happy_path() {
        let (_backend, device) = setup();
        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        cmd.begin().unwrap();
        assert_eq!(cmd.state(), CommandListState::Recording);
        cmd.end().unwrap();
        assert_eq!(cmd.state(), CommandListState::Ended);
        cmd.submit().unwrap();
        assert_eq!(cmd.state(), CommandListState::Submitted);
        cmd.wait().unwrap();
        assert_eq!(cmd.state(), CommandListState::Idle);
    }

    #[test]
    fn test_out_of_order_transitions_fail() {
        let (_backend, device) = setup();
        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        assert!(cmd.end().is_err());
        assert!(cmd.submit().is_err());
        assert!(cmd.wait().is_err());
        assert_eq!(cmd.state(), CommandListState::Idle);

        cmd.begin().unwrap();
        assert!(cmd.begin().is_err());
        assert!(cmd.submit().is_err());
    }

    #[test]
    fn test_discard_skips_wait() {
        let (backend, device) = setup();
        backend.set_auto_complete(false);
        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        cmd.begin().unwrap();
        cmd.end().unwrap();
        cmd.submit().unwrap();
        assert!(cmd.is_executing());
        cmd.discard();
        cmd.wait().unwrap();
        assert_eq!(cmd.state(), CommandListState::Idle);
    }

    #[test]
    fn test_clear_and_blit_validation() {
        let (backend, device) = setup();
        let flags = TextureFlags::RENDER_TARGET | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT;
        let a = Texture::new(
            &device,
            TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba16Float, flags),
        )
        .unwrap();
        let b = Texture::new(
            &device,
            TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, flags),
        )
        .unwrap();
        let c = Texture::new(
            &device,
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba16Float, flags),
        )
        .unwrap();

        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        cmd.begin().unwrap();
        cmd.clear_render_target(&a, Some(Color::BLACK), None, None)
            .unwrap();
        assert!(cmd.blit(&a, &b, true).is_err());
        assert!(cmd.copy(&a, &c).is_err());
        cmd.blit(&a, &c, true).unwrap();
        assert_eq!(cmd.counters().clears, 1);
        cmd.end().unwrap();
        cmd.submit().unwrap();

        let clears = backend
            .commands()
            .iter()
            .filter(|c| c.kind() == "ClearRenderTarget")
            .count();
        assert_eq!(clears, 1);
    }

    #[test]
    fn test_draw_requires_render_pass() {
        let (_backend, device) = setup();
        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        cmd.begin().unwrap();
        assert!(cmd.draw(3, 0).is_err());
        assert!(cmd.dispatch(1, 1, 1).is_err());
    }

    #[test]
    fn test_timeblocks() {
        let (_backend, device) = setup();
        let mut cmd = CommandList::new(device, "test", QueueType::Graphics);
        cmd.begin().unwrap();
        let index = cmd.begin_timeblock("frame").unwrap();
        cmd.end_timeblock().unwrap();
        assert!(cmd.end_timeblock().is_err());
        cmd.end().unwrap();
        cmd.submit().unwrap();
        cmd.wait().unwrap();
        assert!(cmd.timeblock_duration_ms(index).is_some());
    }
}
