//! The renderer: owns the device, swap chain, command pool and every GPU
//! resource the pass pipeline uses, and records one frame per [`Renderer::update`].
//!
//! All recording happens on the render thread. Other threads talk to the
//! renderer through a [`RendererHandle`], which queues [`Request`]s that the
//! render thread applies at the next command-pool wraparound.

mod passes;
mod resources;

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use bevy_ecs::world::World;
use forge_rhi::{
    Color, CommandListCounters, CommandPool, Device, Extent, SwapChain, Texture, TextureFlags,
    Viewport,
};
use glam::{Mat4, Vec3};
use parking_lot::{Mutex, RwLock};

use crate::camera::CameraMatrices;
use crate::config::RendererConfig;
use crate::debug_draw::DebugDraw;
use crate::entities::EntityCache;
use crate::error::{RendererError, RendererResult};
use crate::geometry::BoundingBox;
use crate::model::ModelArena;
use crate::options::{OptionChange, OptionValue, Options, RendererOption};
use crate::render_targets::RenderTarget;
use crate::requests::{FlushHandshake, Request, RequestQueue};
use crate::shaders::{DirectorySourceProvider, MemorySourceProvider, ShaderSourceProvider};
use crate::ui::UiDrawList;

pub use passes::{reflection_probe_faces, REFLECTION_PROBE_FACE_MODULUS};
pub use resources::ResourceCounters;
use resources::Resources;

/// What the last recorded frame did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStatistics {
    pub frame: u64,
    pub delta_time: f32,
    /// Counters of the frame's command list.
    pub counters: CommandListCounters,
    /// Passes that were recorded, in order. Skipped passes are absent.
    pub passes: Vec<&'static str>,
    /// GPU time of the last retired frame recorded on the same command list.
    pub gpu_time_ms: Option<f32>,
}

/// State readable and writable from any thread.
struct Shared {
    render_thread: RwLock<ThreadId>,
    requests: RequestQueue,
    flush: FlushHandshake,
    /// Copy of the render thread's options, republished after every change.
    options: RwLock<Options>,
    environment_texture: RwLock<Option<Arc<Texture>>>,
    resolution_render: RwLock<Extent>,
    resolution_output: RwLock<Extent>,
    debug_draw: Mutex<DebugDraw>,
    ui: Mutex<Option<UiDrawList>>,
    picking_ray: Mutex<Option<(Vec3, Vec3)>>,
    models: RwLock<ModelArena>,
    statistics: Mutex<FrameStatistics>,
}

impl Shared {
    fn is_render_thread(&self) -> bool {
        std::thread::current().id() == *self.render_thread.read()
    }
}

/// Thread-safe access to a [`Renderer`].
///
/// Mutations are queued and take effect at the render thread's next command
/// pool wraparound; reads observe the last published state.
#[derive(Clone)]
pub struct RendererHandle {
    shared: Arc<Shared>,
}

impl RendererHandle {
    pub fn is_calling_from_other_thread(&self) -> bool {
        !self.shared.is_render_thread()
    }

    fn push(&self, request: Request) {
        self.shared.requests.push(request);
    }

    pub fn set_environment_texture(&self, texture: Option<Arc<Texture>>) {
        self.push(Request::SetEnvironmentTexture(texture));
    }

    pub fn request_texture_mip_generation(&self, texture: Arc<Texture>) {
        self.push(Request::GenerateMips(texture));
    }

    pub fn set_viewport(&self, width: f32, height: f32) {
        self.push(Request::SetViewport { width, height });
    }

    pub fn set_window_size(&self, width: u32, height: u32) {
        self.push(Request::SetWindowSize { width, height });
    }

    pub fn set_resolution_render(&self, width: u32, height: u32) {
        self.push(Request::SetResolutionRender { width, height });
    }

    pub fn set_resolution_output(&self, width: u32, height: u32) {
        self.push(Request::SetResolutionOutput { width, height });
    }

    pub fn set_option(&self, option: RendererOption, enabled: bool) {
        self.push(Request::SetOption(option, enabled));
    }

    pub fn set_option_value(&self, option: OptionValue, value: f32) {
        self.push(Request::SetOptionValue(option, value));
    }

    pub fn get_option(&self, option: RendererOption) -> bool {
        self.shared.options.read().get(option)
    }

    pub fn get_option_value(&self, option: OptionValue) -> f32 {
        self.shared.options.read().value(option)
    }

    pub fn options(&self) -> Options {
        self.shared.options.read().clone()
    }

    pub fn environment_texture(&self) -> Option<Arc<Texture>> {
        self.shared.environment_texture.read().clone()
    }

    pub fn resolution_render(&self) -> Extent {
        *self.shared.resolution_render.read()
    }

    pub fn resolution_output(&self) -> Extent {
        *self.shared.resolution_output.read()
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.requests.pending_count()
    }

    pub fn frame_statistics(&self) -> FrameStatistics {
        self.shared.statistics.lock().clone()
    }

    /// Block until the render thread has drained the device queues.
    ///
    /// Returns `Ok(false)` when `timeout` elapsed first. Calling this on the
    /// render thread would deadlock and is rejected.
    pub fn flush(&self, timeout: Option<Duration>) -> RendererResult<bool> {
        if self.shared.is_render_thread() {
            return Err(RendererError::OnRenderThread);
        }
        Ok(self.shared.flush.request_and_wait(timeout))
    }

    pub fn is_rendering_allowed(&self) -> bool {
        self.shared.flush.is_rendering_allowed()
    }

    pub fn draw_line(&self, from: Vec3, to: Vec3, color: Color, depth: bool) {
        self.shared
            .debug_draw
            .lock()
            .draw_line(from, to, color, color, depth);
    }

    pub fn draw_box(&self, bounds: &BoundingBox, color: Color, depth: bool) {
        self.shared.debug_draw.lock().draw_box(bounds, color, depth);
    }

    pub fn draw_circle(
        &self,
        center: Vec3,
        axis: Vec3,
        radius: f32,
        segments: u32,
        color: Color,
        depth: bool,
    ) {
        self.shared
            .debug_draw
            .lock()
            .draw_circle(center, axis, radius, segments, color, depth);
    }

    pub fn draw_rectangle(&self, min: Vec3, max: Vec3, color: Color, depth: bool) {
        self.shared
            .debug_draw
            .lock()
            .draw_rectangle(min, max, color, depth);
    }

    /// Replace the UI drawn over the next frame.
    pub fn submit_ui(&self, list: UiDrawList) {
        *self.shared.ui.lock() = Some(list);
    }

    /// Origin and direction of the ray drawn when picking rays are enabled.
    pub fn set_picking_ray(&self, ray: Option<(Vec3, Vec3)>) {
        *self.shared.picking_ray.lock() = ray;
    }

    /// Run `f` with exclusive access to the model arena.
    pub fn with_models<R>(&self, f: impl FnOnce(&mut ModelArena) -> R) -> R {
        f(&mut self.shared.models.write())
    }
}

/// Everything the passes read and write while recording a frame.
pub(crate) struct RenderContext {
    device: Arc<Device>,
    options: Options,
    resolution_render: Extent,
    resolution_output: Extent,
    window_size: Extent,
    viewport: Viewport,
    resources: Resources,
    entities: EntityCache,
    camera: Option<CameraMatrices>,
    camera_clear_color: Color,
    view_projection_previous: Mat4,
    jitter_previous: [f32; 2],
    camera_dirty: bool,
    environment_texture: Option<Arc<Texture>>,
    environment_dirty: bool,
    mips_pending: Vec<Arc<Texture>>,
    /// Render-target generation the BRDF LUT was baked for.
    brdf_lut_generation: Option<u64>,
    last_counters: CommandListCounters,
    last_delta_time: f32,
    fullscreen: bool,
    frame: u64,
    time: f64,
    passes: Vec<&'static str>,
}

impl RenderContext {
    fn max_dimension(&self) -> u32 {
        self.device.max_texture_dimension_2d()
    }

    /// Drop pipelines and descriptor sets bound to targets, samplers or
    /// states that were just recreated.
    fn release_pipelines(&mut self) {
        if let Err(e) = self.device.queue_wait_all() {
            log::error!("Failed to wait for the GPU before releasing pipelines: {}", e);
        }
        self.device.clear_pipelines();
    }

    fn is_valid_resolution(&self, width: u32, height: u32) -> bool {
        let max = self.max_dimension();
        width > 4 && height > 4 && width <= max && height <= max
    }

    /// Snap to even dimensions, reject invalid sizes, and rebuild the
    /// resolution-dependent resources only when the size actually changed.
    fn set_resolution(
        &mut self,
        width: u32,
        height: u32,
        output: bool,
    ) -> RendererResult<bool> {
        let (width_even, height_even) = (width - width % 2, height - height % 2);
        if !self.is_valid_resolution(width_even, height_even) {
            log::warn!("{}x{} is an invalid resolution", width, height);
            return Err(RendererError::InvalidResolution { width, height });
        }

        let extent = Extent::new(width_even, height_even);
        let target = if output {
            &mut self.resolution_output
        } else {
            &mut self.resolution_render
        };
        if *target == extent {
            return Ok(false);
        }
        let previous = std::mem::replace(target, extent);

        let recreated = self
            .resources
            .create_render_textures(
                &self.device,
                self.resolution_render,
                self.resolution_output,
                &self.options,
            )
            .and_then(|()| {
                self.resources.create_samplers(
                    &self.device,
                    &self.options,
                    self.resolution_render,
                    self.resolution_output,
                )
            });
        if let Err(e) = recreated {
            log::error!("Failed to recreate resources for {}x{}: {}", width, height, e);
            if output {
                self.resolution_output = previous;
            } else {
                self.resolution_render = previous;
            }
            return Err(e.into());
        }
        self.release_pipelines();

        log::info!(
            "{} resolution set to {}x{}",
            if output { "Output" } else { "Render" },
            extent.width,
            extent.height
        );
        Ok(true)
    }

    /// Returns the options that transitioned; side effects run only for those.
    fn set_option(&mut self, option: RendererOption, enabled: bool) -> RendererOption {
        let changed = self.options.set(option, enabled);
        if changed.is_empty() {
            return changed;
        }
        log::debug!("Options changed: {:?}", changed);

        if changed.intersects(RendererOption::RECREATES_RENDER_TEXTURES) {
            if let Err(e) = self.resources.create_render_textures(
                &self.device,
                self.resolution_render,
                self.resolution_output,
                &self.options,
            ) {
                log::error!("Failed to recreate render textures: {}", e);
            }
        }
        if changed.intersects(RendererOption::RECREATES_DEPTH_STATES) {
            let reverse_z = self.options.get(RendererOption::REVERSE_Z);
            self.resources.create_depth_stencil_states(reverse_z);
            if let Err(e) = self.resources.create_samplers(
                &self.device,
                &self.options,
                self.resolution_render,
                self.resolution_output,
            ) {
                log::error!("Failed to recreate samplers: {}", e);
            }
            self.resources.invalidate_shadow_maps();
            self.camera_dirty = true;
        }
        if changed.intersects(
            RendererOption::RECREATES_RENDER_TEXTURES | RendererOption::RECREATES_DEPTH_STATES,
        ) {
            self.release_pipelines();
        }
        changed
    }

    fn set_option_value(&mut self, option: OptionValue, value: f32) -> OptionChange {
        let change = self.options.set_value(option, value);
        if let OptionChange::Changed { old, new } = change {
            log::debug!("{} changed {} -> {}", option.name(), old, new);
            match option {
                OptionValue::Anisotropy => {
                    if let Err(e) = self.resources.create_samplers(
                        &self.device,
                        &self.options,
                        self.resolution_render,
                        self.resolution_output,
                    ) {
                        log::error!("Failed to recreate samplers: {}", e);
                    }
                    self.release_pipelines();
                }
                OptionValue::ShadowResolution => {
                    self.resources.invalidate_shadow_maps();
                    self.release_pipelines();
                }
                _ => {}
            }
        }
        change
    }

    fn set_viewport(&mut self, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            log::warn!("Ignoring viewport {}x{}", width, height);
            return;
        }
        if self.viewport.width != width || self.viewport.height != height {
            self.viewport = Viewport::new(0.0, 0.0, width, height);
            self.camera_dirty = true;
        }
    }

    fn set_environment_texture(&mut self, texture: Option<Arc<Texture>>) {
        self.environment_texture = texture;
        self.environment_dirty = true;
    }

    fn request_mip_generation(&mut self, texture: Arc<Texture>) {
        let required = TextureFlags::MIPS | TextureFlags::PER_MIP_VIEWS | TextureFlags::UAV;
        if !texture.flags().contains(required) {
            log::warn!(
                "Texture '{}' needs mips, per-mip views and storage access for mip generation",
                texture.name()
            );
            return;
        }
        if texture.mip_count() < 2 {
            return;
        }
        self.mips_pending.push(texture);
    }

    fn apply(&mut self, request: Request) {
        let kind = request.kind();
        log::trace!("Applying request {}", kind);
        let result = match request {
            Request::SetEnvironmentTexture(texture) => {
                self.set_environment_texture(texture);
                Ok(())
            }
            Request::GenerateMips(texture) => {
                self.request_mip_generation(texture);
                Ok(())
            }
            Request::SetViewport { width, height } => {
                self.set_viewport(width, height);
                Ok(())
            }
            Request::SetWindowSize { width, height } => {
                self.window_size = Extent::new(width, height);
                Ok(())
            }
            Request::SetResolutionRender { width, height } => {
                self.set_resolution(width, height, false).map(drop)
            }
            Request::SetResolutionOutput { width, height } => {
                self.set_resolution(width, height, true).map(drop)
            }
            Request::SetOption(option, enabled) => {
                self.set_option(option, enabled);
                Ok(())
            }
            Request::SetOptionValue(option, value) => {
                self.set_option_value(option, value);
                Ok(())
            }
        };
        if let Err(e) = result {
            log::debug!("Request {} rejected: {}", kind, e);
        }
    }
}

/// The render-thread side of the renderer.
pub struct Renderer {
    config: RendererConfig,
    swap_chain: SwapChain,
    command_pool: CommandPool,
    ctx: RenderContext,
    shared: Arc<Shared>,
}

impl Renderer {
    /// Create the device from `config` and everything on top of it.
    ///
    /// The calling thread becomes the render thread.
    pub fn new(config: RendererConfig) -> RendererResult<Self> {
        let device = Device::new(&config.device).inspect_err(|e| {
            log::error!("Failed to create device: {}", e);
        })?;
        Self::with_device(config, device)
    }

    pub fn with_device(config: RendererConfig, device: Arc<Device>) -> RendererResult<Self> {
        let provider: Box<dyn ShaderSourceProvider> = match &config.shader_directory {
            Some(directory) => Box::new(DirectorySourceProvider::new(directory.clone())),
            None => Box::new(MemorySourceProvider::placeholders()),
        };
        Self::with_shader_provider(config, device, provider)
    }

    pub fn with_shader_provider(
        config: RendererConfig,
        device: Arc<Device>,
        provider: Box<dyn ShaderSourceProvider>,
    ) -> RendererResult<Self> {
        let mut swap_chain = SwapChain::new(
            &device,
            "swap_chain",
            config.window_size.width,
            config.window_size.height,
            config.swap_chain_format,
            config.swap_chain_buffer_count,
            config.vsync,
        )?;
        swap_chain.set_present_enabled(config.present);
        let command_pool =
            device.allocate_command_pool("renderer", swap_chain.id(), swap_chain.buffer_count())?;

        let mut options = Options::new(config.options, device.max_texture_dimension_2d());
        for (option, value) in &config.option_values {
            options.set_value(*option, *value);
        }

        let even = |extent: Extent| {
            Extent::new(extent.width - extent.width % 2, extent.height - extent.height % 2)
        };
        let resolution_render = even(config.resolution_render);
        let resolution_output = even(config.resolution_output);
        let max = device.max_texture_dimension_2d();
        for extent in [resolution_render, resolution_output] {
            if extent.width <= 4 || extent.height <= 4 || extent.width > max || extent.height > max
            {
                log::warn!("{}x{} is an invalid resolution", extent.width, extent.height);
                return Err(RendererError::InvalidResolution {
                    width: extent.width,
                    height: extent.height,
                });
            }
        }

        let resources = Resources::new(
            &device,
            &options,
            resolution_render,
            resolution_output,
            provider,
            config.compile_shaders_async,
            config.debug_line_capacity,
        )?;

        let shared = Arc::new(Shared {
            render_thread: RwLock::new(std::thread::current().id()),
            requests: RequestQueue::new(),
            flush: FlushHandshake::new(),
            options: RwLock::new(options.clone()),
            environment_texture: RwLock::new(None),
            resolution_render: RwLock::new(resolution_render),
            resolution_output: RwLock::new(resolution_output),
            debug_draw: Mutex::new(DebugDraw::new(config.debug_line_capacity)),
            ui: Mutex::new(None),
            picking_ray: Mutex::new(None),
            models: RwLock::new(ModelArena::new()),
            statistics: Mutex::new(FrameStatistics::default()),
        });

        let ctx = RenderContext {
            device: device.clone(),
            options,
            resolution_render,
            resolution_output,
            window_size: config.window_size,
            viewport: Viewport::from_extent(resolution_render),
            resources,
            entities: EntityCache::new(),
            camera: None,
            camera_clear_color: Color::BLACK,
            view_projection_previous: Mat4::IDENTITY,
            jitter_previous: [0.0; 2],
            camera_dirty: true,
            environment_texture: None,
            environment_dirty: false,
            mips_pending: Vec::new(),
            brdf_lut_generation: None,
            last_counters: CommandListCounters::default(),
            last_delta_time: 0.0,
            fullscreen: false,
            frame: 0,
            time: 0.0,
            passes: Vec::new(),
        };

        log::info!(
            "Renderer created (render {}x{}, output {}x{}, {} swap chain images)",
            resolution_render.width,
            resolution_render.height,
            resolution_output.width,
            resolution_output.height,
            swap_chain.buffer_count()
        );

        Ok(Self {
            config,
            swap_chain,
            command_pool,
            ctx,
            shared,
        })
    }

    pub fn handle(&self) -> RendererHandle {
        RendererHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.ctx.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    /// Make the calling thread the render thread, e.g. after moving the
    /// renderer onto a dedicated thread.
    pub fn bind_render_thread(&mut self) {
        *self.shared.render_thread.write() = std::thread::current().id();
    }

    pub fn is_calling_from_other_thread(&self) -> bool {
        !self.shared.is_render_thread()
    }

    fn require_render_thread(&self) -> RendererResult<()> {
        if self.is_calling_from_other_thread() {
            log::error!("Renderer used from a thread other than the render thread");
            return Err(RendererError::NotRenderThread);
        }
        Ok(())
    }

    fn publish(&self) {
        *self.shared.options.write() = self.ctx.options.clone();
        *self.shared.environment_texture.write() = self.ctx.environment_texture.clone();
        *self.shared.resolution_render.write() = self.ctx.resolution_render;
        *self.shared.resolution_output.write() = self.ctx.resolution_output;
    }

    // Frame

    /// Record, submit and present one frame of `world`.
    pub fn update(&mut self, delta_time: f32, world: &World) -> RendererResult<()> {
        self.require_render_thread()?;

        if self.shared.flush.is_requested() {
            // Waiters are released even when the flush failed.
            let flushed = self.flush();
            self.shared.flush.complete();
            flushed?;
        }

        self.resize_swap_chain()?;
        self.reclaim_descriptor_sets()?;

        if self.command_pool.update()? {
            self.ctx.resources.constant_buffers.reset_offsets();
            let ctx = &mut self.ctx;
            let applied = self.shared.requests.drain_with(|request| ctx.apply(request));
            if applied > 0 {
                log::trace!("Applied {} requests", applied);
                self.publish();
            }
        }

        let lines = self.shared.debug_draw.lock().take();
        let ui = self.shared.ui.lock().take();
        let picking_ray = *self.shared.picking_ray.lock();
        let models = self.shared.models.read();

        self.swap_chain.acquire_next_image();
        let cmd = self.command_pool.current_mut();
        let gpu_time_ms = cmd.timeblock_duration_ms(0);
        cmd.begin()?;
        cmd.begin_timeblock("frame")?;

        let frame = passes::FrameInputs {
            world,
            models: &models,
            lines,
            ui,
            picking_ray,
            delta_time,
        };
        let recorded = self.ctx.record(cmd, &mut self.swap_chain, frame);

        // The list must leave the recording state even when a pass failed.
        cmd.end_timeblock()?;
        cmd.end()?;
        cmd.submit()?;
        recorded?;

        self.ctx.last_counters = *cmd.counters();
        self.ctx.last_delta_time = delta_time;
        *self.shared.statistics.lock() = FrameStatistics {
            frame: self.ctx.frame,
            delta_time,
            counters: self.ctx.last_counters,
            passes: std::mem::take(&mut self.ctx.passes),
            gpu_time_ms,
        };
        drop(models);

        self.present()
    }

    /// Start the frame with an empty pool once three quarters of it is in use,
    /// or once sets released while recording have piled up.
    fn reclaim_descriptor_sets(&mut self) -> RendererResult<()> {
        let device = &self.ctx.device;
        let allocated = device.descriptor_sets_allocated() as u64;
        let capacity = device.descriptor_set_capacity() as u64;
        if allocated * 4 < capacity * 3 && (device.retired_descriptor_sets() as u64) < capacity {
            return Ok(());
        }
        log::debug!(
            "Descriptor pool at {}/{} sets, reclaiming",
            allocated,
            device.descriptor_set_capacity()
        );
        self.flush()?;
        self.ctx.device.clear_pipelines();
        Ok(())
    }

    fn resize_swap_chain(&mut self) -> RendererResult<()> {
        let size = self.ctx.window_size;
        let minimized = size.width == 0 || size.height == 0;
        self.swap_chain
            .set_present_enabled(self.config.present && !minimized);
        if minimized || self.swap_chain.extent() == size {
            return Ok(());
        }
        self.flush()?;
        if let Err(e) = self.swap_chain.resize(size.width, size.height) {
            log::warn!("Swap chain resize to {}x{} failed: {}", size.width, size.height, e);
            self.ctx.window_size = self.swap_chain.extent();
        }
        Ok(())
    }

    /// Present the current swap chain image, if presentation is enabled.
    pub fn present(&mut self) -> RendererResult<()> {
        if !self.swap_chain.is_present_enabled() {
            return Ok(());
        }
        self.swap_chain.present().inspect_err(|e| {
            log::error!("Present failed: {}", e);
        })?;
        Ok(())
    }

    /// Wait for all submitted work. Use [`RendererHandle::flush`] from other threads.
    pub fn flush(&mut self) -> RendererResult<()> {
        self.require_render_thread()?;
        self.command_pool.wait_all()?;
        self.ctx.device.queue_wait_all()?;
        Ok(())
    }

    // Options and resolution

    pub fn set_option(&mut self, option: RendererOption, enabled: bool) -> RendererOption {
        let changed = self.ctx.set_option(option, enabled);
        if !changed.is_empty() {
            self.publish();
        }
        changed
    }

    pub fn get_option(&self, option: RendererOption) -> bool {
        self.ctx.options.get(option)
    }

    pub fn set_option_value(&mut self, option: OptionValue, value: f32) -> OptionChange {
        let change = self.ctx.set_option_value(option, value);
        if change.changed() {
            self.publish();
        }
        change
    }

    pub fn get_option_value(&self, option: OptionValue) -> f32 {
        self.ctx.options.value(option)
    }

    pub fn options(&self) -> &Options {
        &self.ctx.options
    }

    /// Returns `Ok(true)` when the resolution changed and targets were rebuilt.
    pub fn set_resolution_render(&mut self, width: u32, height: u32) -> RendererResult<bool> {
        let changed = self.ctx.set_resolution(width, height, false)?;
        if changed {
            self.publish();
        }
        Ok(changed)
    }

    pub fn set_resolution_output(&mut self, width: u32, height: u32) -> RendererResult<bool> {
        let changed = self.ctx.set_resolution(width, height, true)?;
        if changed {
            self.publish();
        }
        Ok(changed)
    }

    pub fn resolution_render(&self) -> Extent {
        self.ctx.resolution_render
    }

    pub fn resolution_output(&self) -> Extent {
        self.ctx.resolution_output
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.ctx.set_viewport(width, height);
    }

    pub fn viewport(&self) -> Viewport {
        self.ctx.viewport
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.ctx.window_size = Extent::new(width, height);
    }

    // Resources

    pub fn frame_texture(&self) -> Option<&Arc<Texture>> {
        self.render_target(RenderTarget::FrameOutput)
    }

    pub fn render_target(&self, target: RenderTarget) -> Option<&Arc<Texture>> {
        self.ctx.resources.render_targets.get(target)
    }

    pub fn set_environment_texture(&mut self, texture: Option<Arc<Texture>>) {
        self.ctx.set_environment_texture(texture);
        self.publish();
    }

    pub fn environment_texture(&self) -> Option<&Arc<Texture>> {
        self.ctx.environment_texture.as_ref()
    }

    /// Queue `texture` for mip generation during the next frame.
    pub fn request_texture_mip_generation(&mut self, texture: Arc<Texture>) {
        self.ctx.request_mip_generation(texture);
    }

    pub fn pending_mip_generations(&self) -> usize {
        self.ctx.mips_pending.len()
    }

    pub fn resource_counters(&self) -> ResourceCounters {
        self.ctx.resources.counters
    }

    pub fn shaders_compiled(&self) -> usize {
        self.ctx.resources.shaders.compiled_count()
    }

    /// Recompile every shader from its source.
    pub fn reload_shaders(&mut self) {
        self.ctx.resources.shaders.reload_all();
    }

    pub fn frame_number(&self) -> u64 {
        self.ctx.frame
    }

    pub fn time(&self) -> f64 {
        self.ctx.time
    }

    pub fn frame_statistics(&self) -> FrameStatistics {
        self.shared.statistics.lock().clone()
    }

    pub fn camera(&self) -> Option<&CameraMatrices> {
        self.ctx.camera.as_ref()
    }

    pub fn entities(&self) -> &EntityCache {
        &self.ctx.entities
    }

    pub fn is_fullscreen(&self) -> bool {
        self.ctx.fullscreen
    }

    // Debug primitives

    pub fn draw_line(&self, from: Vec3, to: Vec3, color: Color, depth: bool) {
        self.handle().draw_line(from, to, color, depth);
    }

    pub fn draw_box(&self, bounds: &BoundingBox, color: Color, depth: bool) {
        self.handle().draw_box(bounds, color, depth);
    }

    pub fn draw_circle(
        &self,
        center: Vec3,
        axis: Vec3,
        radius: f32,
        segments: u32,
        color: Color,
        depth: bool,
    ) {
        self.handle()
            .draw_circle(center, axis, radius, segments, color, depth);
    }

    pub fn draw_rectangle(&self, min: Vec3, max: Vec3, color: Color, depth: bool) {
        self.handle().draw_rectangle(min, max, color, depth);
    }

    // World events

    /// Reclassify the world's entities and drop resources of removed ones.
    pub fn on_world_resolved(&mut self, world: &World) {
        self.ctx.entities.rebuild(world);
        self.ctx
            .resources
            .retain_entities(|entity| world.entities().contains(entity));
        for probe in self.ctx.resources.probes.values_mut() {
            probe.dirty = true;
        }
        self.ctx.camera_dirty = true;
    }

    /// The world is about to be cleared: wait for the GPU and forget every
    /// entity reference.
    pub fn on_world_pre_clear(&mut self) -> RendererResult<()> {
        self.flush()?;
        self.ctx.entities.clear();
        self.ctx.resources.shadow_maps.clear();
        self.ctx.resources.probes.clear();
        self.ctx.camera = None;
        Ok(())
    }

    /// A freshly loaded world needs every shadow map and probe re-rendered.
    pub fn on_world_load_end(&mut self) {
        self.ctx.resources.invalidate_shadow_maps();
        for probe in self.ctx.resources.probes.values_mut() {
            probe.dirty = true;
        }
    }

    pub fn on_fullscreen_toggled(&mut self, fullscreen: bool) {
        if self.ctx.fullscreen != fullscreen {
            log::debug!("Fullscreen {}", if fullscreen { "on" } else { "off" });
            self.ctx.fullscreen = fullscreen;
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.command_pool.discard_all();
        if let Err(e) = self.ctx.device.queue_wait_all() {
            log::error!("Failed to drain queues on shutdown: {}", e);
        }
    }
}
