//! Headless wgpu backend.
//!
//! Creates real textures, buffers, samplers and shader modules and replays the
//! parts of a command stream wgpu can express without a native pipeline
//! translation: render-pass load/clear, clears, copies and swap chain copies.
//! Draws and dispatches are skipped and logged at `trace`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::command::{ColorAttachment, Command, DepthAttachment, QueueType, SubmissionId};
use crate::descriptor::Descriptor;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::pipeline_state::PipelineState;
use crate::resources::{ShaderDescriptor, TextureSlice};
use crate::types::{
    AddressMode, BufferDescriptor, BufferUsage, Color, CompareFunction, FilterMode,
    SamplerDescriptor, TextureDescriptor, TextureFlags, TextureFormat,
};

use super::{BackendType, DeviceLimits, PhysicalDevice, PhysicalDeviceType, RhiBackend};

const SWAP_CHAIN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

struct TextureEntry {
    texture: wgpu::Texture,
    descriptor: TextureDescriptor,
}

#[derive(Default)]
struct Objects {
    textures: HashMap<ObjectId, TextureEntry>,
    buffers: HashMap<ObjectId, wgpu::Buffer>,
    samplers: HashMap<ObjectId, wgpu::Sampler>,
    shaders: HashMap<ObjectId, wgpu::ShaderModule>,
    swap_chains: HashMap<ObjectId, Vec<wgpu::Texture>>,
    descriptor_sets: HashSet<ObjectId>,
    pipelines: HashSet<u64>,
    submissions: HashMap<SubmissionId, wgpu::SubmissionIndex>,
    timestamps: HashMap<u32, u64>,
}

/// wgpu backend without a surface; swap chains are offscreen textures.
pub struct WgpuBackend {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    objects: Mutex<Objects>,
    completed: Arc<Mutex<HashSet<SubmissionId>>>,
    next_submission: AtomicU64,
    epoch: Instant,
}

impl WgpuBackend {
    pub fn new() -> RhiResult<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> RhiResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RhiError::DeviceCreationFailed("no wgpu adapter found".into()))?;

        let info = adapter.get_info();
        log::info!("Found adapter: {} ({:?} backend)", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Forge RHI Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RhiError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self {
            adapter,
            device,
            queue,
            objects: Mutex::new(Objects::default()),
            completed: Arc::new(Mutex::new(HashSet::new())),
            next_submission: AtomicU64::new(1),
            epoch: Instant::now(),
        })
    }

    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
            TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Rgb10a2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
            TextureFormat::R11g11b10Float => wgpu::TextureFormat::Rg11b10Float,
            // 16-bit normalized formats need an optional feature.
            TextureFormat::Rgba16Snorm | TextureFormat::Rgba16Float => {
                wgpu::TextureFormat::Rgba16Float
            }
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::D16Unorm => wgpu::TextureFormat::Depth16Unorm,
            TextureFormat::D32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::D32FloatS8X24Uint => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    fn supports_storage(format: TextureFormat) -> bool {
        matches!(
            format,
            TextureFormat::R32Float
                | TextureFormat::Rg32Float
                | TextureFormat::Rgba8Unorm
                | TextureFormat::Rgba16Float
                | TextureFormat::Rgba32Float
        )
    }

    fn convert_texture_usage(descriptor: &TextureDescriptor) -> wgpu::TextureUsages {
        let mut usage = wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::TEXTURE_BINDING;
        if descriptor
            .flags
            .intersects(TextureFlags::RENDER_TARGET | TextureFlags::DEPTH_STENCIL)
        {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if descriptor.flags.contains(TextureFlags::UAV) && Self::supports_storage(descriptor.format)
        {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        usage
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::COPY_DST;
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::CONSTANT) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        if usage.contains(BufferUsage::STRUCTURED) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        result
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
            AddressMode::Border => wgpu::AddressMode::ClampToBorder,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_color(color: Color) -> wgpu::Color {
        wgpu::Color {
            r: color.r as f64,
            g: color.g as f64,
            b: color.b as f64,
            a: color.a as f64,
        }
    }

    fn attachment_view(entry: &TextureEntry, array_index: u32) -> wgpu::TextureView {
        entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: entry.descriptor.label.as_deref(),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: array_index,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    fn encode_pass(
        encoder: &mut wgpu::CommandEncoder,
        objects: &Objects,
        name: &str,
        color: &[ColorAttachment],
        depth: Option<&DepthAttachment>,
    ) {
        let color_views: Vec<wgpu::TextureView> = color
            .iter()
            .filter_map(|a| {
                objects
                    .textures
                    .get(&a.texture)
                    .map(|entry| Self::attachment_view(entry, a.array_index))
            })
            .collect();
        let depth_entry = depth.and_then(|d| objects.textures.get(&d.texture).map(|e| (d, e)));
        let depth_view = depth_entry.map(|(d, entry)| Self::attachment_view(entry, d.array_index));

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color
            .iter()
            .zip(color_views.iter())
            .map(|(attachment, view)| {
                let load = match attachment.clear {
                    Some(c) => wgpu::LoadOp::Clear(Self::convert_color(c)),
                    None => wgpu::LoadOp::Load,
                };
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth_stencil_attachment = match (depth_entry, depth_view.as_ref()) {
            (Some((attachment, entry)), Some(view)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match attachment.clear_depth {
                        Some(d) => wgpu::LoadOp::Clear(d),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: entry.descriptor.format.has_stencil().then(|| wgpu::Operations {
                    load: match attachment.clear_stencil {
                        Some(s) => wgpu::LoadOp::Clear(s),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
            }),
            _ => None,
        };

        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(name),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn encode_copy(
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        destination: &wgpu::Texture,
    ) {
        let size = wgpu::Extent3d {
            width: source.width().min(destination.width()),
            height: source.height().min(destination.height()),
            depth_or_array_layers: 1,
        };
        encoder.copy_texture_to_texture(
            source.as_image_copy(),
            destination.as_image_copy(),
            size,
        );
    }

    fn encode(&self, objects: &mut Objects, commands: &[Command]) -> wgpu::CommandBuffer {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Forge") });
        let now = self.epoch.elapsed().as_nanos() as u64;

        for command in commands {
            match command {
                Command::BeginRenderPass {
                    name, color, depth, ..
                } => Self::encode_pass(&mut encoder, objects, name, color, depth.as_ref()),
                Command::ClearRenderTarget {
                    texture,
                    color,
                    depth,
                    stencil,
                } => {
                    let Some(entry) = objects.textures.get(texture) else { continue };
                    if !entry
                        .texture
                        .usage()
                        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
                    {
                        log::trace!("wgpu: clear of non-attachment texture {} skipped", texture);
                        continue;
                    }
                    if entry.descriptor.format.is_depth() {
                        let attachment = DepthAttachment {
                            texture: *texture,
                            array_index: 0,
                            clear_depth: depth.or(Some(0.0)),
                            clear_stencil: *stencil,
                            load: false,
                            read_only: false,
                        };
                        Self::encode_pass(&mut encoder, objects, "clear", &[], Some(&attachment));
                    } else {
                        let attachment = ColorAttachment {
                            texture: *texture,
                            array_index: 0,
                            clear: Some(color.unwrap_or(Color::TRANSPARENT)),
                            load: false,
                        };
                        Self::encode_pass(&mut encoder, objects, "clear", &[attachment], None);
                    }
                }
                Command::Copy {
                    source,
                    destination,
                }
                | Command::Blit {
                    source,
                    destination,
                    ..
                } => {
                    if let (Some(src), Some(dst)) =
                        (objects.textures.get(source), objects.textures.get(destination))
                    {
                        if src.texture.size() == dst.texture.size() {
                            Self::encode_copy(&mut encoder, &src.texture, &dst.texture);
                        } else {
                            log::trace!("wgpu: scaled blit {} -> {} skipped", source, destination);
                        }
                    }
                }
                Command::CopyToSwapChain {
                    source,
                    swap_chain,
                    image_index,
                } => {
                    let src = objects.textures.get(source);
                    let dst = objects
                        .swap_chains
                        .get(swap_chain)
                        .and_then(|images| images.get(*image_index as usize));
                    match (src, dst) {
                        (Some(src), Some(dst))
                            if src.texture.format() == SWAP_CHAIN_FORMAT =>
                        {
                            Self::encode_copy(&mut encoder, &src.texture, dst)
                        }
                        _ => log::trace!("wgpu: swap chain copy from {} skipped", source),
                    }
                }
                Command::Timestamp { query } => {
                    objects.timestamps.insert(*query, now);
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } | Command::Dispatch { .. } => {
                    log::trace!("wgpu: {} skipped", command.kind());
                }
                _ => {}
            }
        }

        encoder.finish()
    }
}

impl RhiBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Wgpu
    }

    fn enumerate_physical_devices(&self) -> Vec<PhysicalDevice> {
        let info = self.adapter.get_info();
        let device_type = match info.device_type {
            wgpu::DeviceType::IntegratedGpu => PhysicalDeviceType::Integrated,
            wgpu::DeviceType::DiscreteGpu => PhysicalDeviceType::Discrete,
            wgpu::DeviceType::VirtualGpu => PhysicalDeviceType::Virtual,
            wgpu::DeviceType::Cpu => PhysicalDeviceType::Cpu,
            wgpu::DeviceType::Other => PhysicalDeviceType::Other,
        };
        vec![PhysicalDevice {
            vendor_id: info.vendor,
            name: info.name,
            // wgpu does not report dedicated memory.
            memory_mb: 0,
            driver_version: info.driver_info,
            device_type,
            native_handle: info.device as u64,
        }]
    }

    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_render_targets: limits.max_color_attachments,
            min_constant_buffer_alignment: limits.min_uniform_buffer_offset_alignment as u64,
            ..Default::default()
        }
    }

    fn create_texture(
        &self,
        id: ObjectId,
        descriptor: &TextureDescriptor,
        slices: &[TextureSlice],
    ) -> RhiResult<()> {
        let format = Self::convert_texture_format(descriptor.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: descriptor.array_length.max(1),
            },
            mip_level_count: descriptor.mip_count.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: Self::convert_texture_usage(descriptor),
            view_formats: &[],
        });

        if !descriptor.format.is_depth() {
            let bpp = descriptor.format.bytes_per_pixel();
            for (layer, slice) in slices.iter().enumerate() {
                for (mip, data) in slice.mips.iter().enumerate() {
                    let width = (descriptor.width >> mip).max(1);
                    let height = (descriptor.height >> mip).max(1);
                    self.queue.write_texture(
                        wgpu::ImageCopyTexture {
                            texture: &texture,
                            mip_level: mip as u32,
                            origin: wgpu::Origin3d {
                                x: 0,
                                y: 0,
                                z: layer as u32,
                            },
                            aspect: wgpu::TextureAspect::All,
                        },
                        data,
                        wgpu::ImageDataLayout {
                            offset: 0,
                            bytes_per_row: Some(width * bpp),
                            rows_per_image: Some(height),
                        },
                        wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
            }
        }

        self.objects.lock().textures.insert(
            id,
            TextureEntry {
                texture,
                descriptor: descriptor.clone(),
            },
        );
        Ok(())
    }

    fn create_buffer(
        &self,
        id: ObjectId,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> RhiResult<()> {
        let usage = Self::convert_buffer_usage(descriptor.usage);
        let buffer = match data {
            Some(contents) => self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: descriptor.label.as_deref(),
                    contents,
                    usage,
                }),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
                usage,
                mapped_at_creation: false,
            }),
        };
        self.objects.lock().buffers.insert(id, buffer);
        Ok(())
    }

    fn write_buffer(&self, id: ObjectId, offset: u64, data: &[u8]) -> RhiResult<()> {
        let objects = self.objects.lock();
        let buffer = objects
            .buffers
            .get(&id)
            .ok_or_else(|| RhiError::Backend(format!("unknown buffer {id}")))?;

        let padded_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if offset + padded_len > buffer.size() {
            return Err(RhiError::InvalidArgument(format!(
                "write of {} bytes at {} overflows buffer {}",
                data.len(),
                offset,
                id
            )));
        }
        if padded_len == data.len() as u64 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            self.queue.write_buffer(buffer, offset, &padded);
        }
        Ok(())
    }

    fn create_sampler(&self, id: ObjectId, descriptor: &SamplerDescriptor) -> RhiResult<()> {
        let all_linear = descriptor.min_filter == FilterMode::Linear
            && descriptor.mag_filter == FilterMode::Linear
            && descriptor.mipmap_filter == FilterMode::Linear;
        let anisotropy_clamp = if all_linear {
            descriptor.anisotropy.clamp(1.0, 16.0) as u16
        } else {
            1
        };
        if descriptor.mip_lod_bias != 0.0 {
            log::trace!("wgpu: mip lod bias {} not supported", descriptor.mip_lod_bias);
        }

        let address_mode = Self::convert_address_mode(descriptor.address_mode);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: Self::convert_filter_mode(descriptor.mag_filter),
            min_filter: Self::convert_filter_mode(descriptor.min_filter),
            mipmap_filter: Self::convert_filter_mode(descriptor.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: descriptor.compare.map(Self::convert_compare_function),
            anisotropy_clamp,
            border_color: (descriptor.address_mode == AddressMode::Border)
                .then_some(wgpu::SamplerBorderColor::TransparentBlack),
        });
        self.objects.lock().samplers.insert(id, sampler);
        Ok(())
    }

    fn compile_shader(&self, id: ObjectId, descriptor: &ShaderDescriptor) -> RhiResult<()> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&descriptor.name),
                source: wgpu::ShaderSource::Wgsl(descriptor.source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RhiError::ShaderCompilationFailed {
                name: descriptor.name.clone(),
                message: error.to_string(),
            });
        }
        self.objects.lock().shaders.insert(id, module);
        Ok(())
    }

    fn create_pipeline(&self, hash: u64, state: &PipelineState) -> RhiResult<()> {
        log::trace!("wgpu: pipeline '{}' {:016x} registered", state.name, hash);
        self.objects.lock().pipelines.insert(hash);
        Ok(())
    }

    fn destroy_pipeline(&self, hash: u64) {
        self.objects.lock().pipelines.remove(&hash);
    }

    fn create_descriptor_set(
        &self,
        id: ObjectId,
        _layout_hash: u64,
        _descriptors: &[Descriptor],
    ) -> RhiResult<()> {
        self.objects.lock().descriptor_sets.insert(id);
        Ok(())
    }

    fn create_swap_chain(
        &self,
        id: ObjectId,
        width: u32,
        height: u32,
        buffer_count: u32,
    ) -> RhiResult<()> {
        let images = (0..buffer_count)
            .map(|index| {
                self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("swap_chain_{index}")),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: SWAP_CHAIN_FORMAT,
                    usage: wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
            })
            .collect();
        self.objects.lock().swap_chains.insert(id, images);
        Ok(())
    }

    fn destroy(&self, id: ObjectId) {
        let mut objects = self.objects.lock();
        if let Some(entry) = objects.textures.remove(&id) {
            entry.texture.destroy();
        }
        if let Some(buffer) = objects.buffers.remove(&id) {
            buffer.destroy();
        }
        if let Some(images) = objects.swap_chains.remove(&id) {
            images.iter().for_each(wgpu::Texture::destroy);
        }
        objects.samplers.remove(&id);
        objects.shaders.remove(&id);
        objects.descriptor_sets.remove(&id);
    }

    fn submit(&self, queue: QueueType, commands: Vec<Command>) -> RhiResult<SubmissionId> {
        let id = SubmissionId(self.next_submission.fetch_add(1, Ordering::Relaxed));
        log::trace!("wgpu: submission {:?} on {:?} ({} commands)", id, queue, commands.len());

        let mut objects = self.objects.lock();
        let buffer = self.encode(&mut objects, &commands);
        let index = self.queue.submit(std::iter::once(buffer));

        let completed = self.completed.clone();
        self.queue.on_submitted_work_done(move || {
            completed.lock().insert(id);
        });
        objects.submissions.insert(id, index);
        Ok(id)
    }

    fn is_submission_complete(&self, submission: SubmissionId) -> bool {
        self.device.poll(wgpu::Maintain::Poll);
        self.completed.lock().contains(&submission)
            || !self.objects.lock().submissions.contains_key(&submission)
    }

    fn wait_submission(&self, submission: SubmissionId) -> RhiResult<()> {
        let index = self.objects.lock().submissions.remove(&submission);
        if let Some(index) = index {
            self.device
                .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
        self.completed.lock().remove(&submission);
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        self.objects.lock().submissions.clear();
        self.completed.lock().clear();
        Ok(())
    }

    fn present(&self, swap_chain: ObjectId, image_index: u32) -> RhiResult<()> {
        log::trace!("wgpu: present {} image {} (headless)", swap_chain, image_index);
        Ok(())
    }

    fn timestamp_period(&self) -> f32 {
        // Timestamps are CPU nanoseconds captured at submit.
        1.0
    }

    fn read_timestamp(&self, query: u32) -> Option<u64> {
        self.objects.lock().timestamps.get(&query).copied()
    }
}
