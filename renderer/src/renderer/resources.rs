//! GPU resources owned by the render thread and the bookkeeping around
//! recreating them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::entity::Entity;
use forge_rhi::{
    Device, Extent, IndexBuffer, RhiResult, Texture, TextureDescriptor, TextureFlags,
    TextureFormat, VertexBuffer, VertexPos2dTexCol8, VertexPosCol,
};

use crate::constant_buffers::ConstantBuffers;
use crate::entities::{GeometryType, Light};
use crate::error::RendererResult;
use crate::geometry;
use crate::model::Model;
use crate::options::Options;
use crate::render_targets::RenderTargets;
use crate::samplers::Samplers;
use crate::shaders::{ShaderLibrary, ShaderSourceProvider};
use crate::states::{BlendStates, DepthStencilStates, RasterizerStates};

/// How often each class of resource was (re)created since construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCounters {
    pub render_textures_created: u32,
    pub samplers_created: u32,
    pub depth_stencil_states_created: u32,
    pub shadow_maps_invalidated: u32,
    pub mips_generated: u32,
}

pub(crate) struct ShadowMap {
    pub texture: Arc<Texture>,
    pub dirty: bool,
}

pub(crate) struct ProbeState {
    pub cubemap: Arc<Texture>,
    pub depth: Arc<Texture>,
    /// First face rendered by the next update.
    pub face_start: u32,
    pub frames_since_update: u32,
    pub dirty: bool,
}

pub(crate) struct Resources {
    pub render_targets: RenderTargets,
    pub samplers: Samplers,
    pub rasterizer: RasterizerStates,
    pub blend: BlendStates,
    pub depth_stencil: DepthStencilStates,
    pub constant_buffers: ConstantBuffers,
    pub shaders: ShaderLibrary,
    /// Cube, quad and sphere for renderables without a model.
    pub builtin: HashMap<GeometryType, Model>,
    pub lines: VertexBuffer,
    pub ui_vertices: VertexBuffer,
    pub ui_indices: Option<IndexBuffer>,
    /// Glyph quads of the performance metrics overlay.
    pub text: VertexBuffer,
    pub shadow_maps: HashMap<Entity, ShadowMap>,
    pub probes: HashMap<Entity, ProbeState>,
    pub counters: ResourceCounters,
}

impl Resources {
    pub fn new(
        device: &Arc<Device>,
        options: &Options,
        render: Extent,
        output: Extent,
        provider: Box<dyn ShaderSourceProvider>,
        compile_async: bool,
        line_capacity: u32,
    ) -> RendererResult<Self> {
        let mut builtin = HashMap::new();
        for (ty, name, mesh) in [
            (GeometryType::Cube, "builtin_cube", geometry::cube()),
            (GeometryType::Quad, "builtin_quad", geometry::quad()),
            (GeometryType::Sphere, "builtin_sphere", geometry::sphere(32, 16)),
        ] {
            let mut model = Model::from_mesh(name, mesh);
            model.upload(device)?;
            builtin.insert(ty, model);
        }

        let mut resources = Self {
            render_targets: RenderTargets::new(),
            samplers: Samplers::new(device, options, render, output)?,
            rasterizer: RasterizerStates::new(),
            blend: BlendStates::new(),
            depth_stencil: DepthStencilStates::new(
                options.get(crate::options::RendererOption::REVERSE_Z),
            ),
            constant_buffers: ConstantBuffers::new(device)?,
            shaders: ShaderLibrary::new(device, provider, compile_async)?,
            builtin,
            lines: VertexBuffer::new_dynamic::<VertexPosCol>(device, line_capacity, "debug_lines")?,
            ui_vertices: VertexBuffer::new_dynamic::<VertexPos2dTexCol8>(device, 4096, "ui")?,
            ui_indices: None,
            text: VertexBuffer::new_dynamic::<VertexPos2dTexCol8>(device, 1024, "text")?,
            shadow_maps: HashMap::new(),
            probes: HashMap::new(),
            counters: ResourceCounters {
                samplers_created: 1,
                depth_stencil_states_created: 1,
                ..Default::default()
            },
        };
        resources.create_render_textures(device, render, output, options)?;
        Ok(resources)
    }

    pub fn create_render_textures(
        &mut self,
        device: &Arc<Device>,
        render: Extent,
        output: Extent,
        options: &Options,
    ) -> RhiResult<()> {
        self.render_targets.create(device, render, output, options)?;
        self.counters.render_textures_created += 1;
        Ok(())
    }

    pub fn create_samplers(
        &mut self,
        device: &Arc<Device>,
        options: &Options,
        render: Extent,
        output: Extent,
    ) -> RhiResult<()> {
        self.samplers = Samplers::new(device, options, render, output)?;
        self.counters.samplers_created += 1;
        Ok(())
    }

    pub fn create_depth_stencil_states(&mut self, reverse_z: bool) {
        self.depth_stencil = DepthStencilStates::new(reverse_z);
        self.counters.depth_stencil_states_created += 1;
    }

    /// Force every shadow map to be re-rendered, and reallocated if its
    /// resolution no longer matches.
    pub fn invalidate_shadow_maps(&mut self) {
        for shadow in self.shadow_maps.values_mut() {
            shadow.dirty = true;
        }
        self.counters.shadow_maps_invalidated += 1;
    }

    /// Shadow map for `entity`, (re)created when missing or of the wrong size.
    pub fn shadow_map(
        &mut self,
        device: &Arc<Device>,
        entity: Entity,
        light: &Light,
        resolution: u32,
    ) -> RhiResult<&mut ShadowMap> {
        let slices = light.light_type.shadow_slice_count();
        match self.shadow_maps.entry(entity) {
            Entry::Occupied(entry)
                if entry.get().texture.width() == resolution
                    && entry.get().texture.array_length() == slices =>
            {
                Ok(entry.into_mut())
            }
            entry => {
                let descriptor = TextureDescriptor {
                    array_length: slices,
                    ..TextureDescriptor::new_2d(
                        resolution,
                        resolution,
                        TextureFormat::D32Float,
                        TextureFlags::DEPTH_STENCIL | TextureFlags::SRV,
                    )
                }
                .with_label("rt_shadow_depth");
                let shadow = ShadowMap {
                    texture: Texture::new(device, descriptor)?,
                    dirty: true,
                };
                Ok(insert(entry, shadow))
            }
        }
    }

    /// Reflection probe targets for `entity`, (re)created on resolution change.
    pub fn probe(
        &mut self,
        device: &Arc<Device>,
        entity: Entity,
        resolution: u32,
    ) -> RhiResult<&mut ProbeState> {
        match self.probes.entry(entity) {
            Entry::Occupied(entry) if entry.get().cubemap.width() == resolution => {
                Ok(entry.into_mut())
            }
            entry => {
                let cubemap = Texture::new(
                    device,
                    TextureDescriptor::new_cube(
                        resolution,
                        TextureFormat::R11g11b10Float,
                        TextureFlags::RENDER_TARGET | TextureFlags::SRV | TextureFlags::CLEAR_OR_BLIT,
                    )
                    .with_label("reflection_probe"),
                )?;
                let depth = Texture::new(
                    device,
                    TextureDescriptor::new_2d(
                        resolution,
                        resolution,
                        TextureFormat::D32Float,
                        TextureFlags::DEPTH_STENCIL | TextureFlags::CLEAR_OR_BLIT,
                    )
                    .with_label("reflection_probe_depth"),
                )?;
                let probe = ProbeState {
                    cubemap,
                    depth,
                    face_start: 0,
                    frames_since_update: 0,
                    dirty: true,
                };
                Ok(insert(entry, probe))
            }
        }
    }

    /// Drop per-entity resources of entities no longer in the world.
    pub fn retain_entities(&mut self, alive: impl Fn(Entity) -> bool) {
        self.shadow_maps.retain(|entity, _| alive(*entity));
        self.probes.retain(|entity, _| alive(*entity));
    }
}

fn insert<V>(entry: Entry<'_, Entity, V>, value: V) -> &mut V {
    match entry {
        Entry::Occupied(mut entry) => {
            entry.insert(value);
            entry.into_mut()
        }
        Entry::Vacant(entry) => entry.insert(value),
    }
}
