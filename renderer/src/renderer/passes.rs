//! Frame recording.
//!
//! [`RenderContext::record`] walks the pass pipeline once per frame. Every
//! pass builds a [`PipelineState`] from compiled shaders; a pass whose shaders
//! are missing or still compiling is skipped without error, so a partially
//! compiled library still produces a frame.
//!
//! Opaque and transparent geometry go through the same chain one after the
//! other: the transparent chain samples a blurred copy of the composited
//! opaque frame for refraction.

use std::sync::Arc;

use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use forge_rhi::{
    Color, CommandList, ImageLayout, LoadOp, PipelineState, PrimitiveTopology, Rect, RhiError, RhiResult,
    SwapChain, SwapChainTarget, Texture, VertexPos2dTexCol8, VertexPosCol, VertexPosTexNorTan,
    Viewport,
};
use glam::{Mat3, Mat4, Vec2, Vec3};

use super::resources::Resources;
use super::RenderContext;
use crate::camera::{taa_jitter, Camera, CameraMatrices};
use crate::constant_buffers::{slot as cb_slot, CbLight, CbMaterial, CbUber, FrameFlags, LightFlags};
use crate::debug_draw::{DebugDraw, LineLists};
use crate::entities::{Light, LightType, ObjectType, ReflectionProbe, Renderable, Transform};
use crate::error::RendererResult;
use crate::model::ModelArena;
use crate::options::{OptionValue, RendererOption};
use crate::render_targets::RenderTarget;
use crate::shaders::{slot, ShaderId};
use crate::ui::UiDrawList;

/// Divisor of the reflection probe face cursor.
///
/// A cubemap has six faces but the cursor wraps at seven, so one update in
/// every cycle renders fewer faces than requested. Whether the seventh slot is
/// intentional is unknown; face indices past the last real face are skipped.
pub const REFLECTION_PROBE_FACE_MODULUS: u32 = 7;

const CUBE_FACE_COUNT: u32 = 6;

/// Faces a probe renders this update and the cursor for the next one.
///
/// `count` is clamped to `1..=6`.
pub fn reflection_probe_faces(start: u32, count: u32) -> (Vec<u32>, u32) {
    let count = count.clamp(1, CUBE_FACE_COUNT);
    let faces = (start..start + count)
        .map(|index| index % REFLECTION_PROBE_FACE_MODULUS)
        .filter(|face| *face < CUBE_FACE_COUNT)
        .collect();
    (faces, (start + count) % REFLECTION_PROBE_FACE_MODULUS)
}

/// View-projection looking down cube face `face` (+X, -X, +Y, -Y, +Z, -Z).
pub(crate) fn cube_face_view_projection(
    position: Vec3,
    face: u32,
    near: f32,
    far: f32,
    reverse_z: bool,
) -> Mat4 {
    let (forward, up) = match face {
        0 => (Vec3::X, Vec3::Y),
        1 => (Vec3::NEG_X, Vec3::Y),
        2 => (Vec3::Y, Vec3::NEG_Z),
        3 => (Vec3::NEG_Y, Vec3::Z),
        4 => (Vec3::Z, Vec3::Y),
        _ => (Vec3::NEG_Z, Vec3::Y),
    };
    let (near, far) = if reverse_z { (far, near) } else { (near, far) };
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
    projection * Mat4::look_to_rh(position, forward, up)
}

/// Per-frame inputs gathered from the shared state before recording.
pub(crate) struct FrameInputs<'a> {
    pub world: &'a World,
    pub models: &'a ModelArena,
    pub lines: LineLists,
    pub ui: Option<UiDrawList>,
    pub picking_ray: Option<(Vec3, Vec3)>,
    pub delta_time: f32,
}

/// Size in pixels of one glyph of the metrics overlay.
const GLYPH_SIZE: [f32; 2] = [8.0, 16.0];
/// The font atlas is a 16x16 grid of ASCII glyphs.
const GLYPHS_PER_ROW: u32 = 16;

/// Two triangles per visible character, laid out left to right from `origin`.
pub(crate) fn text_vertices(text: &str, origin: [f32; 2], color: Color) -> Vec<VertexPos2dTexCol8> {
    let col = pack_color(color);
    let cell = 1.0 / GLYPHS_PER_ROW as f32;
    let mut vertices = Vec::with_capacity(text.len() * 6);
    let mut cursor = origin;
    for character in text.chars() {
        match character {
            '\n' => {
                cursor = [origin[0], cursor[1] + GLYPH_SIZE[1]];
                continue;
            }
            ' ' => {
                cursor[0] += GLYPH_SIZE[0];
                continue;
            }
            _ => {}
        }
        let code = if character.is_ascii() { character as u32 } else { u32::from(b'?') };
        let u = (code % GLYPHS_PER_ROW) as f32 * cell;
        let v = (code / GLYPHS_PER_ROW) as f32 * cell;
        let [x, y] = cursor;
        let [w, h] = GLYPH_SIZE;
        let corner = |dx: f32, dy: f32| VertexPos2dTexCol8 {
            pos: [x + dx * w, y + dy * h],
            tex: [u + dx * cell, v + dy * cell],
            col,
        };
        vertices.extend_from_slice(&[
            corner(0.0, 0.0),
            corner(1.0, 0.0),
            corner(1.0, 1.0),
            corner(0.0, 0.0),
            corner(1.0, 1.0),
            corner(0.0, 1.0),
        ]);
        cursor[0] += w;
    }
    vertices
}

fn pack_color(color: Color) -> u32 {
    color
        .to_array()
        .iter()
        .enumerate()
        .fold(0, |packed, (i, channel)| {
            packed | (((channel.clamp(0.0, 1.0) * 255.0).round() as u32) << (i * 8))
        })
}

fn extent_array(texture: &Texture, mip: u32) -> [f32; 2] {
    let extent = texture.mip_extent(mip);
    [extent.width as f32, extent.height as f32]
}

fn light_buffer(light: &Light, transform: &Transform, reverse_z: bool, resolution: f32) -> CbLight {
    let mut flags = match light.light_type {
        LightType::Directional => LightFlags::DIRECTIONAL,
        LightType::Point => LightFlags::POINT,
        LightType::Spot => LightFlags::SPOT,
    };
    flags.set(LightFlags::SHADOWS, light.shadows);
    flags.set(LightFlags::SHADOWS_TRANSPARENT, light.shadows && light.shadows_transparent);
    flags.set(LightFlags::SCREEN_SPACE_SHADOWS, light.shadows_screen_space);
    flags.set(LightFlags::VOLUMETRIC, light.volumetric);

    let mut buffer = CbLight {
        color: light.color.extend(1.0).to_array(),
        position: transform.position.extend(light.range).to_array(),
        direction: transform.forward().extend(light.angle).to_array(),
        intensity: light.intensity,
        bias: light.bias,
        normal_bias: light.normal_bias,
        shadow_resolution: resolution,
        flags: flags.bits(),
        ..Default::default()
    };
    for (slice, view_projection) in buffer
        .view_projection
        .iter_mut()
        .zip(light.view_projections(transform, reverse_z))
    {
        *slice = view_projection;
    }
    buffer
}

/// Bind the model a renderable references and draw its index range.
///
/// Returns `false` when the model is missing or not uploaded.
fn draw_renderable(
    cmd: &mut CommandList,
    resources: &mut Resources,
    models: &ModelArena,
    transform: &Transform,
    renderable: &Renderable,
    uber: CbUber,
) -> RendererResult<bool> {
    let model = match renderable.model {
        Some(handle) => models.get(handle),
        None => resources.builtin.get(&renderable.geometry_type),
    };
    let Some((vertices, indices)) = model.and_then(|model| {
        Some((model.vertex_buffer()?.clone(), model.index_buffer()?.clone()))
    }) else {
        return Ok(false);
    };

    let index_count = match renderable.index_count {
        0 => indices.index_count().saturating_sub(renderable.index_offset),
        count => count,
    };
    if index_count == 0 {
        return Ok(false);
    }

    let buffers = &mut resources.constant_buffers;
    let matrix = transform.matrix();
    buffers.cpu_uber = CbUber {
        transform: matrix,
        transform_previous: matrix,
        is_transparent: u32::from(renderable.is_transparent()),
        ..uber
    };
    buffers.update_uber()?;
    let material = &renderable.material;
    buffers.cpu_material = CbMaterial {
        color: material.color,
        roughness: material.roughness,
        metallic: material.metallic,
        ..Default::default()
    };
    buffers.update_material()?;

    cmd.set_constant_buffer(cb_slot::UBER, &buffers.uber)?;
    cmd.set_constant_buffer(cb_slot::MATERIAL, &buffers.material)?;
    cmd.set_vertex_buffer(&vertices)?;
    cmd.set_index_buffer(&indices)?;
    cmd.draw_indexed(
        index_count,
        renderable.index_offset,
        renderable.vertex_offset as i32,
    )?;
    Ok(true)
}

impl RenderContext {
    /// Record every pass of one frame into `cmd`.
    pub(super) fn record(
        &mut self,
        cmd: &mut CommandList,
        swap_chain: &mut SwapChain,
        frame: FrameInputs<'_>,
    ) -> RendererResult<()> {
        let FrameInputs {
            world,
            models,
            lines,
            ui,
            picking_ray,
            delta_time,
        } = frame;

        self.frame += 1;
        self.time += f64::from(delta_time);
        self.passes.clear();

        self.pass_generate_mips(cmd)?;
        self.update_camera(world);
        self.update_frame_buffer(delta_time)?;

        match self.camera {
            Some(camera) => {
                self.pass_main(cmd, world, models)?;
                self.pass_lines(cmd, world, &camera, lines, picking_ray)?;
                self.pass_outline(cmd, world, models)?;
                self.pass_icons(cmd, world, &camera)?;
                self.pass_performance_metrics(cmd)?;
            }
            None => {
                let output = self.target(RenderTarget::FrameOutput)?;
                cmd.clear_render_target(&output, Some(Color::BLACK), None, None)?;
                self.passes.push("clear");
            }
        }

        let output = self.target(RenderTarget::FrameOutput)?;
        output.set_layout(ImageLayout::ShaderReadOnly, cmd, None)?;

        if self.fullscreen {
            cmd.copy_to_swap_chain(&output, swap_chain)?;
            self.passes.push("copy_to_swap_chain");
            Ok(())
        } else {
            self.pass_ui(cmd, swap_chain, ui, &output)
        }
    }

    // Frame state

    fn update_camera(&mut self, world: &World) {
        let active = self.entities.camera().and_then(|entity| {
            Some((world.get::<Camera>(entity)?, world.get::<Transform>(entity)?))
        });
        let Some((camera, transform)) = active else {
            self.camera = None;
            return;
        };

        let taa = self.options.get(RendererOption::ANTIALIASING_TAA)
            || self.options.get(RendererOption::UPSAMPLE_TAA);
        let jitter = if taa {
            taa_jitter(self.frame, self.resolution_render)
        } else {
            Vec2::ZERO
        };
        let aspect = if self.viewport.width > 0.0 && self.viewport.height > 0.0 {
            self.viewport.aspect_ratio()
        } else {
            Viewport::from_extent(self.resolution_render).aspect_ratio()
        };
        let matrices = CameraMatrices::compute(
            camera,
            transform,
            aspect,
            self.options.get(RendererOption::REVERSE_Z),
            jitter,
        );

        // Velocity is meaningless across a projection change.
        let previous = match self.camera {
            Some(previous) if !self.camera_dirty => previous,
            _ => matrices,
        };
        self.view_projection_previous = previous.view_projection_unjittered;
        self.jitter_previous = previous.jitter.to_array();
        self.camera_clear_color = camera.clear_color;
        self.camera_dirty = false;

        self.entities.sort_by_depth(world, &matrices);
        self.camera = Some(matrices);
    }

    fn update_frame_buffer(&mut self, delta_time: f32) -> RhiResult<bool> {
        let options = &self.options;
        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::SSR, options.get(RendererOption::SSR));
        flags.set(FrameFlags::TAA_UPSAMPLE, options.get(RendererOption::UPSAMPLE_TAA));
        flags.set(FrameFlags::SSAO, options.get(RendererOption::SSAO));
        flags.set(FrameFlags::VOLUMETRIC_FOG, options.get(RendererOption::VOLUMETRIC_FOG));
        flags.set(
            FrameFlags::SCREEN_SPACE_SHADOWS,
            options.get(RendererOption::SCREEN_SPACE_SHADOWS),
        );
        flags.set(FrameFlags::SSAO_GI, options.get(RendererOption::SSAO_GI));
        flags.set(FrameFlags::REVERSE_Z, options.get(RendererOption::REVERSE_Z));

        let frame = &mut self.resources.constant_buffers.cpu_frame;
        if let Some(camera) = &self.camera {
            frame.view = camera.view;
            frame.projection = camera.projection;
            frame.view_projection = camera.view_projection;
            frame.view_projection_inverted = camera.view_projection_inverted;
            frame.view_projection_unjittered = camera.view_projection_unjittered;
            frame.camera_position = camera.position.to_array();
            frame.camera_direction = camera.forward.to_array();
            frame.camera_near = camera.near;
            frame.camera_far = camera.far;
            frame.taa_jitter_current = camera.jitter.to_array();
        }
        frame.view_projection_previous = self.view_projection_previous;
        frame.taa_jitter_previous = self.jitter_previous;
        frame.resolution_render = [
            self.resolution_render.width as f32,
            self.resolution_render.height as f32,
        ];
        frame.resolution_output = [
            self.resolution_output.width as f32,
            self.resolution_output.height as f32,
        ];
        frame.delta_time = delta_time;
        frame.time = self.time as f32;
        frame.frame = self.frame as u32;
        frame.set_flags(flags);
        frame.gamma = options.value(OptionValue::Gamma);
        frame.exposure = options.value(OptionValue::Exposure);
        frame.tonemapping = options.tonemapping() as u32;
        frame.fog_density = options.value(OptionValue::FogDensity);
        frame.sharpen_strength = options.value(OptionValue::SharpenStrength);
        frame.bloom_intensity = options.value(OptionValue::BloomIntensity);
        frame.film_grain_intensity = options.value(OptionValue::FilmGrainIntensity);
        frame.chromatic_aberration_intensity =
            options.value(OptionValue::ChromaticAberrationIntensity);

        self.resources.constant_buffers.update_frame()
    }

    // Pass helpers

    fn target(&self, target: RenderTarget) -> RhiResult<Arc<Texture>> {
        self.resources
            .render_targets
            .get(target)
            .cloned()
            .ok_or(RhiError::InvalidState {
                expected: "render targets created",
                actual: target.name(),
            })
    }

    fn compute_state(&self, name: &'static str, shader: ShaderId) -> Option<PipelineState> {
        let shader = self.resources.shaders.compiled(shader)?;
        Some(PipelineState {
            shader_compute: Some(shader.clone()),
            ..PipelineState::new(name)
        })
    }

    /// Fullscreen-capable defaults: no culling, no blending, no depth.
    fn graphics_state(
        &self,
        name: &'static str,
        vertex: ShaderId,
        pixel: Option<ShaderId>,
    ) -> Option<PipelineState> {
        let shaders = &self.resources.shaders;
        let shader_pixel = match pixel {
            Some(id) => Some(shaders.compiled(id)?.clone()),
            None => None,
        };
        Some(PipelineState {
            shader_vertex: Some(shaders.compiled(vertex)?.clone()),
            shader_pixel,
            rasterizer_state: Some(self.resources.rasterizer.cull_none_solid.clone()),
            blend_state: Some(self.resources.blend.disabled.clone()),
            depth_stencil_state: Some(self.resources.depth_stencil.off.clone()),
            primitive_topology: Some(PrimitiveTopology::TriangleList),
            ..PipelineState::new(name)
        })
    }

    /// Begin `state` and bind the globals every program declares.
    fn begin(&mut self, cmd: &mut CommandList, state: &PipelineState) -> RendererResult<bool> {
        if !cmd.begin_render_pass(state)? {
            return Ok(false);
        }
        let buffers = &self.resources.constant_buffers;
        cmd.set_constant_buffer(cb_slot::FRAME, &buffers.frame)?;
        cmd.set_constant_buffer(cb_slot::UBER, &buffers.uber)?;
        cmd.set_constant_buffer(cb_slot::LIGHT, &buffers.light)?;
        cmd.set_constant_buffer(cb_slot::MATERIAL, &buffers.material)?;
        for (slot, sampler) in self.resources.samplers.bindings() {
            cmd.set_sampler(slot, sampler)?;
        }
        if self.passes.last() != Some(&state.name) {
            self.passes.push(state.name);
        }
        Ok(true)
    }

    fn set_uber(&mut self, cmd: &mut CommandList, uber: CbUber) -> RendererResult<()> {
        let buffers = &mut self.resources.constant_buffers;
        buffers.cpu_uber = uber;
        buffers.update_uber()?;
        cmd.set_constant_buffer(cb_slot::UBER, &buffers.uber)?;
        Ok(())
    }

    fn set_light(&mut self, cmd: &mut CommandList, light: CbLight) -> RendererResult<()> {
        let buffers = &mut self.resources.constant_buffers;
        buffers.cpu_light = light;
        buffers.update_light()?;
        cmd.set_constant_buffer(cb_slot::LIGHT, &buffers.light)?;
        Ok(())
    }

    fn bind_targets(
        &self,
        cmd: &mut CommandList,
        inputs: &[(u32, RenderTarget)],
    ) -> RendererResult<()> {
        for &(slot, input) in inputs {
            let texture = self.target(input)?;
            cmd.set_texture(slot, &texture)?;
        }
        Ok(())
    }

    /// Run a compute program over mip 0 of `output`, sampling `inputs`.
    ///
    /// Returns `false` when the program is not available.
    fn dispatch(
        &mut self,
        cmd: &mut CommandList,
        name: &'static str,
        shader: ShaderId,
        inputs: &[(u32, RenderTarget)],
        output: RenderTarget,
        uber: CbUber,
    ) -> RendererResult<bool> {
        let Some(state) = self.compute_state(name, shader) else {
            return Ok(false);
        };
        let output = self.target(output)?;
        if !self.begin(cmd, &state)? {
            return Ok(false);
        }
        self.bind_targets(cmd, inputs)?;
        cmd.set_texture_storage(slot::STORAGE_OUT, &output, Some((0, 1)))?;
        self.set_uber(
            cmd,
            CbUber {
                resolution_out: extent_array(&output, 0),
                ..uber
            },
        )?;
        cmd.dispatch_for(&output, 0)?;
        Ok(true)
    }

    /// Read the frame output, write the second output target, then swap them.
    fn post_effect(
        &mut self,
        cmd: &mut CommandList,
        name: &'static str,
        shader: ShaderId,
        extra_inputs: &[(u32, RenderTarget)],
    ) -> RendererResult<()> {
        let mut inputs = vec![(slot::TEX, RenderTarget::FrameOutput)];
        inputs.extend_from_slice(extra_inputs);
        if self.dispatch(
            cmd,
            name,
            shader,
            &inputs,
            RenderTarget::FrameOutput2,
            CbUber::default(),
        )? {
            self.resources
                .render_targets
                .swap(RenderTarget::FrameOutput, RenderTarget::FrameOutput2);
        }
        Ok(())
    }

    /// Fill mips `1..` of `texture`, each from the one above it.
    fn generate_mips(
        &mut self,
        cmd: &mut CommandList,
        texture: &Texture,
        name: &'static str,
        shader: ShaderId,
    ) -> RendererResult<bool> {
        if texture.mip_count() < 2 {
            return Ok(false);
        }
        let Some(state) = self.compute_state(name, shader) else {
            return Ok(false);
        };
        if !self.begin(cmd, &state)? {
            return Ok(false);
        }
        for mip in 1..texture.mip_count() {
            cmd.set_texture_mips(slot::TEX, texture, Some((mip - 1, 1)))?;
            cmd.set_texture_storage(slot::STORAGE_OUT, texture, Some((mip, 1)))?;
            self.set_uber(
                cmd,
                CbUber {
                    resolution_in: extent_array(texture, mip - 1),
                    resolution_out: extent_array(texture, mip),
                    mip_level: mip,
                    ..Default::default()
                },
            )?;
            cmd.dispatch_for(texture, mip)?;
        }
        texture.set_layout(ImageLayout::ShaderReadOnly, cmd, None)?;
        Ok(true)
    }

    /// Draw every entity of `ty` inside the current render pass.
    fn draw_entities(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
        ty: ObjectType,
        shadow_casters_only: bool,
    ) -> RendererResult<u32> {
        let entities = self.entities.get(ty).to_vec();
        let mut drawn = 0;
        for entity in entities {
            let (Some(transform), Some(renderable)) =
                (world.get::<Transform>(entity), world.get::<Renderable>(entity))
            else {
                continue;
            };
            if shadow_casters_only && !renderable.cast_shadows {
                continue;
            }
            if draw_renderable(
                cmd,
                &mut self.resources,
                models,
                transform,
                renderable,
                CbUber::default(),
            )? {
                drawn += 1;
            }
        }
        Ok(drawn)
    }

    fn lights<'w>(&self, world: &'w World) -> Vec<(Entity, &'w Light, &'w Transform)> {
        self.entities
            .get(ObjectType::Light)
            .iter()
            .filter_map(|&entity| {
                Some((entity, world.get::<Light>(entity)?, world.get::<Transform>(entity)?))
            })
            .collect()
    }

    // Passes

    fn pass_generate_mips(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        if self.mips_pending.is_empty() || !self.resources.shaders.is_compiled(ShaderId::AmdSpdC) {
            return Ok(());
        }
        for texture in std::mem::take(&mut self.mips_pending) {
            if self.generate_mips(cmd, &texture, "generate_mips", ShaderId::AmdSpdC)? {
                self.resources.counters.mips_generated += 1;
                log::debug!(
                    "Generated {} mips for '{}'",
                    texture.mip_count() - 1,
                    texture.name()
                );
            }
        }
        Ok(())
    }

    fn pass_main(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
    ) -> RendererResult<()> {
        if !self.entities.has_geometry() {
            let output = self.target(RenderTarget::FrameOutput)?;
            cmd.clear_render_target(&output, Some(self.camera_clear_color), None, None)?;
            self.passes.push("clear");
            return Ok(());
        }

        self.pass_shadow_maps(cmd, world, models)?;
        if self.options.get(RendererOption::REFLECTION_PROBES) {
            self.pass_reflection_probes(cmd, world, models)?;
        }
        self.pass_brdf_lut(cmd)?;
        if self.options.get(RendererOption::DEPTH_PREPASS) {
            self.pass_depth_prepass(cmd, world, models)?;
        }

        self.pass_gbuffer(cmd, world, models, false)?;
        if self.options.get(RendererOption::SSAO) {
            self.pass_ssao(cmd)?;
        }
        if self.options.get(RendererOption::SSR) {
            self.pass_ssr(cmd)?;
        }
        self.pass_light(cmd, world, false)?;
        self.pass_light_composition(cmd, false)?;
        self.pass_light_image_based(cmd, false)?;

        if !self.entities.get(ObjectType::GeometryTransparent).is_empty() {
            self.pass_frame_opaque_blurred(cmd)?;
            self.pass_gbuffer(cmd, world, models, true)?;
            self.pass_light(cmd, world, true)?;
            self.pass_light_composition(cmd, true)?;
            self.pass_light_image_based(cmd, true)?;
        }

        self.pass_post_process(cmd)
    }

    fn pass_shadow_maps(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
    ) -> RendererResult<()> {
        let Some(base) = self.graphics_state(
            "shadow_map",
            ShaderId::DepthLightV,
            Some(ShaderId::DepthLightP),
        ) else {
            return Ok(());
        };
        let resolution = self.options.value(OptionValue::ShadowResolution) as u32;
        let reverse_z = self.options.get(RendererOption::REVERSE_Z);
        let clear_depth = self.resources.depth_stencil.clear_depth();

        for (entity, light, transform) in self.lights(world) {
            if !light.shadows {
                continue;
            }
            let shadow = self
                .resources
                .shadow_map(&self.device, entity, light, resolution)?;
            let texture = shadow.texture.clone();
            if std::mem::take(&mut shadow.dirty) {
                cmd.clear_render_target(&texture, None, Some(clear_depth), None)?;
            }

            let rasterizer = match light.light_type {
                LightType::Directional => &self.resources.rasterizer.light_directional,
                LightType::Point | LightType::Spot => &self.resources.rasterizer.light_point_spot,
            };
            let mut state = PipelineState {
                rasterizer_state: Some(rasterizer.clone()),
                depth_stencil_state: Some(self.resources.depth_stencil.read_write.clone()),
                render_target_depth_texture: Some(texture.clone()),
                clear_depth: LoadOp::Clear(clear_depth),
                vertex_buffer_stride: std::mem::size_of::<VertexPosTexNorTan>() as u32,
                viewport: Viewport::from_extent(texture.extent()),
                ..base.clone()
            };

            let mut buffer = light_buffer(light, transform, reverse_z, resolution as f32);
            for slice in 0..texture.array_length() {
                state.render_target_depth_array_index = slice;
                if !self.begin(cmd, &state)? {
                    break;
                }
                buffer.index = slice;
                self.set_light(cmd, buffer)?;
                self.draw_entities(cmd, world, models, ObjectType::GeometryOpaque, true)?;
                if light.shadows_transparent {
                    self.draw_entities(cmd, world, models, ObjectType::GeometryTransparent, true)?;
                }
                cmd.end_render_pass();
            }
        }
        Ok(())
    }

    fn pass_reflection_probes(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
    ) -> RendererResult<()> {
        let Some(mut base) = self.graphics_state(
            "reflection_probe",
            ShaderId::ReflectionProbeV,
            Some(ShaderId::ReflectionProbeP),
        ) else {
            return Ok(());
        };
        base.rasterizer_state = Some(self.resources.rasterizer.cull_back_solid.clone());
        base.depth_stencil_state = Some(self.resources.depth_stencil.read_write.clone());
        base.clear_color[0] = LoadOp::Clear(Color::BLACK);
        base.clear_depth = LoadOp::Clear(self.resources.depth_stencil.clear_depth());
        base.vertex_buffer_stride = std::mem::size_of::<VertexPosTexNorTan>() as u32;
        let reverse_z = self.options.get(RendererOption::REVERSE_Z);

        let probes: Vec<_> = self
            .entities
            .get(ObjectType::ReflectionProbe)
            .iter()
            .filter_map(|&entity| {
                Some((
                    entity,
                    *world.get::<ReflectionProbe>(entity)?,
                    world.get::<Transform>(entity)?.position,
                ))
            })
            .collect();

        for (entity, probe, position) in probes {
            let state = self.resources.probe(&self.device, entity, probe.resolution)?;
            state.frames_since_update += 1;
            if !state.dirty && state.frames_since_update <= probe.update_interval_frames {
                continue;
            }
            let start = state.face_start;
            let (faces, next) = reflection_probe_faces(start, probe.faces_per_frame);
            state.face_start = next;
            state.frames_since_update = 0;
            if next < start {
                state.dirty = false;
            }
            let (cubemap, depth) = (state.cubemap.clone(), state.depth.clone());

            let mut pass = PipelineState {
                render_target_depth_texture: Some(depth),
                viewport: Viewport::from_extent(cubemap.extent()),
                ..base.clone()
            };
            pass.render_target_color_textures[0] = Some(cubemap.clone());
            for face in faces {
                pass.render_target_color_array_index = face;
                if !self.begin(cmd, &pass)? {
                    break;
                }
                let mut light = CbLight {
                    position: position.extend(probe.plane_far).to_array(),
                    index: face,
                    ..Default::default()
                };
                light.view_projection[0] = cube_face_view_projection(
                    position,
                    face,
                    probe.plane_near,
                    probe.plane_far,
                    reverse_z,
                );
                self.set_light(cmd, light)?;
                self.draw_entities(cmd, world, models, ObjectType::GeometryOpaque, false)?;
                cmd.end_render_pass();
            }
            cubemap.set_layout(ImageLayout::ShaderReadOnly, cmd, None)?;
        }
        Ok(())
    }

    /// The LUT only depends on the BRDF, so it is baked once per render
    /// target table.
    fn pass_brdf_lut(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        let generation = self.resources.render_targets.generation();
        if self.brdf_lut_generation == Some(generation) {
            return Ok(());
        }
        if self.dispatch(
            cmd,
            "brdf_specular_lut",
            ShaderId::BrdfSpecularLutC,
            &[],
            RenderTarget::BrdfSpecularLut,
            CbUber::default(),
        )? {
            self.brdf_lut_generation = Some(generation);
        }
        Ok(())
    }

    fn pass_depth_prepass(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
    ) -> RendererResult<()> {
        let Some(base) = self.graphics_state(
            "depth_prepass",
            ShaderId::DepthPrepassV,
            Some(ShaderId::DepthPrepassP),
        ) else {
            return Ok(());
        };
        let state = PipelineState {
            rasterizer_state: Some(self.resources.rasterizer.cull_back_solid.clone()),
            depth_stencil_state: Some(self.resources.depth_stencil.read_write.clone()),
            render_target_depth_texture: Some(self.target(RenderTarget::GbufferDepth)?),
            clear_depth: LoadOp::Clear(self.resources.depth_stencil.clear_depth()),
            vertex_buffer_stride: std::mem::size_of::<VertexPosTexNorTan>() as u32,
            ..base
        };
        if self.begin(cmd, &state)? {
            self.draw_entities(cmd, world, models, ObjectType::GeometryOpaque, false)?;
            cmd.end_render_pass();
        }
        Ok(())
    }

    fn pass_gbuffer(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
        transparent: bool,
    ) -> RendererResult<()> {
        let name = if transparent { "gbuffer_transparent" } else { "gbuffer" };
        let Some(mut state) =
            self.graphics_state(name, ShaderId::GbufferV, Some(ShaderId::GbufferP))
        else {
            return Ok(());
        };

        let colors = [
            RenderTarget::GbufferAlbedo,
            RenderTarget::GbufferNormal,
            RenderTarget::GbufferMaterial,
            RenderTarget::GbufferVelocity,
        ];
        for (i, target) in colors.into_iter().enumerate() {
            state.render_target_color_textures[i] = Some(self.target(target)?);
            state.clear_color[i] = LoadOp::Clear(Color::TRANSPARENT);
        }
        state.render_target_depth_texture = Some(self.target(RenderTarget::GbufferDepth)?);
        state.vertex_buffer_stride = std::mem::size_of::<VertexPosTexNorTan>() as u32;

        let depth_stencil = &self.resources.depth_stencil;
        let prepass = !transparent && self.options.get(RendererOption::DEPTH_PREPASS);
        if transparent {
            state.rasterizer_state = Some(self.resources.rasterizer.cull_none_solid.clone());
            state.depth_stencil_state = Some(depth_stencil.read_write.clone());
            state.clear_depth = LoadOp::Load;
        } else if prepass {
            state.rasterizer_state = Some(self.resources.rasterizer.cull_back_solid.clone());
            state.depth_stencil_state = Some(depth_stencil.read_equal.clone());
            state.clear_depth = LoadOp::Load;
        } else {
            state.rasterizer_state = Some(self.resources.rasterizer.cull_back_solid.clone());
            state.depth_stencil_state = Some(depth_stencil.read_write.clone());
            state.clear_depth = LoadOp::Clear(depth_stencil.clear_depth());
        }

        let ty = if transparent {
            ObjectType::GeometryTransparent
        } else {
            ObjectType::GeometryOpaque
        };
        if self.begin(cmd, &state)? {
            self.draw_entities(cmd, world, models, ty, false)?;
            cmd.end_render_pass();
        }
        Ok(())
    }

    /// Ambient occlusion followed by a depth-aware separable blur. The result
    /// ends up in the blurred target.
    fn pass_ssao(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        let gbuffer = [
            (slot::TEX_NORMAL, RenderTarget::GbufferNormal),
            (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
        ];
        if !self.dispatch(
            cmd,
            "ssao",
            ShaderId::SsaoC,
            &gbuffer,
            RenderTarget::Ssao,
            CbUber::default(),
        )? {
            return Ok(());
        }

        for (source, destination, direction) in [
            (RenderTarget::Ssao, RenderTarget::SsaoBlurred, [1.0, 0.0]),
            (RenderTarget::SsaoBlurred, RenderTarget::Ssao, [0.0, 1.0]),
        ] {
            let mut inputs = gbuffer.to_vec();
            inputs.push((slot::TEX, source));
            let uber = CbUber {
                blur_direction: direction,
                blur_sigma: 2.0,
                ..Default::default()
            };
            if !self.dispatch(
                cmd,
                "ssao_blur",
                ShaderId::BlurGaussianBilateralC,
                &inputs,
                destination,
                uber,
            )? {
                return Ok(());
            }
        }
        self.resources
            .render_targets
            .swap(RenderTarget::Ssao, RenderTarget::SsaoBlurred);
        Ok(())
    }

    /// Reflections traced at full resolution, then filtered down a mip
    /// pyramid so rough surfaces can sample blurrier reflections.
    fn pass_ssr(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        let inputs = [
            (slot::TEX_NORMAL, RenderTarget::GbufferNormal),
            (slot::TEX_MATERIAL, RenderTarget::GbufferMaterial),
            (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
            (slot::TEX_FRAME, RenderTarget::FrameRender),
        ];
        if !self.dispatch(
            cmd,
            "ssr",
            ShaderId::SsrC,
            &inputs,
            RenderTarget::Ssr,
            CbUber::default(),
        )? {
            return Ok(());
        }
        let ssr = self.target(RenderTarget::Ssr)?;
        self.generate_mips(cmd, &ssr, "ssr_mips", ShaderId::AmdSpdC)?;

        // Each mip is replaced by a blurred downsample of the one above it.
        let Some(state) = self.compute_state("ssr_blur", ShaderId::BlurGaussianC) else {
            return Ok(());
        };
        if ssr.mip_count() < 2 || !self.begin(cmd, &state)? {
            return Ok(());
        }
        for mip in 1..ssr.mip_count() {
            cmd.set_texture_mips(slot::TEX, &ssr, Some((mip - 1, 1)))?;
            cmd.set_texture_storage(slot::STORAGE_OUT, &ssr, Some((mip, 1)))?;
            self.set_uber(
                cmd,
                CbUber {
                    resolution_in: extent_array(&ssr, mip - 1),
                    resolution_out: extent_array(&ssr, mip),
                    blur_direction: [1.0, 1.0],
                    blur_sigma: mip as f32,
                    mip_level: mip,
                    ..Default::default()
                },
            )?;
            cmd.dispatch_for(&ssr, mip)?;
        }
        ssr.set_layout(ImageLayout::ShaderReadOnly, cmd, None)?;
        Ok(())
    }

    fn pass_light(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        transparent: bool,
    ) -> RendererResult<()> {
        let (diffuse, specular) = if transparent {
            (
                RenderTarget::LightDiffuseTransparent,
                RenderTarget::LightSpecularTransparent,
            )
        } else {
            (RenderTarget::LightDiffuse, RenderTarget::LightSpecular)
        };
        let diffuse = self.target(diffuse)?;
        let specular = self.target(specular)?;
        let volumetric = self.target(RenderTarget::LightVolumetric)?;

        cmd.clear_render_target(&diffuse, Some(Color::TRANSPARENT), None, None)?;
        cmd.clear_render_target(&specular, Some(Color::TRANSPARENT), None, None)?;
        let volumetric_fog = !transparent && self.options.get(RendererOption::VOLUMETRIC_FOG);
        if volumetric_fog {
            cmd.clear_render_target(&volumetric, Some(Color::TRANSPARENT), None, None)?;
        }

        let name = if transparent { "light_transparent" } else { "light" };
        let Some(state) = self.compute_state(name, ShaderId::LightC) else {
            return Ok(());
        };
        let lights = self.lights(world);
        if lights.is_empty() || !self.begin(cmd, &state)? {
            return Ok(());
        }
        self.bind_targets(
            cmd,
            &[
                (slot::TEX_ALBEDO, RenderTarget::GbufferAlbedo),
                (slot::TEX_NORMAL, RenderTarget::GbufferNormal),
                (slot::TEX_MATERIAL, RenderTarget::GbufferMaterial),
                (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
                (slot::TEX_SSAO, RenderTarget::SsaoBlurred),
            ],
        )?;

        let reverse_z = self.options.get(RendererOption::REVERSE_Z);
        let resolution = self.options.value(OptionValue::ShadowResolution);
        let uber = CbUber {
            resolution_out: extent_array(&diffuse, 0),
            is_transparent: u32::from(transparent),
            ..Default::default()
        };
        for (entity, light, transform) in lights {
            let shadow = self
                .resources
                .shadow_maps
                .get(&entity)
                .filter(|_| light.shadows)
                .map(|shadow| shadow.texture.clone());
            if let Some(shadow) = shadow {
                cmd.set_texture(slot::TEX_SHADOW, &shadow)?;
            }
            self.set_light(cmd, light_buffer(light, transform, reverse_z, resolution))?;

            cmd.set_texture_storage(slot::STORAGE_OUT, &diffuse, Some((0, 1)))?;
            cmd.set_texture_storage(slot::STORAGE_OUT2, &specular, Some((0, 1)))?;
            self.set_uber(cmd, uber)?;
            cmd.dispatch_for(&diffuse, 0)?;

            if volumetric_fog && light.volumetric {
                cmd.set_texture_storage(slot::STORAGE_OUT, &volumetric, Some((0, 1)))?;
                self.set_uber(
                    cmd,
                    CbUber {
                        array_index: 1,
                        ..uber
                    },
                )?;
                cmd.dispatch_for(&volumetric, 0)?;
            }
        }
        Ok(())
    }

    /// Combine lighting into the frame. The transparent composition blends
    /// over the opaque frame, so it writes the second target and swaps.
    fn pass_light_composition(
        &mut self,
        cmd: &mut CommandList,
        transparent: bool,
    ) -> RendererResult<()> {
        let (name, diffuse, specular, output) = if transparent {
            (
                "light_composition_transparent",
                RenderTarget::LightDiffuseTransparent,
                RenderTarget::LightSpecularTransparent,
                RenderTarget::FrameRender2,
            )
        } else {
            (
                "light_composition",
                RenderTarget::LightDiffuse,
                RenderTarget::LightSpecular,
                RenderTarget::FrameRender,
            )
        };
        let mut inputs = vec![
            (slot::TEX_ALBEDO, RenderTarget::GbufferAlbedo),
            (slot::TEX_NORMAL, RenderTarget::GbufferNormal),
            (slot::TEX_MATERIAL, RenderTarget::GbufferMaterial),
            (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
            (slot::TEX_SSAO, RenderTarget::SsaoBlurred),
            (slot::TEX_SSR, RenderTarget::Ssr),
            (slot::TEX_LIGHT_DIFFUSE, diffuse),
            (slot::TEX_LIGHT_SPECULAR, specular),
            (slot::TEX_LIGHT_VOLUMETRIC, RenderTarget::LightVolumetric),
        ];
        if transparent {
            inputs.push((slot::TEX_FRAME, RenderTarget::FrameRender));
            inputs.push((slot::TEX_FRAME_BLURRED, RenderTarget::FrameRenderOpaqueBlurred));
        }
        let uber = CbUber {
            is_transparent: u32::from(transparent),
            ..Default::default()
        };
        let composed = self.dispatch(
            cmd,
            name,
            ShaderId::LightCompositionC,
            &inputs,
            output,
            uber,
        )?;
        if composed && transparent {
            self.resources
                .render_targets
                .swap(RenderTarget::FrameRender, RenderTarget::FrameRender2);
        }
        Ok(())
    }

    /// Additive image based lighting from the environment and the first
    /// reflection probe.
    fn pass_light_image_based(
        &mut self,
        cmd: &mut CommandList,
        transparent: bool,
    ) -> RendererResult<()> {
        let Some(environment) = self.environment_texture.clone() else {
            return Ok(());
        };
        let name = if transparent {
            "light_image_based_transparent"
        } else {
            "light_image_based"
        };
        let Some(mut state) =
            self.graphics_state(name, ShaderId::QuadV, Some(ShaderId::LightImageBasedP))
        else {
            return Ok(());
        };
        state.blend_state = Some(self.resources.blend.additive.clone());
        state.render_target_color_textures[0] = Some(self.target(RenderTarget::FrameRender)?);
        state.clear_color[0] = LoadOp::Load;

        if std::mem::take(&mut self.environment_dirty) {
            log::debug!("Image based lighting uses '{}'", environment.name());
        }
        let probe = self
            .entities
            .get(ObjectType::ReflectionProbe)
            .iter()
            .find_map(|entity| self.resources.probes.get(entity))
            .map(|probe| probe.cubemap.clone());

        if !self.begin(cmd, &state)? {
            return Ok(());
        }
        self.bind_targets(
            cmd,
            &[
                (slot::TEX_ALBEDO, RenderTarget::GbufferAlbedo),
                (slot::TEX_NORMAL, RenderTarget::GbufferNormal),
                (slot::TEX_MATERIAL, RenderTarget::GbufferMaterial),
                (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
                (slot::TEX_SSAO, RenderTarget::SsaoBlurred),
                (slot::TEX_LUT, RenderTarget::BrdfSpecularLut),
            ],
        )?;
        cmd.set_texture(slot::TEX_ENVIRONMENT, &environment)?;
        if let Some(probe) = probe {
            cmd.set_texture(slot::TEX, &probe)?;
        }
        self.set_uber(
            cmd,
            CbUber {
                is_transparent: u32::from(transparent),
                ..Default::default()
            },
        )?;
        cmd.draw(3, 0)?;
        cmd.end_render_pass();
        Ok(())
    }

    /// Downsampled, blurred copy of the opaque frame for refraction.
    fn pass_frame_opaque_blurred(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        let frame = self.target(RenderTarget::FrameRender)?;
        let blurred = self.target(RenderTarget::FrameRenderOpaqueBlurred)?;
        cmd.blit(&frame, &blurred, true)?;
        self.passes.push("frame_opaque_blit");
        self.generate_mips(cmd, &blurred, "frame_opaque_mips", ShaderId::AmdSpdC)?;
        Ok(())
    }

    fn pass_post_process(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        // Render resolution
        if self.options.get(RendererOption::DEPTH_OF_FIELD)
            && self.dispatch(
                cmd,
                "depth_of_field",
                ShaderId::DepthOfFieldC,
                &[
                    (slot::TEX, RenderTarget::FrameRender),
                    (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
                ],
                RenderTarget::FrameRender2,
                CbUber::default(),
            )?
        {
            self.resources
                .render_targets
                .swap(RenderTarget::FrameRender, RenderTarget::FrameRender2);
        }

        // Render to output resolution
        let taa = self.options.get(RendererOption::ANTIALIASING_TAA)
            || self.options.get(RendererOption::UPSAMPLE_TAA);
        let resolved = if taa {
            let resolved = self.dispatch(
                cmd,
                "taa",
                ShaderId::TaaC,
                &[
                    (slot::TEX, RenderTarget::FrameRender),
                    (slot::TEX2, RenderTarget::TaaHistory),
                    (slot::TEX_VELOCITY, RenderTarget::GbufferVelocity),
                    (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
                ],
                RenderTarget::FrameOutput,
                CbUber::default(),
            )?;
            if resolved {
                let output = self.target(RenderTarget::FrameOutput)?;
                let history = self.target(RenderTarget::TaaHistory)?;
                cmd.blit(&output, &history, true)?;
            }
            resolved
        } else if self.options.get(RendererOption::UPSAMPLE_FSR) {
            self.dispatch(
                cmd,
                "fsr_upsample",
                ShaderId::FsrUpsampleC,
                &[(slot::TEX, RenderTarget::FrameRender)],
                RenderTarget::FrameOutput,
                CbUber::default(),
            )?
        } else {
            false
        };
        if !resolved {
            let frame = self.target(RenderTarget::FrameRender)?;
            let output = self.target(RenderTarget::FrameOutput)?;
            cmd.blit(&frame, &output, true)?;
            self.passes.push("blit_frame_output");
        }

        // Output resolution
        if self.options.get(RendererOption::MOTION_BLUR) {
            self.post_effect(
                cmd,
                "motion_blur",
                ShaderId::MotionBlurC,
                &[
                    (slot::TEX_VELOCITY, RenderTarget::GbufferVelocity),
                    (slot::TEX_DEPTH, RenderTarget::GbufferDepth),
                ],
            )?;
        }
        if self.options.get(RendererOption::BLOOM) {
            self.pass_bloom(cmd)?;
        }
        if self.options.get(RendererOption::SHARPENING) {
            self.post_effect(cmd, "cas", ShaderId::CasC, &[])?;
        }
        self.post_effect(cmd, "tone_mapping_gamma", ShaderId::ToneMappingGammaC, &[])?;
        if self.options.get(RendererOption::DEBANDING) {
            self.post_effect(cmd, "debanding", ShaderId::DebandingC, &[])?;
        }
        if self.options.get(RendererOption::ANTIALIASING_FXAA) {
            self.post_effect(cmd, "fxaa", ShaderId::FxaaC, &[])?;
        }
        if self.options.get(RendererOption::CHROMATIC_ABERRATION) {
            self.post_effect(
                cmd,
                "chromatic_aberration",
                ShaderId::ChromaticAberrationC,
                &[],
            )?;
        }
        if self.options.get(RendererOption::FILM_GRAIN) {
            self.post_effect(cmd, "film_grain", ShaderId::FilmGrainC, &[])?;
        }
        Ok(())
    }

    /// Bright-pass luminance, downsample, then upsample-blend back up the
    /// chain before blending onto the frame.
    fn pass_bloom(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        if !self.dispatch(
            cmd,
            "bloom_luminance",
            ShaderId::BloomLuminanceC,
            &[(slot::TEX, RenderTarget::FrameOutput)],
            RenderTarget::Bloom,
            CbUber::default(),
        )? {
            return Ok(());
        }
        let bloom = self.target(RenderTarget::Bloom)?;
        self.generate_mips(cmd, &bloom, "bloom_downsample", ShaderId::AmdSpdC)?;

        if let Some(state) =
            self.compute_state("bloom_upsample_blend_mip", ShaderId::BloomUpsampleBlendMipC)
        {
            if bloom.mip_count() > 1 && self.begin(cmd, &state)? {
                for mip in (0..bloom.mip_count() - 1).rev() {
                    cmd.set_texture_mips(slot::TEX, &bloom, Some((mip + 1, 1)))?;
                    cmd.set_texture_storage(slot::STORAGE_OUT, &bloom, Some((mip, 1)))?;
                    self.set_uber(
                        cmd,
                        CbUber {
                            resolution_in: extent_array(&bloom, mip + 1),
                            resolution_out: extent_array(&bloom, mip),
                            mip_level: mip,
                            ..Default::default()
                        },
                    )?;
                    cmd.dispatch_for(&bloom, mip)?;
                }
            }
        }

        self.post_effect(
            cmd,
            "bloom_blend_frame",
            ShaderId::BloomBlendFrameC,
            &[(slot::TEX2, RenderTarget::Bloom)],
        )
    }

    // Overlays

    fn pass_lines(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        camera: &CameraMatrices,
        lines: LineLists,
        picking_ray: Option<(Vec3, Vec3)>,
    ) -> RendererResult<()> {
        let mut draw = DebugDraw::with_lines(lines);
        if self.options.get(RendererOption::GRID) {
            draw_grid(&mut draw, camera.position);
        }
        if self.options.get(RendererOption::AABB) {
            let color = Color::new(0.41, 0.86, 1.0, 1.0);
            for ty in [ObjectType::GeometryOpaque, ObjectType::GeometryTransparent] {
                for &entity in self.entities.get(ty) {
                    if let (Some(transform), Some(renderable)) =
                        (world.get::<Transform>(entity), world.get::<Renderable>(entity))
                    {
                        draw.draw_box(&renderable.world_bounds(transform), color, true);
                    }
                }
            }
        }
        if self.options.get(RendererOption::PICKING_RAY) {
            if let Some((origin, direction)) = picking_ray {
                let end = origin + direction.normalize_or_zero() * camera.far;
                draw.draw_line(origin, end, Color::GREEN, Color::GREEN, true);
            }
        }
        if self.options.get(RendererOption::TRANSFORM_HANDLE) {
            if let Some(transform) = self
                .entities
                .selected()
                .and_then(|entity| world.get::<Transform>(entity))
            {
                draw_transform_handle(&mut draw, transform, camera);
            }
        }

        let lines = draw.take();
        if lines.is_empty() {
            return Ok(());
        }
        let Some(mut base) =
            self.graphics_state("lines", ShaderId::LinesV, Some(ShaderId::LinesP))
        else {
            return Ok(());
        };

        // Depth testing needs the scene depth at the output resolution.
        let depth_tested = self.resolution_render == self.resolution_output
            && self.entities.has_geometry();
        let depth_count = if depth_tested { lines.depth.len() as u32 } else { 0 };
        let mut vertices: Vec<VertexPosCol> = lines.depth;
        vertices.extend_from_slice(&lines.overlay);
        let overlay_count = vertices.len() as u32 - depth_count;
        self.resources.lines.update(&vertices)?;

        base.primitive_topology = Some(PrimitiveTopology::LineList);
        base.blend_state = Some(self.resources.blend.alpha.clone());
        base.render_target_color_textures[0] = Some(self.target(RenderTarget::FrameOutput)?);
        base.clear_color[0] = LoadOp::Load;
        base.vertex_buffer_stride = std::mem::size_of::<VertexPosCol>() as u32;
        let uber = CbUber {
            transform: camera.view_projection_unjittered,
            ..Default::default()
        };

        if depth_count > 0 {
            let state = PipelineState {
                depth_stencil_state: Some(self.resources.depth_stencil.read.clone()),
                render_target_depth_texture: Some(self.target(RenderTarget::GbufferDepth)?),
                clear_depth: LoadOp::Load,
                ..base.clone()
            };
            if self.begin(cmd, &state)? {
                cmd.set_vertex_buffer(&self.resources.lines)?;
                self.set_uber(cmd, uber)?;
                cmd.draw(depth_count, 0)?;
                cmd.end_render_pass();
            }
        }
        if overlay_count > 0 {
            let state = PipelineState {
                name: "lines_overlay",
                ..base
            };
            if self.begin(cmd, &state)? {
                cmd.set_vertex_buffer(&self.resources.lines)?;
                self.set_uber(cmd, uber)?;
                cmd.draw(overlay_count, depth_count)?;
                cmd.end_render_pass();
            }
        }
        Ok(())
    }

    fn pass_outline(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        models: &ModelArena,
    ) -> RendererResult<()> {
        if !self.options.get(RendererOption::SELECTION_OUTLINE) {
            return Ok(());
        }
        let Some((transform, renderable)) = self.entities.selected().and_then(|entity| {
            Some((world.get::<Transform>(entity)?, world.get::<Renderable>(entity)?))
        }) else {
            return Ok(());
        };
        let Some(mut state) =
            self.graphics_state("outline", ShaderId::OutlineV, Some(ShaderId::OutlineP))
        else {
            return Ok(());
        };
        state.blend_state = Some(self.resources.blend.alpha.clone());
        state.render_target_color_textures[0] = Some(self.target(RenderTarget::FrameOutput)?);
        state.clear_color[0] = LoadOp::Load;
        state.vertex_buffer_stride = std::mem::size_of::<VertexPosTexNorTan>() as u32;

        if self.begin(cmd, &state)? {
            let uber = CbUber {
                color: [1.0, 0.6, 0.0, 1.0],
                ..Default::default()
            };
            draw_renderable(cmd, &mut self.resources, models, transform, renderable, uber)?;
            cmd.end_render_pass();
        }
        Ok(())
    }

    /// Camera-facing quads marking lights and inactive cameras.
    fn pass_icons(
        &mut self,
        cmd: &mut CommandList,
        world: &World,
        camera: &CameraMatrices,
    ) -> RendererResult<()> {
        if !self.options.get(RendererOption::LIGHTS) {
            return Ok(());
        }
        let mut icons: Vec<(Vec3, [f32; 4])> = self
            .lights(world)
            .into_iter()
            .map(|(_, light, transform)| (transform.position, light.color.extend(1.0).to_array()))
            .collect();
        icons.extend(
            self.entities
                .get(ObjectType::Camera)
                .iter()
                .filter(|&&entity| Some(entity) != self.entities.camera())
                .filter_map(|&entity| world.get::<Transform>(entity))
                .map(|transform| (transform.position, Color::WHITE.to_array())),
        );
        if icons.is_empty() {
            return Ok(());
        }

        let Some(mut state) =
            self.graphics_state("icons", ShaderId::QuadV, Some(ShaderId::TextureP))
        else {
            return Ok(());
        };
        state.primitive_topology = Some(PrimitiveTopology::TriangleStrip);
        state.blend_state = Some(self.resources.blend.alpha.clone());
        state.render_target_color_textures[0] = Some(self.target(RenderTarget::FrameOutput)?);
        state.clear_color[0] = LoadOp::Load;
        if !self.begin(cmd, &state)? {
            return Ok(());
        }

        let billboard = Mat4::from_mat3(Mat3::from_mat4(camera.view).transpose());
        for (position, color) in icons {
            let scale = (camera.position.distance(position) * 0.05).max(0.1);
            let model =
                Mat4::from_translation(position) * billboard * Mat4::from_scale(Vec3::splat(scale));
            self.set_uber(
                cmd,
                CbUber {
                    transform: camera.view_projection_unjittered * model,
                    color,
                    ..Default::default()
                },
            )?;
            cmd.draw(4, 0)?;
        }
        cmd.end_render_pass();
        Ok(())
    }

    fn pass_performance_metrics(&mut self, cmd: &mut CommandList) -> RendererResult<()> {
        if !self.options.get(RendererOption::PERFORMANCE_METRICS) {
            return Ok(());
        }
        let counters = self.last_counters;
        let fps = if self.last_delta_time > 0.0 {
            1.0 / self.last_delta_time
        } else {
            0.0
        };
        let text = format!(
            "FPS {:.1}\nFrame {:.2} ms\nResolution {}x{} -> {}x{}\nDraw calls {}\nDispatches {}\nPipeline binds {}\nDescriptor set binds {}\nBarriers {}",
            fps,
            self.last_delta_time * 1000.0,
            self.resolution_render.width,
            self.resolution_render.height,
            self.resolution_output.width,
            self.resolution_output.height,
            counters.draw_calls,
            counters.dispatches,
            counters.pipeline_binds,
            counters.descriptor_set_binds,
            counters.barriers,
        );
        let vertices = text_vertices(&text, [8.0, 8.0], Color::WHITE);
        if vertices.is_empty() {
            return Ok(());
        }

        let Some(mut state) = self.graphics_state(
            "performance_metrics",
            ShaderId::FontV,
            Some(ShaderId::FontP),
        ) else {
            return Ok(());
        };
        state.blend_state = Some(self.resources.blend.alpha.clone());
        state.render_target_color_textures[0] = Some(self.target(RenderTarget::FrameOutput)?);
        state.clear_color[0] = LoadOp::Load;
        state.vertex_buffer_stride = std::mem::size_of::<VertexPos2dTexCol8>() as u32;

        self.resources.text.update(&vertices)?;
        if self.begin(cmd, &state)? {
            cmd.set_vertex_buffer(&self.resources.text)?;
            self.set_uber(
                cmd,
                CbUber {
                    resolution_out: [
                        self.resolution_output.width as f32,
                        self.resolution_output.height as f32,
                    ],
                    ..Default::default()
                },
            )?;
            cmd.draw(vertices.len() as u32, 0)?;
            cmd.end_render_pass();
        }
        Ok(())
    }

    /// Draw the UI, or the bare frame when there is none, into the swap chain.
    fn pass_ui(
        &mut self,
        cmd: &mut CommandList,
        swap_chain: &mut SwapChain,
        ui: Option<UiDrawList>,
        frame_output: &Arc<Texture>,
    ) -> RendererResult<()> {
        swap_chain.set_layout(ImageLayout::ColorAttachment, cmd)?;

        let extent = swap_chain.extent();
        let ui = ui.filter(|list| !list.is_empty());
        let state = match &ui {
            Some(_) => self.graphics_state("ui", ShaderId::UiV, Some(ShaderId::UiP)),
            None => self.graphics_state("frame_to_swap_chain", ShaderId::QuadV, Some(ShaderId::TextureP)),
        };
        if let Some(mut state) = state {
            state.render_target_swapchain = Some(SwapChainTarget::of(swap_chain));
            state.clear_color[0] = LoadOp::Clear(Color::BLACK);
            state.blend_state = Some(self.resources.blend.alpha.clone());
            state.viewport = Viewport::from_extent(extent);
            state.dynamic_scissor = true;

            match ui {
                Some(list) => {
                    state.vertex_buffer_stride = std::mem::size_of::<VertexPos2dTexCol8>() as u32;
                    if self.begin(cmd, &state)? {
                        self.draw_ui(cmd, &list, frame_output)?;
                        cmd.end_render_pass();
                    }
                }
                None => {
                    if self.begin(cmd, &state)? {
                        cmd.set_texture(slot::TEX, frame_output)?;
                        self.set_uber(
                            cmd,
                            CbUber {
                                resolution_out: [extent.width as f32, extent.height as f32],
                                ..Default::default()
                            },
                        )?;
                        cmd.set_scissor(Rect::new(0, 0, extent.width, extent.height))?;
                        cmd.draw(3, 0)?;
                        cmd.end_render_pass();
                    }
                }
            }
        }

        swap_chain.set_layout(ImageLayout::PresentSource, cmd)?;
        Ok(())
    }

    fn draw_ui(
        &mut self,
        cmd: &mut CommandList,
        list: &UiDrawList,
        frame_output: &Arc<Texture>,
    ) -> RendererResult<()> {
        self.set_uber(
            cmd,
            CbUber {
                resolution_out: list.screen_size,
                ..Default::default()
            },
        )?;
        let resources = &mut self.resources;
        resources.ui_vertices.update(&list.vertices)?;
        let indices = resources
            .ui_indices
            .insert(forge_rhi::IndexBuffer::new(&self.device, &list.indices, "ui_indices")?);
        cmd.set_vertex_buffer(&resources.ui_vertices)?;
        cmd.set_index_buffer(indices)?;

        for command in &list.commands {
            let texture = command.texture.as_ref().unwrap_or(frame_output);
            cmd.set_texture(slot::TEX, texture)?;
            cmd.set_scissor(command.clip)?;
            cmd.draw_indexed(
                command.index_count,
                command.index_offset,
                command.vertex_offset as i32,
            )?;
        }
        Ok(())
    }
}

/// Unit grid on the ground plane, following the camera in whole steps.
fn draw_grid(draw: &mut DebugDraw, center: Vec3) {
    const HALF_EXTENT: i32 = 50;
    let color = Color::new(0.5, 0.5, 0.5, 0.5);
    let origin = Vec3::new(center.x.round(), 0.0, center.z.round());
    let extent = HALF_EXTENT as f32;
    for i in -HALF_EXTENT..=HALF_EXTENT {
        let offset = i as f32;
        draw.draw_line(
            origin + Vec3::new(offset, 0.0, -extent),
            origin + Vec3::new(offset, 0.0, extent),
            color,
            color,
            true,
        );
        draw.draw_line(
            origin + Vec3::new(-extent, 0.0, offset),
            origin + Vec3::new(extent, 0.0, offset),
            color,
            color,
            true,
        );
    }
}

/// Translation axes and rotation rings around the selected entity, scaled to
/// keep a constant size on screen.
fn draw_transform_handle(draw: &mut DebugDraw, transform: &Transform, camera: &CameraMatrices) {
    let size = (camera.position.distance(transform.position) * 0.15).max(0.01);
    let position = transform.position;
    for (axis, color) in [
        (transform.right(), Color::RED),
        (transform.up(), Color::GREEN),
        (-transform.forward(), Color::BLUE),
    ] {
        draw.draw_line(position, position + axis * size, color, color, false);
        draw.draw_circle(position, axis, size * 0.8, 32, color, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_faces_skip_seventh_slot() {
        assert_eq!(reflection_probe_faces(0, 1), (vec![0], 1));
        assert_eq!(reflection_probe_faces(5, 1), (vec![5], 6));
        assert_eq!(reflection_probe_faces(6, 1), (vec![], 0));
        assert_eq!(reflection_probe_faces(4, 3), (vec![4, 5], 0));
    }

    #[test]
    fn test_probe_faces_clamp_count() {
        let (faces, next) = reflection_probe_faces(0, 10);
        assert_eq!(faces, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(next, 6);

        let (faces, next) = reflection_probe_faces(2, 0);
        assert_eq!(faces, vec![2]);
        assert_eq!(next, 3);
    }

    #[test]
    fn test_cube_face_looks_along_axis() {
        let vp = cube_face_view_projection(Vec3::ZERO, 0, 0.1, 100.0, false);
        let clip = vp * Vec3::new(10.0, 0.0, 0.0).extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);

        let behind = vp * Vec3::new(-10.0, 0.0, 0.0).extend(1.0);
        assert!(behind.w < 0.0);
    }

    #[test]
    fn test_text_vertices_layout() {
        let vertices = text_vertices("ab c\nd", [0.0, 0.0], Color::WHITE);
        assert_eq!(vertices.len(), 4 * 6);
        // 'c' sits after the space
        assert_eq!(vertices[12].pos, [3.0 * GLYPH_SIZE[0], 0.0]);
        // 'd' starts the second line
        assert_eq!(vertices[18].pos, [0.0, GLYPH_SIZE[1]]);
        assert_eq!(vertices[0].col, 0xffff_ffff);
    }

    #[test]
    fn test_pack_color_order() {
        assert_eq!(pack_color(Color::new(1.0, 0.0, 0.0, 0.0)), 0x0000_00ff);
        assert_eq!(pack_color(Color::new(0.0, 0.0, 0.0, 1.0)), 0xff00_0000);
    }
}
