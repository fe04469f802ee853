//! Turns tessellated egui output into draw lists the renderer composites
//! over the frame.

use std::collections::HashMap;
use std::sync::Arc;

use egui::epaint::{ImageDelta, Primitive};
use egui::{ClippedPrimitive, TextureId, TexturesDelta};
use forge_renderer::{RendererHandle, UiDrawList};
use forge_rhi::{
    Device, Rect, Texture, TextureDescriptor, TextureFlags, TextureFormat, TextureSlice,
    VertexPos2dTexCol8,
};

use crate::error::EditorResult;

/// Texture id that samples the renderer's frame output.
pub const FRAME_OUTPUT_TEXTURE: TextureId = TextureId::User(0);

/// Size of the surface the UI is drawn onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenDescriptor {
    pub size_in_pixels: [u32; 2],
    pub pixels_per_point: f32,
}

impl ScreenDescriptor {
    pub fn size_in_points(&self) -> [f32; 2] {
        [
            self.size_in_pixels[0] as f32 / self.pixels_per_point,
            self.size_in_pixels[1] as f32 / self.pixels_per_point,
        ]
    }
}

/// Where the editor's UI goes once egui has tessellated it.
pub trait UiRenderBackend {
    /// Apply egui's texture allocations and frees for this frame.
    fn update_textures(&mut self, delta: &TexturesDelta) -> EditorResult<()>;

    /// Make an externally owned texture addressable from egui images.
    fn register_texture(&mut self, texture: Arc<Texture>) -> TextureId;

    fn unregister_texture(&mut self, id: TextureId);

    /// Submit one frame of UI.
    fn render(
        &mut self,
        primitives: &[ClippedPrimitive],
        screen: &ScreenDescriptor,
    ) -> EditorResult<()>;
}

/// CPU copy of a managed texture, kept for partial updates.
struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Hands UI draw lists to the renderer, which draws them into the swap chain
/// after the scene.
pub struct RendererUiBackend {
    device: Arc<Device>,
    handle: RendererHandle,
    textures: HashMap<TextureId, Arc<Texture>>,
    texture_data: HashMap<TextureId, TextureData>,
    next_user_texture_id: u64,
}

impl RendererUiBackend {
    pub fn new(device: Arc<Device>, handle: RendererHandle) -> Self {
        Self {
            device,
            handle,
            textures: HashMap::new(),
            texture_data: HashMap::new(),
            // User(0) is the frame output.
            next_user_texture_id: 1,
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&Arc<Texture>> {
        self.textures.get(&id)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Convert tessellated primitives into a renderer draw list.
    pub fn build_draw_list(
        &self,
        primitives: &[ClippedPrimitive],
        screen: &ScreenDescriptor,
    ) -> UiDrawList {
        let [width, height] = screen.size_in_points();
        let mut list = UiDrawList::new(width, height);
        for ClippedPrimitive {
            clip_rect,
            primitive,
        } in primitives
        {
            let mesh = match primitive {
                Primitive::Mesh(mesh) => mesh,
                Primitive::Callback(_) => {
                    log::trace!("Skipping egui paint callback");
                    continue;
                }
            };
            if mesh.vertices.is_empty() || mesh.indices.is_empty() {
                continue;
            }
            let texture = if mesh.texture_id == FRAME_OUTPUT_TEXTURE {
                None
            } else {
                match self.textures.get(&mesh.texture_id) {
                    Some(texture) => Some(texture.clone()),
                    None => {
                        log::warn!("Missing texture {:?}", mesh.texture_id);
                        continue;
                    }
                }
            };
            let Some(clip) = clip_to_pixels(clip_rect, screen) else {
                continue;
            };

            let vertices: Vec<VertexPos2dTexCol8> = mesh
                .vertices
                .iter()
                .map(|v| VertexPos2dTexCol8 {
                    pos: [v.pos.x, v.pos.y],
                    tex: [v.uv.x, v.uv.y],
                    col: pack_color(v.color),
                })
                .collect();
            list.push_mesh(&vertices, &mesh.indices, clip, texture);
        }
        list
    }

    fn set_texture(&mut self, id: TextureId, delta: &ImageDelta) -> EditorResult<()> {
        let region_width = delta.image.width() as u32;
        let region_height = delta.image.height() as u32;
        let region: Vec<u8> = match &delta.image {
            egui::ImageData::Color(image) => {
                image.pixels.iter().flat_map(|c| c.to_array()).collect()
            }
            egui::ImageData::Font(image) => image
                .srgba_pixels(None)
                .flat_map(|c| c.to_array())
                .collect(),
        };

        let data = match (delta.pos, self.texture_data.remove(&id)) {
            (Some([x, y]), Some(mut data)) => {
                blit_region(&mut data, &region, region_width, x as u32, y as u32);
                data
            }
            (Some(_), None) => {
                log::warn!("Partial update of unknown texture {:?}, recreating", id);
                TextureData {
                    width: region_width,
                    height: region_height,
                    pixels: region,
                }
            }
            (None, _) => TextureData {
                width: region_width,
                height: region_height,
                pixels: region,
            },
        };

        let texture = Texture::with_data(
            &self.device,
            TextureDescriptor::new_2d(
                data.width,
                data.height,
                TextureFormat::Rgba8Unorm,
                TextureFlags::SRV,
            )
            .with_label(format!("egui_texture_{id:?}")),
            vec![TextureSlice::single(data.pixels.clone())],
        )?;
        self.textures.insert(id, texture);
        self.texture_data.insert(id, data);
        Ok(())
    }
}

impl UiRenderBackend for RendererUiBackend {
    fn update_textures(&mut self, delta: &TexturesDelta) -> EditorResult<()> {
        for (id, image) in &delta.set {
            self.set_texture(*id, image)?;
        }
        for id in &delta.free {
            self.textures.remove(id);
            self.texture_data.remove(id);
        }
        Ok(())
    }

    fn register_texture(&mut self, texture: Arc<Texture>) -> TextureId {
        let id = TextureId::User(self.next_user_texture_id);
        self.next_user_texture_id += 1;
        self.textures.insert(id, texture);
        id
    }

    fn unregister_texture(&mut self, id: TextureId) {
        if matches!(id, TextureId::User(_)) {
            self.textures.remove(&id);
        } else {
            log::warn!("Attempted to unregister non-user texture {:?}", id);
        }
    }

    fn render(
        &mut self,
        primitives: &[ClippedPrimitive],
        screen: &ScreenDescriptor,
    ) -> EditorResult<()> {
        let list = self.build_draw_list(primitives, screen);
        log::trace!(
            "Submitting UI: {} commands, {} vertices",
            list.commands.len(),
            list.vertices.len()
        );
        self.handle.submit_ui(list);
        Ok(())
    }
}

/// RGBA8 with red in the low byte.
fn pack_color(color: egui::Color32) -> u32 {
    u32::from_le_bytes(color.to_array())
}

/// Clip rectangle in physical pixels, clamped to the screen. `None` when
/// nothing is visible.
fn clip_to_pixels(clip: &egui::Rect, screen: &ScreenDescriptor) -> Option<Rect> {
    let ppp = screen.pixels_per_point;
    let [screen_width, screen_height] = screen.size_in_pixels;
    let min_x = ((clip.min.x * ppp).round() as i64).clamp(0, screen_width as i64);
    let min_y = ((clip.min.y * ppp).round() as i64).clamp(0, screen_height as i64);
    let max_x = ((clip.max.x * ppp).round() as i64).clamp(min_x, screen_width as i64);
    let max_y = ((clip.max.y * ppp).round() as i64).clamp(min_y, screen_height as i64);
    let (width, height) = ((max_x - min_x) as u32, (max_y - min_y) as u32);
    (width > 0 && height > 0).then(|| Rect::new(min_x as i32, min_y as i32, width, height))
}

fn blit_region(data: &mut TextureData, region: &[u8], region_width: u32, x: u32, y: u32) {
    let row_bytes = region_width as usize * 4;
    if row_bytes == 0 {
        return;
    }
    for (row, source) in region.chunks_exact(row_bytes).enumerate() {
        let dst_y = y as usize + row;
        if dst_y >= data.height as usize || x >= data.width {
            break;
        }
        let start = (dst_y * data.width as usize + x as usize) * 4;
        let len = row_bytes.min((data.width - x) as usize * 4);
        data.pixels[start..start + len].copy_from_slice(&source[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(width: u32, height: u32, pixels_per_point: f32) -> ScreenDescriptor {
        ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point,
        }
    }

    #[test]
    fn test_pack_color_red_low_byte() {
        let packed = pack_color(egui::Color32::from_rgba_premultiplied(1, 2, 3, 4));
        assert_eq!(packed, 0x0403_0201);
    }

    #[test]
    fn test_clip_scales_and_clamps() {
        let clip = egui::Rect::from_min_max(egui::pos2(-10.0, 5.0), egui::pos2(500.0, 50.0));
        let rect = clip_to_pixels(&clip, &screen(800, 600, 2.0)).unwrap();
        assert_eq!(rect, Rect::new(0, 10, 800, 90));
    }

    #[test]
    fn test_clip_outside_screen() {
        let clip = egui::Rect::from_min_max(egui::pos2(900.0, 0.0), egui::pos2(1000.0, 10.0));
        assert!(clip_to_pixels(&clip, &screen(800, 600, 1.0)).is_none());
    }

    #[test]
    fn test_blit_region_patches_rows() {
        let mut data = TextureData {
            width: 4,
            height: 4,
            pixels: vec![0; 64],
        };
        blit_region(&mut data, &[255; 16], 2, 1, 2);
        let texel = |x: usize, y: usize| data.pixels[(y * 4 + x) * 4];
        assert_eq!(texel(1, 2), 255);
        assert_eq!(texel(2, 3), 255);
        assert_eq!(texel(0, 2), 0);
        assert_eq!(texel(3, 3), 0);
        assert_eq!(texel(1, 1), 0);
    }

    #[test]
    fn test_screen_size_in_points() {
        assert_eq!(screen(1600, 900, 2.0).size_in_points(), [800.0, 450.0]);
    }
}
