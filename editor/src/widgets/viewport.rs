//! Shows the renderer's frame output and forwards the panel size to the
//! renderer's viewport.

use std::any::Any;

use forge_renderer::RendererHandle;

use super::{TypedWidget, Widget, WidgetKind};
use crate::context::EditorContext;
use crate::payload::DragDropPayload;
use crate::ui_backend::FRAME_OUTPUT_TEXTURE;

#[derive(Default)]
pub struct ViewportWidget {
    /// Size last forwarded to the renderer, in physical pixels.
    size: Option<(u32, u32)>,
}

impl ViewportWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Forward a new panel size. Empty panels and unchanged sizes are not
    /// forwarded. Returns whether a request was queued.
    pub fn resize(&mut self, handle: &RendererHandle, width: f32, height: f32) -> bool {
        let size = (width.round().max(0.0) as u32, height.round().max(0.0) as u32);
        if size.0 == 0 || size.1 == 0 || self.size == Some(size) {
            return false;
        }
        log::debug!("Viewport resized to {}x{}", size.0, size.1);
        handle.set_viewport(size.0 as f32, size.1 as f32);
        self.size = Some(size);
        true
    }
}

impl Widget for ViewportWidget {
    fn kind(&self) -> WidgetKind {
        Self::KIND
    }

    fn show(&mut self, ctx: &egui::Context, editor: &mut EditorContext) {
        let Ok(handle) = editor.renderer() else {
            return;
        };
        let handle = handle.clone();
        let pixels_per_point = editor.pixels_per_point();

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let size = ui.available_size();
                self.resize(&handle, size.x * pixels_per_point, size.y * pixels_per_point);

                let image = egui::Image::new(egui::load::SizedTexture::new(FRAME_OUTPUT_TEXTURE, size))
                    .sense(egui::Sense::click_and_drag());
                let response = ui.add(image);

                if response.dnd_hover_payload::<DragDropPayload>().is_some() {
                    ui.painter().rect_stroke(
                        response.rect,
                        0.0,
                        egui::Stroke::new(2.0, egui::Color32::LIGHT_BLUE),
                    );
                }
                if let Some(payload) = response.dnd_release_payload::<DragDropPayload>() {
                    editor.push_drop(payload.as_ref().clone());
                }
            });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedWidget for ViewportWidget {
    const KIND: WidgetKind = WidgetKind::Viewport;
}
