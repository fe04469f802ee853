use forge_renderer::Renderer;

use crate::context::{EditorConfig, EditorContext};
use crate::error::{EditorError, EditorResult};
use crate::ui_backend::{RendererUiBackend, ScreenDescriptor, UiRenderBackend};
use crate::widgets::{RenderOptionsWidget, ViewportWidget, WidgetRegistry};

/// The editor: widgets, their shared context, and the backend their UI is
/// drawn through.
pub struct Editor<B: UiRenderBackend = RendererUiBackend> {
    egui: egui::Context,
    widgets: WidgetRegistry,
    context: EditorContext,
    backend: B,
    screen: ScreenDescriptor,
}

impl Editor<RendererUiBackend> {
    pub fn new(renderer: &Renderer, config: EditorConfig) -> EditorResult<Self> {
        let backend = RendererUiBackend::new(renderer.device().clone(), renderer.handle());
        Self::with_backend(renderer, config, backend)
    }
}

impl<B: UiRenderBackend> Editor<B> {
    pub fn with_backend(renderer: &Renderer, config: EditorConfig, mut backend: B) -> EditorResult<Self> {
        let mut context = EditorContext::init(renderer, &config)?;
        for (_, icon) in context.icons_mut().iter_mut() {
            icon.texture_id = Some(backend.register_texture(icon.texture.clone()));
        }

        let mut widgets = WidgetRegistry::new();
        widgets.register(RenderOptionsWidget::new())?;
        widgets.register(ViewportWidget::new())?;

        let egui = egui::Context::default();
        egui.set_visuals(egui::Visuals::dark());
        egui.set_pixels_per_point(config.pixels_per_point);

        let window = renderer.config().window_size;
        Ok(Self {
            egui,
            widgets,
            context,
            backend,
            screen: ScreenDescriptor {
                size_in_pixels: [window.width, window.height],
                pixels_per_point: config.pixels_per_point,
            },
        })
    }

    pub fn egui_context(&self) -> &egui::Context {
        &self.egui
    }

    pub fn widgets(&self) -> &WidgetRegistry {
        &self.widgets
    }

    pub fn widgets_mut(&mut self) -> &mut WidgetRegistry {
        &mut self.widgets
    }

    pub fn context(&self) -> &EditorContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EditorContext {
        &mut self.context
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.screen.size_in_pixels = [width, height];
    }

    /// Run every visible widget and submit the resulting UI.
    pub fn run_frame(&mut self, mut raw_input: egui::RawInput) -> EditorResult<()> {
        if !self.context.is_initialized() {
            return Err(EditorError::NotInitialized);
        }
        let [width, height] = self.screen.size_in_points();
        raw_input.screen_rect.get_or_insert(egui::Rect::from_min_size(
            egui::Pos2::ZERO,
            egui::vec2(width, height),
        ));

        let Self {
            egui,
            widgets,
            context,
            backend,
            screen,
        } = self;
        let output = egui.run(raw_input, |ctx| widgets.show_all(ctx, context));

        backend.update_textures(&output.textures_delta)?;
        let primitives = egui.tessellate(output.shapes, output.pixels_per_point);
        backend.render(&primitives, screen)
    }

    /// Release icon textures and the renderer handle. The editor cannot run
    /// frames afterwards.
    pub fn teardown(&mut self) {
        for (_, icon) in self.context.icons_mut().iter_mut() {
            if let Some(id) = icon.texture_id.take() {
                self.backend.unregister_texture(id);
            }
        }
        self.context.teardown();
    }
}
