//! State shared by every widget, created by [`EditorContext::init`] and
//! released by [`EditorContext::teardown`].

use std::path::PathBuf;

use forge_renderer::{Renderer, RendererHandle};

use crate::error::{EditorError, EditorResult};
use crate::icons::IconLibrary;
use crate::payload::DragDropPayload;

#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Directory searched for `<icon>.png` files; generated icons otherwise.
    pub icon_directory: Option<PathBuf>,
    pub pixels_per_point: f32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            icon_directory: None,
            pixels_per_point: 1.0,
        }
    }
}

pub struct EditorContext {
    renderer: Option<RendererHandle>,
    icons: IconLibrary,
    drops: Vec<DragDropPayload>,
    pixels_per_point: f32,
}

impl EditorContext {
    pub fn init(renderer: &Renderer, config: &EditorConfig) -> EditorResult<Self> {
        let icons = IconLibrary::load(renderer.device(), config.icon_directory.as_deref())?;
        log::info!("Editor context initialized ({} icons)", icons.len());
        Ok(Self {
            renderer: Some(renderer.handle()),
            icons,
            drops: Vec::new(),
            pixels_per_point: config.pixels_per_point,
        })
    }

    /// Release the renderer handle and every icon texture.
    pub fn teardown(&mut self) {
        if self.renderer.take().is_some() {
            self.icons = IconLibrary::default();
            self.drops.clear();
            log::info!("Editor context torn down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn renderer(&self) -> EditorResult<&RendererHandle> {
        self.renderer.as_ref().ok_or(EditorError::NotInitialized)
    }

    pub fn icons(&self) -> &IconLibrary {
        &self.icons
    }

    pub fn icons_mut(&mut self) -> &mut IconLibrary {
        &mut self.icons
    }

    pub fn pixels_per_point(&self) -> f32 {
        self.pixels_per_point
    }

    /// Record a payload dropped onto a widget this frame.
    pub fn push_drop(&mut self, payload: DragDropPayload) {
        log::debug!("Dropped {}", payload.label());
        self.drops.push(payload);
    }

    /// Payloads dropped since the last call, oldest first.
    pub fn take_drops(&mut self) -> Vec<DragDropPayload> {
        std::mem::take(&mut self.drops)
    }
}
