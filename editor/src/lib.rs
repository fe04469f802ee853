//! # Forge Editor
//!
//! Editor layer over [`forge_renderer`]: a registry of egui widgets that read
//! and write renderer state through a [`forge_renderer::RendererHandle`], and
//! a UI backend that hands the tessellated UI to the renderer.
//!
//! ## Overview
//!
//! - [`Editor`] - owns the egui context, widgets and UI backend
//! - [`EditorContext`] - state shared by widgets, with explicit init and teardown
//! - [`WidgetRegistry`] - widgets by [`WidgetKind`], with typed lookup
//! - [`DragDropPayload`] - what is dragged between widgets
//! - [`UiRenderBackend`] / [`RendererUiBackend`] - where the UI is drawn

pub mod context;
pub mod editor;
pub mod error;
pub mod icons;
pub mod payload;
pub mod ui_backend;
pub mod widgets;

pub use context::{EditorConfig, EditorContext};
pub use editor::Editor;
pub use error::{EditorError, EditorResult};
pub use icons::{Icon, IconKind, IconLibrary};
pub use payload::DragDropPayload;
pub use ui_backend::{RendererUiBackend, ScreenDescriptor, UiRenderBackend, FRAME_OUTPUT_TEXTURE};
pub use widgets::{
    RenderOptionsWidget, TypedWidget, ViewportWidget, Widget, WidgetKind, WidgetRegistry,
};
