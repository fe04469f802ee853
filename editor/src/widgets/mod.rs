//! Editor widgets and the registry that owns them.
//!
//! Every widget is registered once, at editor construction, under its
//! [`WidgetKind`]. Typed lookups go through [`WidgetRegistry::get`], which
//! finds the entry by kind and downcasts it to the concrete type registered
//! for that kind.

mod render_options;
mod viewport;

use std::any::Any;

pub use render_options::RenderOptionsWidget;
pub use viewport::ViewportWidget;

use crate::context::EditorContext;
use crate::error::{EditorError, EditorResult};

/// Identifiers for editor widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    RenderOptions,
    Viewport,
}

impl WidgetKind {
    pub fn title(self) -> &'static str {
        match self {
            WidgetKind::RenderOptions => "Render Options",
            WidgetKind::Viewport => "Viewport",
        }
    }
}

pub trait Widget: Any {
    fn kind(&self) -> WidgetKind;

    /// Build the widget's UI for this frame.
    fn show(&mut self, ctx: &egui::Context, editor: &mut EditorContext);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A widget type bound to exactly one [`WidgetKind`].
pub trait TypedWidget: Widget + Sized {
    const KIND: WidgetKind;
}

struct Entry {
    widget: Box<dyn Widget>,
    visible: bool,
}

#[derive(Default)]
pub struct WidgetRegistry {
    entries: Vec<Entry>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `widget`; registration order is draw order.
    pub fn register<W: TypedWidget>(&mut self, widget: W) -> EditorResult<()> {
        if self.contains(W::KIND) {
            return Err(EditorError::DuplicateWidget(W::KIND));
        }
        log::debug!("Registered widget '{}'", W::KIND.title());
        self.entries.push(Entry {
            widget: Box::new(widget),
            visible: true,
        });
        Ok(())
    }

    pub fn contains(&self, kind: WidgetKind) -> bool {
        self.entry(kind).is_some()
    }

    pub fn get<W: TypedWidget>(&self) -> Option<&W> {
        self.entry(W::KIND)?.widget.as_any().downcast_ref::<W>()
    }

    pub fn get_mut<W: TypedWidget>(&mut self) -> Option<&mut W> {
        self.entries
            .iter_mut()
            .find(|entry| entry.widget.kind() == W::KIND)?
            .widget
            .as_any_mut()
            .downcast_mut::<W>()
    }

    pub fn is_visible(&self, kind: WidgetKind) -> bool {
        self.entry(kind).is_some_and(|entry| entry.visible)
    }

    pub fn set_visible(&mut self, kind: WidgetKind, visible: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.widget.kind() == kind) {
            entry.visible = visible;
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = WidgetKind> + '_ {
        self.entries.iter().map(|entry| entry.widget.kind())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Show every visible widget, in registration order.
    pub fn show_all(&mut self, ctx: &egui::Context, editor: &mut EditorContext) {
        for entry in self.entries.iter_mut().filter(|entry| entry.visible) {
            entry.widget.show(ctx, editor);
        }
    }

    fn entry(&self, kind: WidgetKind) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.widget.kind() == kind)
    }
}
