//! Editor widgets, context lifetime and UI submission against a headless renderer.

use std::sync::Arc;

use bevy_ecs::world::World;
use rstest::{fixture, rstest};

use forge_editor::{
    DragDropPayload, Editor, EditorConfig, EditorError, IconKind, RenderOptionsWidget,
    RendererUiBackend, ScreenDescriptor, UiRenderBackend, ViewportWidget, WidgetKind,
    FRAME_OUTPUT_TEXTURE,
};
use forge_renderer::{OptionValue, Renderer, RendererConfig, RendererOption};
use forge_rhi::{Device, DeviceDescriptor, NullBackend};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[fixture]
fn renderer() -> Renderer {
    init_logging();
    let backend = Arc::new(NullBackend::new());
    let device = Device::with_backend(backend, &DeviceDescriptor::default()).expect("null device");
    Renderer::with_device(RendererConfig::headless(640, 360), device).expect("renderer")
}

fn update(renderer: &mut Renderer) {
    renderer.update(1.0 / 60.0, &World::new()).expect("frame");
}

#[rstest]
fn test_widgets_registered_at_construction(renderer: Renderer) {
    let editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    let widgets = editor.widgets();

    assert_eq!(widgets.len(), 2);
    assert!(widgets.get::<RenderOptionsWidget>().is_some());
    assert!(widgets.get::<ViewportWidget>().is_some());
    assert_eq!(
        widgets.kinds().collect::<Vec<_>>(),
        vec![WidgetKind::RenderOptions, WidgetKind::Viewport]
    );
}

#[rstest]
fn test_duplicate_widget_rejected(renderer: Renderer) {
    let mut editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    let result = editor.widgets_mut().register(ViewportWidget::new());
    assert!(matches!(
        result,
        Err(EditorError::DuplicateWidget(WidgetKind::Viewport))
    ));
    assert_eq!(editor.widgets().len(), 2);
}

#[rstest]
fn test_widget_visibility(renderer: Renderer) {
    let mut editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    assert!(editor.widgets().is_visible(WidgetKind::RenderOptions));
    editor
        .widgets_mut()
        .set_visible(WidgetKind::RenderOptions, false);
    assert!(!editor.widgets().is_visible(WidgetKind::RenderOptions));
    assert!(editor.widgets().is_visible(WidgetKind::Viewport));
}

#[rstest]
fn test_icons_registered_with_backend(renderer: Renderer) {
    let editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    let icons = editor.context().icons();

    assert_eq!(icons.len(), IconKind::ALL.len());
    for kind in IconKind::ALL {
        let id = icons.texture_id(kind).expect("registered icon");
        let texture = editor.backend().texture(id).expect("backend texture");
        assert_eq!(texture.id(), icons.get(kind).unwrap().texture.id());
    }
}

#[rstest]
fn test_ui_reaches_renderer(mut renderer: Renderer) {
    let mut editor = Editor::new(&renderer, EditorConfig::default()).unwrap();

    editor.run_frame(egui::RawInput::default()).unwrap();
    assert!(editor.backend().texture(egui::TextureId::default()).is_some());

    update(&mut renderer);
    let passes = renderer.frame_statistics().passes;
    assert!(passes.contains(&"ui"), "passes: {passes:?}");
    assert!(!passes.contains(&"frame_to_swap_chain"));

    // Without a new UI frame the renderer falls back to the plain blit.
    update(&mut renderer);
    assert!(renderer
        .frame_statistics()
        .passes
        .contains(&"frame_to_swap_chain"));
}

#[rstest]
fn test_viewport_forwards_size_changes(mut renderer: Renderer) {
    let handle = renderer.handle();
    let mut viewport = ViewportWidget::new();

    assert!(viewport.resize(&handle, 800.4, 449.6));
    assert!(!viewport.resize(&handle, 800.0, 450.0));
    assert!(!viewport.resize(&handle, 0.0, 450.0));
    assert_eq!(viewport.size(), Some((800, 450)));
    assert_eq!(handle.pending_requests(), 1);

    update(&mut renderer);
    assert_eq!(renderer.viewport().width, 800.0);
    assert_eq!(renderer.viewport().height, 450.0);
}

#[rstest]
fn test_render_options_submit_only_changes(mut renderer: Renderer) {
    let handle = renderer.handle();
    let mut widget = RenderOptionsWidget::new();
    let before = widget.displayed(&handle);

    let mut after = before.clone();
    assert_eq!(widget.submit(&handle, &before, &after), 0);

    after.set(RendererOption::SSAO, false);
    after.set(RendererOption::ANTIALIASING_FXAA, true);
    after.set_value(OptionValue::Gamma, 2.4);
    assert_eq!(widget.submit(&handle, &before, &after), 3);

    // Pending edits stay displayed until the render thread applies them.
    assert!(!widget.displayed(&handle).get(RendererOption::SSAO));
    assert!(handle.get_option(RendererOption::SSAO));

    update(&mut renderer);
    let applied = widget.displayed(&handle);
    assert!(!applied.get(RendererOption::SSAO));
    assert!(applied.get(RendererOption::ANTIALIASING_FXAA));
    assert_eq!(applied.value(OptionValue::Gamma), 2.4);
}

#[rstest]
fn test_drops_drained_in_order(renderer: Renderer) {
    let mut editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    let context = editor.context_mut();
    context.push_drop(DragDropPayload::Model(String::from("models/a.fmdl")));
    context.push_drop(DragDropPayload::Texture(String::from("textures/b.png")));

    let drops = context.take_drops();
    assert_eq!(drops.len(), 2);
    assert_eq!(drops[0].model(), Some("models/a.fmdl"));
    assert_eq!(drops[1].texture(), Some("textures/b.png"));
    assert!(context.take_drops().is_empty());
}

#[rstest]
fn test_teardown_releases_context(renderer: Renderer) {
    let mut editor = Editor::new(&renderer, EditorConfig::default()).unwrap();
    let icon = editor.context().icons().texture_id(IconKind::Light).unwrap();

    editor.teardown();

    assert!(!editor.context().is_initialized());
    assert!(editor.context().icons().is_empty());
    assert!(editor.backend().texture(icon).is_none());
    assert!(matches!(
        editor.context().renderer(),
        Err(EditorError::NotInitialized)
    ));
    assert!(matches!(
        editor.run_frame(egui::RawInput::default()),
        Err(EditorError::NotInitialized)
    ));
}

#[rstest]
fn test_backend_draw_list(renderer: Renderer) {
    let mut backend = RendererUiBackend::new(renderer.device().clone(), renderer.handle());
    let frame = renderer.frame_texture().unwrap().clone();
    let registered = backend.register_texture(frame.clone());
    assert_ne!(registered, FRAME_OUTPUT_TEXTURE);

    let quad = |texture_id| {
        let mut mesh = egui::epaint::Mesh::with_texture(texture_id);
        mesh.add_rect_with_uv(
            egui::Rect::from_min_size(egui::pos2(10.0, 10.0), egui::vec2(100.0, 50.0)),
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
        egui::ClippedPrimitive {
            clip_rect: egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(640.0, 360.0)),
            primitive: egui::epaint::Primitive::Mesh(mesh),
        }
    };
    let primitives = [
        quad(FRAME_OUTPUT_TEXTURE),
        quad(registered),
        quad(egui::TextureId::User(999)),
    ];
    let screen = ScreenDescriptor {
        size_in_pixels: [640, 360],
        pixels_per_point: 1.0,
    };

    let list = backend.build_draw_list(&primitives, &screen);
    assert_eq!(list.commands.len(), 2, "unknown textures are skipped");
    assert!(list.commands[0].texture.is_none());
    assert_eq!(
        list.commands[1].texture.as_ref().map(|t| t.id()),
        Some(frame.id())
    );
    assert_eq!(list.commands[1].vertex_offset, 4);
    assert_eq!(list.indices.len(), 12);
    assert_eq!(list.screen_size, [640.0, 360.0]);
}
