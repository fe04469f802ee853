use bevy_ecs::world::World;
use forge_editor::{Editor, EditorConfig, EditorResult};
use forge_renderer::{
    BoundingBox, Camera, GeometryType, Light, LightType, Renderable, Renderer, RendererConfig,
    Transform,
};
use glam::Vec3;

const FRAMES: u32 = 3;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    forge_renderer::init();

    if let Err(e) = run() {
        log::error!("Editor failed: {}", e);
        std::process::exit(1);
    }
}

/// Render a small scene with the editor UI on top, headless.
fn run() -> EditorResult<()> {
    let mut renderer = Renderer::new(RendererConfig::headless(1280, 720))?;
    let mut editor = Editor::new(&renderer, EditorConfig::default())?;

    let mut world = World::new();
    world.spawn((
        Camera::default(),
        Transform::looking_at(Vec3::new(0.0, 2.0, -5.0), Vec3::ZERO),
    ));
    world.spawn((
        Renderable {
            geometry_type: GeometryType::Cube,
            bounding_box: BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            ..Default::default()
        },
        Transform::from_position(Vec3::ZERO),
    ));
    world.spawn((
        Light::new(LightType::Directional),
        Transform::looking_at(Vec3::new(1.0, 4.0, 1.0), Vec3::ZERO),
    ));
    renderer.on_world_resolved(&world);

    for frame in 0..FRAMES {
        editor.run_frame(egui::RawInput::default())?;
        renderer.update(1.0 / 60.0, &world)?;
        let stats = renderer.frame_statistics();
        log::info!(
            "Frame {}: {} passes, {} draw calls",
            frame,
            stats.passes.len(),
            stats.counters.draw_calls
        );
    }

    editor.teardown();
    Ok(())
}
