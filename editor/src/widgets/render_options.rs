//! Toggles and sliders for every renderer option, written back through the
//! renderer handle.

use std::any::Any;

use forge_renderer::{OptionValue, Options, RendererHandle, RendererOption, Tonemapping};
use forge_rhi::Extent;

use super::{TypedWidget, Widget, WidgetKind};
use crate::context::EditorContext;

const GROUPS: [(&str, &[RendererOption]); 4] = [
    (
        "Editor",
        &[
            RendererOption::AABB,
            RendererOption::PICKING_RAY,
            RendererOption::GRID,
            RendererOption::TRANSFORM_HANDLE,
            RendererOption::SELECTION_OUTLINE,
            RendererOption::LIGHTS,
            RendererOption::PERFORMANCE_METRICS,
        ],
    ),
    (
        "Lighting",
        &[
            RendererOption::REFLECTION_PROBES,
            RendererOption::DEPTH_PREPASS,
            RendererOption::REVERSE_Z,
            RendererOption::VOLUMETRIC_FOG,
            RendererOption::SSAO,
            RendererOption::SSAO_GI,
            RendererOption::SCREEN_SPACE_SHADOWS,
            RendererOption::SSR,
        ],
    ),
    (
        "Post process",
        &[
            RendererOption::BLOOM,
            RendererOption::MOTION_BLUR,
            RendererOption::DEPTH_OF_FIELD,
            RendererOption::FILM_GRAIN,
            RendererOption::SHARPENING,
            RendererOption::CHROMATIC_ABERRATION,
            RendererOption::DEBANDING,
        ],
    ),
    (
        "Anti-aliasing and upsampling",
        &[
            RendererOption::ANTIALIASING_TAA,
            RendererOption::ANTIALIASING_FXAA,
            RendererOption::UPSAMPLE_TAA,
            RendererOption::UPSAMPLE_FSR,
        ],
    ),
];

pub const RESOLUTION_PRESETS: [(u32, u32); 5] = [
    (1280, 720),
    (1600, 900),
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
];

fn slider_range(option: OptionValue) -> std::ops::RangeInclusive<f32> {
    match option {
        OptionValue::Anisotropy => 0.0..=16.0,
        OptionValue::ShadowResolution => 128.0..=8192.0,
        OptionValue::Tonemapping => 0.0..=(Tonemapping::ALL.len() - 1) as f32,
        OptionValue::Gamma => 1.0..=3.0,
        OptionValue::Exposure => 0.0..=5.0,
        OptionValue::BloomIntensity | OptionValue::FogDensity => 0.0..=10.0,
        OptionValue::SharpenStrength
        | OptionValue::FilmGrainIntensity
        | OptionValue::ChromaticAberrationIntensity => 0.0..=1.0,
    }
}

#[derive(Default)]
pub struct RenderOptionsWidget {
    /// Edits submitted but not yet applied by the render thread, shown
    /// instead of the published options until the queue drains.
    pending: Option<Options>,
}

impl RenderOptionsWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options as the widget currently displays them.
    pub fn displayed(&mut self, handle: &RendererHandle) -> Options {
        if handle.pending_requests() == 0 {
            self.pending = None;
        }
        self.pending.clone().unwrap_or_else(|| handle.options())
    }

    /// Queue a request for every option that differs between `before` and
    /// `after`. Returns the number of requests queued.
    pub fn submit(&mut self, handle: &RendererHandle, before: &Options, after: &Options) -> usize {
        let mut queued = 0;
        for option in before.flags().symmetric_difference(after.flags()).iter() {
            handle.set_option(option, after.get(option));
            queued += 1;
        }
        for option in OptionValue::ALL {
            let value = after.value(option);
            if before.value(option) != value {
                handle.set_option_value(option, value);
                queued += 1;
            }
        }
        if queued > 0 {
            log::debug!("Render options: {} changes queued", queued);
            self.pending = Some(after.clone());
        }
        queued
    }

    fn options_ui(ui: &mut egui::Ui, options: &mut Options) {
        for (group, flags) in GROUPS {
            egui::CollapsingHeader::new(group)
                .default_open(true)
                .show(ui, |ui| {
                    for &option in flags {
                        let mut enabled = options.get(option);
                        if ui.checkbox(&mut enabled, option.name()).changed() {
                            options.set(option, enabled);
                        }
                    }
                });
        }

        egui::CollapsingHeader::new("Values")
            .default_open(true)
            .show(ui, |ui| {
                for option in OptionValue::ALL {
                    let mut value = options.value(option);
                    let changed = if option == OptionValue::Tonemapping {
                        let mut selected = options.tonemapping();
                        egui::ComboBox::from_label(option.name())
                            .selected_text(format!("{selected:?}"))
                            .show_ui(ui, |ui| {
                                for tonemapping in Tonemapping::ALL {
                                    ui.selectable_value(
                                        &mut selected,
                                        tonemapping,
                                        format!("{tonemapping:?}"),
                                    );
                                }
                            });
                        value = selected as u32 as f32;
                        value != options.value(option)
                    } else {
                        ui.add(egui::Slider::new(&mut value, slider_range(option)).text(option.name()))
                            .changed()
                    };
                    if changed {
                        options.set_value(option, value);
                    }
                }
            });
    }

    fn resolution_ui(ui: &mut egui::Ui, label: &str, current: Extent) -> Option<(u32, u32)> {
        let mut selected = (current.width, current.height);
        egui::ComboBox::from_label(label)
            .selected_text(format!("{}x{}", current.width, current.height))
            .show_ui(ui, |ui| {
                for preset in RESOLUTION_PRESETS {
                    ui.selectable_value(&mut selected, preset, format!("{}x{}", preset.0, preset.1));
                }
            });
        (selected != (current.width, current.height)).then_some(selected)
    }
}

impl Widget for RenderOptionsWidget {
    fn kind(&self) -> WidgetKind {
        Self::KIND
    }

    fn show(&mut self, ctx: &egui::Context, editor: &mut EditorContext) {
        let Ok(handle) = editor.renderer() else {
            return;
        };
        let handle = handle.clone();
        let before = self.displayed(&handle);
        let mut after = before.clone();

        egui::Window::new(Self::KIND.title())
            .default_width(320.0)
            .show(ctx, |ui| {
                if let Some((width, height)) =
                    Self::resolution_ui(ui, "Render resolution", handle.resolution_render())
                {
                    handle.set_resolution_render(width, height);
                }
                if let Some((width, height)) =
                    Self::resolution_ui(ui, "Output resolution", handle.resolution_output())
                {
                    handle.set_resolution_output(width, height);
                }
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    Self::options_ui(ui, &mut after);
                });

                let stats = handle.frame_statistics();
                ui.separator();
                ui.label(format!(
                    "Frame {}: {} passes, {} draws, {} dispatches",
                    stats.frame,
                    stats.passes.len(),
                    stats.counters.draw_calls,
                    stats.counters.dispatches
                ));
            });

        self.submit(&handle, &before, &after);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TypedWidget for RenderOptionsWidget {
    const KIND: WidgetKind = WidgetKind::RenderOptions;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_option_in_one_group() {
        let mut seen = RendererOption::empty();
        for (_, flags) in GROUPS {
            for &option in flags {
                assert!(!seen.contains(option), "{} listed twice", option.name());
                seen |= option;
            }
        }
        assert_eq!(seen, RendererOption::all());
    }

    #[test]
    fn test_slider_ranges_contain_defaults() {
        for option in OptionValue::ALL {
            assert!(
                slider_range(option).contains(&option.default_value()),
                "{}",
                option.name()
            );
        }
    }
}
