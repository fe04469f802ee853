//! Renderer options: a bitmask of toggles plus a table of scalar values.
//!
//! [`Options`] only stores and clamps. Transition detection is reported back
//! to the renderer, which decides what has to be recreated.

use std::collections::HashMap;

use bitflags::bitflags;

bitflags! {
    /// Boolean renderer toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RendererOption: u64 {
        const AABB = 1 << 0;
        const PICKING_RAY = 1 << 1;
        const GRID = 1 << 2;
        const TRANSFORM_HANDLE = 1 << 3;
        const SELECTION_OUTLINE = 1 << 4;
        const LIGHTS = 1 << 5;
        const PERFORMANCE_METRICS = 1 << 6;
        const REFLECTION_PROBES = 1 << 7;
        const DEPTH_PREPASS = 1 << 8;
        const REVERSE_Z = 1 << 9;
        const BLOOM = 1 << 10;
        const VOLUMETRIC_FOG = 1 << 11;
        const SSAO = 1 << 12;
        const SSAO_GI = 1 << 13;
        const SCREEN_SPACE_SHADOWS = 1 << 14;
        const SSR = 1 << 15;
        const MOTION_BLUR = 1 << 16;
        const DEPTH_OF_FIELD = 1 << 17;
        const FILM_GRAIN = 1 << 18;
        const SHARPENING = 1 << 19;
        const CHROMATIC_ABERRATION = 1 << 20;
        const DEBANDING = 1 << 21;
        const ANTIALIASING_TAA = 1 << 22;
        const ANTIALIASING_FXAA = 1 << 23;
        const UPSAMPLE_TAA = 1 << 24;
        const UPSAMPLE_FSR = 1 << 25;
    }
}

impl RendererOption {
    /// Options whose transition changes the set or size of render targets.
    pub const RECREATES_RENDER_TEXTURES: Self = Self::UPSAMPLE_TAA.union(Self::UPSAMPLE_FSR);

    /// Options whose transition changes depth comparison direction.
    pub const RECREATES_DEPTH_STATES: Self = Self::REVERSE_Z;

    pub fn name(self) -> &'static str {
        self.iter_names().next().map_or("NONE", |(name, _)| name)
    }
}

impl Default for RendererOption {
    fn default() -> Self {
        Self::GRID
            | Self::TRANSFORM_HANDLE
            | Self::SELECTION_OUTLINE
            | Self::LIGHTS
            | Self::REFLECTION_PROBES
            | Self::REVERSE_Z
            | Self::BLOOM
            | Self::VOLUMETRIC_FOG
            | Self::SSAO
            | Self::SCREEN_SPACE_SHADOWS
            | Self::SSR
            | Self::MOTION_BLUR
            | Self::SHARPENING
            | Self::DEBANDING
            | Self::ANTIALIASING_TAA
            | Self::UPSAMPLE_TAA
    }
}

/// Tonemapping operators, stored as the numeric value of
/// [`OptionValue::Tonemapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Tonemapping {
    #[default]
    Aces = 0,
    Reinhard = 1,
    Uncharted2 = 2,
    Matrix = 3,
    Disabled = 4,
}

impl Tonemapping {
    pub const ALL: [Self; 5] = [
        Self::Aces,
        Self::Reinhard,
        Self::Uncharted2,
        Self::Matrix,
        Self::Disabled,
    ];

    pub fn from_value(value: f32) -> Self {
        Self::ALL
            .get(value.round().max(0.0) as usize)
            .copied()
            .unwrap_or_default()
    }
}

/// Scalar renderer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionValue {
    Anisotropy,
    ShadowResolution,
    Tonemapping,
    Gamma,
    Exposure,
    SharpenStrength,
    BloomIntensity,
    FogDensity,
    FilmGrainIntensity,
    ChromaticAberrationIntensity,
}

impl OptionValue {
    pub const ALL: [Self; 10] = [
        Self::Anisotropy,
        Self::ShadowResolution,
        Self::Tonemapping,
        Self::Gamma,
        Self::Exposure,
        Self::SharpenStrength,
        Self::BloomIntensity,
        Self::FogDensity,
        Self::FilmGrainIntensity,
        Self::ChromaticAberrationIntensity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Anisotropy => "Anisotropy",
            Self::ShadowResolution => "Shadow resolution",
            Self::Tonemapping => "Tonemapping",
            Self::Gamma => "Gamma",
            Self::Exposure => "Exposure",
            Self::SharpenStrength => "Sharpen strength",
            Self::BloomIntensity => "Bloom intensity",
            Self::FogDensity => "Fog density",
            Self::FilmGrainIntensity => "Film grain intensity",
            Self::ChromaticAberrationIntensity => "Chromatic aberration intensity",
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            Self::Anisotropy => 16.0,
            Self::ShadowResolution => 2048.0,
            Self::Tonemapping => Tonemapping::Aces as u32 as f32,
            Self::Gamma => 2.2,
            Self::Exposure => 1.0,
            Self::SharpenStrength => 1.0,
            Self::BloomIntensity => 0.2,
            Self::FogDensity => 0.08,
            Self::FilmGrainIntensity => 0.005,
            Self::ChromaticAberrationIntensity => 0.5,
        }
    }
}

/// Smallest shadow map the renderer will allocate.
pub const MIN_SHADOW_RESOLUTION: f32 = 128.0;
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Outcome of an option write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionChange {
    Unchanged,
    Changed { old: f32, new: f32 },
}

impl OptionChange {
    pub fn changed(self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    flags: RendererOption,
    values: HashMap<OptionValue, f32>,
    max_texture_dimension: u32,
}

impl Options {
    pub fn new(flags: RendererOption, max_texture_dimension: u32) -> Self {
        let values = OptionValue::ALL
            .into_iter()
            .map(|option| (option, option.default_value()))
            .collect();
        let mut options = Self {
            flags: RendererOption::empty(),
            values,
            max_texture_dimension,
        };
        for option in flags.iter() {
            options.set(option, true);
        }
        let shadow = options.value(OptionValue::ShadowResolution);
        options.set_value(OptionValue::ShadowResolution, shadow);
        options
    }

    pub fn flags(&self) -> RendererOption {
        self.flags
    }

    pub fn get(&self, option: RendererOption) -> bool {
        self.flags.contains(option)
    }

    /// Returns the options that actually transitioned.
    ///
    /// Upsampling modes are mutually exclusive: enabling one clears the other.
    pub fn set(&mut self, option: RendererOption, enabled: bool) -> RendererOption {
        let before = self.flags;
        self.flags.set(option, enabled);
        if enabled {
            if option.contains(RendererOption::UPSAMPLE_TAA) {
                self.flags.remove(RendererOption::UPSAMPLE_FSR);
            } else if option.contains(RendererOption::UPSAMPLE_FSR) {
                self.flags.remove(RendererOption::UPSAMPLE_TAA);
            }
        }
        before.symmetric_difference(self.flags)
    }

    pub fn value(&self, option: OptionValue) -> f32 {
        self.values
            .get(&option)
            .copied()
            .unwrap_or_else(|| option.default_value())
    }

    pub fn tonemapping(&self) -> Tonemapping {
        Tonemapping::from_value(self.value(OptionValue::Tonemapping))
    }

    /// Clamp `value` into the option's domain.
    pub fn clamp(&self, option: OptionValue, value: f32) -> f32 {
        match option {
            OptionValue::Anisotropy => value.clamp(0.0, MAX_ANISOTROPY),
            OptionValue::ShadowResolution => value
                .clamp(MIN_SHADOW_RESOLUTION, self.max_texture_dimension as f32)
                .round(),
            OptionValue::Tonemapping => Tonemapping::from_value(value) as u32 as f32,
            OptionValue::Gamma => value.clamp(1.0, 3.0),
            OptionValue::Exposure => value.max(0.0),
            OptionValue::SharpenStrength
            | OptionValue::FilmGrainIntensity
            | OptionValue::ChromaticAberrationIntensity => value.clamp(0.0, 1.0),
            OptionValue::BloomIntensity | OptionValue::FogDensity => value.clamp(0.0, 10.0),
        }
    }

    pub fn set_value(&mut self, option: OptionValue, value: f32) -> OptionChange {
        let new = self.clamp(option, value);
        let old = self.value(option);
        if old == new {
            return OptionChange::Unchanged;
        }
        self.values.insert(option, new);
        OptionChange::Changed { old, new }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_transitions_only() {
        let mut options = Options::new(RendererOption::empty(), 16384);
        assert_eq!(options.set(RendererOption::BLOOM, true), RendererOption::BLOOM);
        assert!(options.set(RendererOption::BLOOM, true).is_empty());
        assert_eq!(options.set(RendererOption::BLOOM, false), RendererOption::BLOOM);
    }

    #[test]
    fn test_upsampling_modes_are_exclusive() {
        let mut options = Options::new(RendererOption::UPSAMPLE_TAA, 16384);
        let changed = options.set(RendererOption::UPSAMPLE_FSR, true);
        assert_eq!(
            changed,
            RendererOption::UPSAMPLE_FSR | RendererOption::UPSAMPLE_TAA
        );
        assert!(!options.get(RendererOption::UPSAMPLE_TAA));
    }

    #[test]
    fn test_value_clamps() {
        let mut options = Options::new(RendererOption::empty(), 4096);
        options.set_value(OptionValue::Anisotropy, 64.0);
        assert_eq!(options.value(OptionValue::Anisotropy), 16.0);
        options.set_value(OptionValue::Anisotropy, -1.0);
        assert_eq!(options.value(OptionValue::Anisotropy), 0.0);

        options.set_value(OptionValue::ShadowResolution, 100_000.0);
        assert_eq!(options.value(OptionValue::ShadowResolution), 4096.0);
        options.set_value(OptionValue::ShadowResolution, 1.0);
        assert_eq!(options.value(OptionValue::ShadowResolution), MIN_SHADOW_RESOLUTION);
    }

    #[test]
    fn test_unchanged_value() {
        let mut options = Options::new(RendererOption::empty(), 4096);
        let gamma = options.value(OptionValue::Gamma);
        assert_eq!(options.set_value(OptionValue::Gamma, gamma), OptionChange::Unchanged);
        assert!(options.set_value(OptionValue::Gamma, 2.4).changed());
    }

    #[test]
    fn test_tonemapping_from_value() {
        assert_eq!(Tonemapping::from_value(1.2), Tonemapping::Reinhard);
        assert_eq!(Tonemapping::from_value(99.0), Tonemapping::Aces);
    }
}
