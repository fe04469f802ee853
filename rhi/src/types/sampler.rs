//! Sampler types.

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture addressing mode outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Comparison function for depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

impl CompareFunction {
    /// Mirror of the function for a reversed depth range.
    pub fn reversed(self) -> Self {
        match self {
            Self::Less => Self::Greater,
            Self::LessEqual => Self::GreaterEqual,
            Self::Greater => Self::Less,
            Self::GreaterEqual => Self::LessEqual,
            other => other,
        }
    }
}

/// Descriptor for creating a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode: AddressMode,
    pub compare: Option<CompareFunction>,
    /// 0 disables anisotropic filtering.
    pub anisotropy: f32,
    pub mip_lod_bias: f32,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode: AddressMode::Wrap,
            compare: None,
            anisotropy: 0.0,
            mip_lod_bias: 0.0,
        }
    }
}

impl SamplerDescriptor {
    pub fn new(filter: FilterMode, address_mode: AddressMode) -> Self {
        Self {
            min_filter: filter,
            mag_filter: filter,
            mipmap_filter: filter,
            address_mode,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = Some(compare);
        self
    }

    pub fn with_anisotropy(mut self, anisotropy: f32, mip_lod_bias: f32) -> Self {
        self.anisotropy = anisotropy;
        self.mip_lod_bias = mip_lod_bias;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_compare() {
        assert_eq!(CompareFunction::Less.reversed(), CompareFunction::Greater);
        assert_eq!(
            CompareFunction::GreaterEqual.reversed(),
            CompareFunction::LessEqual
        );
        assert_eq!(CompareFunction::Always.reversed(), CompareFunction::Always);
    }
}
