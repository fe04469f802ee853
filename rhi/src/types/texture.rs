//! Texture types.

use bitflags::bitflags;

/// Maximum number of mip levels tracked per texture.
pub const MAX_MIP_LEVELS: usize = 12;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    R8Unorm,
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    #[default]
    Rgba8Unorm,
    Bgra8Unorm,
    Rgb10a2Unorm,
    R11g11b10Float,
    Rgba16Snorm,
    Rgba16Float,
    Rgba32Float,
    D16Unorm,
    D32Float,
    D32FloatS8X24Uint,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D16Unorm | Self::D32Float | Self::D32FloatS8X24Uint)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D32FloatS8X24Uint)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float | Self::D16Unorm => 2,
            Self::R32Float
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Bgra8Unorm
            | Self::Rgb10a2Unorm
            | Self::R11g11b10Float
            | Self::D32Float => 4,
            Self::Rg32Float | Self::Rgba16Snorm | Self::Rgba16Float | Self::D32FloatS8X24Uint => {
                8
            }
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Capabilities and views a texture is created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        /// Shader resource view.
        const SRV = 1 << 0;
        /// Unordered access (storage) view.
        const UAV = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        /// Allocate the full mip chain.
        const MIPS = 1 << 4;
        /// One view per mip level, required for per-mip compute writes.
        const PER_MIP_VIEWS = 1 << 5;
        const CUBEMAP = 1 << 6;
        /// Can be the source or destination of a clear or blit.
        const CLEAR_OR_BLIT = 1 << 7;
        /// Mips are produced on the GPU after upload.
        const MIPS_GENERATED = 1 << 8;
    }
}

/// Image layout tracked per mip for explicit barrier management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    Preinitialized,
    ColorAttachment,
    DepthAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSource,
    TransferDestination,
    PresentSource,
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub array_length: u32,
    pub mip_count: u32,
    pub format: TextureFormat,
    pub flags: TextureFlags,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, flags: TextureFlags) -> Self {
        Self {
            label: None,
            width,
            height,
            array_length: 1,
            mip_count: 1,
            format,
            flags,
        }
    }

    pub fn new_cube(size: u32, format: TextureFormat, flags: TextureFlags) -> Self {
        Self {
            label: None,
            width: size,
            height: size,
            array_length: 6,
            mip_count: 1,
            format,
            flags: flags | TextureFlags::CUBEMAP,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mips(mut self, mip_count: u32) -> Self {
        self.mip_count = mip_count.clamp(1, MAX_MIP_LEVELS as u32);
        self.flags |= TextureFlags::MIPS;
        self
    }

    /// Number of mips in a full chain for the given size, capped to [`MAX_MIP_LEVELS`].
    pub fn full_mip_count(width: u32, height: u32) -> u32 {
        let largest = width.max(height).max(1);
        (32 - largest.leading_zeros()).min(MAX_MIP_LEVELS as u32)
    }

    pub fn byte_size(&self) -> u64 {
        let bpp = self.format.bytes_per_pixel() as u64;
        (0..self.mip_count)
            .map(|mip| {
                let w = (self.width >> mip).max(1) as u64;
                let h = (self.height >> mip).max(1) as u64;
                w * h * bpp
            })
            .sum::<u64>()
            * self.array_length as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_count() {
        assert_eq!(TextureDescriptor::full_mip_count(1, 1), 1);
        assert_eq!(TextureDescriptor::full_mip_count(256, 256), 9);
        assert_eq!(TextureDescriptor::full_mip_count(1920, 1080), 11);
        assert_eq!(TextureDescriptor::full_mip_count(16384, 16384), 12);
    }

    #[test]
    fn test_byte_size_with_mips() {
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV)
            .with_mips(3);
        assert_eq!(desc.byte_size(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::D32Float.is_depth());
        assert!(!TextureFormat::Rgba16Float.is_depth());
        assert!(TextureFormat::D32FloatS8X24Uint.has_stencil());
    }
}
