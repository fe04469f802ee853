//! Buffer types.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        const STRUCTURED = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
        /// CPU writable between map/unmap.
        const MAPPABLE = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::COPY_DST
    }
}

/// Index element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Element stride in bytes (vertex size, structured element size, ...).
    pub stride: u32,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, stride: u32, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            stride,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
