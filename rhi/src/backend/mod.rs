//! GPU backend abstraction layer.
//!
//! The RHI talks to the native graphics API through a single strategy object
//! implementing [`RhiBackend`], chosen when the [`Device`](crate::Device) is
//! created.
//!
//! # Available Backends
//!
//! - `null` (default): records submissions without touching a GPU; used for
//!   headless runs and tests
//! - `wgpu-backend`: headless backend using wgpu
//!
//! Resources are keyed by [`ObjectId`] so the backend owns its native tables
//! and the frontend never holds native handles.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod null;

use std::sync::Arc;

use crate::command::{Command, QueueType, SubmissionId};
use crate::descriptor::Descriptor;
use crate::error::RhiResult;
use crate::id::ObjectId;
use crate::pipeline_state::PipelineState;
use crate::resources::{ShaderDescriptor, TextureSlice};
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor};

pub use null::{NullBackend, NullObjectKind, RecordedSubmission};

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// No GPU, commands are recorded for inspection.
    #[default]
    Null,
    /// wgpu (Vulkan, Metal, DX12)
    Wgpu,
}

/// Class of a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhysicalDeviceType {
    #[default]
    Other,
    Integrated,
    Discrete,
    Virtual,
    Cpu,
}

/// Backend-independent description of a GPU.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalDevice {
    pub vendor_id: u32,
    pub name: String,
    /// Dedicated memory in megabytes.
    pub memory_mb: u64,
    pub driver_version: String,
    pub device_type: PhysicalDeviceType,
    /// Opaque backend handle (adapter index, native pointer, ...).
    pub native_handle: u64,
}

impl PhysicalDevice {
    pub const VENDOR_NVIDIA: u32 = 0x10DE;
    pub const VENDOR_AMD: u32 = 0x1002;
    pub const VENDOR_INTEL: u32 = 0x8086;

    pub fn vendor_name(&self) -> &'static str {
        match self.vendor_id {
            Self::VENDOR_NVIDIA => "Nvidia",
            Self::VENDOR_AMD | 0x1022 => "AMD",
            Self::VENDOR_INTEL | 0x8087 | 0x163C => "Intel",
            0x13B5 => "ARM",
            0x5143 => "Qualcomm",
            _ => "Unknown",
        }
    }

    pub fn is_nvidia(&self) -> bool {
        self.vendor_id == Self::VENDOR_NVIDIA
    }

    pub fn is_amd(&self) -> bool {
        self.vendor_id == Self::VENDOR_AMD
    }

    pub fn is_intel(&self) -> bool {
        self.vendor_id == Self::VENDOR_INTEL
    }
}

/// Limits the renderer has to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    pub max_texture_dimension_2d: u32,
    pub max_anisotropy: u32,
    pub max_render_targets: u32,
    pub min_constant_buffer_alignment: u64,
    pub descriptor_set_capacity: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_2d: 16384,
            max_anisotropy: 16,
            max_render_targets: 8,
            min_constant_buffer_alignment: 256,
            descriptor_set_capacity: 4096,
        }
    }
}

/// GPU backend trait for abstracting different graphics APIs.
pub trait RhiBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn backend_type(&self) -> BackendType;

    fn enumerate_physical_devices(&self) -> Vec<PhysicalDevice>;

    fn limits(&self) -> DeviceLimits;

    /// Create a texture, uploading `slices` when non-empty.
    fn create_texture(
        &self,
        id: ObjectId,
        descriptor: &TextureDescriptor,
        slices: &[TextureSlice],
    ) -> RhiResult<()>;

    fn create_buffer(
        &self,
        id: ObjectId,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> RhiResult<()>;

    fn write_buffer(&self, id: ObjectId, offset: u64, data: &[u8]) -> RhiResult<()>;

    fn create_sampler(&self, id: ObjectId, descriptor: &SamplerDescriptor) -> RhiResult<()>;

    fn compile_shader(&self, id: ObjectId, descriptor: &ShaderDescriptor) -> RhiResult<()>;

    /// Create the native pipeline object for a validated state.
    fn create_pipeline(&self, hash: u64, state: &PipelineState) -> RhiResult<()>;

    fn destroy_pipeline(&self, hash: u64);

    fn create_descriptor_set(
        &self,
        id: ObjectId,
        layout_hash: u64,
        descriptors: &[Descriptor],
    ) -> RhiResult<()>;

    fn create_swap_chain(&self, id: ObjectId, width: u32, height: u32, buffer_count: u32)
        -> RhiResult<()>;

    /// Release the native object behind `id`. Unknown ids are ignored.
    fn destroy(&self, id: ObjectId);

    fn submit(&self, queue: QueueType, commands: Vec<Command>) -> RhiResult<SubmissionId>;

    fn is_submission_complete(&self, submission: SubmissionId) -> bool;

    /// Block until the submission has retired.
    fn wait_submission(&self, submission: SubmissionId) -> RhiResult<()>;

    /// Block until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    fn present(&self, swap_chain: ObjectId, image_index: u32) -> RhiResult<()>;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    /// Raw tick value written by a [`Command::Timestamp`], once its submission retired.
    fn read_timestamp(&self, query: u32) -> Option<u64>;
}

/// Create a backend of the requested type.
pub fn create_backend(backend_type: BackendType) -> RhiResult<Arc<dyn RhiBackend>> {
    match backend_type {
        BackendType::Null => {
            log::info!("Using null backend");
            Ok(Arc::new(NullBackend::new()))
        }
        #[cfg(feature = "wgpu-backend")]
        BackendType::Wgpu => {
            let backend = wgpu_backend::WgpuBackend::new()?;
            log::info!("Using wgpu backend");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "wgpu-backend"))]
        BackendType::Wgpu => Err(crate::error::RhiError::DeviceCreationFailed(
            "wgpu backend not compiled in (enable the `wgpu-backend` feature)".into(),
        )),
    }
}

/// Check if a real GPU backend is available.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_names() {
        let mut device = PhysicalDevice {
            vendor_id: PhysicalDevice::VENDOR_AMD,
            name: "Radeon".into(),
            memory_mb: 8192,
            driver_version: "1.0".into(),
            device_type: PhysicalDeviceType::Discrete,
            native_handle: 0,
        };
        assert_eq!(device.vendor_name(), "AMD");
        assert!(device.is_amd());
        device.vendor_id = 0xFFFF;
        assert_eq!(device.vendor_name(), "Unknown");
    }

    #[test]
    fn test_create_null_backend() {
        let backend = create_backend(BackendType::Null).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Null);
    }
}
