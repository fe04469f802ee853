//! Textures with per-mip layout tracking.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::command_list::CommandList;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::types::{Extent, ImageLayout, TextureDescriptor, TextureFlags, TextureFormat, MAX_MIP_LEVELS};

/// CPU pixel payload of one array slice, one byte vector per mip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSlice {
    pub mips: Vec<Vec<u8>>,
}

impl TextureSlice {
    pub fn new(mips: Vec<Vec<u8>>) -> Self {
        Self { mips }
    }

    pub fn single(data: Vec<u8>) -> Self {
        Self { mips: vec![data] }
    }
}

/// A GPU texture.
///
/// The image layout of every mip is tracked on the CPU; commands that assume a
/// particular layout must be preceded by [`Texture::set_layout`].
pub struct Texture {
    id: ObjectId,
    device: Arc<Device>,
    descriptor: TextureDescriptor,
    layouts: Mutex<[ImageLayout; MAX_MIP_LEVELS]>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("width", &self.descriptor.width)
            .field("height", &self.descriptor.height)
            .field("format", &self.descriptor.format)
            .finish()
    }
}

impl Texture {
    pub fn new(device: &Arc<Device>, descriptor: TextureDescriptor) -> RhiResult<Arc<Self>> {
        Self::with_data(device, descriptor, Vec::new())
    }

    /// Create a texture and upload `slices`. The payload is released once uploaded.
    pub fn with_data(
        device: &Arc<Device>,
        descriptor: TextureDescriptor,
        slices: Vec<TextureSlice>,
    ) -> RhiResult<Arc<Self>> {
        let max = device.max_texture_dimension_2d();
        if descriptor.width > max || descriptor.height > max {
            return Err(RhiError::InvalidArgument(format!(
                "texture {:?} is {}x{}, device maximum is {}",
                descriptor.label, descriptor.width, descriptor.height, max
            )));
        }
        if descriptor.mip_count as usize > MAX_MIP_LEVELS {
            return Err(RhiError::InvalidArgument(format!(
                "texture {:?} requests {} mips",
                descriptor.label, descriptor.mip_count
            )));
        }

        let id = ObjectId::new();
        device
            .backend()
            .create_texture(id, &descriptor, &slices)
            .inspect_err(|e| {
                log::error!("Failed to create texture {:?}: {}", descriptor.label, e);
            })?;

        let initial = if slices.is_empty() {
            ImageLayout::Undefined
        } else {
            ImageLayout::ShaderReadOnly
        };

        Ok(Arc::new(Self {
            id,
            device: device.clone(),
            descriptor,
            layouts: Mutex::new([initial; MAX_MIP_LEVELS]),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.descriptor.label.as_deref().unwrap_or("<unnamed>")
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.descriptor.width, self.descriptor.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    pub fn flags(&self) -> TextureFlags {
        self.descriptor.flags
    }

    pub fn mip_count(&self) -> u32 {
        self.descriptor.mip_count
    }

    pub fn array_length(&self) -> u32 {
        self.descriptor.array_length
    }

    pub fn is_render_target(&self) -> bool {
        self.descriptor.flags.contains(TextureFlags::RENDER_TARGET)
    }

    pub fn is_depth_stencil(&self) -> bool {
        self.descriptor.flags.contains(TextureFlags::DEPTH_STENCIL)
    }

    pub fn is_uav(&self) -> bool {
        self.descriptor.flags.contains(TextureFlags::UAV)
    }

    pub fn has_per_mip_views(&self) -> bool {
        self.descriptor.flags.contains(TextureFlags::PER_MIP_VIEWS)
    }

    /// Width and height of `mip`.
    pub fn mip_extent(&self, mip: u32) -> Extent {
        Extent::new(
            (self.descriptor.width >> mip).max(1),
            (self.descriptor.height >> mip).max(1),
        )
    }

    pub fn layout(&self, mip: u32) -> ImageLayout {
        self.layouts.lock()[mip as usize]
    }

    /// True when every mip in the range is already in `layout`.
    pub fn is_in_layout(&self, layout: ImageLayout, mip_start: u32, mip_count: u32) -> bool {
        let layouts = self.layouts.lock();
        (mip_start..mip_start + mip_count).all(|mip| layouts[mip as usize] == layout)
    }

    /// Transition `mip_count` mips starting at `mip_start` (all mips when `None`),
    /// recording one barrier per contiguous run of differing layouts.
    pub fn set_layout(
        &self,
        layout: ImageLayout,
        cmd: &mut CommandList,
        mips: Option<(u32, u32)>,
    ) -> RhiResult<()> {
        let (mip_start, mip_count) = mips.unwrap_or((0, self.descriptor.mip_count));
        if mip_count == 0 || mip_start + mip_count > self.descriptor.mip_count {
            return Err(RhiError::InvalidArgument(format!(
                "mip range {}..{} out of bounds for '{}' ({} mips)",
                mip_start,
                mip_start + mip_count,
                self.name(),
                self.descriptor.mip_count
            )));
        }

        let mut layouts = self.layouts.lock();
        let mut mip = mip_start;
        while mip < mip_start + mip_count {
            let from = layouts[mip as usize];
            if from == layout {
                mip += 1;
                continue;
            }
            let run_start = mip;
            while mip < mip_start + mip_count && layouts[mip as usize] == from {
                layouts[mip as usize] = layout;
                mip += 1;
            }
            cmd.insert_texture_barrier(self.id, run_start, mip - run_start, from, layout)?;
        }
        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;

    fn test_device() -> Arc<Device> {
        Device::new(&DeviceDescriptor::default()).unwrap()
    }

    #[test]
    fn test_texture_with_data_starts_readable() {
        let device = test_device();
        let texture = Texture::with_data(
            &device,
            TextureDescriptor::new_2d(2, 2, TextureFormat::Rgba8Unorm, TextureFlags::SRV),
            vec![TextureSlice::single(vec![0; 16])],
        )
        .unwrap();
        assert_eq!(texture.layout(0), ImageLayout::ShaderReadOnly);
    }

    #[test]
    fn test_texture_too_large() {
        let device = test_device();
        let max = device.max_texture_dimension_2d();
        let result = Texture::new(
            &device,
            TextureDescriptor::new_2d(max + 1, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV),
        );
        assert!(matches!(result, Err(RhiError::InvalidArgument(_))));
    }

    #[test]
    fn test_mip_extent() {
        let device = test_device();
        let texture = Texture::new(
            &device,
            TextureDescriptor::new_2d(64, 16, TextureFormat::Rgba8Unorm, TextureFlags::SRV)
                .with_mips(7),
        )
        .unwrap();
        assert_eq!(texture.mip_extent(2), Extent::new(16, 4));
        assert_eq!(texture.mip_extent(6), Extent::new(1, 1));
    }
}
