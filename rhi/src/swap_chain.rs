//! Swap chain: the images the final frame is presented from.
//!
//! Layouts are tracked per image so the renderer can record explicit barriers
//! before copying into the current image and before presenting it.

use std::sync::Arc;

use crate::command_list::CommandList;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::types::{Extent, ImageLayout, TextureFormat};

/// Swap chains hold between two and three images.
pub const MIN_SWAP_CHAIN_BUFFERS: u32 = 2;
pub const MAX_SWAP_CHAIN_BUFFERS: u32 = 3;

pub struct SwapChain {
    id: ObjectId,
    device: Arc<Device>,
    name: String,
    extent: Extent,
    format: TextureFormat,
    buffer_count: u32,
    image_index: u32,
    layouts: Vec<ImageLayout>,
    present_enabled: bool,
    vsync: bool,
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("extent", &self.extent)
            .field("buffer_count", &self.buffer_count)
            .field("image_index", &self.image_index)
            .finish()
    }
}

impl SwapChain {
    pub fn new(
        device: &Arc<Device>,
        name: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        buffer_count: u32,
        vsync: bool,
    ) -> RhiResult<Self> {
        validate_extent(device, width, height)?;
        let buffer_count = buffer_count.clamp(MIN_SWAP_CHAIN_BUFFERS, MAX_SWAP_CHAIN_BUFFERS);
        let id = ObjectId::new();
        device
            .backend()
            .create_swap_chain(id, width, height, buffer_count)
            .inspect_err(|e| log::error!("Failed to create swap chain '{}': {}", name, e))?;

        Ok(Self {
            id,
            device: device.clone(),
            name: name.to_string(),
            extent: Extent::new(width, height),
            format,
            buffer_count,
            // The first acquire lands on image 0.
            image_index: buffer_count - 1,
            layouts: vec![ImageLayout::Undefined; buffer_count as usize],
            present_enabled: true,
            vsync,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn layout(&self) -> ImageLayout {
        self.layouts[self.image_index as usize]
    }

    pub fn is_vsync(&self) -> bool {
        self.vsync
    }

    pub fn is_present_enabled(&self) -> bool {
        self.present_enabled
    }

    /// Minimised windows disable presentation; frames are still recorded.
    pub fn set_present_enabled(&mut self, enabled: bool) {
        self.present_enabled = enabled;
    }

    /// Recreate the native swap chain at a new size.
    ///
    /// Returns `Ok(false)` when the size is unchanged. A resized swap chain gets a
    /// fresh id, so pipelines bound to the old one are never reused.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        if self.extent == Extent::new(width, height) {
            return Ok(false);
        }
        validate_extent(&self.device, width, height)?;

        let id = ObjectId::new();
        self.device
            .backend()
            .create_swap_chain(id, width, height, self.buffer_count)?;
        self.device.backend().destroy(self.id);

        log::info!(
            "Swap chain '{}' resized {}x{} -> {}x{}",
            self.name,
            self.extent.width,
            self.extent.height,
            width,
            height
        );
        self.id = id;
        self.extent = Extent::new(width, height);
        self.image_index = self.buffer_count - 1;
        self.layouts.fill(ImageLayout::Undefined);
        Ok(true)
    }

    pub fn acquire_next_image(&mut self) -> u32 {
        self.image_index = (self.image_index + 1) % self.buffer_count;
        self.image_index
    }

    /// Record a barrier moving the current image to `layout`.
    pub fn set_layout(&mut self, layout: ImageLayout, cmd: &mut CommandList) -> RhiResult<()> {
        let index = self.image_index as usize;
        let from = self.layouts[index];
        if from == layout {
            return Ok(());
        }
        cmd.insert_swap_chain_barrier(self.id, self.image_index, from, layout)?;
        self.layouts[index] = layout;
        Ok(())
    }

    /// Present the current image; it must already be in `PresentSource`.
    pub fn present(&mut self) -> RhiResult<()> {
        if !self.present_enabled {
            return Ok(());
        }
        if self.layout() != ImageLayout::PresentSource {
            return Err(RhiError::InvalidState {
                expected: "PresentSource",
                actual: "image not transitioned for present",
            });
        }
        self.device.backend().present(self.id, self.image_index)
    }
}

fn validate_extent(device: &Device, width: u32, height: u32) -> RhiResult<()> {
    let max = device.max_texture_dimension_2d();
    if width == 0 || height == 0 || width > max || height > max {
        return Err(RhiError::InvalidArgument(format!(
            "swap chain size {width}x{height} outside 1..={max}"
        )));
    }
    Ok(())
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::QueueType;
    use crate::device::DeviceDescriptor;

    fn device() -> Arc<Device> {
        Device::new(&DeviceDescriptor::default()).unwrap()
    }

    #[test]
    fn test_acquire_cycles_images() {
        let device = device();
        let mut swap_chain =
            SwapChain::new(&device, "main", 64, 64, TextureFormat::Bgra8Unorm, 2, true).unwrap();
        assert_eq!(swap_chain.acquire_next_image(), 0);
        assert_eq!(swap_chain.acquire_next_image(), 1);
        assert_eq!(swap_chain.acquire_next_image(), 0);
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let device = device();
        let mut swap_chain =
            SwapChain::new(&device, "main", 64, 64, TextureFormat::Bgra8Unorm, 3, true).unwrap();
        let id = swap_chain.id();
        assert!(!swap_chain.resize(64, 64).unwrap());
        assert_eq!(swap_chain.id(), id);
        assert!(swap_chain.resize(128, 32).unwrap());
        assert_ne!(swap_chain.id(), id);
        assert!(swap_chain.resize(0, 32).is_err());
    }

    #[test]
    fn test_present_requires_layout() {
        let device = device();
        let mut swap_chain =
            SwapChain::new(&device, "main", 64, 64, TextureFormat::Bgra8Unorm, 2, true).unwrap();
        swap_chain.acquire_next_image();
        assert!(swap_chain.present().is_err());

        let mut cmd = CommandList::new(device, "present", QueueType::Graphics);
        cmd.begin().unwrap();
        swap_chain
            .set_layout(ImageLayout::PresentSource, &mut cmd)
            .unwrap();
        swap_chain
            .set_layout(ImageLayout::PresentSource, &mut cmd)
            .unwrap();
        assert_eq!(cmd.counters().barriers, 1);
        swap_chain.present().unwrap();
    }
}
