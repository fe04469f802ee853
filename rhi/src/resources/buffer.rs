//! Vertex, index, constant and structured buffers.

use std::sync::Arc;

use bytemuck::Pod;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::types::{BufferDescriptor, BufferUsage, IndexFormat};

fn create_native(
    device: &Device,
    id: ObjectId,
    descriptor: &BufferDescriptor,
    data: Option<&[u8]>,
) -> RhiResult<()> {
    device
        .backend()
        .create_buffer(id, descriptor, data)
        .inspect_err(|e| log::error!("Failed to create buffer {:?}: {}", descriptor.label, e))
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Vertex buffer, either immutable or CPU-updatable.
pub struct VertexBuffer {
    id: ObjectId,
    device: Arc<Device>,
    stride: u32,
    vertex_count: u32,
    capacity: u32,
}

impl VertexBuffer {
    /// Immutable buffer initialised with `vertices`.
    pub fn new<T: Pod>(device: &Arc<Device>, vertices: &[T], name: &str) -> RhiResult<Self> {
        let stride = std::mem::size_of::<T>() as u32;
        let descriptor = BufferDescriptor::new(
            std::mem::size_of_val(vertices) as u64,
            stride,
            BufferUsage::VERTEX | BufferUsage::COPY_DST,
        )
        .with_label(name);
        let id = ObjectId::new();
        create_native(device, id, &descriptor, Some(bytemuck::cast_slice(vertices)))?;
        Ok(Self {
            id,
            device: device.clone(),
            stride,
            vertex_count: vertices.len() as u32,
            capacity: vertices.len() as u32,
        })
    }

    /// Mappable buffer with room for `capacity` vertices of `T`.
    pub fn new_dynamic<T: Pod>(device: &Arc<Device>, capacity: u32, name: &str) -> RhiResult<Self> {
        let stride = std::mem::size_of::<T>() as u32;
        let descriptor = BufferDescriptor::new(
            stride as u64 * capacity.max(1) as u64,
            stride,
            BufferUsage::VERTEX | BufferUsage::MAPPABLE,
        )
        .with_label(name);
        let id = ObjectId::new();
        create_native(device, id, &descriptor, None)?;
        Ok(Self {
            id,
            device: device.clone(),
            stride,
            vertex_count: 0,
            capacity: capacity.max(1),
        })
    }

    /// Replace the contents of a dynamic buffer, growing it when needed.
    pub fn update<T: Pod>(&mut self, vertices: &[T]) -> RhiResult<()> {
        if std::mem::size_of::<T>() as u32 != self.stride {
            return Err(RhiError::InvalidArgument(format!(
                "vertex stride mismatch: buffer {} bytes, data {} bytes",
                self.stride,
                std::mem::size_of::<T>()
            )));
        }
        let count = vertices.len() as u32;
        if count > self.capacity {
            let capacity = count.next_power_of_two();
            let descriptor = BufferDescriptor::new(
                self.stride as u64 * capacity as u64,
                self.stride,
                BufferUsage::VERTEX | BufferUsage::MAPPABLE,
            );
            let id = ObjectId::new();
            create_native(&self.device, id, &descriptor, None)?;
            self.device.backend().destroy(self.id);
            self.id = id;
            self.capacity = capacity;
        }
        if !vertices.is_empty() {
            self.device
                .backend()
                .write_buffer(self.id, 0, bytemuck::cast_slice(vertices))?;
        }
        self.vertex_count = count;
        Ok(())
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

/// Index buffer.
pub struct IndexBuffer {
    id: ObjectId,
    device: Arc<Device>,
    format: IndexFormat,
    index_count: u32,
}

impl IndexBuffer {
    pub fn new(device: &Arc<Device>, indices: &[u32], name: &str) -> RhiResult<Self> {
        let descriptor = BufferDescriptor::new(
            std::mem::size_of_val(indices) as u64,
            4,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        )
        .with_label(name);
        let id = ObjectId::new();
        create_native(device, id, &descriptor, Some(bytemuck::cast_slice(indices)))?;
        Ok(Self {
            id,
            device: device.clone(),
            format: IndexFormat::Uint32,
            index_count: indices.len() as u32,
        })
    }

    pub fn new_u16(device: &Arc<Device>, indices: &[u16], name: &str) -> RhiResult<Self> {
        let descriptor = BufferDescriptor::new(
            std::mem::size_of_val(indices) as u64,
            2,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        )
        .with_label(name);
        let id = ObjectId::new();
        create_native(device, id, &descriptor, Some(bytemuck::cast_slice(indices)))?;
        Ok(Self {
            id,
            device: device.clone(),
            format: IndexFormat::Uint16,
            index_count: indices.len() as u32,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

/// Dynamic constant buffer written as a ring.
///
/// Each changed update lands at the next aligned slot and becomes the dynamic
/// offset bound by descriptor sets. Unchanged values are not re-uploaded.
/// When the ring runs out of slots the GPU buffer is recreated with twice the
/// element count. [`reset_offset`](Self::reset_offset) rewinds the ring once
/// the in-flight frames that read it have retired.
pub struct ConstantBuffer {
    id: ObjectId,
    device: Arc<Device>,
    name: String,
    stride: u64,
    element_count: u32,
    offset: u64,
    rewind: bool,
    has_data: bool,
    last: Vec<u8>,
}

impl std::fmt::Debug for ConstantBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantBuffer")
            .field("name", &self.name)
            .field("stride", &self.stride)
            .field("element_count", &self.element_count)
            .field("offset", &self.offset)
            .finish()
    }
}

impl ConstantBuffer {
    pub fn new(
        device: &Arc<Device>,
        name: &str,
        element_size: usize,
        element_count: u32,
    ) -> RhiResult<Self> {
        let alignment = device.limits().min_constant_buffer_alignment.max(1);
        let stride = align_up(element_size.max(1) as u64, alignment);
        let element_count = element_count.max(1);
        let id = ObjectId::new();
        create_native(device, id, &Self::descriptor(name, stride, element_count), None)?;
        Ok(Self {
            id,
            device: device.clone(),
            name: name.to_string(),
            stride,
            element_count,
            offset: 0,
            rewind: true,
            has_data: false,
            last: Vec::new(),
        })
    }

    fn descriptor(name: &str, stride: u64, element_count: u32) -> BufferDescriptor {
        BufferDescriptor::new(
            stride * element_count as u64,
            stride as u32,
            BufferUsage::CONSTANT | BufferUsage::MAPPABLE,
        )
        .with_label(name)
    }

    /// Upload `value` unless it equals the last uploaded value.
    ///
    /// Returns `true` when an upload happened.
    pub fn update<T: Pod>(&mut self, value: &T) -> RhiResult<bool> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() as u64 > self.stride {
            return Err(RhiError::InvalidArgument(format!(
                "constant buffer '{}' holds {} bytes per element, got {}",
                self.name,
                self.stride,
                bytes.len()
            )));
        }
        if self.has_data && self.last == bytes {
            return Ok(false);
        }

        let mut next = if self.rewind || !self.has_data {
            0
        } else {
            self.offset + self.stride
        };
        if next + self.stride > self.size() {
            self.grow()?;
            next = 0;
        }

        self.device.backend().write_buffer(self.id, next, bytes)?;
        self.offset = next;
        self.rewind = false;
        self.has_data = true;
        self.last.clear();
        self.last.extend_from_slice(bytes);
        Ok(true)
    }

    fn grow(&mut self) -> RhiResult<()> {
        let element_count = self.element_count * 2;
        let id = ObjectId::new();
        create_native(
            &self.device,
            id,
            &Self::descriptor(&self.name, self.stride, element_count),
            None,
        )?;
        log::debug!(
            "Constant buffer '{}' grew from {} to {} elements",
            self.name,
            self.element_count,
            element_count
        );
        self.device.backend().destroy(self.id);
        self.id = id;
        self.element_count = element_count;
        Ok(())
    }

    /// Next changed update starts again at the front of the ring.
    pub fn reset_offset(&mut self) {
        self.rewind = true;
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset of the most recent upload.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn size(&self) -> u64 {
        self.stride * self.element_count as u64
    }
}

impl Drop for ConstantBuffer {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

/// Structured (storage) buffer of `T`-sized elements.
pub struct StructuredBuffer {
    id: ObjectId,
    device: Arc<Device>,
    name: String,
    stride: u32,
    element_count: u32,
}

impl StructuredBuffer {
    pub fn new(device: &Arc<Device>, name: &str, stride: u32, element_count: u32) -> RhiResult<Self> {
        let id = ObjectId::new();
        create_native(
            device,
            id,
            &Self::descriptor(name, stride, element_count),
            None,
        )?;
        Ok(Self {
            id,
            device: device.clone(),
            name: name.to_string(),
            stride,
            element_count: element_count.max(1),
        })
    }

    fn descriptor(name: &str, stride: u32, element_count: u32) -> BufferDescriptor {
        BufferDescriptor::new(
            stride as u64 * element_count.max(1) as u64,
            stride,
            BufferUsage::STRUCTURED | BufferUsage::MAPPABLE,
        )
        .with_label(name)
    }

    /// Write `elements` at the start of the buffer, doubling capacity as needed.
    pub fn update<T: Pod>(&mut self, elements: &[T]) -> RhiResult<()> {
        if std::mem::size_of::<T>() as u32 != self.stride {
            return Err(RhiError::InvalidArgument(format!(
                "structured buffer '{}' stride is {}, element is {}",
                self.name,
                self.stride,
                std::mem::size_of::<T>()
            )));
        }
        let needed = elements.len() as u32;
        if needed > self.element_count {
            let mut element_count = self.element_count;
            while element_count < needed {
                element_count *= 2;
            }
            let id = ObjectId::new();
            create_native(
                &self.device,
                id,
                &Self::descriptor(&self.name, self.stride, element_count),
                None,
            )?;
            self.device.backend().destroy(self.id);
            self.id = id;
            self.element_count = element_count;
        }
        if !elements.is_empty() {
            self.device
                .backend()
                .write_buffer(self.id, 0, bytemuck::cast_slice(elements))?;
        }
        Ok(())
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }
}

impl Drop for StructuredBuffer {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::device::DeviceDescriptor;

    fn test_device() -> (Arc<NullBackend>, Arc<Device>) {
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(backend.clone(), &DeviceDescriptor::default()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_constant_buffer_skips_unchanged() {
        let (backend, device) = test_device();
        let mut cb = ConstantBuffer::new(&device, "test", 16, 4).unwrap();
        assert!(cb.update(&[1.0f32; 4]).unwrap());
        assert!(!cb.update(&[1.0f32; 4]).unwrap());
        assert_eq!(backend.buffer_write_count(), 1);
        assert_eq!(cb.offset(), 0);

        assert!(cb.update(&[2.0f32; 4]).unwrap());
        assert_eq!(cb.offset(), 256);
    }

    #[test]
    fn test_constant_buffer_doubles_when_full() {
        let (_backend, device) = test_device();
        let mut cb = ConstantBuffer::new(&device, "test", 16, 2).unwrap();
        let first_id = cb.id();
        cb.update(&1u32).unwrap();
        cb.update(&2u32).unwrap();
        assert_eq!(cb.element_count(), 2);

        cb.update(&3u32).unwrap();
        assert_eq!(cb.element_count(), 4);
        assert_eq!(cb.offset(), 0);
        assert_ne!(cb.id(), first_id);
    }

    #[test]
    fn test_constant_buffer_reset_offset() {
        let (_backend, device) = test_device();
        let mut cb = ConstantBuffer::new(&device, "test", 16, 4).unwrap();
        cb.update(&1u32).unwrap();
        cb.update(&2u32).unwrap();
        assert_eq!(cb.offset(), 256);

        cb.reset_offset();
        // Unchanged data keeps pointing at the last written slot.
        assert!(!cb.update(&2u32).unwrap());
        assert_eq!(cb.offset(), 256);
        assert!(cb.update(&3u32).unwrap());
        assert_eq!(cb.offset(), 0);
    }

    #[test]
    fn test_dynamic_vertex_buffer_grows() {
        let (_backend, device) = test_device();
        let mut vb = VertexBuffer::new_dynamic::<[f32; 3]>(&device, 2, "lines").unwrap();
        vb.update(&[[0.0f32; 3]; 5]).unwrap();
        assert_eq!(vb.vertex_count(), 5);
        assert!(vb.update(&[0u8; 5]).is_err());
    }
}
