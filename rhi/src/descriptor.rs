//! Descriptor set layouts and binding deduplication.
//!
//! A [`DescriptorSetLayout`] mirrors the resource slots of one pipeline. Setting
//! a resource only flags the layout for rebinding when the slot contents
//! actually change, and materialized descriptor sets are cached by a hash of
//! everything bound, so draws sharing a combination of resources share a set.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::resources::{ConstantBuffer, Sampler, StructuredBuffer, Texture};
use crate::types::{ImageLayout, ShaderStage, TextureFlags};

/// Kind of resource a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    ConstantBuffer,
    Sampler,
    Texture,
    TextureStorage,
    StructuredBuffer,
}

/// Static description of a slot, as declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub name: String,
    pub ty: DescriptorType,
    pub slot: u32,
    pub stages: ShaderStage,
}

impl DescriptorBinding {
    pub fn new(name: impl Into<String>, ty: DescriptorType, slot: u32, stages: ShaderStage) -> Self {
        Self {
            name: name.into(),
            ty,
            slot,
            stages,
        }
    }
}

/// Mip selection of a bound texture; `None` binds every mip.
pub type MipSelection = Option<(u32, u32)>;

/// One binding slot and what is currently bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub binding: DescriptorBinding,
    pub data: Option<ObjectId>,
    /// Dynamic offset for constant buffers.
    pub offset: u64,
    pub range: u64,
    pub mips: MipSelection,
    pub layout: ImageLayout,
}

impl Descriptor {
    fn new(binding: DescriptorBinding) -> Self {
        Self {
            binding,
            data: None,
            offset: 0,
            range: 0,
            mips: None,
            layout: ImageLayout::Undefined,
        }
    }

    /// Hash of the slot shape only.
    pub fn layout_hash(&self, state: &mut impl Hasher) {
        self.binding.ty.hash(state);
        self.binding.slot.hash(state);
        self.binding.stages.bits().hash(state);
    }

    /// Hash of what is bound, excluding dynamic offsets which are supplied at bind time.
    pub fn content_hash(&self, state: &mut impl Hasher) {
        self.data.hash(state);
        self.mips.hash(state);
    }
}

/// A materialized descriptor set.
#[derive(Debug)]
pub struct DescriptorSet {
    id: ObjectId,
    hash: u64,
}

impl DescriptorSet {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// Resource binding table of one pipeline with its set cache.
pub struct DescriptorSetLayout {
    name: String,
    descriptors: Vec<Descriptor>,
    layout_hash: u64,
    needs_to_bind: bool,
    sets: HashMap<u64, Arc<DescriptorSet>>,
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("name", &self.name)
            .field("descriptors", &self.descriptors.len())
            .field("sets", &self.sets.len())
            .field("needs_to_bind", &self.needs_to_bind)
            .finish()
    }
}

impl DescriptorSetLayout {
    /// Build a layout from shader bindings, merging stages of slots declared twice.
    pub fn new(name: impl Into<String>, bindings: impl IntoIterator<Item = DescriptorBinding>) -> Self {
        let mut descriptors: Vec<Descriptor> = Vec::new();
        for binding in bindings {
            match descriptors
                .iter_mut()
                .find(|d| d.binding.slot == binding.slot && d.binding.ty == binding.ty)
            {
                Some(existing) => existing.binding.stages |= binding.stages,
                None => descriptors.push(Descriptor::new(binding)),
            }
        }
        descriptors.sort_by_key(|d| (d.binding.slot, d.binding.ty as u8));

        let mut hasher = DefaultHasher::new();
        for descriptor in &descriptors {
            descriptor.layout_hash(&mut hasher);
        }

        Self {
            name: name.into(),
            descriptors,
            layout_hash: hasher.finish(),
            needs_to_bind: true,
            sets: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }

    pub fn needs_to_bind(&self) -> bool {
        self.needs_to_bind
    }

    /// Force the next draw to rebind, e.g. after a pipeline switch.
    pub fn mark_needs_to_bind(&mut self) {
        self.needs_to_bind = true;
    }

    pub fn cached_set_count(&self) -> usize {
        self.sets.len()
    }

    fn update_slot(
        &mut self,
        slot: u32,
        types: &[DescriptorType],
        data: ObjectId,
        offset: u64,
        range: u64,
        mips: MipSelection,
        layout: ImageLayout,
    ) -> bool {
        let Some(descriptor) = self
            .descriptors
            .iter_mut()
            .find(|d| d.binding.slot == slot && types.contains(&d.binding.ty))
        else {
            log::trace!("Layout '{}' has no {:?} slot {}", self.name, types, slot);
            return false;
        };

        let changed = descriptor.data != Some(data)
            || descriptor.offset != offset
            || descriptor.range != range
            || descriptor.mips != mips
            || descriptor.layout != layout;
        if changed {
            descriptor.data = Some(data);
            descriptor.offset = offset;
            descriptor.range = range;
            descriptor.mips = mips;
            descriptor.layout = layout;
            self.needs_to_bind = true;
        }
        changed
    }

    /// Returns `true` when the slot contents changed.
    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &ConstantBuffer) -> bool {
        self.update_slot(
            slot,
            &[DescriptorType::ConstantBuffer],
            buffer.id(),
            buffer.offset(),
            buffer.stride(),
            None,
            ImageLayout::Undefined,
        )
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: &Sampler) -> bool {
        self.update_slot(
            slot,
            &[DescriptorType::Sampler],
            sampler.id(),
            0,
            0,
            None,
            ImageLayout::Undefined,
        )
    }

    pub fn set_structured_buffer(&mut self, slot: u32, buffer: &StructuredBuffer) -> bool {
        self.update_slot(
            slot,
            &[DescriptorType::StructuredBuffer],
            buffer.id(),
            0,
            buffer.stride() as u64 * buffer.element_count() as u64,
            None,
            ImageLayout::Undefined,
        )
    }

    /// Bind `texture` (or a mip range of it) to a sampled or storage slot.
    pub fn set_texture(&mut self, slot: u32, texture: &Texture, mips: MipSelection) -> RhiResult<bool> {
        if let Some((start, count)) = mips {
            let per_mip = texture.flags().contains(TextureFlags::PER_MIP_VIEWS);
            if !per_mip && !(start == 0 && count == texture.mip_count()) {
                return Err(RhiError::InvalidArgument(format!(
                    "texture '{}' has no per-mip views",
                    texture.name()
                )));
            }
            if start + count > texture.mip_count() {
                return Err(RhiError::InvalidArgument(format!(
                    "mip range {}..{} out of bounds for '{}'",
                    start,
                    start + count,
                    texture.name()
                )));
            }
        }
        let layout = texture.layout(mips.map_or(0, |(start, _)| start));
        Ok(self.update_slot(
            slot,
            &[DescriptorType::Texture, DescriptorType::TextureStorage],
            texture.id(),
            0,
            0,
            mips,
            layout,
        ))
    }

    /// Dynamic offsets of constant buffer slots, in slot order.
    pub fn dynamic_offsets(&self) -> Vec<u32> {
        self.descriptors
            .iter()
            .filter(|d| d.binding.ty == DescriptorType::ConstantBuffer)
            .map(|d| d.offset as u32)
            .collect()
    }

    /// Hash of the layout combined with everything currently bound.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.layout_hash.hash(&mut hasher);
        for descriptor in &self.descriptors {
            descriptor.content_hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Get the set for the current bindings, materializing it on a cache miss.
    ///
    /// Clears the rebind flag; callers bind the returned set.
    pub fn get_descriptor_set(&mut self, device: &Device) -> RhiResult<Arc<DescriptorSet>> {
        let hash = self.content_hash();
        if let Some(set) = self.sets.get(&hash) {
            self.needs_to_bind = false;
            return Ok(set.clone());
        }

        // Exhaustion is recoverable by the caller, which resets the pool.
        device.reserve_descriptor_set().inspect_err(|e| {
            log::debug!("Layout '{}': {}", self.name, e);
        })?;
        let id = ObjectId::new();
        if let Err(e) = device
            .backend()
            .create_descriptor_set(id, self.layout_hash, &self.descriptors)
        {
            device.release_descriptor_sets(1);
            log::error!("Failed to create descriptor set for '{}': {}", self.name, e);
            return Err(e);
        }

        let set = Arc::new(DescriptorSet { id, hash });
        self.sets.insert(hash, set.clone());
        self.needs_to_bind = false;
        Ok(set)
    }

    /// Drop cached sets, returning how many were released.
    pub fn clear_sets(&mut self, device: &Device) -> u32 {
        let count = self.sets.len() as u32;
        for (_, set) in self.sets.drain() {
            device.retire_descriptor_set(set.id);
        }
        self.needs_to_bind = true;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, NullObjectKind};
    use crate::device::DeviceDescriptor;
    use crate::types::{SamplerDescriptor, TextureDescriptor, TextureFormat};

    fn bindings() -> Vec<DescriptorBinding> {
        vec![
            DescriptorBinding::new("frame", DescriptorType::ConstantBuffer, 0, ShaderStage::VERTEX),
            DescriptorBinding::new("frame", DescriptorType::ConstantBuffer, 0, ShaderStage::PIXEL),
            DescriptorBinding::new("albedo", DescriptorType::Texture, 1, ShaderStage::PIXEL),
            DescriptorBinding::new("sampler", DescriptorType::Sampler, 2, ShaderStage::PIXEL),
        ]
    }

    fn setup() -> (Arc<NullBackend>, Arc<Device>) {
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(backend.clone(), &DeviceDescriptor::default()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_stage_merge() {
        let layout = DescriptorSetLayout::new("test", bindings());
        assert_eq!(layout.descriptors().len(), 3);
        assert_eq!(
            layout.descriptors()[0].binding.stages,
            ShaderStage::VERTEX | ShaderStage::PIXEL
        );
    }

    #[test]
    fn test_get_descriptor_set_deduplicates() {
        let (backend, device) = setup();
        let texture = Texture::new(
            &device,
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV),
        )
        .unwrap();
        let mut layout = DescriptorSetLayout::new("test", bindings());
        layout.set_texture(1, &texture, None).unwrap();

        let first = layout.get_descriptor_set(&device).unwrap();
        let second = layout.get_descriptor_set(&device).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.created_count(NullObjectKind::DescriptorSet), 1);
        assert_eq!(device.descriptor_sets_allocated(), 1);
    }

    #[test]
    fn test_identical_rebind_does_not_flag() {
        let (_backend, device) = setup();
        let sampler = Sampler::new(&device, SamplerDescriptor::default()).unwrap();
        let mut layout = DescriptorSetLayout::new("test", bindings());
        assert!(layout.set_sampler(2, &sampler));
        layout.get_descriptor_set(&device).unwrap();
        assert!(!layout.needs_to_bind());

        assert!(!layout.set_sampler(2, &sampler));
        assert!(!layout.needs_to_bind());
    }

    #[test]
    fn test_switching_back_hits_cache() {
        let (backend, device) = setup();
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV);
        let a = Texture::new(&device, desc.clone()).unwrap();
        let b = Texture::new(&device, desc).unwrap();
        let mut layout = DescriptorSetLayout::new("test", bindings());

        layout.set_texture(1, &a, None).unwrap();
        let set_a = layout.get_descriptor_set(&device).unwrap();
        layout.set_texture(1, &b, None).unwrap();
        let set_b = layout.get_descriptor_set(&device).unwrap();
        layout.set_texture(1, &a, None).unwrap();
        assert!(layout.needs_to_bind());
        let again = layout.get_descriptor_set(&device).unwrap();

        assert!(!Arc::ptr_eq(&set_a, &set_b));
        assert!(Arc::ptr_eq(&set_a, &again));
        assert_eq!(backend.created_count(NullObjectKind::DescriptorSet), 2);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let backend = Arc::new(NullBackend::new());
        let device = Device::with_backend(
            backend,
            &DeviceDescriptor {
                descriptor_set_capacity: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV);
        let a = Texture::new(&device, desc.clone()).unwrap();
        let b = Texture::new(&device, desc).unwrap();
        let mut layout = DescriptorSetLayout::new("test", bindings());

        layout.set_texture(1, &a, None).unwrap();
        layout.get_descriptor_set(&device).unwrap();
        layout.set_texture(1, &b, None).unwrap();
        assert_eq!(
            layout.get_descriptor_set(&device).unwrap_err(),
            RhiError::DescriptorPoolExhausted { capacity: 1 }
        );

        assert_eq!(layout.clear_sets(&device), 1);
        assert!(device.has_descriptor_set_capacity());
    }

    #[test]
    fn test_per_mip_binding_requires_flag() {
        let (_backend, device) = setup();
        let texture = Texture::new(
            &device,
            TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureFlags::SRV)
                .with_mips(4),
        )
        .unwrap();
        let mut layout = DescriptorSetLayout::new("test", bindings());
        assert!(layout.set_texture(1, &texture, Some((1, 1))).is_err());
        assert!(layout.set_texture(1, &texture, Some((0, 4))).is_ok());
    }
}
