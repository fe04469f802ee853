//! Samplers.

use std::sync::Arc;

use crate::device::Device;
use crate::error::RhiResult;
use crate::id::ObjectId;
use crate::types::SamplerDescriptor;

pub struct Sampler {
    id: ObjectId,
    device: Arc<Device>,
    descriptor: SamplerDescriptor,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl Sampler {
    pub fn new(device: &Arc<Device>, descriptor: SamplerDescriptor) -> RhiResult<Arc<Self>> {
        let max = device.limits().max_anisotropy as f32;
        let mut descriptor = descriptor;
        descriptor.anisotropy = descriptor.anisotropy.clamp(0.0, max);

        let id = ObjectId::new();
        device
            .backend()
            .create_sampler(id, &descriptor)
            .inspect_err(|e| log::error!("Failed to create sampler {:?}: {}", descriptor.label, e))?;
        Ok(Arc::new(Self {
            id,
            device: device.clone(),
            descriptor,
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    pub fn anisotropy(&self) -> f32 {
        self.descriptor.anisotropy
    }

    pub fn mip_lod_bias(&self) -> f32 {
        self.descriptor.mip_lod_bias
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}
