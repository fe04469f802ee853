//! Cached native pipelines.

use parking_lot::Mutex;

use crate::descriptor::{DescriptorBinding, DescriptorSetLayout};
use crate::pipeline_state::PipelineState;

/// A native pipeline plus the binding table its draws share.
#[derive(Debug)]
pub struct Pipeline {
    hash: u64,
    name: &'static str,
    compute: bool,
    layout: Mutex<DescriptorSetLayout>,
}

impl Pipeline {
    pub(crate) fn new(hash: u64, state: &PipelineState) -> Self {
        let bindings: Vec<DescriptorBinding> =
            [&state.shader_vertex, &state.shader_pixel, &state.shader_compute]
                .into_iter()
                .flatten()
                .flat_map(|shader| shader.bindings().iter().cloned())
                .collect();

        Self {
            hash,
            name: state.name,
            compute: state.is_compute(),
            layout: Mutex::new(DescriptorSetLayout::new(state.name, bindings)),
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_compute(&self) -> bool {
        self.compute
    }

    pub fn descriptor_set_layout(&self) -> &Mutex<DescriptorSetLayout> {
        &self.layout
    }

    pub fn descriptor_set_count(&self) -> u32 {
        self.layout.lock().cached_set_count() as u32
    }
}
