//! RHI device: physical device selection, queues, descriptor capacity,
//! pipeline cache and timestamp queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{self, BackendType, DeviceLimits, PhysicalDevice, PhysicalDeviceType, RhiBackend};
use crate::command::{QueueType, SubmissionId};
use crate::command_pool::CommandPool;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::pipeline::Pipeline;
use crate::pipeline_state::PipelineState;

/// Parameters for creating a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub backend: BackendType,
    /// Substring of the adapter name to prefer over the automatic choice.
    pub preferred_adapter: Option<String>,
    /// Overrides the backend's descriptor set capacity when set.
    pub descriptor_set_capacity: Option<u32>,
    pub debug_labels: bool,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            backend: BackendType::Null,
            preferred_adapter: None,
            descriptor_set_capacity: None,
            debug_labels: cfg!(debug_assertions),
        }
    }
}

/// The logical device every other RHI object is created from.
pub struct Device {
    backend: Arc<dyn RhiBackend>,
    physical_devices: Vec<PhysicalDevice>,
    primary: usize,
    limits: DeviceLimits,
    debug_labels: bool,
    descriptor_sets_allocated: AtomicU32,
    /// Released sets whose native objects may still be referenced by
    /// submitted work. Destroyed once the queues are idle.
    retired_descriptor_sets: Mutex<Vec<ObjectId>>,
    pipelines: Mutex<HashMap<u64, Arc<Pipeline>>>,
    in_flight: Mutex<Vec<SubmissionId>>,
    next_query: AtomicU32,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend.name())
            .field("adapter", &self.primary_physical_device().name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Create a device with the backend named in `descriptor`.
    pub fn new(descriptor: &DeviceDescriptor) -> RhiResult<Arc<Self>> {
        let backend = backend::create_backend(descriptor.backend)?;
        Self::with_backend(backend, descriptor)
    }

    /// Create a device over an existing backend instance.
    pub fn with_backend(
        backend: Arc<dyn RhiBackend>,
        descriptor: &DeviceDescriptor,
    ) -> RhiResult<Arc<Self>> {
        let physical_devices = backend.enumerate_physical_devices();
        if physical_devices.is_empty() {
            return Err(RhiError::DeviceCreationFailed(format!(
                "{} backend reported no physical devices",
                backend.name()
            )));
        }

        let primary = select_primary(&physical_devices, descriptor.preferred_adapter.as_deref());
        let mut limits = backend.limits();
        if let Some(capacity) = descriptor.descriptor_set_capacity {
            limits.descriptor_set_capacity = capacity;
        }

        let adapter = &physical_devices[primary];
        log::info!(
            "Selected GPU: {} ({}, {} MB, {} backend)",
            adapter.name,
            adapter.vendor_name(),
            adapter.memory_mb,
            backend.name()
        );

        Ok(Arc::new(Self {
            backend,
            physical_devices,
            primary,
            limits,
            debug_labels: descriptor.debug_labels,
            descriptor_sets_allocated: AtomicU32::new(0),
            retired_descriptor_sets: Mutex::new(Vec::new()),
            pipelines: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
            next_query: AtomicU32::new(0),
        }))
    }

    pub fn backend(&self) -> &Arc<dyn RhiBackend> {
        &self.backend
    }

    pub fn physical_devices(&self) -> &[PhysicalDevice] {
        &self.physical_devices
    }

    pub fn primary_physical_device(&self) -> &PhysicalDevice {
        &self.physical_devices[self.primary]
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn max_texture_dimension_2d(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    pub fn debug_labels(&self) -> bool {
        self.debug_labels
    }

    /// Obtain a command pool with `list_count` lists per set, bound to a swap chain.
    pub fn allocate_command_pool(
        self: &Arc<Self>,
        name: &str,
        swap_chain_id: ObjectId,
        list_count: u32,
    ) -> RhiResult<CommandPool> {
        CommandPool::new(self.clone(), name, swap_chain_id, list_count)
    }

    // Descriptor pool

    pub fn has_descriptor_set_capacity(&self) -> bool {
        self.descriptor_sets_allocated.load(Ordering::Acquire) < self.limits.descriptor_set_capacity
    }

    pub fn descriptor_sets_allocated(&self) -> u32 {
        self.descriptor_sets_allocated.load(Ordering::Acquire)
    }

    /// Reserve one set from the pool.
    pub(crate) fn reserve_descriptor_set(&self) -> RhiResult<()> {
        let capacity = self.limits.descriptor_set_capacity;
        self.descriptor_sets_allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < capacity).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|_| RhiError::DescriptorPoolExhausted { capacity })
    }

    pub fn descriptor_set_capacity(&self) -> u32 {
        self.limits.descriptor_set_capacity
    }

    /// Return a set to the pool. Its native object lives until the queues
    /// are idle.
    pub(crate) fn retire_descriptor_set(&self, id: ObjectId) {
        self.retired_descriptor_sets.lock().push(id);
        self.release_descriptor_sets(1);
    }

    /// Return every cached set of every pipeline to the pool. Pipelines stay
    /// cached and rebuild their sets on the next bind.
    ///
    /// Safe while recording: released sets are only destroyed by the next
    /// [`queue_wait_all`](Self::queue_wait_all). Must not be called while a
    /// pipeline's layout is locked.
    pub fn reset_descriptor_sets(&self) -> u32 {
        let pipelines: Vec<Arc<Pipeline>> = self.pipelines.lock().values().cloned().collect();
        let released = pipelines
            .iter()
            .map(|pipeline| pipeline.descriptor_set_layout().lock().clear_sets(self))
            .sum();
        log::debug!("Reset descriptor pool: {} sets released", released);
        released
    }

    /// Sets released to the pool whose native objects are not destroyed yet.
    pub fn retired_descriptor_sets(&self) -> usize {
        self.retired_descriptor_sets.lock().len()
    }

    fn destroy_retired_if_idle(&self) {
        if self.submissions_in_flight() == 0 {
            self.destroy_retired();
        }
    }

    fn destroy_retired(&self) {
        let retired = std::mem::take(&mut *self.retired_descriptor_sets.lock());
        for id in retired {
            self.backend.destroy(id);
        }
    }

    pub(crate) fn release_descriptor_sets(&self, count: u32) {
        let _ = self
            .descriptor_sets_allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }

    // Pipelines

    /// Fetch the cached pipeline for `state`, creating it on a miss.
    pub fn get_or_create_pipeline(&self, state: &PipelineState) -> RhiResult<Arc<Pipeline>> {
        state.validate().map_err(RhiError::InvalidPipelineState)?;
        let hash = state.compute_hash();

        if let Some(pipeline) = self.pipelines.lock().get(&hash) {
            return Ok(pipeline.clone());
        }

        self.backend.create_pipeline(hash, state).inspect_err(|e| {
            log::error!("Failed to create pipeline '{}': {}", state.name, e);
        })?;
        let pipeline = Arc::new(Pipeline::new(hash, state));
        log::debug!("Created pipeline '{}' ({:#018x})", state.name, hash);

        Ok(self
            .pipelines
            .lock()
            .entry(hash)
            .or_insert(pipeline)
            .clone())
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Drop every cached pipeline and the descriptor sets they own.
    ///
    /// Pipeline hashes include render target ids; call this after recreating
    /// targets, outside of recording.
    pub fn clear_pipelines(&self) -> usize {
        let pipelines: Vec<Arc<Pipeline>> =
            self.pipelines.lock().drain().map(|(_, pipeline)| pipeline).collect();
        for pipeline in &pipelines {
            pipeline.descriptor_set_layout().lock().clear_sets(self);
            self.backend.destroy_pipeline(pipeline.hash());
        }
        log::debug!("Cleared {} pipelines", pipelines.len());
        self.destroy_retired_if_idle();
        pipelines.len()
    }

    // Queues

    pub fn submit(
        &self,
        queue: QueueType,
        commands: Vec<crate::command::Command>,
    ) -> RhiResult<SubmissionId> {
        let submission = self.backend.submit(queue, commands)?;
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|id| !self.backend.is_submission_complete(*id));
        in_flight.push(submission);
        Ok(submission)
    }

    pub fn is_submission_complete(&self, submission: SubmissionId) -> bool {
        self.backend.is_submission_complete(submission)
    }

    pub fn wait_submission(&self, submission: SubmissionId) -> RhiResult<()> {
        self.backend.wait_submission(submission)
    }

    /// Block until every queue is idle.
    pub fn queue_wait_all(&self) -> RhiResult<()> {
        self.backend.wait_idle()?;
        self.in_flight.lock().clear();
        self.destroy_retired();
        Ok(())
    }

    pub fn submissions_in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|id| !self.backend.is_submission_complete(*id));
        in_flight.len()
    }

    // Timestamp queries

    pub(crate) fn allocate_query(&self) -> u32 {
        self.next_query.fetch_add(1, Ordering::Relaxed)
    }

    /// Milliseconds between two resolved timestamp queries.
    pub fn timestamp_delta_ms(&self, start: u32, end: u32) -> Option<f32> {
        let start = self.backend.read_timestamp(start)?;
        let end = self.backend.read_timestamp(end)?;
        let ticks = end.saturating_sub(start) as f32;
        Some(ticks * self.backend.timestamp_period() / 1_000_000.0)
    }
}

/// Preferred adapter by name, else discrete GPUs, then the most memory.
fn select_primary(devices: &[PhysicalDevice], preferred: Option<&str>) -> usize {
    if let Some(name) = preferred {
        if let Some(index) = devices.iter().position(|d| d.name.contains(name)) {
            return index;
        }
        log::warn!("Preferred adapter '{}' not found, selecting automatically", name);
    }

    devices
        .iter()
        .enumerate()
        .max_by_key(|(_, d)| (d.device_type == PhysicalDeviceType::Discrete, d.memory_mb))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    fn device(devices: &[(&str, PhysicalDeviceType, u64)]) -> Vec<PhysicalDevice> {
        devices
            .iter()
            .enumerate()
            .map(|(i, (name, ty, mem))| PhysicalDevice {
                vendor_id: 0,
                name: name.to_string(),
                memory_mb: *mem,
                driver_version: String::new(),
                device_type: *ty,
                native_handle: i as u64,
            })
            .collect()
    }

    #[test]
    fn test_select_prefers_discrete() {
        let devices = device(&[
            ("integrated", PhysicalDeviceType::Integrated, 16000),
            ("small discrete", PhysicalDeviceType::Discrete, 4000),
            ("big discrete", PhysicalDeviceType::Discrete, 8000),
        ]);
        assert_eq!(select_primary(&devices, None), 2);
        assert_eq!(select_primary(&devices, Some("integrated")), 0);
        assert_eq!(select_primary(&devices, Some("missing")), 2);
    }

    #[test]
    fn test_null_device_creation() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        assert_eq!(device.primary_physical_device().name, "Null Discrete Device");
        assert!(device.has_descriptor_set_capacity());
    }

    #[test]
    fn test_descriptor_capacity() {
        let descriptor = DeviceDescriptor {
            descriptor_set_capacity: Some(2),
            ..Default::default()
        };
        let device = Device::with_backend(Arc::new(NullBackend::new()), &descriptor).unwrap();
        device.reserve_descriptor_set().unwrap();
        device.reserve_descriptor_set().unwrap();
        assert!(!device.has_descriptor_set_capacity());
        assert_eq!(
            device.reserve_descriptor_set(),
            Err(RhiError::DescriptorPoolExhausted { capacity: 2 })
        );
        device.release_descriptor_sets(1);
        assert!(device.has_descriptor_set_capacity());
    }
}
