//! Null backend for headless runs and testing.
//!
//! Performs no GPU work. Every submission is recorded so tests can inspect the
//! exact command stream, and completion can be driven by hand to exercise
//! command list waits.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::command::{Command, QueueType, SubmissionId};
use crate::descriptor::Descriptor;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::pipeline_state::PipelineState;
use crate::resources::{ShaderDescriptor, TextureSlice};
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor};

use super::{BackendType, DeviceLimits, PhysicalDevice, PhysicalDeviceType, RhiBackend};

/// A submission captured by the null backend.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub id: SubmissionId,
    pub queue: QueueType,
    pub commands: Vec<Command>,
}

/// Kinds of native objects the null backend tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullObjectKind {
    Texture,
    Buffer,
    Sampler,
    Shader,
    DescriptorSet,
    SwapChain,
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, NullObjectKind>,
    created: HashMap<NullObjectKind, u64>,
    pipelines: HashSet<u64>,
    submissions: Vec<RecordedSubmission>,
    pending: HashSet<SubmissionId>,
    timestamps: HashMap<u32, u64>,
    buffer_writes: u64,
    presents: u64,
}

/// Null GPU backend.
pub struct NullBackend {
    state: Mutex<State>,
    retired: Condvar,
    next_submission: AtomicU64,
    auto_complete: AtomicBool,
    fail_resource_creation: AtomicBool,
    fail_wait: AtomicBool,
    limits: DeviceLimits,
    epoch: Instant,
}

impl std::fmt::Debug for NullBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullBackend")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retired: Condvar::new(),
            next_submission: AtomicU64::new(1),
            auto_complete: AtomicBool::new(true),
            fail_resource_creation: AtomicBool::new(false),
            fail_wait: AtomicBool::new(false),
            limits,
            epoch: Instant::now(),
        }
    }

    /// When disabled, submissions stay in flight until [`signal`](Self::signal) is called.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.auto_complete.store(enabled, Ordering::Release);
    }

    /// Make every subsequent resource creation fail.
    pub fn set_fail_resource_creation(&self, fail: bool) {
        self.fail_resource_creation.store(fail, Ordering::Release);
    }

    /// Make queue waits fail as they would after a device loss.
    pub fn set_fail_wait(&self, fail: bool) {
        self.fail_wait.store(fail, Ordering::Release);
    }

    fn check_wait(&self) -> RhiResult<()> {
        if self.fail_wait.load(Ordering::Acquire) {
            return Err(RhiError::Backend(String::from("null backend: device lost")));
        }
        Ok(())
    }

    /// Retire a submission, waking any waiter.
    pub fn signal(&self, submission: SubmissionId) {
        let mut state = self.state.lock();
        state.pending.remove(&submission);
        self.retired.notify_all();
    }

    pub fn signal_all(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        self.retired.notify_all();
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.lock().submissions.clone()
    }

    /// All submitted commands, in submission order.
    pub fn commands(&self) -> Vec<Command> {
        self.state
            .lock()
            .submissions
            .iter()
            .flat_map(|s| s.commands.iter().cloned())
            .collect()
    }

    pub fn clear_recorded(&self) {
        self.state.lock().submissions.clear();
    }

    /// Number of objects of `kind` created over the backend lifetime.
    pub fn created_count(&self, kind: NullObjectKind) -> u64 {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    /// Number of objects of `kind` currently alive.
    pub fn live_count(&self, kind: NullObjectKind) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    pub fn pipeline_count(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn buffer_write_count(&self) -> u64 {
        self.state.lock().buffer_writes
    }

    pub fn present_count(&self) -> u64 {
        self.state.lock().presents
    }

    fn register(&self, id: ObjectId, kind: NullObjectKind, label: Option<&str>) -> RhiResult<()> {
        if self.fail_resource_creation.load(Ordering::Acquire) {
            return Err(RhiError::ResourceCreationFailed(format!(
                "{kind:?} {} rejected by null backend",
                label.unwrap_or("<unnamed>")
            )));
        }
        log::trace!("NullBackend: creating {:?} {} ({:?})", kind, id, label);
        let mut state = self.state.lock();
        state.objects.insert(id, kind);
        *state.created.entry(kind).or_default() += 1;
        Ok(())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RhiBackend for NullBackend {
    fn name(&self) -> &'static str {
        "Null"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Null
    }

    fn enumerate_physical_devices(&self) -> Vec<PhysicalDevice> {
        vec![
            PhysicalDevice {
                vendor_id: 0,
                name: "Null Software Device".into(),
                memory_mb: 256,
                driver_version: env!("CARGO_PKG_VERSION").into(),
                device_type: PhysicalDeviceType::Cpu,
                native_handle: 0,
            },
            PhysicalDevice {
                vendor_id: PhysicalDevice::VENDOR_NVIDIA,
                name: "Null Discrete Device".into(),
                memory_mb: 8192,
                driver_version: env!("CARGO_PKG_VERSION").into(),
                device_type: PhysicalDeviceType::Discrete,
                native_handle: 1,
            },
        ]
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(
        &self,
        id: ObjectId,
        descriptor: &TextureDescriptor,
        slices: &[TextureSlice],
    ) -> RhiResult<()> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(RhiError::ResourceCreationFailed(format!(
                "texture {:?} has zero size",
                descriptor.label
            )));
        }
        log::trace!(
            "NullBackend: texture {}x{} with {} slices",
            descriptor.width,
            descriptor.height,
            slices.len()
        );
        self.register(id, NullObjectKind::Texture, descriptor.label.as_deref())
    }

    fn create_buffer(
        &self,
        id: ObjectId,
        descriptor: &BufferDescriptor,
        _data: Option<&[u8]>,
    ) -> RhiResult<()> {
        if descriptor.size == 0 {
            return Err(RhiError::ResourceCreationFailed(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }
        self.register(id, NullObjectKind::Buffer, descriptor.label.as_deref())
    }

    fn write_buffer(&self, id: ObjectId, offset: u64, data: &[u8]) -> RhiResult<()> {
        log::trace!(
            "NullBackend: write_buffer {} offset={} len={}",
            id,
            offset,
            data.len()
        );
        self.state.lock().buffer_writes += 1;
        Ok(())
    }

    fn create_sampler(&self, id: ObjectId, descriptor: &SamplerDescriptor) -> RhiResult<()> {
        self.register(id, NullObjectKind::Sampler, descriptor.label.as_deref())
    }

    fn compile_shader(&self, id: ObjectId, descriptor: &ShaderDescriptor) -> RhiResult<()> {
        if descriptor.source.trim().is_empty() {
            return Err(RhiError::ShaderCompilationFailed {
                name: descriptor.name.clone(),
                message: "empty source".into(),
            });
        }
        self.register(id, NullObjectKind::Shader, Some(&descriptor.name))
    }

    fn create_pipeline(&self, hash: u64, state: &PipelineState) -> RhiResult<()> {
        log::trace!("NullBackend: pipeline '{}' ({:#x})", state.name, hash);
        self.state.lock().pipelines.insert(hash);
        Ok(())
    }

    fn create_descriptor_set(
        &self,
        id: ObjectId,
        layout_hash: u64,
        descriptors: &[Descriptor],
    ) -> RhiResult<()> {
        log::trace!(
            "NullBackend: descriptor set for layout {:#x} ({} bindings)",
            layout_hash,
            descriptors.len()
        );
        self.register(id, NullObjectKind::DescriptorSet, None)
    }

    fn create_swap_chain(
        &self,
        id: ObjectId,
        width: u32,
        height: u32,
        buffer_count: u32,
    ) -> RhiResult<()> {
        log::trace!("NullBackend: swap chain {width}x{height} x{buffer_count}");
        self.register(id, NullObjectKind::SwapChain, None)
    }

    fn destroy_pipeline(&self, hash: u64) {
        self.state.lock().pipelines.remove(&hash);
    }

    fn destroy(&self, id: ObjectId) {
        self.state.lock().objects.remove(&id);
    }

    fn submit(&self, queue: QueueType, commands: Vec<Command>) -> RhiResult<SubmissionId> {
        let id = SubmissionId(self.next_submission.fetch_add(1, Ordering::Relaxed));
        log::trace!(
            "NullBackend: submission {:?} on {:?} with {} commands",
            id,
            queue,
            commands.len()
        );

        let mut state = self.state.lock();
        let now = self.epoch.elapsed().as_nanos() as u64;
        for command in &commands {
            if let Command::Timestamp { query } = command {
                state.timestamps.insert(*query, now);
            }
        }
        state.submissions.push(RecordedSubmission {
            id,
            queue,
            commands,
        });
        if !self.auto_complete.load(Ordering::Acquire) {
            state.pending.insert(id);
        }
        Ok(id)
    }

    fn is_submission_complete(&self, submission: SubmissionId) -> bool {
        !self.state.lock().pending.contains(&submission)
    }

    fn wait_submission(&self, submission: SubmissionId) -> RhiResult<()> {
        self.check_wait()?;
        let mut state = self.state.lock();
        while state.pending.contains(&submission) {
            self.retired.wait(&mut state);
        }
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.check_wait()?;
        let mut state = self.state.lock();
        while !state.pending.is_empty() {
            self.retired.wait(&mut state);
        }
        Ok(())
    }

    fn present(&self, swap_chain: ObjectId, image_index: u32) -> RhiResult<()> {
        log::trace!("NullBackend: present {} image {}", swap_chain, image_index);
        self.state.lock().presents += 1;
        Ok(())
    }

    fn timestamp_period(&self) -> f32 {
        1.0
    }

    fn read_timestamp(&self, query: u32) -> Option<u64> {
        self.state.lock().timestamps.get(&query).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFlags, TextureFormat};

    #[test]
    fn test_submission_recording() {
        let backend = NullBackend::new();
        let id = backend
            .submit(QueueType::Graphics, vec![Command::EndMarker])
            .unwrap();
        assert!(backend.is_submission_complete(id));
        assert_eq!(backend.commands(), vec![Command::EndMarker]);
    }

    #[test]
    fn test_manual_completion() {
        let backend = NullBackend::new();
        backend.set_auto_complete(false);
        let id = backend.submit(QueueType::Graphics, Vec::new()).unwrap();
        assert!(!backend.is_submission_complete(id));
        backend.signal(id);
        assert!(backend.is_submission_complete(id));
        backend.wait_submission(id).unwrap();
    }

    #[test]
    fn test_failing_creation() {
        let backend = NullBackend::new();
        backend.set_fail_resource_creation(true);
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureFlags::SRV);
        assert!(backend.create_texture(ObjectId::new(), &desc, &[]).is_err());
        assert_eq!(backend.created_count(NullObjectKind::Texture), 0);
    }
}
