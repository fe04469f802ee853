//! Shaders and background compilation.
//!
//! A shader moves through [`CompilationState`] atomically so passes can poll
//! [`Shader::is_compiled`] from the render thread while a worker compiles.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::descriptor::DescriptorBinding;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;
use crate::types::ShaderStage;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationState {
    Idle = 0,
    Compiling = 1,
    Succeeded = 2,
    Failed = 3,
}

impl CompilationState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Compiling,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Everything the backend needs to compile a shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescriptor {
    pub name: String,
    pub stage: ShaderStage,
    pub source: String,
    pub entry_point: String,
    pub defines: Vec<(String, String)>,
    /// Resource slots the shader reads.
    pub bindings: Vec<DescriptorBinding>,
}

impl ShaderDescriptor {
    pub fn new(name: impl Into<String>, stage: ShaderStage, source: impl Into<String>) -> Self {
        let entry_point = if stage.contains(ShaderStage::COMPUTE) {
            "main_cs"
        } else if stage.contains(ShaderStage::PIXEL) {
            "main_ps"
        } else {
            "main_vs"
        };
        Self {
            name: name.into(),
            stage,
            source: source.into(),
            entry_point: entry_point.to_string(),
            defines: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<DescriptorBinding>) -> Self {
        self.bindings = bindings;
        self
    }
}

pub struct Shader {
    id: ObjectId,
    device: Arc<Device>,
    descriptor: ShaderDescriptor,
    state: AtomicU8,
    error: Mutex<Option<String>>,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("state", &self.compilation_state())
            .finish()
    }
}

impl Shader {
    /// Create an uncompiled shader.
    pub fn new(device: &Arc<Device>, descriptor: ShaderDescriptor) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            device: device.clone(),
            descriptor,
            state: AtomicU8::new(CompilationState::Idle as u8),
            error: Mutex::new(None),
        })
    }

    /// Compile on the calling thread.
    pub fn compile(&self) -> RhiResult<()> {
        self.set_state(CompilationState::Compiling);
        match self.device.backend().compile_shader(self.id, &self.descriptor) {
            Ok(()) => {
                *self.error.lock() = None;
                self.set_state(CompilationState::Succeeded);
                log::debug!("Compiled shader '{}'", self.descriptor.name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to compile shader '{}': {}", self.descriptor.name, e);
                *self.error.lock() = Some(e.to_string());
                self.set_state(CompilationState::Failed);
                Err(e)
            }
        }
    }

    fn set_state(&self, state: CompilationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn compilation_state(&self) -> CompilationState {
        CompilationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_compiled(&self) -> bool {
        self.compilation_state() == CompilationState::Succeeded
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.descriptor.stage
    }

    pub fn descriptor(&self) -> &ShaderDescriptor {
        &self.descriptor
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.descriptor.bindings
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.device.backend().destroy(self.id);
    }
}

/// Background worker compiling shaders in submission order.
pub struct ShaderCompiler {
    sender: Option<mpsc::Sender<Arc<Shader>>>,
    worker: Option<JoinHandle<()>>,
}

impl ShaderCompiler {
    pub fn new() -> RhiResult<Self> {
        let (sender, receiver) = mpsc::channel::<Arc<Shader>>();
        let worker = std::thread::Builder::new()
            .name("shader-compiler".into())
            .spawn(move || {
                while let Ok(shader) = receiver.recv() {
                    // Failures are recorded on the shader itself.
                    let _ = shader.compile();
                }
            })
            .map_err(|e| RhiError::Backend(format!("failed to spawn shader compiler: {e}")))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue `shader`; it reports [`CompilationState::Compiling`] immediately.
    pub fn compile_async(&self, shader: Arc<Shader>) -> RhiResult<()> {
        let Some(sender) = &self.sender else {
            return Err(RhiError::Backend("shader compiler shut down".into()));
        };
        shader.set_state(CompilationState::Compiling);
        sender.send(shader).map_err(|e| {
            e.0.set_state(CompilationState::Failed);
            RhiError::Backend("shader compiler worker exited".into())
        })
    }
}

impl Drop for ShaderCompiler {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;

    #[test]
    fn test_sync_compile() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let shader = Shader::new(
            &device,
            ShaderDescriptor::new("quad", ShaderStage::VERTEX, "fn main_vs() {}"),
        );
        assert_eq!(shader.compilation_state(), CompilationState::Idle);
        shader.compile().unwrap();
        assert!(shader.is_compiled());
    }

    #[test]
    fn test_failed_compile_records_error() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let shader = Shader::new(&device, ShaderDescriptor::new("empty", ShaderStage::PIXEL, ""));
        assert!(shader.compile().is_err());
        assert_eq!(shader.compilation_state(), CompilationState::Failed);
        assert!(shader.error_message().is_some());
    }

    #[test]
    fn test_async_compile() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let shader = Shader::new(
            &device,
            ShaderDescriptor::new("cs", ShaderStage::COMPUTE, "fn main_cs() {}"),
        );
        {
            let compiler = ShaderCompiler::new().unwrap();
            compiler.compile_async(shader.clone()).unwrap();
            // Dropping the compiler drains the queue.
        }
        assert!(shader.is_compiled());
        assert_eq!(shader.descriptor().entry_point, "main_cs");
    }
}
