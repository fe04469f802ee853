//! Cross-thread requests and the flush handshake.
//!
//! Threads other than the render thread never touch RHI state directly. They
//! queue a [`Request`]; the render thread applies the whole batch at the next
//! command-pool wraparound, when no recorded frame can still be reading the
//! resources being replaced. A producer arriving while a batch is being
//! applied blocks until the render thread is done, so each batch is merged
//! atomically.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forge_rhi::Texture;
use parking_lot::{Condvar, Mutex};

use crate::options::{OptionValue, RendererOption};

/// A mutation queued from outside the render thread.
#[derive(Debug, Clone)]
pub enum Request {
    SetEnvironmentTexture(Option<Arc<Texture>>),
    GenerateMips(Arc<Texture>),
    SetViewport { width: f32, height: f32 },
    SetWindowSize { width: u32, height: u32 },
    SetResolutionRender { width: u32, height: u32 },
    SetResolutionOutput { width: u32, height: u32 },
    SetOption(RendererOption, bool),
    SetOptionValue(OptionValue, f32),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetEnvironmentTexture(_) => "SetEnvironmentTexture",
            Self::GenerateMips(_) => "GenerateMips",
            Self::SetViewport { .. } => "SetViewport",
            Self::SetWindowSize { .. } => "SetWindowSize",
            Self::SetResolutionRender { .. } => "SetResolutionRender",
            Self::SetResolutionOutput { .. } => "SetResolutionOutput",
            Self::SetOption(..) => "SetOption",
            Self::SetOptionValue(..) => "SetOptionValue",
        }
    }
}

#[derive(Default)]
struct QueueState {
    reading: bool,
    pending: Vec<Request>,
}

#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, waiting out a batch that is being applied.
    pub fn push(&self, request: Request) {
        let mut state = self.state.lock();
        if state.reading {
            log::debug!(
                "Request {} waiting for the render thread to finish applying requests",
                request.kind()
            );
            while state.reading {
                self.idle.wait(&mut state);
            }
        }
        state.pending.push(request);
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_reading(&self) -> bool {
        self.state.lock().reading
    }

    /// Take every pending request and apply it with `apply`.
    ///
    /// Producers calling [`push`](Self::push) meanwhile block until `apply`
    /// returns. Returns the number of requests applied.
    pub fn drain_with(&self, mut apply: impl FnMut(Request)) -> usize {
        let batch = {
            let mut state = self.state.lock();
            state.reading = true;
            std::mem::take(&mut state.pending)
        };
        let _reading = ReadingGuard(self);
        let count = batch.len();
        for request in batch {
            apply(request);
        }
        count
    }
}

/// Ends a batch, releasing blocked producers, even if applying it panicked.
struct ReadingGuard<'a>(&'a RequestQueue);

impl Drop for ReadingGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().reading = false;
        self.0.idle.notify_all();
    }
}

struct FlushState {
    requested: bool,
    rendering_allowed: bool,
    epoch: u64,
}

/// Two-phase flush between an outside thread and the render thread.
///
/// Only the render thread may wait on the device queues, so an outside
/// thread raises a request and blocks until the render thread has serviced
/// it at the top of its next update.
pub struct FlushHandshake {
    state: Mutex<FlushState>,
    serviced: Condvar,
}

impl Default for FlushHandshake {
    fn default() -> Self {
        Self {
            state: Mutex::new(FlushState {
                requested: false,
                rendering_allowed: true,
                epoch: 0,
            }),
            serviced: Condvar::new(),
        }
    }
}

impl FlushHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.state.lock().requested
    }

    pub fn is_rendering_allowed(&self) -> bool {
        self.state.lock().rendering_allowed
    }

    /// Number of flushes serviced so far.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Raise a flush request and block until it is serviced.
    ///
    /// Returns `false` if `timeout` elapsed first; the request stays raised
    /// and is serviced on a later update.
    pub fn request_and_wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();
        state.requested = true;
        state.rendering_allowed = false;
        let target = state.epoch + 1;
        log::debug!("Waiting for the render thread to flush");
        while state.epoch < target {
            match deadline {
                Some(deadline) => {
                    if self.serviced.wait_until(&mut state, deadline).timed_out()
                        && state.epoch < target
                    {
                        return false;
                    }
                }
                None => self.serviced.wait(&mut state),
            }
        }
        true
    }

    /// Called by the render thread once the queues are idle.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.requested = false;
        state.rendering_allowed = true;
        state.epoch += 1;
        self.serviced.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_drain_applies_in_order() {
        let queue = RequestQueue::new();
        queue.push(Request::SetViewport {
            width: 1.0,
            height: 1.0,
        });
        queue.push(Request::SetOption(RendererOption::BLOOM, false));

        let mut kinds = Vec::new();
        assert_eq!(queue.drain_with(|r| kinds.push(r.kind())), 2);
        assert_eq!(kinds, ["SetViewport", "SetOption"]);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.drain_with(|_| unreachable!()), 0);
    }

    #[test]
    fn test_push_waits_for_drain() {
        let queue = Arc::new(RequestQueue::new());
        let pushed = Arc::new(AtomicBool::new(false));
        queue.push(Request::SetOption(RendererOption::BLOOM, true));

        let mut producer = None;
        queue.drain_with(|_| {
            let queue = queue.clone();
            let pushed_flag = pushed.clone();
            producer = Some(std::thread::spawn(move || {
                queue.push(Request::SetOption(RendererOption::SSR, true));
                pushed_flag.store(true, Ordering::SeqCst);
            }));
            std::thread::sleep(Duration::from_millis(20));
            assert!(!pushed.load(Ordering::SeqCst));
        });

        producer.unwrap().join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.pending_count(), 1);
        assert!(!queue.is_reading());
    }

    #[test]
    fn test_panicking_batch_releases_producers() {
        let queue = RequestQueue::new();
        queue.push(Request::SetOption(RendererOption::BLOOM, true));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            queue.drain_with(|_| panic!("apply failed"));
        }));
        assert!(result.is_err());
        assert!(!queue.is_reading());

        queue.push(Request::SetOption(RendererOption::SSR, true));
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_flush_handshake() {
        let handshake = Arc::new(FlushHandshake::new());
        let waiter = {
            let handshake = handshake.clone();
            std::thread::spawn(move || handshake.request_and_wait(None))
        };

        while !handshake.is_requested() {
            std::thread::yield_now();
        }
        assert!(!handshake.is_rendering_allowed());
        handshake.complete();

        assert!(waiter.join().unwrap());
        assert!(handshake.is_rendering_allowed());
        assert_eq!(handshake.epoch(), 1);
    }

    #[test]
    fn test_flush_timeout() {
        let handshake = FlushHandshake::new();
        assert!(!handshake.request_and_wait(Some(Duration::from_millis(10))));
        assert!(handshake.is_requested());
    }
}
