//! # Render-Thread Handoff
//!
//! One FIFO command stream from producer threads to the render thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   RenderCommand   ┌──────────────┐
//! │   Producer   │──────────────────>│    Render    │
//! │ (simulation) │  Resource/Destroy │   executor   │
//! └──────────────┘   Task/Fence      └──────────────┘
//!        │                                  │
//!        └──────── Fence::wait() <──────────┘
//! ```
//!
//! Resource requests, buffer destroys and arbitrary render tasks share one
//! channel, so everything a producer posts executes in post order. A fence
//! lets the producer block until the render thread has caught up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::buffer::BufferId;
use crate::device::{DrawSubmission, RenderDevice};
use crate::executor::RenderExecutor;
use crate::queue::request::ResourceRequest;
use crate::queue::shared::QueueShared;

/// Closure run on the render thread.
pub type RenderTask = Box<dyn FnOnce(&mut RenderFrame<'_>) + Send>;

pub(crate) enum RenderCommand {
    /// Apply a resource request, if command `seq` still owns it.
    Resource {
        request: Arc<ResourceRequest>,
        seq: u64,
    },
    /// Destroy a buffer and cancel its queued work.
    Destroy(BufferId),
    /// Run a closure.
    Task(RenderTask),
    /// Signal once everything before it has executed.
    Fence(Sender<()>),
}

/// Render-thread view handed to each [`RenderTask`].
pub struct RenderFrame<'a> {
    pub(crate) device: &'a mut dyn RenderDevice,
    pub(crate) shared: &'a QueueShared,
}

impl RenderFrame<'_> {
    /// The render device.
    pub fn device(&mut self) -> &mut dyn RenderDevice {
        &mut *self.device
    }

    /// Reports that a buffer was torn down outside the queue.
    ///
    /// Cancels every in-flight request for `id`. Returns how many.
    pub fn notify_buffer_destroyed(&mut self, id: BufferId) -> usize {
        self.shared.mark_destroyed(id)
    }

    /// Issues a draw.
    pub fn submit_draw(&mut self, draw: &DrawSubmission) {
        self.device.submit_draw(draw);
    }
}

/// Producer-side handle onto the command stream.
#[derive(Clone)]
pub struct RenderSubmitter {
    sender: Sender<RenderCommand>,
    shared: Arc<QueueShared>,
    submitted: Arc<AtomicU64>,
}

impl RenderSubmitter {
    /// Queues `task` to run on the render thread.
    ///
    /// Returns false if the render thread is gone.
    pub fn run_on_render_thread<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut RenderFrame<'_>) + Send + 'static,
    {
        self.submit(RenderCommand::Task(Box::new(task)))
    }

    /// Queues a fence behind everything submitted so far.
    #[must_use]
    pub fn fence(&self) -> Fence {
        let (tx, rx) = bounded(1);
        self.submit(RenderCommand::Fence(tx));
        Fence { receiver: rx, signalled: false }
    }

    /// Blocks until the render thread has executed everything submitted so far.
    ///
    /// Returns false if the render thread went away first.
    pub fn flush(&self) -> bool {
        self.fence().wait()
    }

    /// Commands submitted through any clone of this handle.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn shared(&self) -> &Arc<QueueShared> {
        &self.shared
    }

    pub(crate) fn submit(&self, command: RenderCommand) -> bool {
        if self.sender.send(command).is_err() {
            tracing::warn!("render thread disconnected; command discarded");
            return false;
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Completion signal for a fence command.
#[must_use = "a fence does nothing unless waited on"]
pub struct Fence {
    receiver: Receiver<()>,
    signalled: bool,
}

impl Fence {
    /// Blocks until the fence executes.
    ///
    /// Returns false if the render thread dropped it without executing.
    pub fn wait(self) -> bool {
        self.signalled || self.receiver.recv().is_ok()
    }

    /// Blocks for at most `timeout`.
    ///
    /// Returns true once the fence has executed.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if !self.signalled {
            match self.receiver.recv_timeout(timeout) {
                Ok(()) => self.signalled = true,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }
        }
        self.signalled
    }

    /// Non-blocking check.
    pub fn poll(&mut self) -> bool {
        if !self.signalled {
            match self.receiver.try_recv() {
                Ok(()) => self.signalled = true,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
        }
        self.signalled
    }
}

/// Creates a command stream feeding `device`.
///
/// The executor may be driven inline with [`RenderExecutor::drain`] or moved
/// to its own thread with [`RenderExecutor::spawn`].
pub fn render_channel<D: RenderDevice>(device: D) -> (RenderSubmitter, RenderExecutor<D>) {
    let (sender, receiver) = unbounded();
    let shared = Arc::new(QueueShared::default());
    let submitter = RenderSubmitter { sender, shared: Arc::clone(&shared), submitted: Arc::new(AtomicU64::new(0)) };
    (submitter, RenderExecutor::new(device, receiver, shared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    #[test]
    fn test_tasks_run_in_order() {
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            submitter.run_on_render_thread(move |_| log.lock().push(i));
        }
        assert_eq!(submitter.submitted(), 3);
        assert_eq!(executor.drain().tasks, 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_fence_signals_after_drain() {
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let mut fence = submitter.fence();
        assert!(!fence.poll());
        executor.drain();
        assert!(fence.poll());
        assert!(fence.wait());
    }

    #[test]
    fn test_fence_reports_lost_executor() {
        let (submitter, executor) = render_channel(SoftwareDevice::new());
        let fence = submitter.fence();
        drop(executor);
        assert!(!fence.wait());
        assert!(!submitter.run_on_render_thread(|_| {}));
    }
}
