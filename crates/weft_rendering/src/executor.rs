//! # Render Executor
//!
//! Consumer half of the command stream. Owns the [`RenderDevice`] and is the
//! only code that touches it.
//!
//! Per command:
//!
//! | Command  | Effect                                                     |
//! |----------|------------------------------------------------------------|
//! | Resource | skipped if the buffer is destroyed, else applied           |
//! | Destroy  | cancel queued work for the buffer, then destroy it         |
//! | Task     | run the closure with a [`RenderFrame`]                     |
//! | Fence    | signal the waiting producer                                |

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::buffer::BufferId;
use crate::device::RenderDevice;
use crate::handoff::{RenderCommand, RenderFrame};
use crate::queue::request::Applied;
use crate::queue::shared::QueueShared;

/// Counters for one drain, or cumulative via [`RenderExecutor::totals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Buffers created.
    pub created: u64,
    /// Buffer writes applied.
    pub written: u64,
    /// Buffers destroyed.
    pub destroyed: u64,
    /// Resource commands turned into no-ops.
    pub skipped: u64,
    /// Requests the device rejected.
    pub failed: u64,
    /// Tasks run.
    pub tasks: u64,
    /// Fences signalled.
    pub fences: u64,
}

impl DrainStats {
    fn accumulate(&mut self, other: &Self) {
        self.created += other.created;
        self.written += other.written;
        self.destroyed += other.destroyed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.tasks += other.tasks;
        self.fences += other.fences;
    }
}

/// Render-thread half of [`render_channel`](crate::render_channel).
pub struct RenderExecutor<D: RenderDevice> {
    device: D,
    receiver: Receiver<RenderCommand>,
    shared: Arc<QueueShared>,
    totals: DrainStats,
}

impl<D: RenderDevice> RenderExecutor<D> {
    pub(crate) fn new(device: D, receiver: Receiver<RenderCommand>, shared: Arc<QueueShared>) -> Self {
        Self { device, receiver, shared, totals: DrainStats::default() }
    }

    /// Executes every command currently queued without blocking.
    pub fn drain(&mut self) -> DrainStats {
        let mut stats = DrainStats::default();
        loop {
            match self.receiver.try_recv() {
                Ok(command) => self.execute(command, &mut stats),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.totals.accumulate(&stats);
        stats
    }

    /// Executes commands until every submitter is dropped.
    #[must_use]
    pub fn run(mut self) -> Self {
        tracing::info!("render executor started");
        let mut stats = DrainStats::default();
        while let Ok(command) = self.receiver.recv() {
            self.execute(command, &mut stats);
        }
        self.totals.accumulate(&stats);
        tracing::info!(
            "render executor stopped: {} writes, {} skipped, {} tasks",
            self.totals.written,
            self.totals.skipped,
            self.totals.tasks
        );
        self
    }

    /// Reports that a buffer was torn down outside the queue.
    ///
    /// Cancels every in-flight request for `id`. Returns how many.
    pub fn notify_buffer_destroyed(&mut self, id: BufferId) -> usize {
        let cancelled = self.shared.mark_destroyed(id);
        if cancelled > 0 {
            tracing::debug!("{:?} destroyed externally, cancelled {} requests", id, cancelled);
        }
        cancelled
    }

    /// The device.
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Cumulative counters.
    #[must_use]
    pub const fn totals(&self) -> DrainStats {
        self.totals
    }

    fn execute(&mut self, command: RenderCommand, stats: &mut DrainStats) {
        match command {
            RenderCommand::Resource { request, seq } => {
                if self.shared.is_destroyed(request.target()) {
                    request.cancel();
                    stats.skipped += 1;
                    return;
                }
                match request.apply(seq, &mut self.device) {
                    Applied::Created => stats.created += 1,
                    Applied::Written => stats.written += 1,
                    Applied::Skipped => stats.skipped += 1,
                    Applied::Failed(err) => {
                        stats.failed += 1;
                        tracing::warn!("resource request for {:?} failed: {}", request.target(), err);
                    }
                }
            }
            RenderCommand::Destroy(id) => {
                self.shared.mark_destroyed(id);
                match self.device.destroy_buffer(id) {
                    Ok(()) => stats.destroyed += 1,
                    // Creation was itself cancelled; nothing to tear down.
                    Err(err) => tracing::debug!("destroy {:?}: {}", id, err),
                }
            }
            RenderCommand::Task(task) => {
                let mut frame = RenderFrame { device: &mut self.device, shared: &self.shared };
                task(&mut frame);
                stats.tasks += 1;
            }
            RenderCommand::Fence(signal) => {
                // Waiter may have given up.
                let _ = signal.send(());
                stats.fences += 1;
            }
        }
    }
}

impl<D: RenderDevice + 'static> RenderExecutor<D> {
    /// Moves the executor onto a dedicated render thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<RenderThread<D>> {
        let handle = std::thread::Builder::new().name("weft-render".to_string()).spawn(move || self.run())?;
        Ok(RenderThread { handle })
    }
}

/// A running render thread.
pub struct RenderThread<D: RenderDevice> {
    handle: JoinHandle<RenderExecutor<D>>,
}

impl<D: RenderDevice> RenderThread<D> {
    /// Waits for the thread to exit and returns its executor.
    ///
    /// The thread exits once every submitter has been dropped. Returns
    /// `None` if it panicked.
    #[must_use]
    pub fn join(self) -> Option<RenderExecutor<D>> {
        self.handle.join().ok()
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferDesc, BufferKind};
    use crate::device::SoftwareDevice;
    use crate::handoff::render_channel;
    use crate::queue::{QueueConfig, RenderResourceQueue, WriteLayout};

    #[test]
    fn test_task_notify_cancels_later_writes() {
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let mut queue = RenderResourceQueue::new(submitter.clone(), QueueConfig::default());
        let b = queue.create_buffer(BufferDesc::dynamic_of::<u32>(BufferKind::Vertex, 1));

        submitter.run_on_render_thread(move |frame| {
            let _ = frame.device().destroy_buffer(b);
            frame.notify_buffer_destroyed(b);
        });
        queue.write_buffer(b, WriteLayout::new(BufferKind::Vertex, 0, 1, 4), &[1; 4]);

        let stats = executor.drain();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(executor.device().live_buffers(), 0);
    }

    #[test]
    fn test_failed_write_counted() {
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let mut queue = RenderResourceQueue::new(submitter, QueueConfig::default());
        let b = queue.create_buffer(BufferDesc::dynamic_of::<u32>(BufferKind::Vertex, 1));
        queue.write_buffer(b, WriteLayout::new(BufferKind::Vertex, 4, 1, 4), &[1; 4]);

        let stats = executor.drain();
        assert_eq!(stats.failed, 1);
        assert_eq!(executor.totals().failed, 1);
    }

    #[test]
    fn test_spawned_thread_exits_with_submitters() {
        let (submitter, executor) = render_channel(SoftwareDevice::new());
        let thread = executor.spawn().unwrap();
        submitter.run_on_render_thread(|_| {});
        assert!(submitter.flush());
        drop(submitter);
        let executor = thread.join().unwrap();
        assert_eq!(executor.totals().tasks, 1);
        assert_eq!(executor.totals().fences, 1);
    }
}
