//! # Double-Buffered Snapshot
//!
//! One producer writes the back slot while any number of render-thread
//! readers see the front slot. Dropping the write handle publishes.
//!
//! ## Architecture
//!
//! ```text
//!     ┌──────────────────────────────┐
//!     │        DoubleBuffer<T>       │
//!     │  ┌─────────┐  ┌─────────┐    │
//!     │  │ Slot 0  │  │ Slot 1  │    │
//!     │  └────┬────┘  └────┬────┘    │
//!     │  ┌────┴────────────┴────┐    │
//!     │  │ Atomic front (0/1)   │    │
//!     │  └──────────────────────┘    │
//!     └──────────────────────────────┘
//!            │                │
//!            ▼                ▼
//!     ┌─────────────┐  ┌─────────────┐
//!     │ WriteHandle │  │ ReadHandle  │
//!     │ (producer)  │  │ (renderer)  │
//!     └─────────────┘  └─────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `WriteHandle`: exclusive, one at a time (a second one is a programmer error)
//! - `ReadHandle`: shared, always the last published slot
//!
//! A reader still holding the old front when the writer comes around to that
//! slot again makes the writer wait for it. It never tears.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Double-buffered value shared between a producer and the render thread.
pub struct DoubleBuffer<T> {
    slots: [Arc<RwLock<T>>; 2],
    /// Index of the last published slot.
    front: AtomicUsize,
    /// Whether a write handle is currently held.
    write_locked: AtomicBool,
    /// Number of publishes so far.
    generation: AtomicU64,
}

impl<T> DoubleBuffer<T> {
    /// Creates a buffer whose both slots start as `initial`.
    #[must_use]
    pub fn new(initial: T) -> Arc<Self>
    where
        T: Clone,
    {
        Arc::new(Self {
            slots: [
                Arc::new(RwLock::new(initial.clone())),
                Arc::new(RwLock::new(initial)),
            ],
            front: AtomicUsize::new(0),
            write_locked: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    /// Number of completed publishes.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns whether a write handle is currently active.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.write_locked.load(Ordering::Acquire)
    }

    /// Gets the write handle for the back slot.
    ///
    /// The back slot holds whatever was published two generations ago.
    ///
    /// # Panics
    ///
    /// Panics if a write handle is already held (only one allowed).
    #[must_use]
    pub fn write_handle(self: &Arc<Self>) -> WriteHandle<T> {
        let was_locked = self.write_locked.swap(true, Ordering::AcqRel);
        assert!(!was_locked, "Double write handle! Only one write handle allowed at a time.");

        let back = self.front.load(Ordering::Acquire) ^ 1;
        WriteHandle {
            buffer: Arc::clone(self),
            guard: Some(self.slots[back].write_arc()),
            index: back,
        }
    }

    /// Gets a write handle whose slot starts as a copy of the front.
    ///
    /// # Panics
    ///
    /// Panics if a write handle is already held.
    #[must_use]
    pub fn write_handle_from_front(self: &Arc<Self>) -> WriteHandle<T>
    where
        T: Clone,
    {
        let mut handle = self.write_handle();
        let front = self.slots[handle.index ^ 1].read().clone();
        *handle = front;
        handle
    }

    /// Gets a read handle to the last published slot.
    #[must_use]
    pub fn read_handle(&self) -> ReadHandle<T> {
        let front = self.front.load(Ordering::Acquire);
        ReadHandle {
            guard: self.slots[front].read_arc(),
            generation: self.generation(),
        }
    }
}

/// Exclusive access to the back slot. Publishes on drop.
pub struct WriteHandle<T> {
    buffer: Arc<DoubleBuffer<T>>,
    guard: Option<ArcRwLockWriteGuard<RawRwLock, T>>,
    index: usize,
}

impl<T> WriteHandle<T> {
    /// Publishes the slot. Same as dropping the handle.
    pub fn publish(self) {}
}

impl<T> Deref for WriteHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in Drop.
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("write guard released before drop"),
        }
    }
}

impl<T> DerefMut for WriteHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("write guard released before drop"),
        }
    }
}

impl<T> Drop for WriteHandle<T> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.buffer.front.store(self.index, Ordering::Release);
        self.buffer.generation.fetch_add(1, Ordering::AcqRel);
        self.buffer.write_locked.store(false, Ordering::Release);
    }
}

/// Shared access to the last published slot.
pub struct ReadHandle<T> {
    guard: ArcRwLockReadGuard<RawRwLock, T>,
    generation: u64,
}

impl<T> ReadHandle<T> {
    /// Generation observed when the handle was taken.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Deref for ReadHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.guard
    }
}
