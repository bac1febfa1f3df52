//! # Cross-Thread Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Producer thread:  WRITES actor render state, RELEASES native handles
//! Render thread:    READS render state, still USES those handles
//!
//! Without synchronization: torn snapshots, use-after-free
//! ```
//!
//! ## The Solution
//!
//! - `DoubleBuffer`: the renderer always reads the last *completed* snapshot
//! - `CleanupQueue`: releases are wrapped in tickets that only finalize once
//!   the render thread has passed every command that could still use them

mod cleanup;
mod double_buffer;

pub use cleanup::{CleanupQueue, CleanupTicket};
pub use double_buffer::{DoubleBuffer, ReadHandle, WriteHandle};
