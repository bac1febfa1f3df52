//! # Render Error Types
//!
//! Device-level failures. None of these reach the producer: `Post` never
//! fails, and the render thread logs and counts what it could not apply.

use thiserror::Error;

use crate::buffer::BufferId;

/// Errors raised while applying buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Operation against a buffer the device does not know.
    #[error("Unknown buffer: {0:?}")]
    UnknownBuffer(BufferId),

    /// Buffer created twice.
    #[error("Buffer already exists: {0:?}")]
    DuplicateBuffer(BufferId),

    /// Write past the buffer's capacity.
    #[error("Write out of range on {buffer:?}: {first}+{count} > {capacity}")]
    OutOfRange {
        /// Target buffer.
        buffer: BufferId,
        /// First element written.
        first: u32,
        /// Elements written.
        count: u32,
        /// Buffer capacity in elements.
        capacity: u32,
    },

    /// Payload layout disagrees with the buffer descriptor.
    #[error("Descriptor mismatch on {buffer:?}: {reason}")]
    DescriptorMismatch {
        /// Target buffer.
        buffer: BufferId,
        /// What disagreed.
        reason: String,
    },

    /// Configuration could not be parsed.
    #[error("Invalid queue config: {0}")]
    Config(String),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
