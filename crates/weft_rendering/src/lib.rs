//! # WEFT Rendering
//!
//! Cross-thread handoff between the simulation producer and the render
//! thread that owns every GPU-visible buffer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │ RenderResourceQueue  │   FIFO stream   │   RenderExecutor     │
//! │  post / merge / pool │────────────────>│  apply / skip / run  │
//! │ RenderSubmitter      │                 │   RenderDevice       │
//! └──────────────────────┘                 └──────────────────────┘
//!            ▲                                        │
//!            └──────── destroyed set, in-flight ──────┘
//!                       marks (QueueShared)
//! ```
//!
//! ## Rules
//!
//! 1. **Only the executor touches the device** - producers post requests
//! 2. **Post never fails** - a destroyed destination makes it a no-op
//! 3. **Per-buffer post order is preserved** - merges never jump a newer request

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod device;
pub mod error;
pub mod executor;
pub mod handoff;
pub mod queue;

pub use buffer::{BufferDesc, BufferId, BufferKind, VertexSemantic, WriteRange};
pub use device::{DeviceOp, DrawSubmission, RenderDevice, SoftwareDevice};
pub use error::{RenderError, RenderResult};
pub use executor::{DrainStats, RenderExecutor, RenderThread};
pub use handoff::{render_channel, Fence, RenderFrame, RenderSubmitter, RenderTask};
pub use queue::{
    PostOutcome, QueueConfig, QueueStats, ReclaimStats, RenderResourceQueue,
    RenderResourceRequest, WriteLayout,
};
