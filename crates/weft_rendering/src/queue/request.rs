//! Resource requests and their in-flight state.
//!
//! A request is shared between the producer's pending list and the command
//! stream. The body lock orders the producer's merge against the render
//! thread's apply: whoever takes it first decides whether the new payload
//! rides this request or needs a new one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::buffer::{BufferDesc, BufferId, BufferKind, VertexSemantic, WriteRange};
use crate::device::RenderDevice;
use crate::error::RenderError;

/// Shape of a write. Two writes merge or reuse only when shapes are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WriteLayout {
    /// Kind of the destination buffer.
    pub kind: BufferKind,
    /// Element range written.
    pub range: WriteRange,
    /// Bytes per element.
    pub stride: u32,
    /// Attribute written, for single-semantic vertex buffers.
    pub semantic: Option<VertexSemantic>,
}

impl WriteLayout {
    /// Layout covering `count` elements from `first`.
    #[must_use]
    pub const fn new(kind: BufferKind, first: u32, count: u32, stride: u32) -> Self {
        Self { kind, range: WriteRange::new(first, count), stride, semantic: None }
    }

    /// Same layout tagged with a vertex semantic.
    #[must_use]
    pub const fn with_semantic(mut self, semantic: VertexSemantic) -> Self {
        self.semantic = Some(semantic);
        self
    }
}

/// Request posted from the producer thread.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderResourceRequest {
    /// Create a buffer.
    ///
    /// Ids come from [`RenderResourceQueue::create_buffer`](super::RenderResourceQueue::create_buffer)
    /// or lie above every id handed out so far; an older id that was never
    /// created counts as destroyed.
    CreateBuffer {
        /// Buffer to create.
        target: BufferId,
        /// Its descriptor.
        desc: BufferDesc,
    },
    /// Write into a buffer.
    WriteBuffer {
        /// Destination.
        target: BufferId,
        /// Shape of the write.
        layout: WriteLayout,
        /// Bytes to write.
        payload: Vec<u8>,
    },
}

impl RenderResourceRequest {
    /// Destination buffer.
    #[must_use]
    pub const fn target(&self) -> BufferId {
        match self {
            Self::CreateBuffer { target, .. } | Self::WriteBuffer { target, .. } => *target,
        }
    }
}

/// What `post` did with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// Fresh request queued.
    Queued,
    /// Payload replaced that of a still-pending request.
    Merged,
    /// A pooled request was re-armed and queued.
    Reused,
    /// Destination already destroyed; nothing queued.
    Dropped,
}

#[derive(Debug)]
pub(crate) enum RequestBody {
    Create(BufferDesc),
    Write { layout: WriteLayout, payload: Vec<u8> },
}

/// Result of applying a request on the render thread.
#[derive(Debug)]
pub(crate) enum Applied {
    Created,
    Written,
    Skipped,
    Failed(RenderError),
}

#[derive(Debug)]
pub(crate) struct ResourceRequest {
    target: BufferId,
    in_flight: AtomicBool,
    /// Sequence of the command currently carrying this request.
    post_seq: AtomicU64,
    body: Mutex<RequestBody>,
}

impl ResourceRequest {
    pub(crate) fn new(target: BufferId, body: RequestBody, seq: u64) -> Self {
        Self {
            target,
            in_flight: AtomicBool::new(true),
            post_seq: AtomicU64::new(seq),
            body: Mutex::new(body),
        }
    }

    pub(crate) const fn target(&self) -> BufferId {
        self.target
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn post_seq(&self) -> u64 {
        self.post_seq.load(Ordering::Acquire)
    }

    pub(crate) fn write_layout(&self) -> Option<WriteLayout> {
        match &*self.body.lock() {
            RequestBody::Write { layout, .. } => Some(*layout),
            RequestBody::Create(_) => None,
        }
    }

    /// Replaces the payload if this is a still-pending write of `layout`.
    pub(crate) fn try_merge(&self, layout: &WriteLayout, bytes: &[u8]) -> bool {
        let mut body = self.body.lock();
        if !self.is_in_flight() {
            return false;
        }
        match &mut *body {
            RequestBody::Write { layout: pending, payload } if pending == layout => {
                payload.clear();
                payload.extend_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    /// Re-arms a completed write with a new payload under a new sequence.
    pub(crate) fn rearm(&self, bytes: &[u8], seq: u64) {
        let mut body = self.body.lock();
        if let RequestBody::Write { payload, .. } = &mut *body {
            payload.clear();
            payload.extend_from_slice(bytes);
        }
        self.post_seq.store(seq, Ordering::Release);
        self.in_flight.store(true, Ordering::Release);
    }

    /// Clears the in-flight mark without doing the work.
    ///
    /// Returns true if the request was still in flight.
    pub(crate) fn cancel(&self) -> bool {
        self.in_flight.swap(false, Ordering::AcqRel)
    }

    /// Performs the request on the device if the command `seq` still owns it.
    pub(crate) fn apply(&self, seq: u64, device: &mut dyn RenderDevice) -> Applied {
        let body = self.body.lock();
        if !self.is_in_flight() || self.post_seq() != seq {
            return Applied::Skipped;
        }
        let result = match &*body {
            RequestBody::Create(desc) => device.create_buffer(self.target, desc).map(|()| Applied::Created),
            RequestBody::Write { layout, payload } => device
                .write_buffer(self.target, layout.range, layout.stride, payload)
                .map(|()| Applied::Written),
        };
        self.in_flight.store(false, Ordering::Release);
        result.unwrap_or_else(Applied::Failed)
    }
}
