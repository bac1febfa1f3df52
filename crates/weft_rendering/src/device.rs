//! Render device seam.
//!
//! The host engine's GPU layer implements [`RenderDevice`]. `SoftwareDevice`
//! keeps buffers in CPU memory and records every operation; it backs headless
//! runs and the test suite.

use std::collections::HashMap;

use weft_shared::Mat44;

use crate::buffer::{BufferDesc, BufferId, WriteRange};
use crate::error::{RenderError, RenderResult};

/// One draw issued by an actor's render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawSubmission {
    /// Issuing actor.
    pub actor: u64,
    /// Vertex stream.
    pub vertex_buffer: Option<BufferId>,
    /// Index stream.
    pub index_buffer: Option<BufferId>,
    /// Skinning matrices.
    pub bone_buffer: Option<BufferId>,
    /// Elements to draw.
    pub element_count: u32,
    /// Graphical LOD drawn.
    pub lod: u32,
    /// Local-to-world transform.
    pub transform: Mat44,
    /// Publish generation of the snapshot this draw came from.
    pub snapshot_generation: u64,
}

/// Buffer operations legal only on the render thread.
pub trait RenderDevice: Send {
    /// Creates a buffer.
    ///
    /// # Errors
    ///
    /// `DuplicateBuffer` if `id` already exists.
    fn create_buffer(&mut self, id: BufferId, desc: &BufferDesc) -> RenderResult<()>;

    /// Writes `bytes` into `range` of a buffer.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer`, `OutOfRange` or `DescriptorMismatch`.
    fn write_buffer(&mut self, id: BufferId, range: WriteRange, stride: u32, bytes: &[u8]) -> RenderResult<()>;

    /// Destroys a buffer.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` if `id` does not exist.
    fn destroy_buffer(&mut self, id: BufferId) -> RenderResult<()>;

    /// Issues a draw.
    fn submit_draw(&mut self, draw: &DrawSubmission);
}

/// Device operation as recorded by [`SoftwareDevice`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceOp {
    /// Buffer created.
    Create(BufferId),
    /// Buffer written.
    Write {
        /// Target.
        id: BufferId,
        /// Range written.
        range: WriteRange,
    },
    /// Buffer destroyed.
    Destroy(BufferId),
    /// Draw issued by an actor.
    Draw {
        /// Issuing actor.
        actor: u64,
    },
}

struct SoftwareBuffer {
    desc: BufferDesc,
    bytes: Vec<u8>,
}

/// CPU-memory device.
#[derive(Default)]
pub struct SoftwareDevice {
    buffers: HashMap<BufferId, SoftwareBuffer>,
    ops: Vec<DeviceOp>,
    draws: Vec<DrawSubmission>,
    dangling_draws: usize,
}

impl SoftwareDevice {
    /// Creates an empty device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation applied so far, in order.
    #[must_use]
    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    /// Draws submitted so far.
    #[must_use]
    pub fn draws(&self) -> &[DrawSubmission] {
        &self.draws
    }

    /// Draws that referenced a buffer not live at submission.
    #[must_use]
    pub fn dangling_draws(&self) -> usize {
        self.dangling_draws
    }

    /// Contents of a live buffer.
    #[must_use]
    pub fn buffer_bytes(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.bytes.as_slice())
    }

    /// Descriptor of a live buffer.
    #[must_use]
    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(&id).map(|b| &b.desc)
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Writes applied to `id`.
    #[must_use]
    pub fn write_count(&self, id: BufferId) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::Write { id: target, .. } if *target == id))
            .count()
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_buffer(&mut self, id: BufferId, desc: &BufferDesc) -> RenderResult<()> {
        if self.buffers.contains_key(&id) {
            return Err(RenderError::DuplicateBuffer(id));
        }
        let len = usize::try_from(desc.byte_size()).map_err(|_| RenderError::DescriptorMismatch {
            buffer: id,
            reason: "buffer too large".to_string(),
        })?;
        self.buffers.insert(id, SoftwareBuffer { desc: *desc, bytes: vec![0; len] });
        self.ops.push(DeviceOp::Create(id));
        Ok(())
    }

    fn write_buffer(&mut self, id: BufferId, range: WriteRange, stride: u32, bytes: &[u8]) -> RenderResult<()> {
        let buffer = self.buffers.get_mut(&id).ok_or(RenderError::UnknownBuffer(id))?;
        if stride != buffer.desc.stride {
            return Err(RenderError::DescriptorMismatch {
                buffer: id,
                reason: format!("stride {} != {}", stride, buffer.desc.stride),
            });
        }
        if range.end() > u64::from(buffer.desc.capacity) {
            return Err(RenderError::OutOfRange {
                buffer: id,
                first: range.first,
                count: range.count,
                capacity: buffer.desc.capacity,
            });
        }
        if bytes.len() as u64 != range.byte_len(stride) {
            return Err(RenderError::DescriptorMismatch {
                buffer: id,
                reason: format!("payload {} bytes, range needs {}", bytes.len(), range.byte_len(stride)),
            });
        }
        // Bounds checked above against the allocation size.
        let start = range.first as usize * stride as usize;
        buffer.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        self.ops.push(DeviceOp::Write { id, range });
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) -> RenderResult<()> {
        self.buffers.remove(&id).ok_or(RenderError::UnknownBuffer(id))?;
        self.ops.push(DeviceOp::Destroy(id));
        Ok(())
    }

    fn submit_draw(&mut self, draw: &DrawSubmission) {
        let streams = [draw.vertex_buffer, draw.index_buffer, draw.bone_buffer];
        if streams.iter().flatten().any(|id| !self.buffers.contains_key(id)) {
            tracing::warn!("draw from actor {} references a buffer that is not live", draw.actor);
            self.dangling_draws += 1;
        }
        self.ops.push(DeviceOp::Draw { actor: draw.actor });
        self.draws.push(draw.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferKind;

    fn desc() -> BufferDesc {
        BufferDesc { kind: BufferKind::Vertex, stride: 4, capacity: 8, semantic: None, dynamic: true }
    }

    #[test]
    fn test_create_write_destroy() {
        let mut device = SoftwareDevice::new();
        let id = BufferId(1);

        device.create_buffer(id, &desc()).unwrap();
        device.write_buffer(id, WriteRange::new(2, 1), 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&device.buffer_bytes(id).unwrap()[8..12], &[1, 2, 3, 4]);

        device.destroy_buffer(id).unwrap();
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.ops().len(), 3);
    }

    #[test]
    fn test_write_validation() {
        let mut device = SoftwareDevice::new();
        let id = BufferId(1);
        device.create_buffer(id, &desc()).unwrap();

        assert!(matches!(
            device.write_buffer(id, WriteRange::new(7, 2), 4, &[0; 8]),
            Err(RenderError::OutOfRange { .. })
        ));
        assert!(matches!(
            device.write_buffer(id, WriteRange::new(0, 1), 8, &[0; 8]),
            Err(RenderError::DescriptorMismatch { .. })
        ));
        assert!(matches!(
            device.write_buffer(BufferId(9), WriteRange::new(0, 1), 4, &[0; 4]),
            Err(RenderError::UnknownBuffer(_))
        ));
        assert_eq!(device.write_count(id), 0);
    }

    #[test]
    fn test_draw_against_missing_buffer_is_counted() {
        let mut device = SoftwareDevice::new();
        let id = BufferId(1);
        device.create_buffer(id, &desc()).unwrap();

        let mut draw = DrawSubmission {
            actor: 3,
            vertex_buffer: Some(id),
            index_buffer: None,
            bone_buffer: None,
            element_count: 3,
            lod: 0,
            transform: Mat44::IDENTITY,
            snapshot_generation: 1,
        };
        device.submit_draw(&draw);
        assert_eq!(device.dangling_draws(), 0);

        draw.index_buffer = Some(BufferId(2));
        device.submit_draw(&draw);
        assert_eq!(device.dangling_draws(), 1);
        assert_eq!(device.ops().last(), Some(&DeviceOp::Draw { actor: 3 }));
        assert_eq!(device.draws().len(), 2);
    }
}
