//! Buffer identities and descriptors.
//!
//! A buffer is described on the producer thread and only ever materialized on
//! the render thread.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

/// Render-thread buffer identity. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// What a buffer feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    /// Per-vertex attributes.
    Vertex,
    /// Triangle indices.
    Index,
    /// Skinning matrices.
    Bone,
    /// Per-instance transforms.
    Instance,
}

/// Vertex attribute a vertex buffer carries, when it carries exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexSemantic {
    /// Object-space position.
    Position,
    /// Normal.
    Normal,
    /// Tangent.
    Tangent,
    /// Vertex color.
    Color,
    /// Texture coordinate set.
    TexCoord(u8),
    /// Bone indices.
    BoneIndex,
    /// Bone weights.
    BoneWeight,
}

/// Everything needed to create a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// What the buffer feeds.
    pub kind: BufferKind,
    /// Bytes per element.
    pub stride: u32,
    /// Capacity in elements.
    pub capacity: u32,
    /// Attribute for single-semantic vertex buffers.
    pub semantic: Option<VertexSemantic>,
    /// Rewritten most frames.
    pub dynamic: bool,
}

impl BufferDesc {
    /// Dynamic buffer of `capacity` elements of `T`.
    #[must_use]
    pub fn dynamic_of<T: Pod>(kind: BufferKind, capacity: u32) -> Self {
        let stride = u32::try_from(std::mem::size_of::<T>()).unwrap_or(u32::MAX);
        Self { kind, stride, capacity, semantic: None, dynamic: true }
    }

    /// Same descriptor tagged with a vertex semantic.
    #[must_use]
    pub const fn with_semantic(mut self, semantic: VertexSemantic) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Size in bytes.
    #[must_use]
    pub const fn byte_size(&self) -> u64 {
        self.stride as u64 * self.capacity as u64
    }
}

/// Element range of a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WriteRange {
    /// First element.
    pub first: u32,
    /// Number of elements.
    pub count: u32,
}

impl WriteRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }

    /// One past the last element.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.first as u64 + self.count as u64
    }

    /// Bytes covered at `stride`.
    #[must_use]
    pub const fn byte_len(&self, stride: u32) -> u64 {
        self.count as u64 * stride as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_shared::Mat44;

    #[test]
    fn test_dynamic_desc_stride() {
        let desc = BufferDesc::dynamic_of::<Mat44>(BufferKind::Bone, 32);
        assert_eq!(desc.stride, 64);
        assert_eq!(desc.byte_size(), 64 * 32);
        assert!(desc.dynamic);
    }

    #[test]
    fn test_range_bytes() {
        let range = WriteRange::new(4, 10);
        assert_eq!(range.end(), 14);
        assert_eq!(range.byte_len(12), 120);
    }
}
