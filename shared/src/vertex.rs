//! Vertex declarations and buffer bindings

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Handle to a native vertex or index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const NULL: BufferHandle = BufferHandle(0);
}

state_enum! {
    pub enum VertexElementFormat {
        Single = 0,
        Vector2 = 1,
        Vector3 = 2,
        Vector4 = 3,
        Color = 4,
        Byte4 = 5,
        Short2 = 6,
        Short4 = 7,
        NormalizedShort2 = 8,
        NormalizedShort4 = 9,
        HalfVector2 = 10,
        HalfVector4 = 11,
    }
}

impl VertexElementFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexElementFormat::Single
            | VertexElementFormat::Color
            | VertexElementFormat::Byte4
            | VertexElementFormat::Short2
            | VertexElementFormat::NormalizedShort2
            | VertexElementFormat::HalfVector2 => 4,
            VertexElementFormat::Vector2
            | VertexElementFormat::Short4
            | VertexElementFormat::NormalizedShort4
            | VertexElementFormat::HalfVector4 => 8,
            VertexElementFormat::Vector3 => 12,
            VertexElementFormat::Vector4 => 16,
        }
    }
}

state_enum! {
    /// Semantic of a vertex element, paired with a usage index
    pub enum VertexElementUsage {
        Position = 0,
        Color = 1,
        TextureCoordinate = 2,
        Normal = 3,
        Binormal = 4,
        Tangent = 5,
        BlendIndices = 6,
        BlendWeight = 7,
        Depth = 8,
        Fog = 9,
        PointSize = 10,
        Sample = 11,
        TessellateFactor = 12,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexElement {
    /// Byte offset from the start of the vertex
    pub offset: u32,
    pub format: VertexElementFormat,
    pub usage: VertexElementUsage,
    pub usage_index: u8,
}

impl VertexElement {
    pub const fn new(
        offset: u32,
        format: VertexElementFormat,
        usage: VertexElementUsage,
        usage_index: u8,
    ) -> Self {
        Self {
            offset,
            format,
            usage,
            usage_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexDeclaration {
    /// Bytes between consecutive vertices
    pub stride: u32,
    pub elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    /// Builds a declaration whose stride is the end of the furthest element
    pub fn new(elements: Vec<VertexElement>) -> Self {
        let stride = elements
            .iter()
            .map(|e| e.offset + e.format.size())
            .max()
            .unwrap_or(0);
        Self { stride, elements }
    }

    pub fn with_stride(stride: u32, elements: Vec<VertexElement>) -> Self {
        Self { stride, elements }
    }
}

/// One vertex stream: a buffer, how to read it, and how fast to step it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: BufferHandle,
    pub declaration: Arc<VertexDeclaration>,
    /// Offset in vertices into `buffer`
    pub vertex_offset: u32,
    /// 0 = per-vertex; N = advance once every N instances
    pub instance_frequency: u32,
}

impl VertexBufferBinding {
    pub fn new(buffer: BufferHandle, declaration: Arc<VertexDeclaration>) -> Self {
        Self {
            buffer,
            declaration,
            vertex_offset: 0,
            instance_frequency: 0,
        }
    }

    pub fn instanced(mut self, frequency: u32) -> Self {
        self.instance_frequency = frequency;
        self
    }

    /// Byte offset of the first vertex in `buffer`
    pub fn byte_offset(&self) -> u64 {
        u64::from(self.vertex_offset) * u64::from(self.declaration.stride)
    }
}
