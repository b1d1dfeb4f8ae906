//! Vertex layout resolution and caching
//!
//! A layout key is derived from the bound vertex buffer declarations and the
//! vertex shader's reflection data, since attribute locations are assigned by
//! the shader. The same bindings under a different shader produce a different key.

use std::hash::{Hash, Hasher};

use bakery_shared::{
    VertexBufferBinding, VertexElementFormat, VertexElementUsage, MAX_USAGE_INDEX,
};
use smallvec::SmallVec;

use crate::backend::{Backend, Shader, ShaderId, VertexLayoutHandle};
use crate::error::{BackendError, VertexLayoutError};

use super::CacheTable;

/// One shader input fed from a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexElementFormat,
    pub offset: u32,
    pub buffer_index: u32,
}

/// One vertex buffer slot of a layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    /// 0 = per-vertex; N = advance once every N instances
    pub step_rate: u32,
    pub attributes: SmallVec<[VertexAttribute; 8]>,
}

/// Resolved vertex input layout, usable both as cache key and as creation info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayoutKey {
    // Compared first so mismatches are rejected without walking the buffers
    hash: u64,
    shader: ShaderId,
    buffers: SmallVec<[VertexBufferLayout; 4]>,
}

impl Hash for VertexLayoutKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl VertexLayoutKey {
    /// Builds the key for `bindings` as seen by `shader`.
    ///
    /// Elements are visited in binding order, then element order. An element whose
    /// (usage, usage index) pair was already claimed is moved to the lowest free
    /// index of that usage; when all 16 are taken it is reported and skipped.
    /// Elements the shader does not read contribute nothing.
    pub fn resolve(
        bindings: &[VertexBufferBinding],
        shader: &Shader,
    ) -> (Self, Vec<VertexLayoutError>) {
        let mut claimed = [0u16; VertexElementUsage::COUNT];
        let mut errors = Vec::new();
        let mut buffers = SmallVec::new();

        for (binding_index, binding) in bindings.iter().enumerate() {
            let mut attributes = SmallVec::new();
            for (element_index, element) in binding.declaration.elements.iter().enumerate() {
                let slots = &mut claimed[element.usage.index() as usize];
                let requested = usize::from(element.usage_index);
                let index = if requested < MAX_USAGE_INDEX && *slots & (1 << requested) == 0 {
                    requested
                } else {
                    let lowest_free = slots.trailing_ones() as usize;
                    if lowest_free >= MAX_USAGE_INDEX {
                        errors.push(VertexLayoutError::UsageSlotsExhausted {
                            usage: element.usage,
                            binding: binding_index,
                            element: element_index,
                        });
                        continue;
                    }
                    lowest_free
                };
                *slots |= 1 << index;

                let Some(location) = shader.input_location(element.usage, index as u8) else {
                    continue;
                };
                attributes.push(VertexAttribute {
                    location,
                    format: element.format,
                    offset: element.offset,
                    buffer_index: binding_index as u32,
                });
            }
            buffers.push(VertexBufferLayout {
                stride: binding.declaration.stride,
                step_rate: binding.instance_frequency,
                attributes,
            });
        }

        let mut key = Self {
            hash: 0,
            shader: shader.id,
            buffers,
        };
        key.hash = key.hash_value();
        (key, errors)
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        self.shader.hash(&mut hasher);
        self.buffers.hash(&mut hasher);
        hasher.finish()
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn buffers(&self) -> &[VertexBufferLayout] {
        &self.buffers
    }

    pub fn attributes(&self) -> impl Iterator<Item = &VertexAttribute> {
        self.buffers.iter().flat_map(|b| b.attributes.iter())
    }
}

/// Linear cache of vertex layouts
#[derive(Debug, Default)]
pub struct VertexLayoutCache {
    table: CacheTable<VertexLayoutKey, VertexLayoutHandle>,
    builds: u64,
}

impl VertexLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&self, key: &VertexLayoutKey) -> Option<VertexLayoutHandle> {
        self.table.fetch(key)
    }

    pub fn insert(&mut self, key: VertexLayoutKey, handle: VertexLayoutHandle) {
        self.table.insert(key, handle);
    }

    pub fn fetch_or_build<B: Backend + ?Sized>(
        &mut self,
        key: VertexLayoutKey,
        backend: &mut B,
    ) -> Result<VertexLayoutHandle, BackendError> {
        let builds = &mut self.builds;
        self.table.fetch_or_build(key, |key| {
            tracing::debug!(
                shader = key.shader.0,
                buffers = key.buffers.len(),
                "creating vertex layout"
            );
            let handle = backend
                .create_vertex_layout(key)
                .inspect_err(|e| tracing::error!("vertex layout creation failed: {e}"))?;
            *builds += 1;
            Ok(handle)
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn release_all<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for handle in self.table.drain_values() {
            backend.release_vertex_layout(handle);
        }
    }
}
