//! Pipeline key and bucketed pipeline cache
//!
//! Pipelines are the most expensive native objects and large titles reach
//! thousands of them, so unlike the state tables this cache hashes into a fixed
//! number of collision-chained buckets.

use std::sync::Arc;

use bakery_shared::{DepthFormat, PrimitiveType, SurfaceFormat};
use smallvec::SmallVec;

use crate::backend::{
    Backend, BlendDesc, PipelineDesc, PipelineHandle, ShaderId, ShaderPair, VertexLayoutHandle,
};
use crate::codec::{unpack_blend, unpack_depth_stencil, unpack_rasterizer, PackedStateKey};
use crate::error::BackendError;

use super::{ObjectCache, StateKind};

/// Multiplier of the polynomial bucket hash
pub const PIPELINE_HASH_MULTIPLIER: u64 = 39;

/// Everything that makes two native pipelines differ
///
/// The vertex layout enters as its cached handle. The layout cache maps each
/// distinct layout key to exactly one handle, so handle equality is layout equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub blend: PackedStateKey,
    pub depth_stencil: PackedStateKey,
    /// Packed with the bias scaled for `depth_format`
    pub rasterizer: PackedStateKey,
    pub vertex_layout: VertexLayoutHandle,
    pub vertex_shader: ShaderId,
    pub pixel_shader: ShaderId,
    pub primitive: PrimitiveType,
    pub sample_count: u32,
    pub sample_mask: u32,
    pub color_formats: SmallVec<[SurfaceFormat; 4]>,
    pub depth_format: DepthFormat,
}

impl PipelineKey {
    /// Polynomial hash `h = h * 39 + field` over every field, in this order:
    /// blend (a, b), depth-stencil (a, b), rasterizer (a, b), vertex layout,
    /// vertex shader, pixel shader, primitive, sample count, sample mask,
    /// color attachment count, each color format, depth format.
    pub fn polynomial_hash(&self) -> u64 {
        let fields = [
            self.blend.a,
            self.blend.b,
            self.depth_stencil.a,
            self.depth_stencil.b,
            self.rasterizer.a,
            self.rasterizer.b,
            self.vertex_layout.0,
            self.vertex_shader.0,
            self.pixel_shader.0,
            u64::from(self.primitive.index()),
            u64::from(self.sample_count),
            u64::from(self.sample_mask),
            self.color_formats.len() as u64,
        ];
        let formats = self.color_formats.iter().map(|f| u64::from(f.index()));
        fields
            .into_iter()
            .chain(formats)
            .chain(std::iter::once(u64::from(self.depth_format.index())))
            .fold(0u64, |h, field| {
                h.wrapping_mul(PIPELINE_HASH_MULTIPLIER).wrapping_add(field)
            })
    }
}

struct PipelineEntry {
    key: PipelineKey,
    handle: PipelineHandle,
    // Keeps the shader identities alive while the pipeline references them
    _shaders: Arc<ShaderPair>,
}

/// Cache for graphics pipelines
pub struct PipelineCache {
    buckets: Vec<Vec<PipelineEntry>>,
    len: usize,
    builds: u64,
    failures: u64,
}

impl PipelineCache {
    /// `bucket_count` should be a prime of at least 1000
    pub fn new(bucket_count: usize) -> Self {
        debug_assert!(crate::config::is_prime(bucket_count) && bucket_count >= 1000);
        let bucket_count = bucket_count.max(1);
        Self {
            buckets: (0..bucket_count).map(|_| Vec::new()).collect(),
            len: 0,
            builds: 0,
            failures: 0,
        }
    }

    fn bucket_index(&self, key: &PipelineKey) -> usize {
        (key.polynomial_hash() % self.buckets.len() as u64) as usize
    }

    pub fn fetch(&self, key: &PipelineKey) -> Option<PipelineHandle> {
        self.buckets[self.bucket_index(key)]
            .iter()
            .find(|entry| entry.key == *key)
            .map(|entry| entry.handle)
    }

    /// Appends a pipeline. The caller must have checked [`fetch`](Self::fetch) first.
    pub fn insert(&mut self, key: PipelineKey, handle: PipelineHandle, shaders: Arc<ShaderPair>) {
        let index = self.bucket_index(&key);
        let bucket = &mut self.buckets[index];
        if let Some(entry) = bucket.iter_mut().find(|entry| entry.key == key) {
            debug_assert!(false, "pipeline insert for a key that is already present");
            entry.handle = handle;
            entry._shaders = shaders;
            return;
        }
        bucket.push(PipelineEntry {
            key,
            handle,
            _shaders: shaders,
        });
        self.len += 1;
    }

    /// Compiles the pipeline described by `key`.
    ///
    /// Returns [`PipelineHandle::NULL`] when a state object or the pipeline itself
    /// fails to build. Nothing is cached in that case.
    pub fn build<B: Backend + ?Sized>(
        &mut self,
        key: &PipelineKey,
        shaders: &ShaderPair,
        objects: &mut ObjectCache,
        backend: &mut B,
    ) -> PipelineHandle {
        match self.try_build(key, shaders, objects, backend) {
            Ok(handle) => {
                self.builds += 1;
                handle
            }
            Err(e) => {
                self.failures += 1;
                tracing::error!(
                    vertex_shader = key.vertex_shader.0,
                    pixel_shader = key.pixel_shader.0,
                    "pipeline build failed, skipping draw: {e}"
                );
                PipelineHandle::NULL
            }
        }
    }

    fn try_build<B: Backend + ?Sized>(
        &self,
        key: &PipelineKey,
        shaders: &ShaderPair,
        objects: &mut ObjectCache,
        backend: &mut B,
    ) -> Result<PipelineHandle, BackendError> {
        let blend_object = objects.resolve(StateKind::Blend, key.blend, backend)?;
        let depth_stencil_object = objects.resolve(StateKind::DepthStencil, key.depth_stencil, backend)?;
        let rasterizer_object = objects.resolve(StateKind::Rasterizer, key.rasterizer, backend)?;

        let mut blend = unpack_blend(key.blend);
        blend.multi_sample_mask = key.sample_mask;
        let desc = PipelineDesc {
            vertex_shader: shaders.vertex.native,
            pixel_shader: shaders.pixel.native,
            vertex_layout: key.vertex_layout,
            primitive: key.primitive,
            blend: BlendDesc {
                enabled: blend.is_blending(),
                state: blend,
            },
            depth_stencil: unpack_depth_stencil(key.depth_stencil),
            rasterizer: unpack_rasterizer(key.rasterizer),
            blend_object,
            depth_stencil_object,
            rasterizer_object,
            color_formats: key.color_formats.clone(),
            depth_format: key.depth_format,
            sample_count: key.sample_count,
            sample_mask: key.sample_mask,
        };

        tracing::debug!(
            vertex_shader = key.vertex_shader.0,
            pixel_shader = key.pixel_shader.0,
            primitive = ?key.primitive,
            targets = key.color_formats.len(),
            sample_count = key.sample_count,
            "creating pipeline"
        );
        backend.create_pipeline(&desc)
    }

    /// Looks up `key`, building and inserting the pipeline on a miss.
    ///
    /// The entry is stored under `key` itself, never a re-derived key.
    pub fn fetch_or_build<B: Backend + ?Sized>(
        &mut self,
        key: PipelineKey,
        shaders: &Arc<ShaderPair>,
        objects: &mut ObjectCache,
        backend: &mut B,
    ) -> PipelineHandle {
        if let Some(handle) = self.fetch(&key) {
            return handle;
        }
        let handle = self.build(&key, shaders, objects, backend);
        if !handle.is_null() {
            self.insert(key, handle, Arc::clone(shaders));
        }
        handle
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Successful native pipeline builds
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn release_all<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for bucket in &mut self.buckets {
            for entry in bucket.drain(..) {
                backend.release_pipeline(entry.handle);
            }
        }
        self.len = 0;
    }
}
