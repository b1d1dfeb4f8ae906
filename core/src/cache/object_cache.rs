//! Packed state key -> native state object

use crate::backend::{Backend, StateHandle};
use crate::codec::{
    unpack_blend, unpack_depth_stencil, unpack_rasterizer, unpack_sampler, PackedStateKey,
};
use crate::error::BackendError;

use super::CacheTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Blend,
    DepthStencil,
    Rasterizer,
    Sampler,
}

impl StateKind {
    pub const ALL: [StateKind; 4] = [
        StateKind::Blend,
        StateKind::DepthStencil,
        StateKind::Rasterizer,
        StateKind::Sampler,
    ];
}

/// One append-only table per state kind
#[derive(Debug, Default)]
pub struct ObjectCache {
    blend: CacheTable<PackedStateKey, StateHandle>,
    depth_stencil: CacheTable<PackedStateKey, StateHandle>,
    rasterizer: CacheTable<PackedStateKey, StateHandle>,
    sampler: CacheTable<PackedStateKey, StateHandle>,
    builds: [u64; 4],
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: StateKind) -> &CacheTable<PackedStateKey, StateHandle> {
        match kind {
            StateKind::Blend => &self.blend,
            StateKind::DepthStencil => &self.depth_stencil,
            StateKind::Rasterizer => &self.rasterizer,
            StateKind::Sampler => &self.sampler,
        }
    }

    fn table_mut(&mut self, kind: StateKind) -> &mut CacheTable<PackedStateKey, StateHandle> {
        match kind {
            StateKind::Blend => &mut self.blend,
            StateKind::DepthStencil => &mut self.depth_stencil,
            StateKind::Rasterizer => &mut self.rasterizer,
            StateKind::Sampler => &mut self.sampler,
        }
    }

    pub fn fetch(&self, kind: StateKind, key: PackedStateKey) -> Option<StateHandle> {
        self.table(kind).fetch(&key)
    }

    pub fn insert(&mut self, kind: StateKind, key: PackedStateKey, handle: StateHandle) {
        self.table_mut(kind).insert(key, handle);
    }

    /// Returns the native object for `key`, creating it from the unpacked state on a miss.
    ///
    /// Rasterizer keys must already carry the depth-format-scaled bias.
    pub fn resolve<B: Backend + ?Sized>(
        &mut self,
        kind: StateKind,
        key: PackedStateKey,
        backend: &mut B,
    ) -> Result<StateHandle, BackendError> {
        if let Some(handle) = self.fetch(kind, key) {
            return Ok(handle);
        }

        tracing::debug!(?kind, a = key.a, b = key.b, "creating state object");
        let handle = match kind {
            StateKind::Blend => backend.create_blend_state(&unpack_blend(key)),
            StateKind::DepthStencil => backend.create_depth_stencil_state(&unpack_depth_stencil(key)),
            StateKind::Rasterizer => backend.create_rasterizer_state(&unpack_rasterizer(key)),
            StateKind::Sampler => backend.create_sampler_state(&unpack_sampler(key)),
        }
        .inspect_err(|e| tracing::error!(?kind, "state object creation failed: {e}"))?;

        self.builds[kind as usize] += 1;
        self.insert(kind, key, handle);
        Ok(handle)
    }

    pub fn len(&self, kind: StateKind) -> usize {
        self.table(kind).len()
    }

    /// Number of native objects created for `kind`
    pub fn builds(&self, kind: StateKind) -> u64 {
        self.builds[kind as usize]
    }

    /// Releases every cached object. Used once, at device teardown.
    pub fn release_all<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for kind in StateKind::ALL {
            for handle in self.table_mut(kind).drain_values() {
                backend.release_state(handle);
            }
        }
    }
}
