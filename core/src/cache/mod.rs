//! Native object caches
//!
//! All tables are append-only for the lifetime of the device. Nothing is ever
//! evicted; handles are released in bulk at teardown.

mod object_cache;
mod pipeline;
mod vertex_layout;

pub use object_cache::{ObjectCache, StateKind};
pub use pipeline::{PipelineCache, PipelineKey, PIPELINE_HASH_MULTIPLIER};
pub use vertex_layout::{
    VertexAttribute, VertexBufferLayout, VertexLayoutCache, VertexLayoutKey,
};

/// Small linear associative table
///
/// Lookup is a linear scan, which beats hashing for the few dozen entries a
/// game realistically creates per state kind.
#[derive(Debug, Clone)]
pub struct CacheTable<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for CacheTable<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq, V: Copy> CacheTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&self, key: &K) -> Option<V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Appends an entry. The caller must have checked [`fetch`](Self::fetch) first;
    /// inserting a present key overwrites it in release builds.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            debug_assert!(false, "cache insert for a key that is already present");
            slot.1 = value;
            return;
        }
        self.entries.push((key, value));
    }

    /// Returns the cached value, or builds and inserts it.
    ///
    /// A failed build is not cached, so the next call retries it.
    pub fn fetch_or_build<E>(
        &mut self,
        key: K,
        build: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.fetch(&key) {
            return Ok(value);
        }
        let value = build(&key)?;
        self.insert(key, value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and yields every value, for teardown
    pub fn drain_values(&mut self) -> impl Iterator<Item = V> + '_ {
        self.entries.drain(..).map(|(_, v)| v)
    }
}
