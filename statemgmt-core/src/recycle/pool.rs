//! Recycle Pool
//!
//! Components that leave the tree can be parked here instead of being
//! destroyed, keyed by a reuse id chosen by the component author. A later
//! insertion of a component with the same reuse id pops the most recently
//! parked instance and rebinds it.
//!
//! The pool does not inspect what it stores. It is generic over the
//! instance type so the framework decides what a "component" is.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace};

use super::id_map::RecycleIdMap;
use crate::observe::ConsumerId;

/// Keyed LIFO pool of retired instances plus the recycle id mapping.
#[derive(Debug)]
pub struct RecyclePool<T> {
    pools: IndexMap<String, Vec<T>>,
    ids: RecycleIdMap,
}

impl<T> Default for RecyclePool<T> {
    fn default() -> Self {
        Self {
            pools: IndexMap::new(),
            ids: RecycleIdMap::new(),
        }
    }
}

impl<T> RecyclePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `instance` under `reuse_id`.
    pub fn push_recycle_v2_component(&mut self, reuse_id: &str, instance: T) {
        let stack = self.pools.entry(reuse_id.to_owned()).or_default();
        stack.push(instance);
        trace!(reuse_id, pooled = stack.len(), "component parked");
    }

    /// Take the most recently parked instance for `reuse_id`.
    pub fn pop_recycle_v2_component(&mut self, reuse_id: &str) -> Option<T> {
        let instance = self.pools.get_mut(reuse_id)?.pop();
        if instance.is_some() {
            trace!(reuse_id, "component taken from pool");
        }
        instance
    }

    pub fn update_recycle_id_mapping(&mut self, original: ConsumerId, proxy: ConsumerId) {
        self.ids.update_recycle_id_mapping(original, proxy);
    }

    pub fn get_recycle_id_mapping(&self, original: ConsumerId) -> Option<ConsumerId> {
        self.ids.get_recycle_id_mapping(original)
    }

    pub fn id_map(&self) -> &RecycleIdMap {
        &self.ids
    }

    pub fn id_map_mut(&mut self) -> &mut RecycleIdMap {
        &mut self.ids
    }

    /// Drop every parked instance. Id mappings are kept, since reused
    /// instances still live in the tree under their proxy ids.
    ///
    /// Returns the dropped instances so the caller can tear them down.
    pub fn purge_all_cached_recycle_elmt_ids(&mut self) -> Vec<T> {
        let purged: Vec<T> = self.pools.drain(..).flat_map(|(_, stack)| stack).collect();
        debug!(purged = purged.len(), "recycle pool purged");
        purged
    }

    /// Parked instances across all reuse ids.
    pub fn pooled_count(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    pub fn pooled_count_for(&self, reuse_id: &str) -> usize {
        self.pools.get(reuse_id).map_or(0, Vec::len)
    }

    /// Reuse ids that currently hold at least one instance, in first-use
    /// order.
    pub fn reuse_ids(&self) -> Vec<&str> {
        self.pools
            .iter()
            .filter(|(_, stack)| !stack.is_empty())
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pooled_count() == 0
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pooled: self
                .pools
                .iter()
                .filter(|(_, stack)| !stack.is_empty())
                .map(|(key, stack)| (key.clone(), stack.len()))
                .collect(),
            id_mappings: self.ids.len(),
        }
    }
}

/// Serializable view of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub pooled: IndexMap<String, usize>,
    pub id_mappings: usize,
}
