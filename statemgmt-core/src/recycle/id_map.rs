//! Id mapping for recycled instances.
//!
//! When a pooled instance is reused it keeps its original element id
//! internally, while the new owner knows it under a fresh id. The map
//! records `original -> proxy` and the reverse direction, so lookups are
//! O(1) both ways.

use std::collections::HashMap;

use tracing::trace;

use crate::observe::ConsumerId;

#[derive(Debug, Default)]
pub struct RecycleIdMap {
    forward: HashMap<ConsumerId, ConsumerId>,
    reverse: HashMap<ConsumerId, ConsumerId>,
}

impl RecycleIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `original` to `proxy`.
    ///
    /// Remapping an original drops its previous proxy, and a proxy already
    /// used by another original is taken over, so both directions stay
    /// one-to-one.
    pub fn update_recycle_id_mapping(&mut self, original: ConsumerId, proxy: ConsumerId) {
        if let Some(previous) = self.forward.insert(original, proxy) {
            self.reverse.remove(&previous);
        }
        if let Some(stale) = self.reverse.insert(proxy, original) {
            if stale != original {
                self.forward.remove(&stale);
            }
        }
        trace!(%original, %proxy, "recycle id mapped");
    }

    /// The proxy `original` is currently known under.
    pub fn get_recycle_id_mapping(&self, original: ConsumerId) -> Option<ConsumerId> {
        self.forward.get(&original).copied()
    }

    /// The original id behind `proxy`.
    pub fn original_id(&self, proxy: ConsumerId) -> Option<ConsumerId> {
        self.reverse.get(&proxy).copied()
    }

    /// The id to address `id` by: its proxy when mapped, otherwise itself.
    pub fn proxy_id(&self, id: ConsumerId) -> ConsumerId {
        self.get_recycle_id_mapping(id).unwrap_or(id)
    }

    pub fn remove_recycle_id_mapping(&mut self, original: ConsumerId) -> Option<ConsumerId> {
        let proxy = self.forward.remove(&original)?;
        self.reverse.remove(&proxy);
        Some(proxy)
    }

    /// Drop every mapping. Returns how many there were.
    pub fn purge_id_mappings(&mut self) -> usize {
        let count = self.forward.len();
        self.forward.clear();
        self.reverse.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ConsumerId {
        ConsumerId::from_raw(raw)
    }

    #[test]
    fn unmapped_lookup_is_none() {
        let map = RecycleIdMap::new();
        assert_eq!(map.get_recycle_id_mapping(id(5)), None);
        assert_eq!(map.proxy_id(id(5)), id(5));
    }

    #[test]
    fn lookups_work_both_ways() {
        let mut map = RecycleIdMap::new();
        map.update_recycle_id_mapping(id(5), id(9));
        assert_eq!(map.get_recycle_id_mapping(id(5)), Some(id(9)));
        assert_eq!(map.original_id(id(9)), Some(id(5)));
        assert_eq!(map.proxy_id(id(5)), id(9));
    }

    #[test]
    fn remapping_drops_stale_reverse_entries() {
        let mut map = RecycleIdMap::new();
        map.update_recycle_id_mapping(id(5), id(9));
        map.update_recycle_id_mapping(id(5), id(12));
        assert_eq!(map.original_id(id(9)), None);
        assert_eq!(map.original_id(id(12)), Some(id(5)));

        // Proxy 12 taken over by another original.
        map.update_recycle_id_mapping(id(7), id(12));
        assert_eq!(map.get_recycle_id_mapping(id(5)), None);
        assert_eq!(map.original_id(id(12)), Some(id(7)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_and_purge() {
        let mut map = RecycleIdMap::new();
        map.update_recycle_id_mapping(id(1), id(2));
        map.update_recycle_id_mapping(id(3), id(4));

        assert_eq!(map.remove_recycle_id_mapping(id(1)), Some(id(2)));
        assert_eq!(map.original_id(id(2)), None);
        assert_eq!(map.remove_recycle_id_mapping(id(1)), None);

        assert_eq!(map.purge_id_mappings(), 1);
        assert!(map.is_empty());
    }
}
