//! Binding Registry
//!
//! For every `(target, property)` pair the registry keeps the set of
//! consumers that read it (the "ref set"). A reverse index from consumer to
//! its bindings makes `clear` proportional to the number of bindings the
//! consumer has, not to the size of the whole registry.
//!
//! Ref sets are `IndexSet`s: registration is idempotent and iteration
//! follows first-registration order, which keeps notification order stable.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::id::{ConsumerId, TargetId};

/// Consumer ids copied out of a ref set before notification.
pub type ConsumerList = SmallVec<[ConsumerId; 8]>;

type PropertyKey = Rc<str>;

#[derive(Debug, Default)]
pub struct BindingRegistry {
    refs: HashMap<TargetId, HashMap<PropertyKey, IndexSet<ConsumerId>>>,
    reverse: HashMap<ConsumerId, HashSet<(TargetId, PropertyKey)>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `property` as tracked on `target`, creating an empty ref set.
    pub fn declare(&mut self, target: TargetId, property: &str) {
        self.refs
            .entry(target)
            .or_default()
            .entry(Rc::from(property))
            .or_default();
    }

    /// Whether `property` on `target` has a ref set (declared or bound).
    pub fn is_tracked(&self, target: TargetId, property: &str) -> bool {
        self.refs
            .get(&target)
            .is_some_and(|props| props.contains_key(property))
    }

    /// Add `id` to the ref set of `(target, property)`.
    ///
    /// Returns `false` if the binding already existed.
    pub fn add(&mut self, id: ConsumerId, target: TargetId, property: &str) -> bool {
        let props = self.refs.entry(target).or_default();
        let key = match props.get_key_value(property) {
            Some((key, _)) => Rc::clone(key),
            None => Rc::from(property),
        };
        let inserted = props.entry(Rc::clone(&key)).or_default().insert(id);
        if inserted {
            self.reverse.entry(id).or_default().insert((target, key));
        }
        inserted
    }

    /// Consumers currently bound to `(target, property)`, in registration order.
    pub fn consumers_of(&self, target: TargetId, property: &str) -> ConsumerList {
        self.refs
            .get(&target)
            .and_then(|props| props.get(property))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: ConsumerId, target: TargetId, property: &str) -> bool {
        self.refs
            .get(&target)
            .and_then(|props| props.get(property))
            .is_some_and(|set| set.contains(&id))
    }

    /// Size of the ref set for `(target, property)`.
    pub fn ref_count(&self, target: TargetId, property: &str) -> usize {
        self.refs
            .get(&target)
            .and_then(|props| props.get(property))
            .map_or(0, IndexSet::len)
    }

    /// Number of bindings `id` participates in.
    pub fn binding_count(&self, id: ConsumerId) -> usize {
        self.reverse.get(&id).map_or(0, HashSet::len)
    }

    /// Remove `id` from every ref set. Returns the number of bindings removed.
    pub fn clear(&mut self, id: ConsumerId) -> usize {
        let Some(bindings) = self.reverse.remove(&id) else {
            return 0;
        };
        for (target, property) in &bindings {
            if let Some(set) = self
                .refs
                .get_mut(target)
                .and_then(|props| props.get_mut(property))
            {
                // Preserve the registration order of the remaining consumers.
                set.shift_remove(&id);
            }
        }
        bindings.len()
    }

    /// Drop every ref set of `target`.
    pub fn clear_target(&mut self, target: TargetId) -> usize {
        let Some(props) = self.refs.remove(&target) else {
            return 0;
        };
        let mut removed = 0;
        for (property, set) in props {
            for id in set {
                if let Some(bindings) = self.reverse.get_mut(&id) {
                    bindings.remove(&(target, Rc::clone(&property)));
                    if bindings.is_empty() {
                        self.reverse.remove(&id);
                    }
                }
                removed += 1;
            }
        }
        removed
    }

    /// Move every binding of `old` over to `new`.
    ///
    /// `old` keeps its position in each ref set when `new` was not already a
    /// member. Returns the number of bindings moved.
    pub fn rebind(&mut self, old: ConsumerId, new: ConsumerId) -> usize {
        if old == new {
            return 0;
        }
        let Some(bindings) = self.reverse.remove(&old) else {
            return 0;
        };
        let moved = bindings.len();
        for (target, property) in bindings {
            let Some(set) = self
                .refs
                .get_mut(&target)
                .and_then(|props| props.get_mut(&property))
            else {
                continue;
            };
            if let Some(index) = set.get_index_of(&old) {
                if set.contains(&new) {
                    set.shift_remove_index(index);
                } else {
                    set.insert(new);
                    let last = set.len() - 1;
                    set.move_index(last, index);
                    set.shift_remove(&old);
                }
            }
            self.reverse.entry(new).or_default().insert((target, property));
        }
        moved
    }

    /// Number of targets with at least one ref set.
    pub fn target_count(&self) -> usize {
        self.refs.len()
    }

    /// Total number of `(consumer, target, property)` bindings.
    pub fn total_bindings(&self) -> usize {
        self.reverse.values().map(HashSet::len).sum()
    }

    /// Iterate over `(target, property, ref set size)` triples.
    pub fn iter_ref_sets(&self) -> impl Iterator<Item = (TargetId, &str, usize)> + '_ {
        self.refs.iter().flat_map(|(target, props)| {
            props
                .iter()
                .map(move |(property, set)| (*target, property.as_ref(), set.len()))
        })
    }
}
