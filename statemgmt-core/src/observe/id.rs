//! Identifier types for consumers and observable targets.
//!
//! A consumer is anything that can depend on observable state: a component
//! element, a monitor, or a computed property. All of them share one
//! numeric space, split into disjoint ranges so that the kind of a consumer
//! can be read off its id without a lookup.

use std::cell::{Cell, RefCell};
use std::fmt;

use serde::Serialize;

/// First id handed out to computed properties.
pub const MIN_COMPUTED_ID: u64 = 0x10_0000_0000;

/// First id handed out to monitors.
pub const MIN_WATCH_ID: u64 = 0x1_0000_0000_0000;

/// Unique identifier for a consumer.
///
/// Element ids and legacy subscriber ids are drawn from the same counter,
/// which keeps the two registries from ever colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConsumerId(u64);

/// The range a consumer id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdKind {
    /// A component element (or a legacy subscriber).
    Element,
    /// A computed property.
    Computed,
    /// A monitor.
    Monitor,
}

impl ConsumerId {
    /// Wrap a raw id. Used by collaborators that persist ids elsewhere.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> IdKind {
        if self.0 >= MIN_WATCH_ID {
            IdKind::Monitor
        } else if self.0 >= MIN_COMPUTED_ID {
            IdKind::Computed
        } else {
            IdKind::Element
        }
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an observable target.
///
/// Targets live in their own namespace; a target id never needs to be
/// compared with a consumer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TargetId(u64);

impl TargetId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocates ids for one engine context.
///
/// Released element ids go onto a free list and are handed out again before
/// the counter advances. Monitor and computed ids are never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next_element: Cell<u64>,
    next_computed: Cell<u64>,
    next_watch: Cell<u64>,
    next_target: Cell<u64>,
    free_elements: RefCell<Vec<u64>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_element: Cell::new(1),
            next_computed: Cell::new(MIN_COMPUTED_ID),
            next_watch: Cell::new(MIN_WATCH_ID),
            next_target: Cell::new(1),
            free_elements: RefCell::new(Vec::new()),
        }
    }

    /// Allocate an element id, preferring previously released ones.
    pub fn element(&self) -> ConsumerId {
        if let Some(raw) = self.free_elements.borrow_mut().pop() {
            return ConsumerId(raw);
        }
        ConsumerId(bump(&self.next_element))
    }

    /// Allocate a fresh element id, bypassing the free list.
    ///
    /// Legacy subscriber ids come from here: they are never released back.
    pub fn fresh_element(&self) -> ConsumerId {
        ConsumerId(bump(&self.next_element))
    }

    pub fn computed(&self) -> ConsumerId {
        ConsumerId(bump(&self.next_computed))
    }

    pub fn watch(&self) -> ConsumerId {
        ConsumerId(bump(&self.next_watch))
    }

    pub fn target(&self) -> TargetId {
        TargetId(bump(&self.next_target))
    }

    /// The id the next monitor will receive.
    pub fn peek_watch(&self) -> ConsumerId {
        ConsumerId(self.next_watch.get())
    }

    /// Return an element id to the free list.
    ///
    /// The caller must have removed every binding of `id` first. Ids of
    /// other kinds, and ids that were never handed out, are ignored.
    pub fn release(&self, id: ConsumerId) -> bool {
        if id.kind() != IdKind::Element || id.0 == 0 || id.0 >= self.next_element.get() {
            return false;
        }
        let mut free = self.free_elements.borrow_mut();
        if free.contains(&id.0) {
            return false;
        }
        free.push(id.0);
        true
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &Cell<u64>) -> u64 {
    let id = counter.get();
    counter.set(id + 1);
    id
}
