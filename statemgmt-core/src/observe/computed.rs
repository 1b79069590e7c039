//! Computed Properties
//!
//! A computed property is a cached value derived from other observed
//! properties. It is both a consumer and a source:
//!
//! 1. On creation its getter runs under recording, binding the computed
//!    id to every property the getter reads.
//!
//! 2. When one of those properties changes, the engine notifies the
//!    computed property, which drops its old bindings and re-runs the getter
//!    under recording.
//!
//! 3. If the result differs from the cached value, the computed property
//!    fires a change on its own `(owner, name)` property, so consumers that
//!    read it are notified in turn. An unchanged result stops propagation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::engine::{Consumer, ObserveEngine};
use super::id::{ConsumerId, TargetId};
use super::object::ObservedObject;
use super::value::Value;

#[derive(Clone)]
pub struct Computed {
    inner: Rc<ComputedInner>,
}

struct ComputedInner {
    id: ConsumerId,
    owner: TargetId,
    name: Rc<str>,
    engine: ObserveEngine,
    getter: Box<dyn Fn() -> Value>,
    value: RefCell<Value>,
    recompute_count: Cell<usize>,
    disposed: Cell<bool>,
}

impl Computed {
    /// Create a computed property `name` on `owner` and evaluate it once.
    pub fn new<F>(owner: &ObservedObject, name: &str, getter: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        let engine = owner.engine().clone();
        let id = engine.ids().computed();
        let computed = Self {
            inner: Rc::new(ComputedInner {
                id,
                owner: owner.id(),
                name: Rc::from(name),
                engine: engine.clone(),
                getter: Box::new(getter),
                value: RefCell::new(Value::Undefined),
                recompute_count: Cell::new(0),
                disposed: Cell::new(false),
            }),
        };

        engine.register_consumer(id, &computed.inner);
        engine.register_owned(owner.id(), id);
        engine.register_observed_property(owner.id(), name);

        let initial = computed.inner.evaluate();
        *computed.inner.value.borrow_mut() = initial;
        debug!(%id, owner = %owner.id(), name, "computed property created");
        computed
    }

    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Read the cached value, binding the recording consumer to it.
    pub fn get(&self) -> Value {
        self.inner.engine.add_ref(self.inner.owner, &self.inner.name);
        self.get_untracked()
    }

    pub fn get_untracked(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// How many times the getter ran after the initial evaluation.
    pub fn recompute_count(&self) -> usize {
        self.inner.recompute_count.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Unbind from every input. The cached value stays readable.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.engine.clear_binding(self.inner.id);
        self.inner.engine.unregister_owned(self.inner.owner, self.inner.id);
    }
}

impl ComputedInner {
    fn evaluate(&self) -> Value {
        self.engine.clear_refs(self.id);
        self.engine.record(self.id, || (self.getter)())
    }

    fn recompute(&self) {
        if self.disposed.get() {
            return;
        }
        let next = self.evaluate();
        self.recompute_count.set(self.recompute_count.get() + 1);

        let changed = {
            let mut value = self.value.borrow_mut();
            if value.same_value(&next) {
                false
            } else {
                *value = next;
                true
            }
        };
        trace!(id = %self.id, changed, "computed property re-evaluated");
        if changed {
            self.engine.fire_change(self.owner, &self.name);
        }
    }
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        self.engine.clear_binding(self.id);
        self.engine.unregister_owned(self.owner, self.id);
    }
}

impl Consumer for ComputedInner {
    fn on_dependency_changed(&self, _id: ConsumerId, _engine: &ObserveEngine) {
        self.recompute();
    }

    fn on_unbind(&self, _id: ConsumerId) {
        self.disposed.set(true);
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}
