//! Observed Objects
//!
//! An `ObservedObject` is an observable target with named properties. It is
//! what generated component code reads from and writes to:
//!
//! - `get` records a binding for the recording consumer, then returns the
//!   value.
//! - `set` stores the value and fires a change, but only when the new value
//!   differs from the old one under [`Value::same_value`].
//!
//! Objects hold a handle to their engine so call sites do not have to pass
//! it around. Dropping the last handle tears the target down: its ref sets
//! go away and the monitors and computed properties it owns are unbound. Nested objects are stored as `Value::Object`, which is how
//! dotted monitor paths such as `"user.address.city"` resolve.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::engine::ObserveEngine;
use super::id::TargetId;
use super::value::Value;

#[derive(Clone)]
pub struct ObservedObject {
    inner: Rc<ObjectInner>,
}

struct ObjectInner {
    id: TargetId,
    engine: ObserveEngine,
    props: RefCell<IndexMap<Rc<str>, Value>>,
}

impl ObservedObject {
    /// Create an empty object registered with `engine`.
    pub fn new(engine: &ObserveEngine) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: engine.ids().target(),
                engine: engine.clone(),
                props: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Create an object with declared properties.
    pub fn with_props<K, V>(engine: &ObserveEngine, props: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let object = Self::new(engine);
        for (name, value) in props {
            object.declare(name.as_ref(), value);
        }
        object
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn engine(&self) -> &ObserveEngine {
        &self.inner.engine
    }

    pub fn ptr_eq(&self, other: &ObservedObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Declare a tracked property with an initial value. No change fires.
    pub fn declare(&self, name: &str, value: impl Into<Value>) {
        self.inner
            .props
            .borrow_mut()
            .insert(Rc::from(name), value.into());
        self.inner.engine.register_observed_property(self.inner.id, name);
    }

    /// Read a property, binding the recording consumer to it.
    ///
    /// Missing properties read as `Value::Undefined` and are still bound,
    /// so a consumer is notified when the property first appears.
    pub fn get(&self, name: &str) -> Value {
        self.inner.engine.add_ref(self.inner.id, name);
        self.get_untracked(name)
    }

    /// Read a property without recording a dependency.
    pub fn get_untracked(&self, name: &str) -> Value {
        self.inner
            .props
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Write a property. Returns whether the value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut props = self.inner.props.borrow_mut();
            match props.get_mut(name) {
                Some(current) if current.same_value(&value) => return false,
                Some(current) => *current = value,
                None => {
                    props.insert(Rc::from(name), value);
                }
            }
        }
        self.inner.engine.fire_change(self.inner.id, name);
        true
    }

    /// Read-modify-write without binding the writer to the property.
    pub fn update(&self, name: &str, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.get_untracked(name));
        self.set(name, next)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.props.borrow().contains_key(name)
    }

    /// Property names in declaration order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Resolve a dotted path, binding the recording consumer to every
    /// segment read along the way.
    ///
    /// Stops with `Value::Undefined` as soon as an intermediate segment is
    /// not an object.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Value {
        let Some((first, rest)) = segments.split_first() else {
            return Value::Undefined;
        };
        let mut value = self.get(first.as_ref());
        for segment in rest {
            value = match &value {
                Value::Object(object) => object.get(segment.as_ref()),
                _ => return Value::Undefined,
            };
        }
        value
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.engine.teardown_target(self.id);
    }
}

impl fmt::Debug for ObservedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedObject")
            .field("id", &self.inner.id)
            .field("props", &self.inner.props.borrow().len())
            .finish()
    }
}
