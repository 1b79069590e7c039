//! Subscriber registry for single-property subscribers.
//!
//! Older components subscribe to one property at a time and are looked up
//! by id when the property changes. Their ids come from the engine's
//! element counter, so a legacy id never equals a live element id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::observe::{ConsumerId, IdAllocator};

/// A subscriber registered with the [`SubscriberManager`].
pub trait LegacySubscriber {
    fn id(&self) -> ConsumerId;

    /// Called by [`SubscriberManager::delete`] after removal.
    fn about_to_be_deleted(&self) {}
}

pub struct SubscriberManager {
    ids: Rc<IdAllocator>,
    subscribers: RefCell<HashMap<ConsumerId, Rc<dyn LegacySubscriber>>>,
}

impl SubscriberManager {
    pub fn new(ids: Rc<IdAllocator>) -> Self {
        Self {
            ids,
            subscribers: RefCell::new(HashMap::new()),
        }
    }

    /// Allocate an id for a new subscriber.
    pub fn make_id(&self) -> ConsumerId {
        self.ids.fresh_element()
    }

    /// Register `subscriber` under its own id. Returns `false` if the id was
    /// already taken; the existing entry is kept.
    pub fn add(&self, subscriber: Rc<dyn LegacySubscriber>) -> bool {
        let id = subscriber.id();
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            debug!(%id, "subscriber id already registered");
            return false;
        }
        subscribers.insert(id, subscriber);
        trace!(%id, "subscriber added");
        true
    }

    /// Remove the subscriber registered under `id`.
    pub fn delete(&self, id: ConsumerId) -> bool {
        let removed = self.subscribers.borrow_mut().remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.about_to_be_deleted();
                trace!(%id, "subscriber deleted");
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: ConsumerId) -> Option<Rc<dyn LegacySubscriber>> {
        self.subscribers.borrow().get(&id).cloned()
    }

    pub fn has(&self, id: ConsumerId) -> bool {
        self.subscribers.borrow().contains_key(&id)
    }

    pub fn num_subscribers(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

impl fmt::Debug for SubscriberManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberManager")
            .field("subscribers", &self.num_subscribers())
            .finish()
    }
}
