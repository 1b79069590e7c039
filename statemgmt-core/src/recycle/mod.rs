//! Component recycling.
//!
//! - [`RecyclePool`]: retired instances keyed by reuse id, popped LIFO.
//! - [`RecycleIdMap`]: the `original <-> proxy` id table for reused
//!   instances.
//!
//! Rebinding a reused instance is the caller's sequence: pop it, allocate a
//! fresh element id, record the mapping, move the old id's bindings with
//! [`ObserveEngine::rebind_consumer`](crate::observe::ObserveEngine::rebind_consumer)
//! and reset its monitors with
//! [`Monitor::notify_change_on_reuse`](crate::monitor::Monitor::notify_change_on_reuse).

mod id_map;
mod pool;

pub use id_map::RecycleIdMap;
pub use pool::{PoolSnapshot, RecyclePool};
