//! Observation Engine
//!
//! This module implements fine-grained dependency tracking: which consumer
//! read which property, and who has to be recomputed when a property is
//! written.
//!
//! # Concepts
//!
//! ## Consumers
//!
//! A consumer is anything that can depend on observable state: a component
//! element, a monitor, or a computed property. Each has a [`ConsumerId`];
//! the id range tells the kinds apart.
//!
//! ## Targets and ref sets
//!
//! An observable target ([`TargetId`], usually an [`ObservedObject`]) has
//! named properties. For each property the engine keeps a ref set: the ids
//! of the consumers that read it during their last recorded pass.
//!
//! ## Recording
//!
//! While a consumer renders or computes, its id sits on top of the
//! recording stack and every tracked read adds a binding to it. Reads made
//! through [`ObserveEngine::execute_unobserved`] bind nothing.
//!
//! ## Dirty set and idle queue
//!
//! A write marks the consumers in the written property's ref set dirty and
//! queues one recomputation closure per consumer. The owner of the engine
//! drains the queue once per frame, or lets the engine flush immediately.

mod binding;
mod computed;
mod engine;
mod id;
mod idle;
mod object;
mod recorder;
mod value;

pub use binding::{BindingRegistry, ConsumerList};
pub use computed::Computed;
pub use engine::{Consumer, EngineSnapshot, ObserveEngine, RecordingGuard, RefSetSnapshot};
pub use id::{ConsumerId, IdAllocator, IdKind, TargetId, MIN_COMPUTED_ID, MIN_WATCH_ID};
pub use idle::{DrainBudget, DrainReport, IdleTask, IdleTaskQueue};
pub use object::ObservedObject;
pub use recorder::{Frame, GuardBase, RecordingStack};
pub use value::Value;
