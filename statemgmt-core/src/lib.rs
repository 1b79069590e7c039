//! State Management Core
//!
//! This crate provides the state management runtime for a retained-mode UI
//! framework. It implements:
//!
//! - Fine-grained dependency tracking between components and the state they
//!   read
//! - Deferred (idle queue) and immediate change propagation
//! - Path monitors with before/now snapshots of changed values
//! - Computed properties
//! - Recycling of retired component instances
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observe`: the engine context, id allocation, binding registry,
//!   recording stack, idle task queue and observed objects
//! - `monitor`: path monitors built on top of the engine
//! - `recycle`: the reuse pool and recycle id mapping
//! - `legacy`: the single-property subscriber registry
//! - `config` / `error`: engine configuration and the crate error type
//!
//! Everything is single-threaded. State lives behind `Rc`, `RefCell` and
//! `Cell`, and one [`ObserveEngine`] handle is shared by all objects of an
//! application (or of a test).
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use statemgmt_core::{Monitor, MonitorOptions, ObserveEngine, ObservedObject};
//!
//! let engine = ObserveEngine::new();
//! let state = ObservedObject::with_props(&engine, [("count", 0), ("step", 1)]);
//!
//! let changed = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&changed);
//! let monitor = Monitor::new(
//!     &state,
//!     "count step",
//!     move |m| sink.borrow_mut().extend(m.dirty()),
//!     MonitorOptions::default(),
//! )?;
//! monitor.init_run()?;
//!
//! state.set("count", 5);
//! engine.flush()?;
//! assert_eq!(*changed.borrow(), vec!["count".to_string()]);
//! # Ok::<(), statemgmt_core::ObserveError>(())
//! ```

pub mod config;
pub mod error;
pub mod legacy;
pub mod monitor;
pub mod observe;
pub mod recycle;

pub use config::{NotifyMode, ObserveConfig};
pub use error::{ObserveError, Result};
pub use legacy::{LegacySubscriber, SubscriberManager};
pub use monitor::{Monitor, MonitorOptions, MonitorState, MonitorValue, WatchPath};
pub use observe::{Computed, Consumer, ConsumerId, ObserveEngine, ObservedObject, TargetId, Value};
pub use recycle::{RecycleIdMap, RecyclePool};
