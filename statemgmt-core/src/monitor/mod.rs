//! Monitors
//!
//! A monitor is a path-based watcher attached to an observed object. It
//! binds itself to every property visited while resolving its paths and,
//! when any of them changes, calls back once with the list of changed paths
//! and their before/now values.
//!
//! Paths are dotted (`"user.address.city"`) and a single monitor may watch
//! several, declared as one whitespace-separated string.

mod path;
mod watch;

pub use path::WatchPath;
pub use watch::{Monitor, MonitorOptions, MonitorSnapshot, MonitorState, MonitorValue, PathSnapshot};
