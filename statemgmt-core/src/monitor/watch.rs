//! Monitor Implementation
//!
//! A monitor watches an ordered list of paths on one target and calls back
//! with the subset that changed.
//!
//! # Lifecycle
//!
//! ```text
//! Constructed --init_run--> Idle --change--> NotifiedDirty --callback--> Idle
//!                             \                                          /
//!                              `------------- unbind --> Disposed <-----'
//! ```
//!
//! `init_run` reads every path under recording, so the monitor is bound to
//! each property it visits and the baseline snapshot is captured. On every
//! later notification the monitor re-reads all paths (refreshing its
//! bindings, since an intermediate object may have been replaced), diffs the
//! fresh values against the previous ones, and runs the callback once if
//! anything differs.
//!
//! # Re-entrancy
//!
//! A callback that writes one of its own watched paths does not recurse:
//! the notification that write produces is queued and handled on the next
//! drain of the idle queue.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::path::WatchPath;
use crate::error::{ObserveError, Result};
use crate::observe::{Consumer, ConsumerId, ObserveEngine, ObservedObject, TargetId, Value};

/// Registration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorOptions {
    /// Declared by a decorator. Decorator monitors have a fixed path list;
    /// API monitors can add and remove paths later.
    pub is_decorator: bool,

    /// Run inside the write that triggered it instead of on the idle queue.
    pub is_sync: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            is_decorator: true,
            is_sync: false,
        }
    }
}

impl MonitorOptions {
    /// Options for a monitor registered at runtime rather than declared.
    pub fn api() -> Self {
        Self {
            is_decorator: false,
            is_sync: false,
        }
    }

    pub fn sync(mut self) -> Self {
        self.is_sync = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Constructed,
    Idle,
    NotifiedDirty,
    Disposed,
}

/// Snapshot of one watched path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorValue {
    pub path: String,
    pub before: Value,
    pub now: Value,
}

struct PathEntry {
    path: WatchPath,
    before: Value,
    now: Value,
    dirty: bool,
}

impl PathEntry {
    fn new(path: WatchPath) -> Self {
        Self {
            path,
            before: Value::Undefined,
            now: Value::Undefined,
            dirty: false,
        }
    }

    fn to_value(&self) -> MonitorValue {
        MonitorValue {
            path: self.path.as_str().to_owned(),
            before: self.before.clone(),
            now: self.now.clone(),
        }
    }
}

type MonitorCallback = Box<dyn Fn(&Monitor)>;

#[derive(Clone)]
pub struct Monitor {
    inner: Rc<MonitorInner>,
}

struct MonitorInner {
    id: ConsumerId,
    this: Weak<MonitorInner>,
    target: ObservedObject,
    engine: ObserveEngine,
    options: MonitorOptions,
    values: RefCell<IndexMap<Rc<str>, PathEntry>>,
    callback: MonitorCallback,
    state: Cell<MonitorState>,
    running: Cell<bool>,
    notify_count: Cell<usize>,
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Monitor {
    /// Create a monitor on `target` for the whitespace-separated `paths`.
    ///
    /// The monitor is not bound to anything until [`init_run`](Self::init_run).
    pub fn new<F>(target: &ObservedObject, paths: &str, callback: F, options: MonitorOptions) -> Result<Self>
    where
        F: Fn(&Monitor) + 'static,
    {
        let paths = WatchPath::parse_list(paths)?;
        Self::with_paths(target, paths, callback, options)
    }

    /// Create a monitor from already parsed paths.
    pub fn with_paths<F>(
        target: &ObservedObject,
        paths: Vec<WatchPath>,
        callback: F,
        options: MonitorOptions,
    ) -> Result<Self>
    where
        F: Fn(&Monitor) + 'static,
    {
        if paths.is_empty() {
            return Err(ObserveError::InvalidPath(String::new()));
        }
        let engine = target.engine().clone();
        let id = engine.ids().watch();

        let mut values = IndexMap::with_capacity(paths.len());
        for path in paths {
            values.entry(path.key()).or_insert_with(|| PathEntry::new(path));
        }

        let inner = Rc::new_cyclic(|this| MonitorInner {
            id,
            this: this.clone(),
            target: target.clone(),
            engine: engine.clone(),
            options,
            values: RefCell::new(values),
            callback: Box::new(callback),
            state: Cell::new(MonitorState::Constructed),
            running: Cell::new(false),
            notify_count: Cell::new(0),
        });

        engine.register_consumer(id, &inner);
        engine.register_owned(target.id(), id);
        debug!(%id, target = %target.id(), paths = inner.values.borrow().len(), "monitor created");
        Ok(Self { inner })
    }

    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    pub fn target(&self) -> TargetId {
        self.inner.target.id()
    }

    pub fn options(&self) -> MonitorOptions {
        self.inner.options
    }

    pub fn state(&self) -> MonitorState {
        self.inner.state.get()
    }

    /// Number of entries in the value map (one per watched path).
    pub fn value_count(&self) -> usize {
        self.inner.values.borrow().len()
    }

    /// Watched paths in declaration order.
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .values
            .borrow()
            .values()
            .map(|entry| entry.path.as_str().to_owned())
            .collect()
    }

    /// How many times the callback has run.
    pub fn notify_count(&self) -> usize {
        self.inner.notify_count.get()
    }

    /// Capture the baseline and bind every watched path.
    pub fn init_run(&self) -> Result<&Self> {
        self.inner.init_run()?;
        Ok(self)
    }

    /// Re-read every path and run the callback if any changed.
    ///
    /// Returns whether the callback ran.
    pub fn notify_change(&self) -> Result<bool> {
        self.inner.notify_change()
    }

    /// Reset the snapshots after the owning component was recycled.
    ///
    /// Every path is re-read under recording and becomes the new baseline
    /// (`before == now`). Dirty flags are cleared and the callback does not
    /// run: the reused component starts observing from its new state.
    pub fn notify_change_on_reuse(&self) -> Result<()> {
        self.inner.notify_change_on_reuse()
    }

    /// Paths that changed in the current notification, in declaration
    /// order. Empty outside of a callback.
    pub fn dirty(&self) -> Vec<String> {
        self.inner
            .values
            .borrow()
            .values()
            .filter(|entry| entry.dirty)
            .map(|entry| entry.path.as_str().to_owned())
            .collect()
    }

    /// Snapshot of `path`, or of the first dirty path when `path` is `None`.
    pub fn value(&self, path: Option<&str>) -> Result<MonitorValue> {
        let values = self.inner.values.borrow();
        match path {
            Some(path) => values
                .get(path.trim())
                .map(PathEntry::to_value)
                .ok_or_else(|| ObserveError::PathNotWatched(path.to_owned())),
            None => values
                .values()
                .find(|entry| entry.dirty)
                .map(PathEntry::to_value)
                .ok_or(ObserveError::NoDirtyPath),
        }
    }

    /// Watch an additional path. Only API monitors accept new paths.
    ///
    /// Returns `false` if the path was already watched.
    pub fn add_path(&self, path: &str) -> Result<bool> {
        self.inner.ensure_mutable()?;
        let path = WatchPath::parse(path)?;
        if self.inner.values.borrow().contains_key(path.as_str()) {
            return Ok(false);
        }

        let mut entry = PathEntry::new(path);
        if matches!(self.state(), MonitorState::Idle | MonitorState::NotifiedDirty) {
            let inner = &self.inner;
            let value = inner
                .engine
                .record(inner.id, || inner.target.resolve(entry.path.segments()));
            entry.before = value.clone();
            entry.now = value;
        }
        self.inner.values.borrow_mut().insert(entry.path.key(), entry);
        Ok(true)
    }

    /// Stop watching a path. Only API monitors accept this.
    ///
    /// Returns `false` if the path was not watched. Removing the last path
    /// unbinds the monitor.
    pub fn remove_path(&self, path: &str) -> Result<bool> {
        self.inner.ensure_mutable()?;
        let removed = self.inner.values.borrow_mut().shift_remove(path.trim()).is_some();
        if !removed {
            return Ok(false);
        }
        if self.value_count() == 0 {
            self.unbind();
        } else if self.state() != MonitorState::Constructed {
            // Drop the removed path's bindings; snapshots stay as they are.
            self.inner.read_paths();
        }
        Ok(true)
    }

    /// Remove every binding and stop reacting to changes.
    pub fn unbind(&self) {
        let inner = &self.inner;
        if inner.state.replace(MonitorState::Disposed) == MonitorState::Disposed {
            return;
        }
        inner.engine.clear_binding(inner.id);
        inner.engine.unregister_owned(inner.target.id(), inner.id);
        debug!(id = %inner.id, "monitor unbound");
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let values = self.inner.values.borrow();
        MonitorSnapshot {
            id: self.inner.id,
            target: self.inner.target.id(),
            state: self.state(),
            options: self.inner.options,
            notify_count: self.notify_count(),
            paths: values
                .values()
                .map(|entry| PathSnapshot {
                    value: entry.to_value(),
                    dirty: entry.dirty,
                })
                .collect(),
        }
    }
}

impl MonitorInner {
    fn is_initialized(&self) -> bool {
        matches!(self.state.get(), MonitorState::Idle | MonitorState::NotifiedDirty)
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.options.is_decorator {
            Err(ObserveError::DecoratorMonitorImmutable(self.id))
        } else {
            Ok(())
        }
    }

    /// Re-read every watched path under recording, replacing the previous
    /// bindings. No snapshot borrow is held while paths resolve.
    fn read_paths(&self) -> Vec<Value> {
        let paths: Vec<WatchPath> = self
            .values
            .borrow()
            .values()
            .map(|entry| entry.path.clone())
            .collect();
        self.engine.clear_refs(self.id);
        self.engine.record(self.id, || {
            paths
                .iter()
                .map(|path| self.target.resolve(path.segments()))
                .collect()
        })
    }

    fn init_run(&self) -> Result<()> {
        if self.state.get() != MonitorState::Constructed {
            return Err(ObserveError::MonitorAlreadyInitialized(self.id));
        }
        self.reset_baseline();
        self.state.set(MonitorState::Idle);
        debug!(id = %self.id, "monitor initialized");
        Ok(())
    }

    fn notify_change_on_reuse(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(ObserveError::MonitorNotInitialized(self.id));
        }
        self.reset_baseline();
        self.state.set(MonitorState::Idle);
        trace!(id = %self.id, "monitor reset on reuse");
        Ok(())
    }

    fn reset_baseline(&self) {
        let fresh = self.read_paths();
        let mut values = self.values.borrow_mut();
        for (entry, value) in values.values_mut().zip(fresh) {
            entry.before = value.clone();
            entry.now = value;
            entry.dirty = false;
        }
    }

    fn notify_change(&self) -> Result<bool> {
        if !self.is_initialized() {
            return Err(ObserveError::MonitorNotInitialized(self.id));
        }
        if self.running.get() {
            // Picked up on the next drain instead of recursing.
            self.engine.mark_dirty(self.id);
            trace!(id = %self.id, "monitor notification deferred during callback");
            return Ok(false);
        }

        let fresh = self.read_paths();
        let any_dirty = {
            let mut values = self.values.borrow_mut();
            let mut any_dirty = false;
            for (entry, value) in values.values_mut().zip(fresh) {
                entry.before = std::mem::replace(&mut entry.now, value);
                entry.dirty = !entry.before.same_value(&entry.now);
                any_dirty |= entry.dirty;
            }
            any_dirty
        };
        if !any_dirty {
            return Ok(false);
        }

        let Some(this) = self.this.upgrade() else {
            return Ok(false);
        };
        self.state.set(MonitorState::NotifiedDirty);
        {
            self.running.set(true);
            let _running = RunningGuard(&self.running);
            (self.callback)(&Monitor { inner: this });
        }
        self.notify_count.set(self.notify_count.get() + 1);

        for entry in self.values.borrow_mut().values_mut() {
            entry.dirty = false;
        }
        // The callback may have unbound the monitor.
        if self.state.get() == MonitorState::NotifiedDirty {
            self.state.set(MonitorState::Idle);
        }
        Ok(true)
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.engine.clear_binding(self.id);
        self.engine.unregister_owned(self.target.id(), self.id);
    }
}

impl Consumer for MonitorInner {
    fn on_dependency_changed(&self, _id: ConsumerId, _engine: &ObserveEngine) {
        if let Err(err) = self.notify_change() {
            warn!(id = %self.id, %err, "monitor notification failed");
        }
    }

    fn is_sync(&self) -> bool {
        self.options.is_sync
    }

    fn on_unbind(&self, _id: ConsumerId) {
        self.state.set(MonitorState::Disposed);
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("paths", &self.paths())
            .finish()
    }
}

/// Serializable view of a monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub id: ConsumerId,
    pub target: TargetId,
    pub state: MonitorState,
    pub options: MonitorOptions,
    pub notify_count: usize,
    pub paths: Vec<PathSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathSnapshot {
    #[serde(flatten)]
    pub value: MonitorValue,
    pub dirty: bool,
}
