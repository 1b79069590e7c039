//! Observation Engine
//!
//! The engine is the central coordinator. It owns the binding registry, the
//! recording stack, the dirty set and the idle task queue, and every change
//! to them goes through its API.
//!
//! # How It Works
//!
//! 1. A consumer brackets its render or compute pass with
//!    `start_record_dependencies` / `stop_record_dependencies`.
//!
//! 2. Every tracked read inside the bracket calls `add_ref`, which adds the
//!    recording consumer to the ref set of `(target, property)`.
//!
//! 3. A write calls `fire_change`. The engine:
//!    a. copies the ref set of the written property
//!    b. runs sync consumers (sync monitors) on the spot
//!    c. adds the others to the dirty set, queueing one closure per newly
//!       dirty consumer
//!    d. flushes immediately when configured to, otherwise waits for the
//!       owner to drain the queue
//!
//! # Liveness
//!
//! Consumers are held as `Weak<dyn Consumer>`. Nothing requires a consumer
//! to unregister before it is dropped; the engine finds out at notification
//! time, treats the notification as a no-op and prunes the dead id's
//! bindings. Element ids only return to the allocator through
//! `release_element_id`, which clears bindings first, so a reused id can
//! never inherit a stale binding.
//!
//! # Context, not singleton
//!
//! `ObserveEngine` is a cheap `Rc` handle. Components, objects and monitors
//! each keep a clone; tests create a fresh engine instead of resetting
//! global state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::binding::{BindingRegistry, ConsumerList};
use super::id::{ConsumerId, IdAllocator, IdKind, TargetId};
use super::idle::{DrainBudget, DrainReport, IdleTaskQueue};
use super::recorder::{Frame, GuardBase, RecordingStack};
use crate::config::{NotifyMode, ObserveConfig};
use crate::error::{ObserveError, Result};
use crate::legacy::SubscriberManager;

/// Anything that can depend on observable state.
pub trait Consumer {
    /// A property this consumer read under `id` has changed.
    fn on_dependency_changed(&self, id: ConsumerId, engine: &ObserveEngine);

    /// Sync consumers run inside `fire_change` instead of the idle queue.
    fn is_sync(&self) -> bool {
        false
    }

    /// The engine unbound `id` as part of tearing down its owning target.
    fn on_unbind(&self, _id: ConsumerId) {}
}

/// Handle to an engine context.
#[derive(Clone)]
pub struct ObserveEngine {
    inner: Rc<EngineInner>,
}

struct EngineInner {
    config: ObserveConfig,
    ids: Rc<IdAllocator>,
    bindings: RefCell<BindingRegistry>,
    recorder: RefCell<RecordingStack>,
    consumers: RefCell<HashMap<ConsumerId, Weak<dyn Consumer>>>,
    /// Monitors and computed properties owned by a target.
    owned: RefCell<HashMap<TargetId, SmallVec<[ConsumerId; 4]>>>,
    dirty: RefCell<IndexSet<ConsumerId>>,
    idle: RefCell<IdleTaskQueue<ObserveEngine>>,
    flushing: Cell<bool>,
    /// Sync consumers currently running inside `fire_change`.
    sync_depth: Cell<usize>,
    subscribers: SubscriberManager,
}

/// Removes the frame it pushed when dropped, even if the recorded code
/// panics.
///
/// Frames started inside the guarded code and never stopped are discarded
/// with it, so the stack is back at its depth from before the guard.
pub struct RecordingGuard<'a> {
    engine: &'a ObserveEngine,
    frame: Frame,
    base: GuardBase,
}

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        let leftover = self.engine.inner.recorder.borrow_mut().exit(self.base);
        if leftover > 0 {
            warn!(frame = ?self.frame, leftover, "unbalanced recording frames discarded");
        }
    }
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl ObserveEngine {
    pub fn new() -> Self {
        Self::with_config(ObserveConfig::default())
    }

    pub fn with_config(config: ObserveConfig) -> Self {
        let ids = Rc::new(IdAllocator::new());
        Self {
            inner: Rc::new(EngineInner {
                config,
                subscribers: SubscriberManager::new(Rc::clone(&ids)),
                ids,
                bindings: RefCell::new(BindingRegistry::new()),
                recorder: RefCell::new(RecordingStack::new()),
                consumers: RefCell::new(HashMap::new()),
                owned: RefCell::new(HashMap::new()),
                dirty: RefCell::new(IndexSet::new()),
                idle: RefCell::new(IdleTaskQueue::new()),
                flushing: Cell::new(false),
                sync_depth: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ObserveConfig {
        &self.inner.config
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.inner.ids
    }

    /// The legacy single-property subscriber registry sharing this
    /// engine's id space.
    pub fn subscriber_manager(&self) -> &SubscriberManager {
        &self.inner.subscribers
    }

    /// Whether two handles refer to the same engine context.
    pub fn ptr_eq(&self, other: &ObserveEngine) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Consumers
    // ------------------------------------------------------------------------

    pub fn allocate_element_id(&self) -> ConsumerId {
        self.inner.ids.element()
    }

    /// Unbind an element and return its id to the allocator.
    pub fn release_element_id(&self, id: ConsumerId) -> bool {
        if id.kind() != IdKind::Element {
            return false;
        }
        self.clear_binding(id);
        self.inner.ids.release(id)
    }

    /// Register `consumer` to be notified for `id`. Replaces any previous
    /// registration of the same id.
    pub fn register_consumer<C: Consumer + 'static>(&self, id: ConsumerId, consumer: &Rc<C>) {
        let weak = Rc::downgrade(consumer);
        let weak: Weak<dyn Consumer> = weak;
        self.inner.consumers.borrow_mut().insert(id, weak);
    }

    pub fn is_registered(&self, id: ConsumerId) -> bool {
        self.inner.consumers.borrow().contains_key(&id)
    }

    /// Record that `target` owns consumer `id` (a monitor or computed
    /// property), for teardown.
    pub(crate) fn register_owned(&self, target: TargetId, id: ConsumerId) {
        let mut owned = self.inner.owned.borrow_mut();
        let ids = owned.entry(target).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub(crate) fn unregister_owned(&self, target: TargetId, id: ConsumerId) {
        let mut owned = self.inner.owned.borrow_mut();
        if let Some(ids) = owned.get_mut(&target) {
            ids.retain(|owned_id| *owned_id != id);
            if ids.is_empty() {
                owned.remove(&target);
            }
        }
    }

    /// Live consumer for `id`. Prunes the bindings of a consumer that was
    /// registered but has since been dropped.
    fn resolve(&self, id: ConsumerId) -> Option<Rc<dyn Consumer>> {
        let weak = self.inner.consumers.borrow().get(&id).cloned()?;
        if let Some(consumer) = weak.upgrade() {
            return Some(consumer);
        }
        trace!(%id, "dropping bindings of dead consumer");
        self.inner.consumers.borrow_mut().remove(&id);
        self.inner.bindings.borrow_mut().clear(id);
        None
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Register `consumer` under `id` and start attributing reads to it.
    ///
    /// Must be balanced by `stop_record_dependencies`. Frames nest, so a
    /// child consumer may start recording while its parent is recording.
    pub fn start_record_dependencies<C: Consumer + 'static>(&self, consumer: &Rc<C>, id: ConsumerId) {
        self.register_consumer(id, consumer);
        self.inner.recorder.borrow_mut().push(Some(id));
        trace!(%id, depth = self.recording_depth(), "start recording");
    }

    /// Pop the top recording frame.
    ///
    /// Returns the consumer the frame belonged to, or `None` for an
    /// unobserved frame. A stop with no matching start is reported as
    /// [`ObserveError::UnbalancedRecording`] and leaves the engine intact.
    /// Frames pushed by `record` and `execute_unobserved` only end with
    /// their scope, so a stop inside one of them cannot reach the frames
    /// outside it.
    pub fn stop_record_dependencies(&self) -> Result<Option<ConsumerId>> {
        let popped = self.inner.recorder.borrow_mut().pop();
        match popped {
            Some(frame) => Ok(frame),
            None => {
                warn!("stop_record_dependencies called without a matching start");
                Err(ObserveError::UnbalancedRecording)
            }
        }
    }

    /// The consumer reads are currently attributed to, `None` when not
    /// recording.
    pub fn current_recorded_id(&self) -> Option<ConsumerId> {
        self.inner.recorder.borrow().current()
    }

    pub fn recording_depth(&self) -> usize {
        self.inner.recorder.borrow().depth()
    }

    /// Push a frame and return a guard that pops it.
    pub fn enter(&self, frame: Frame) -> RecordingGuard<'_> {
        let base = self.inner.recorder.borrow_mut().enter(frame);
        RecordingGuard {
            engine: self,
            frame,
            base,
        }
    }

    /// Run `f` with reads attributed to `id`.
    pub fn record<R>(&self, id: ConsumerId, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(Some(id));
        f()
    }

    /// Run `task` with recording suspended and return its result.
    ///
    /// Nests inside an active recording and restores it afterwards.
    pub fn execute_unobserved<R>(&self, task: impl FnOnce() -> R) -> R {
        let _guard = self.enter(None);
        task()
    }

    // ------------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------------

    /// Declare a tracked property ahead of any read.
    pub fn register_observed_property(&self, target: TargetId, property: &str) {
        self.inner.bindings.borrow_mut().declare(target, property);
    }

    pub fn is_tracked(&self, target: TargetId, property: &str) -> bool {
        self.inner.bindings.borrow().is_tracked(target, property)
    }

    /// Bind the recording consumer, if any, to `(target, property)`.
    pub fn add_ref(&self, target: TargetId, property: &str) -> bool {
        match self.current_recorded_id() {
            Some(id) => self.add_ref_for_id(id, target, property),
            None => false,
        }
    }

    /// Bind `id` to `(target, property)`. Returns `false` if the binding
    /// already existed.
    pub fn add_ref_for_id(&self, id: ConsumerId, target: TargetId, property: &str) -> bool {
        let added = self.inner.bindings.borrow_mut().add(id, target, property);
        if added {
            trace!(%id, %target, property, "binding added");
        }
        added
    }

    /// Remove `id` from every ref set, the dirty set and the consumer
    /// registry. Unknown ids are a no-op.
    pub fn clear_binding(&self, id: ConsumerId) -> usize {
        let removed = self.inner.bindings.borrow_mut().clear(id);
        self.inner.consumers.borrow_mut().remove(&id);
        self.inner.dirty.borrow_mut().swap_remove(&id);
        if removed > 0 {
            trace!(%id, removed, "bindings cleared");
        }
        removed
    }

    /// Remove `id` from every ref set but keep it registered, ready to
    /// record a fresh set of bindings.
    pub fn clear_refs(&self, id: ConsumerId) -> usize {
        self.inner.bindings.borrow_mut().clear(id)
    }

    /// Move every binding, the registration and any pending dirty mark of
    /// `old` over to `new`. Used when a recycled instance gets a new id.
    pub fn rebind_consumer(&self, old: ConsumerId, new: ConsumerId) -> usize {
        let moved = self.inner.bindings.borrow_mut().rebind(old, new);
        {
            let mut consumers = self.inner.consumers.borrow_mut();
            if let Some(weak) = consumers.remove(&old) {
                consumers.entry(new).or_insert(weak);
            }
        }
        let was_dirty = self.inner.dirty.borrow_mut().swap_remove(&old);
        if was_dirty {
            self.mark_dirty(new);
        }
        debug!(%old, %new, moved, "consumer rebound");
        moved
    }

    pub fn ref_count(&self, target: TargetId, property: &str) -> usize {
        self.inner.bindings.borrow().ref_count(target, property)
    }

    pub fn consumers_of(&self, target: TargetId, property: &str) -> ConsumerList {
        self.inner.bindings.borrow().consumers_of(target, property)
    }

    pub fn is_bound(&self, id: ConsumerId, target: TargetId, property: &str) -> bool {
        self.inner.bindings.borrow().contains(id, target, property)
    }

    pub fn binding_count(&self, id: ConsumerId) -> usize {
        self.inner.bindings.borrow().binding_count(id)
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Unbind every monitor owned by `target`. Returns how many were unbound.
    pub fn clear_watches_from_target(&self, target: TargetId) -> usize {
        let monitors: SmallVec<[ConsumerId; 4]> = {
            let mut owned = self.inner.owned.borrow_mut();
            let Some(ids) = owned.get_mut(&target) else {
                return 0;
            };
            let (monitors, rest): (SmallVec<[ConsumerId; 4]>, SmallVec<[ConsumerId; 4]>) =
                ids.iter().copied().partition(|id| id.kind() == IdKind::Monitor);
            if rest.is_empty() {
                owned.remove(&target);
            } else {
                *ids = rest;
            }
            monitors
        };
        for id in &monitors {
            self.unbind_owned(*id);
        }
        debug!(%target, count = monitors.len(), "watches cleared from target");
        monitors.len()
    }

    /// Unbind everything owned by `target` and drop its ref sets.
    pub fn teardown_target(&self, target: TargetId) {
        let owned = self.inner.owned.borrow_mut().remove(&target).unwrap_or_default();
        for id in &owned {
            self.unbind_owned(*id);
        }
        let dropped = self.inner.bindings.borrow_mut().clear_target(target);
        debug!(%target, owned = owned.len(), dropped, "target torn down");
    }

    fn unbind_owned(&self, id: ConsumerId) {
        let consumer = self.inner.consumers.borrow().get(&id).and_then(Weak::upgrade);
        self.clear_binding(id);
        if let Some(consumer) = consumer {
            consumer.on_unbind(id);
        }
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Notify the consumers of `(target, property)` that it changed.
    ///
    /// Returns the number of live consumers that were notified or queued.
    pub fn fire_change(&self, target: TargetId, property: &str) -> usize {
        let ids = self.consumers_of(target, property);
        if ids.is_empty() {
            return 0;
        }
        trace!(%target, property, consumers = ids.len(), "fire change");

        let mut sync: SmallVec<[(ConsumerId, Rc<dyn Consumer>); 4]> = SmallVec::new();
        let mut notified = 0;
        for id in ids {
            let Some(consumer) = self.resolve(id) else {
                continue;
            };
            notified += 1;
            if consumer.is_sync() {
                sync.push((id, consumer));
            } else {
                self.mark_dirty(id);
            }
        }

        for (id, consumer) in sync {
            let _sync = DepthGuard::enter(&self.inner.sync_depth);
            consumer.on_dependency_changed(id, self);
        }

        // Writes made by a sync consumer are flushed by the outermost write.
        if self.inner.config.notify_mode == NotifyMode::Immediate
            && !self.inner.flushing.get()
            && self.inner.sync_depth.get() == 0
        {
            if let Err(err) = self.flush() {
                warn!(%err, "immediate flush did not settle");
            }
        }
        notified
    }

    /// Queue a recomputation for `id` unless one is already pending.
    pub fn mark_dirty(&self, id: ConsumerId) -> bool {
        if !self.inner.dirty.borrow_mut().insert(id) {
            return false;
        }
        self.inner
            .idle
            .borrow_mut()
            .push(Box::new(move |engine: &ObserveEngine| engine.dispatch(id)));
        true
    }

    fn dispatch(&self, id: ConsumerId) {
        // Cleared or rebound since it was queued.
        if !self.inner.dirty.borrow_mut().swap_remove(&id) {
            return;
        }
        match self.resolve(id) {
            Some(consumer) => consumer.on_dependency_changed(id, self),
            None => trace!(%id, "skipping notification of unknown consumer"),
        }
    }

    pub fn is_dirty(&self, id: ConsumerId) -> bool {
        self.inner.dirty.borrow().contains(&id)
    }

    pub fn dirty_count(&self) -> usize {
        self.inner.dirty.borrow().len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.idle.borrow().len()
    }

    // ------------------------------------------------------------------------
    // Idle task queue
    // ------------------------------------------------------------------------

    /// Queue an arbitrary closure behind the pending recomputations.
    pub fn push_idle_task(&self, task: impl FnOnce(&ObserveEngine) + 'static) {
        self.inner.idle.borrow_mut().push(Box::new(task));
    }

    /// Run every task queued before this call.
    pub fn update_dirty(&self) -> DrainReport {
        self.run_idle_tasks(DrainBudget::unbounded())
    }

    /// Run queued tasks until `budget` is spent.
    ///
    /// A drain started from inside a running task does nothing; the outer
    /// drain or the next call picks the work up.
    pub fn run_idle_tasks(&self, budget: DrainBudget) -> DrainReport {
        if self.inner.flushing.replace(true) {
            trace!("nested drain ignored");
            return DrainReport {
                ran: 0,
                remaining: self.pending_tasks(),
            };
        }
        let _guard = FlushGuard(&self.inner.flushing);
        let report = IdleTaskQueue::drain(&self.inner.idle, self, budget);
        if report.ran > 0 {
            debug!(ran = report.ran, remaining = report.remaining, "idle tasks drained");
        }
        report
    }

    /// Drain repeatedly until the queue is empty.
    ///
    /// Work queued by the drained tasks runs in the following round. Gives
    /// up after `max_flush_rounds` rounds, leaving the rest queued.
    pub fn flush(&self) -> Result<usize> {
        if self.inner.flushing.get() {
            return Ok(0);
        }
        let max_rounds = self.inner.config.max_flush_rounds;
        let mut total = 0;
        for _ in 0..max_rounds {
            if self.pending_tasks() == 0 {
                return Ok(total);
            }
            total += self.update_dirty().ran;
        }
        if self.pending_tasks() == 0 {
            Ok(total)
        } else {
            warn!(max_rounds, pending = self.pending_tasks(), "flush limit reached");
            Err(ObserveError::FlushLimitExceeded(max_rounds))
        }
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> EngineSnapshot {
        let bindings = self.inner.bindings.borrow();
        let mut ref_sets: Vec<RefSetSnapshot> = bindings
            .iter_ref_sets()
            .map(|(target, property, consumers)| RefSetSnapshot {
                target,
                property: property.to_owned(),
                consumers,
            })
            .collect();
        ref_sets.sort_by(|a, b| (a.target, &a.property).cmp(&(b.target, &b.property)));

        EngineSnapshot {
            notify_mode: self.inner.config.notify_mode,
            recording_depth: self.recording_depth(),
            current_recorded_id: self.current_recorded_id(),
            registered_consumers: self.inner.consumers.borrow().len(),
            dirty: self.inner.dirty.borrow().iter().copied().collect(),
            pending_tasks: self.pending_tasks(),
            total_bindings: bindings.total_bindings(),
            ref_sets,
        }
    }
}

impl Default for ObserveEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObserveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserveEngine")
            .field("notify_mode", &self.inner.config.notify_mode)
            .field("recording_depth", &self.recording_depth())
            .field("dirty", &self.dirty_count())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// Serializable view of engine state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub notify_mode: NotifyMode,
    pub recording_depth: usize,
    pub current_recorded_id: Option<ConsumerId>,
    pub registered_consumers: usize,
    pub dirty: Vec<ConsumerId>,
    pub pending_tasks: usize,
    pub total_bindings: usize,
    pub ref_sets: Vec<RefSetSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefSetSnapshot {
    pub target: TargetId,
    pub property: String,
    pub consumers: usize,
}
