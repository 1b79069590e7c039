//! Idle Task Queue
//!
//! Deferred recomputation closures wait here until the owner of the engine
//! gives them time, typically once per frame. The queue is append-only with
//! a `[first, end)` window:
//!
//! - `first` advances as tasks complete, so a drain that runs out of budget
//!   resumes exactly where it stopped on the next call.
//! - `end` is sampled when a drain starts. Tasks appended by the tasks
//!   themselves land past `end` and run on the next drain, which keeps one
//!   drain from looping forever on self-scheduling work.
//!
//! Not advancing `first` is the only form of cancellation: work that was
//! never reached simply stays queued (or is dropped by `clear`).

use std::cell::RefCell;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ObserveConfig;

/// A deferred closure, run with the queue's context.
pub type IdleTask<C> = Box<dyn FnOnce(&C)>;

/// Limits for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainBudget {
    time: Option<Duration>,
    max_tasks: Option<usize>,
}

impl DrainBudget {
    /// No limits: everything in the window runs.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Stop once `time` has elapsed since the drain started.
    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    /// Stop after `max_tasks` tasks. Zero runs nothing.
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    /// The configured per-frame idle budget.
    pub fn from_config(config: &ObserveConfig) -> Self {
        Self {
            time: config.idle_budget(),
            max_tasks: None,
        }
    }

    fn exhausted(&self, started: Instant, ran: usize) -> bool {
        self.max_tasks.is_some_and(|max| ran >= max)
            || self.time.is_some_and(|time| started.elapsed() >= time)
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Tasks run by this drain.
    pub ran: usize,
    /// Tasks still queued afterwards, including ones appended during it.
    pub remaining: usize,
}

pub struct IdleTaskQueue<C> {
    tasks: Vec<Option<IdleTask<C>>>,
    first: usize,
}

impl<C> IdleTaskQueue<C> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            first: 0,
        }
    }

    pub fn push(&mut self, task: IdleTask<C>) {
        self.tasks.push(Some(task));
    }

    /// Start of the pending window.
    pub fn first(&self) -> usize {
        self.first
    }

    /// End of the pending window.
    pub fn end(&self) -> usize {
        self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending task without running it.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.tasks.clear();
        self.first = 0;
        dropped
    }

    fn take_before(&mut self, end: usize) -> Option<IdleTask<C>> {
        while self.first < end.min(self.tasks.len()) {
            let task = self.tasks[self.first].take();
            self.first += 1;
            if task.is_some() {
                return task;
            }
        }
        None
    }

    fn compact(&mut self) {
        if self.first == self.tasks.len() {
            self.tasks.clear();
            self.first = 0;
        } else if self.first > 64 && self.first * 2 > self.tasks.len() {
            self.tasks.drain(..self.first);
            self.first = 0;
        }
    }

    /// Run the tasks in `[first, end)` as observed on entry, within `budget`.
    ///
    /// The queue is only borrowed between tasks, so a task may push onto the
    /// same queue through `ctx`.
    pub fn drain(queue: &RefCell<Self>, ctx: &C, budget: DrainBudget) -> DrainReport {
        let started = Instant::now();
        let end = queue.borrow().end();
        let mut ran = 0;

        while !budget.exhausted(started, ran) {
            let next = queue.borrow_mut().take_before(end);
            let Some(task) = next else { break };
            task(ctx);
            ran += 1;
        }

        let mut queue = queue.borrow_mut();
        queue.compact();
        DrainReport {
            ran,
            remaining: queue.len(),
        }
    }
}

impl<C> Default for IdleTaskQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for IdleTaskQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleTaskQueue")
            .field("first", &self.first)
            .field("end", &self.end())
            .finish()
    }
}
