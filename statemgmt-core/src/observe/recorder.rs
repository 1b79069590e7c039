//! Dependency Recorder
//!
//! The recording stack attributes property reads to the consumer that is
//! currently rendering or computing. Each frame is either a consumer id or
//! an unobserved marker pushed by `execute_unobserved`; only the top frame
//! matters.
//!
//! Nesting is allowed: a component that renders a child component pushes a
//! second frame, and reads inside the child are attributed to the child
//! until its frame is popped.
//!
//! Frames pushed through a guard (`record`, `execute_unobserved`) are
//! removed only by that guard. A stray stop cannot pop them, and a stray
//! start inside them is discarded when the guard ends.

/// One recording frame. `None` suspends recording.
pub type Frame = Option<super::ConsumerId>;

/// Position of a guarded frame, handed back to [`RecordingStack::exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardBase(usize);

#[derive(Debug, Default)]
pub struct RecordingStack {
    frames: Vec<Frame>,
    /// Depth of each open guarded frame, innermost last. `pop` never goes
    /// below the innermost one.
    floors: Vec<usize>,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pop the top frame. `None` means there is no frame above the innermost
    /// guarded frame (or the stack is empty).
    pub fn pop(&mut self) -> Option<Frame> {
        let floor = self.floors.last().copied().unwrap_or(0);
        if self.frames.len() <= floor {
            return None;
        }
        self.frames.pop()
    }

    /// Push a frame that only [`exit`](Self::exit) may remove.
    pub fn enter(&mut self, frame: Frame) -> GuardBase {
        let base = self.frames.len();
        self.frames.push(frame);
        self.floors.push(base + 1);
        GuardBase(base)
    }

    /// Remove the guarded frame at `base` and anything left above it.
    ///
    /// Returns how many unbalanced frames were discarded along with it.
    pub fn exit(&mut self, base: GuardBase) -> usize {
        let leftover = self.frames.len().saturating_sub(base.0 + 1);
        self.frames.truncate(base.0);
        while self.floors.last().is_some_and(|floor| *floor > base.0) {
            self.floors.pop();
        }
        leftover
    }

    /// The consumer reads are currently attributed to.
    pub fn current(&self) -> Option<super::ConsumerId> {
        self.frames.last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame. Only used when an engine is reset.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.floors.clear();
    }
}
