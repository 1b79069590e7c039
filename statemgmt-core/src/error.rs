//! Error types for the state management core.
//!
//! Only caller-protocol violations surface as errors. Stale references and
//! empty pools resolve to `None` or a no-op at the call site instead.

use thiserror::Error;

use crate::observe::ConsumerId;

/// Errors reported by the observation engine, monitors and configuration.
#[derive(Debug, Error)]
pub enum ObserveError {
    /// `stop_record_dependencies` was called with an empty recording stack.
    #[error("unbalanced recording: stop called with an empty recording stack")]
    UnbalancedRecording,

    /// `init_run` was called on a monitor that already ran once.
    #[error("monitor {0} has already been initialized")]
    MonitorAlreadyInitialized(ConsumerId),

    /// The monitor has not captured its baseline yet, or has been unbound.
    #[error("monitor {0} is not initialized or has been unbound")]
    MonitorNotInitialized(ConsumerId),

    /// `value(Some(path))` named a path the monitor does not watch.
    #[error("path `{0}` is not watched by this monitor")]
    PathNotWatched(String),

    /// `value(None)` was called while no path was dirty.
    #[error("no watched path is dirty")]
    NoDirtyPath,

    /// A watch path was empty or contained an empty segment.
    #[error("invalid watch path `{0}`")]
    InvalidPath(String),

    /// Watched paths of a decorator monitor are fixed at registration.
    #[error("monitor {0} was declared by a decorator; its paths cannot change")]
    DecoratorMonitorImmutable(ConsumerId),

    /// A flush kept producing new work past the configured round limit.
    #[error("flush did not settle after {0} rounds")]
    FlushLimitExceeded(usize),

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ObserveError>;
