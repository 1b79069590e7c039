//! Engine Configuration
//!
//! `ObserveConfig` controls how writes are turned into recomputation. Every
//! field has a default, so a partial JSON document is enough:
//!
//! ```rust,ignore
//! let config = ObserveConfig::from_json_str(r#"{ "notify_mode": "immediate" }"#)?;
//! let engine = ObserveEngine::with_config(config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the engine reacts after a write marks consumers dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Dirty consumers wait in the idle task queue until the owner drains it
    /// (once per frame, for example).
    #[default]
    Deferred,

    /// The queue is flushed before the write returns, unless a flush is
    /// already running further up the stack.
    Immediate,
}

/// Configuration for an [`ObserveEngine`](crate::observe::ObserveEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveConfig {
    /// Write handling strategy.
    pub notify_mode: NotifyMode,

    /// Time budget for a single `run_idle_tasks` call driven by
    /// [`DrainBudget::from_config`](crate::observe::DrainBudget::from_config).
    /// Zero means unbounded.
    pub idle_budget_ms: u64,

    /// Upper bound on `update_dirty` rounds within one `flush`.
    pub max_flush_rounds: usize,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            notify_mode: NotifyMode::Deferred,
            idle_budget_ms: 16,
            max_flush_rounds: 100,
        }
    }
}

impl ObserveConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Idle budget as a duration, `None` when unbounded.
    pub fn idle_budget(&self) -> Option<Duration> {
        (self.idle_budget_ms > 0).then(|| Duration::from_millis(self.idle_budget_ms))
    }
}
