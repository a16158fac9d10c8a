use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats::StatsSnapshot;

/// Lifecycle of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
    /// Reconnect budget exhausted. Carries the last failure.
    Failed(String),
}

impl PipelineState {
    /// True while a worker owns the run (a `start` in these states is a no-op).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming | Self::Reconnecting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Streaming => f.write_str("streaming"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Full status view returned by `LifecycleController::status_report`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: PipelineState,
    pub last_error: Option<String>,
    /// Source URL without credentials.
    pub source: Option<String>,
    /// Sequence number of the readable result, if any.
    pub latest_sequence: Option<u64>,
    pub stats: StatsSnapshot,
}
