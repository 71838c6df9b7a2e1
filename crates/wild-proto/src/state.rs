//! Loop stage and observer-facing phase labels.

use serde::{Deserialize, Serialize};

/// The logical cycle position of an active loop.
///
/// Persists across pause/resume; only `stop` discards it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Driving the agent through open-ended exploration of the goal.
    #[default]
    Exploring,
    /// A job batch has been submitted and is being monitored.
    Running,
    /// All tracked runs settled; the agent is analyzing results.
    Analyzing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Exploring => "exploring",
            Stage::Running => "running",
            Stage::Analyzing => "analyzing",
        }
    }
}

/// Finer-grained status label surfaced to observers.
///
/// Derived from the stage, the paused flags, and transient sub-states such
/// as "a sweep was just created and has not begun reporting yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Starting,
    Planning,
    Monitoring,
    Reacting,
    Waiting,
    WaitingForHuman,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Planning => "planning",
            Phase::Monitoring => "monitoring",
            Phase::Reacting => "reacting",
            Phase::Waiting => "waiting",
            Phase::WaitingForHuman => "waiting_for_human",
        }
    }
}
