//! Loop state for the phase controller.
//!
//! `LoopState` is created on `start`, mutated by every transition, and reset
//! to its zero value on `stop`. Termination conditions are the one field that
//! survives a reset, since observers configure them independently of any
//! single loop run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wild_proto::{Phase, Stage};

/// Termination conditions evaluated once per completed response cycle.
///
/// Only `max_iterations` and `max_time_seconds` are mechanically checked;
/// `max_tokens` and `custom_condition` are advisory and surfaced to the agent
/// as context only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationConditions {
    pub max_iterations: Option<u64>,
    pub max_time_seconds: Option<u64>,
    pub max_tokens: Option<u64>,
    pub custom_condition: Option<String>,
}

/// The phase controller's authoritative state.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    /// False means idle/stopped.
    pub active: bool,

    /// Independent of `active`; a paused loop retains its stage and queue.
    pub paused: bool,

    /// Set when a NEEDS_HUMAN escalation caused the pause.
    pub escalated: bool,

    /// True while a dequeued prompt is in flight to the agent.
    pub busy: bool,

    /// The logical cycle position; persists across pause/resume.
    pub stage: Stage,

    /// Completed request/response cycles.
    pub iteration: u64,

    /// Free-text objective supplied at start; immutable for one loop run.
    pub goal: String,

    /// Chat session the loop is bound to.
    pub session_id: String,

    /// Set on `start`, cleared on `stop`.
    pub started_at: Option<DateTime<Utc>>,

    pub termination: TerminationConditions,

    /// The job batch currently being monitored, if any.
    pub tracked_job_id: Option<String>,

    /// True once the tracked job has reported at least one member status.
    pub job_reporting: bool,

    /// Last user-visible failure, for UI display.
    pub last_error: Option<String>,
}

impl LoopState {
    /// Seconds elapsed since the loop started, or 0 when idle.
    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at
            .map(|started| (Utc::now() - started).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Derives the observer-facing phase label.
    pub fn phase(&self) -> Phase {
        if !self.active {
            return Phase::Idle;
        }
        if self.paused {
            return if self.escalated {
                Phase::WaitingForHuman
            } else {
                Phase::Waiting
            };
        }
        match self.stage {
            Stage::Exploring => {
                if self.iteration == 0 {
                    Phase::Starting
                } else {
                    Phase::Planning
                }
            }
            // A sweep that was just created has not begun reporting yet.
            Stage::Running => {
                if self.job_reporting {
                    Phase::Monitoring
                } else {
                    Phase::Starting
                }
            }
            Stage::Analyzing => Phase::Reacting,
        }
    }

    /// Resets to the zero value, preserving termination conditions.
    pub fn reset(&mut self) {
        let termination = self.termination.clone();
        *self = LoopState {
            termination,
            ..LoopState::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_derivation() {
        let mut state = LoopState::default();
        assert_eq!(state.phase(), Phase::Idle);

        state.active = true;
        state.stage = Stage::Exploring;
        assert_eq!(state.phase(), Phase::Starting);

        state.iteration = 2;
        assert_eq!(state.phase(), Phase::Planning);

        state.stage = Stage::Running;
        assert_eq!(state.phase(), Phase::Starting);
        state.job_reporting = true;
        assert_eq!(state.phase(), Phase::Monitoring);

        state.stage = Stage::Analyzing;
        assert_eq!(state.phase(), Phase::Reacting);

        state.paused = true;
        assert_eq!(state.phase(), Phase::Waiting);
        state.escalated = true;
        assert_eq!(state.phase(), Phase::WaitingForHuman);
    }

    #[test]
    fn test_reset_preserves_termination_conditions() {
        let mut state = LoopState {
            active: true,
            iteration: 7,
            goal: "tune batch size".to_string(),
            termination: TerminationConditions {
                max_iterations: Some(10),
                ..TerminationConditions::default()
            },
            ..LoopState::default()
        };

        state.reset();

        assert!(!state.active);
        assert_eq!(state.iteration, 0);
        assert!(state.goal.is_empty());
        assert_eq!(state.termination.max_iterations, Some(10));
    }
}
