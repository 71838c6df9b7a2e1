//! Queued event types for the wild loop's delivery queue.

use crate::ProvenanceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority bands for queued events. Lower value = more urgent.
pub mod priority {
    /// Direct user steer.
    pub const STEER: i32 = 10;
    /// Critical alert raised by the execution backend.
    pub const ALERT_CRITICAL: i32 = 20;
    /// Warning-level alert.
    pub const ALERT_WARNING: i32 = 30;
    /// A run finished with failure.
    pub const RUN_FAILED: i32 = 40;
    /// A run finished successfully.
    pub const RUN_SUCCEEDED: i32 = 50;
    /// Analysis trigger once a job batch settles.
    pub const ANALYSIS: i32 = 70;
    /// Routine exploration continuation.
    pub const EXPLORING: i32 = 90;
}

/// The kind of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Steer,
    Alert,
    RunEvent,
    Analysis,
    Exploring,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Steer => "steer",
            EventKind::Alert => "alert",
            EventKind::RunEvent => "run_event",
            EventKind::Analysis => "analysis",
            EventKind::Exploring => "exploring",
        }
    }
}

/// An item awaiting delivery to the reasoning agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Opaque unique id; re-enqueuing an existing id is a no-op.
    pub id: String,

    /// Priority band; lower value is delivered first.
    pub priority: i32,

    /// Short human-readable label (display only, not used for ordering).
    pub title: String,

    /// Fully rendered prompt text to deliver.
    pub prompt: String,

    /// The kind of event this prompt represents.
    pub kind: EventKind,

    /// Creation timestamp, used as an ordering tie-breaker.
    pub created_at: DateTime<Utc>,

    /// How `prompt` was produced, when known.
    pub provenance: Option<ProvenanceRecord>,
}

impl QueuedEvent {
    /// Creates a new event stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        kind: EventKind,
        priority: i32,
        title: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            title: title.into(),
            prompt: prompt.into(),
            kind,
            created_at: Utc::now(),
            provenance: None,
        }
    }

    /// Attaches a provenance record describing how the prompt was built.
    #[must_use]
    pub fn with_provenance(mut self, provenance: ProvenanceRecord) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Overrides the creation timestamp. Intended for tests that need a
    /// deterministic tie-breaker.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
