//! # wild-proto
//!
//! Shared types, error definitions, and collaborator traits for the wild loop.
//!
//! This crate provides the foundational abstractions used across the wild
//! loop crates, including:
//! - `QueuedEvent` and priority bands for the delivery queue
//! - The `ExecutionBackend` trait and its job/run/alert types
//! - The `PromptRenderer` trait and provenance records
//! - Loop stage and phase labels
//! - Common error types

mod backend;
mod error;
mod event;
mod render;
mod state;

pub use backend::{
    Alert, AlertSeverity, AlertStatus, ExecutionBackend, Job, JobSpec, Run, RunStatus,
};
pub use error::{Error, Result};
pub use event::{priority, EventKind, QueuedEvent};
pub use render::{PromptRenderer, PromptType, ProvenanceRecord, RenderRequest};
pub use state::{Phase, Stage};
