//! Execution backend interface for sweep jobs, runs, and alerts.
//!
//! The wild loop never executes anything itself; it drives a backend that
//! creates job batches (hyperparameter sweeps), reports per-run status, and
//! raises alerts that may need a decision from the agent or a human.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a single run (one unit of a job batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl RunStatus {
    /// Returns true once the run can no longer change status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        }
    }
}

/// A single execution unit within a job batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    /// The command line this run executes.
    pub command: String,
}

/// Severity of an alert raised against a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

/// Resolution state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Resolved,
    Dismissed,
}

/// An alert raised by the backend against a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub run_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Choices the backend accepts as a response to this alert.
    pub choices: Vec<String>,
    pub status: AlertStatus,
}

/// A job batch (e.g. a hyperparameter sweep) tracked as one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Member runs belonging to this batch.
    pub run_ids: Vec<String>,
}

/// A job specification extracted from agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub base_command: String,
    /// Hyperparameter grid: parameter name to candidate values.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Cap on concurrently scheduled runs.
    #[serde(default)]
    pub max_runs: Option<u32>,
}

/// Interface to the system that executes sweeps and reports their status.
///
/// All calls are asynchronous and fallible; the loop converts failures into
/// retry-after-delay behavior rather than propagating them as hard faults.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Lists all runs known to the backend.
    async fn list_runs(&self) -> Result<Vec<Run>>;

    /// Fetches a job batch and its member run ids.
    async fn get_job(&self, id: &str) -> Result<Job>;

    /// Lists all alerts known to the backend.
    async fn list_alerts(&self) -> Result<Vec<Alert>>;

    /// Creates a job batch from a specification.
    async fn create_job(&self, spec: &JobSpec) -> Result<Job>;

    /// Starts a created job with the given parallelism.
    async fn start_job(&self, id: &str, parallelism: u32) -> Result<()>;

    /// Submits a choice in response to a pending alert.
    async fn respond_to_alert(&self, id: &str, choice: &str) -> Result<()>;

    /// Fetches the log text of a run.
    async fn get_run_log(&self, id: &str) -> Result<String>;
}
