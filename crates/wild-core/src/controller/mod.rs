//! The phase controller: owns loop state and executes transition rules.
//!
//! `WildLoop` is the host API the delivery mechanism talks to. All queue and
//! state mutation is serialized through a single async lock, so overlapping
//! timer callbacks, poll ticks, and response callbacks cannot interleave
//! mid-transition. Every delayed or background task captures the epoch
//! counter at creation and re-checks it before taking effect; `start` and
//! `stop` bump the epoch, turning stale callbacks into silent no-ops.

mod loop_state;

pub use loop_state::{LoopState, TerminationConditions};

use crate::poller;
use crate::prompts::PromptBuilder;
use crate::queue::EventQueue;
use crate::signal_parser::{self, AlertResolution, LoopSignal};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wild_proto::{
    priority, Error, EventKind, ExecutionBackend, JobSpec, Phase, QueuedEvent, Result, RunStatus,
    Stage,
};

/// Delay before re-enqueuing an exploring prompt on the very first
/// iteration. Short, but long enough for a UI to render the first exchange.
const FIRST_EXPLORE_DELAY: Duration = Duration::from_millis(1500);

/// Delay before re-enqueuing an exploring prompt on later iterations.
const EXPLORE_DELAY: Duration = Duration::from_secs(3);

/// Poll cadence while monitoring a job batch.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reason the wild loop terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// COMPLETE signal detected in a response.
    Completed,
    /// Maximum iterations reached.
    MaxIterations,
    /// Maximum runtime exceeded.
    MaxRuntime,
    /// Manually stopped.
    Stopped,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::MaxIterations => "max_iterations",
            TerminationReason::MaxRuntime => "max_runtime",
            TerminationReason::Stopped => "stopped",
        }
    }

    /// Returns true if this is a successful completion (not a limit or a
    /// manual stop).
    pub fn is_success(self) -> bool {
        matches!(self, TerminationReason::Completed)
    }
}

/// Observer-facing snapshot of the loop, for UIs to render status.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub active: bool,
    pub paused: bool,
    pub stage: Stage,
    pub phase: Phase,
    pub iteration: u64,
    pub goal: String,
    pub tracked_job_id: Option<String>,
    pub queue_len: usize,
    pub runs_tracked: usize,
    pub runs_terminal: usize,
    pub runs_failed: usize,
    pub alerts_pending: usize,
    pub elapsed_seconds: u64,
    pub last_error: Option<String>,
}

/// Mutable core guarded by a single lock: state, queue, and the ephemeral
/// observed-status caches rebuilt every loop run.
#[derive(Debug, Default)]
pub(crate) struct LoopCore {
    pub(crate) state: LoopState,
    pub(crate) queue: EventQueue,
    /// Last observed status per tracked run.
    pub(crate) last_run_status: HashMap<String, RunStatus>,
    /// Alerts already converted into queued events.
    pub(crate) seen_alerts: HashSet<String>,
    /// Run ids that existed before this loop run created anything.
    pub(crate) preexisting_runs: HashSet<String>,
    /// One-shot guard for the running -> analyzing transition; cleared only
    /// on re-entering the running stage.
    pub(crate) analysis_triggered: bool,
    /// Pending alert count from the most recent poll, for status display.
    pub(crate) pending_alert_count: usize,
    /// Monotonic id source for injected steer events.
    pub(crate) steer_seq: u64,
    /// Bumped on every start/stop; stale timer and poll callbacks check it.
    pub(crate) epoch: u64,
}

impl LoopCore {
    fn reset_caches(&mut self) {
        self.last_run_status.clear();
        self.seen_alerts.clear();
        self.preexisting_runs.clear();
        self.analysis_triggered = false;
        self.pending_alert_count = 0;
    }

    /// Tears the loop down to idle. Irreversible; restarting requires a new
    /// `start`.
    fn stop(&mut self) {
        self.epoch += 1;
        self.queue.clear();
        self.reset_caches();
        self.state.reset();
    }

    /// Evaluates the mechanically-checked termination conditions.
    fn check_termination(&self) -> Option<TerminationReason> {
        let conditions = &self.state.termination;

        if let Some(max) = conditions.max_iterations {
            if self.state.iteration >= max {
                return Some(TerminationReason::MaxIterations);
            }
        }

        if let Some(max) = conditions.max_time_seconds {
            if self.state.elapsed_seconds() >= max {
                return Some(TerminationReason::MaxRuntime);
            }
        }

        // max_tokens and custom_condition are advisory only.
        None
    }

    fn status(&self) -> LoopStatus {
        let runs_terminal = self
            .last_run_status
            .values()
            .filter(|s| s.is_terminal())
            .count();
        let runs_failed = self
            .last_run_status
            .values()
            .filter(|s| matches!(s, RunStatus::Failed | RunStatus::Stopped))
            .count();
        LoopStatus {
            active: self.state.active,
            paused: self.state.paused,
            stage: self.state.stage,
            phase: self.state.phase(),
            iteration: self.state.iteration,
            goal: self.state.goal.clone(),
            tracked_job_id: self.state.tracked_job_id.clone(),
            queue_len: self.queue.len(),
            runs_tracked: self.last_run_status.len(),
            runs_terminal,
            runs_failed,
            alerts_pending: self.pending_alert_count,
            elapsed_seconds: self.state.elapsed_seconds(),
            last_error: self.state.last_error.clone(),
        }
    }
}

/// What to do after the lock is released in `on_response_complete`.
enum Followup {
    None,
    Retry { delay: Duration, next: u64 },
    SubmitJob(JobSpec),
    ResolveAlert(AlertResolution),
    BackToExploring { next: u64 },
}

/// The autonomous control loop host API.
///
/// Cloning is cheap; clones share the same loop.
#[derive(Clone)]
pub struct WildLoop {
    pub(crate) core: Arc<Mutex<LoopCore>>,
    pub(crate) backend: Arc<dyn ExecutionBackend>,
    pub(crate) prompts: Arc<PromptBuilder>,
}

impl WildLoop {
    pub fn new(backend: Arc<dyn ExecutionBackend>, prompts: PromptBuilder) -> Self {
        Self {
            core: Arc::new(Mutex::new(LoopCore::default())),
            backend,
            prompts: Arc::new(prompts),
        }
    }

    /// Arms the loop with a goal and enters the exploring stage.
    ///
    /// Snapshots the ids of runs that already exist so events from earlier
    /// work are not attributed to this loop run, then queues the first
    /// exploring prompt.
    pub async fn start(&self, goal: &str, session_id: &str) -> Result<()> {
        let epoch = {
            let mut core = self.core.lock().await;
            if core.state.active {
                return Err(Error::AlreadyActive);
            }
            core.epoch += 1;
            core.queue.clear();
            core.reset_caches();
            core.state.reset();
            core.state.active = true;
            core.state.stage = Stage::Exploring;
            core.state.goal = goal.to_string();
            core.state.session_id = session_id.to_string();
            core.state.started_at = Some(Utc::now());
            core.epoch
        };

        info!(goal, session_id, "Wild loop started");
        self.snapshot_preexisting_runs(epoch).await;
        self.enqueue_exploring_now(epoch, 1).await;
        Ok(())
    }

    /// Pauses the loop, preserving stage and queue contents.
    ///
    /// Safe to call at any point, including mid-delivery: the busy flag is
    /// cleared so no stale in-flight assumption blocks a later `resume`.
    pub async fn pause(&self) {
        let mut core = self.core.lock().await;
        if !core.state.active || core.state.paused {
            return;
        }
        core.state.paused = true;
        core.state.busy = false;
        info!(stage = core.state.stage.as_str(), "Wild loop paused");
    }

    /// Resumes a paused loop in its previous stage.
    ///
    /// Resuming into the exploring stage with an empty queue re-seeds the
    /// queue with a fresh exploring prompt; otherwise delivery picks up
    /// where it left off.
    pub async fn resume(&self) {
        let (epoch, next_iteration, need_prompt) = {
            let mut core = self.core.lock().await;
            if !core.state.active || !core.state.paused {
                return;
            }
            core.state.paused = false;
            core.state.escalated = false;
            let need_prompt = core.state.stage == Stage::Exploring && core.queue.is_empty();
            (core.epoch, core.state.iteration + 1, need_prompt)
        };

        info!("Wild loop resumed");
        if need_prompt {
            self.enqueue_exploring_now(epoch, next_iteration).await;
        }
    }

    /// Stops the loop and clears all run state.
    pub async fn stop(&self) {
        let mut core = self.core.lock().await;
        if !core.state.active {
            return;
        }
        core.stop();
        info!(reason = TerminationReason::Stopped.as_str(), "Wild loop stopped");
    }

    /// Replaces the termination conditions. Takes effect from the next
    /// completed response cycle.
    pub async fn set_termination_conditions(&self, conditions: TerminationConditions) {
        let mut core = self.core.lock().await;
        core.state.termination = conditions;
    }

    /// Removes and returns the head of the queue for delivery to the agent.
    ///
    /// Returns `None` while idle, paused, or while a previous delivery is
    /// still in flight; there is never more than one in-flight request.
    pub async fn consume_head_of_queue(&self) -> Option<QueuedEvent> {
        let mut core = self.core.lock().await;
        if !core.state.active || core.state.paused || core.state.busy {
            return None;
        }
        let event = core.queue.dequeue()?;
        core.state.busy = true;
        debug!(id = %event.id, kind = event.kind.as_str(), "Delivering queue head");
        Some(event)
    }

    /// Feeds a completed agent response back into the loop.
    ///
    /// Increments the iteration counter and re-evaluates termination before
    /// any signal-based transition; a termination breach wins regardless of
    /// what the response contains.
    pub async fn on_response_complete(&self, response: &str) {
        let signal = signal_parser::parse_signal(response);

        let epoch;
        let followup = {
            let mut core = self.core.lock().await;
            if !core.state.active {
                debug!("Response received while idle, ignoring");
                return;
            }
            epoch = core.epoch;
            core.state.busy = false;
            core.state.iteration += 1;

            if let Some(reason) = core.check_termination() {
                info!(
                    reason = reason.as_str(),
                    iteration = core.state.iteration,
                    "Termination condition met"
                );
                core.stop();
                return;
            }

            // Completion and escalation signals are honored in any stage.
            match signal {
                Some(LoopSignal::Complete) => {
                    info!(
                        reason = TerminationReason::Completed.as_str(),
                        iteration = core.state.iteration,
                        "Completion signal received"
                    );
                    core.stop();
                    return;
                }
                Some(LoopSignal::NeedsHuman) => {
                    info!("Escalation signal received, pausing for human input");
                    core.state.paused = true;
                    core.state.escalated = true;
                    return;
                }
                _ => {}
            }

            if core.state.paused {
                // A pause raced the delivery; hold position until resume.
                return;
            }

            match core.state.stage {
                Stage::Running => signal_parser::parse_alert_resolution(response)
                    .map_or(Followup::None, Followup::ResolveAlert),
                Stage::Exploring => match signal_parser::parse_job_spec(response) {
                    Some(spec) => Followup::SubmitJob(spec),
                    None => {
                        let delay = if core.state.iteration <= 1 {
                            FIRST_EXPLORE_DELAY
                        } else {
                            EXPLORE_DELAY
                        };
                        Followup::Retry {
                            delay,
                            next: core.state.iteration + 1,
                        }
                    }
                },
                Stage::Analyzing => {
                    // CONTINUE, or no directive at all: begin the next cycle.
                    core.state.stage = Stage::Exploring;
                    core.state.tracked_job_id = None;
                    core.state.job_reporting = false;
                    core.last_run_status.clear();
                    core.seen_alerts.clear();
                    core.analysis_triggered = false;
                    core.pending_alert_count = 0;
                    info!(iteration = core.state.iteration, "Analysis done, exploring again");
                    Followup::BackToExploring {
                        next: core.state.iteration + 1,
                    }
                }
            }
        };

        match followup {
            Followup::None => {}
            Followup::Retry { delay, next } => self.schedule_exploring(delay, epoch, next),
            Followup::SubmitJob(spec) => self.submit_job(epoch, spec).await,
            Followup::ResolveAlert(resolution) => self.resolve_alert(epoch, resolution).await,
            Followup::BackToExploring { next } => {
                // Runs created by the finished batch are pre-existing now.
                self.snapshot_preexisting_runs(epoch).await;
                self.schedule_exploring(EXPLORE_DELAY, epoch, next);
            }
        }
    }

    /// Injects a direct user steer at the most urgent priority band.
    pub async fn enqueue_steer(&self, title: &str, prompt: &str) -> bool {
        let mut core = self.core.lock().await;
        core.steer_seq += 1;
        let id = format!("steer-{}", core.steer_seq);
        core.queue.enqueue(QueuedEvent::new(
            id,
            EventKind::Steer,
            priority::STEER,
            title,
            prompt,
        ))
    }

    /// Overrides the queue order; see [`EventQueue::reorder`].
    pub async fn reorder_queue(&self, ordered_ids: &[String]) {
        self.core.lock().await.queue.reorder(ordered_ids);
    }

    /// Removes a queued event by id.
    pub async fn remove_queued(&self, id: &str) -> bool {
        self.core.lock().await.queue.remove(id)
    }

    /// Inserts an event at a position chosen by the UI.
    pub async fn insert_queued_at(&self, event: QueuedEvent, index: usize) -> bool {
        self.core.lock().await.queue.insert_at(event, index)
    }

    /// Snapshot of queue contents in delivery order.
    pub async fn queue_events(&self) -> Vec<QueuedEvent> {
        self.core.lock().await.queue.events().to_vec()
    }

    pub async fn stage(&self) -> Stage {
        self.core.lock().await.state.stage
    }

    pub async fn phase(&self) -> Phase {
        self.core.lock().await.state.phase()
    }

    pub async fn iteration(&self) -> u64 {
        self.core.lock().await.state.iteration
    }

    /// Full observer-facing snapshot including run/alert summary counts.
    pub async fn status(&self) -> LoopStatus {
        self.core.lock().await.status()
    }

    /// Records the runs that already exist so the poller and status summary
    /// only attribute new work to this loop run.
    async fn snapshot_preexisting_runs(&self, epoch: u64) {
        match self.backend.list_runs().await {
            Ok(runs) => {
                let mut core = self.core.lock().await;
                if core.epoch == epoch {
                    core.preexisting_runs = runs.into_iter().map(|r| r.id).collect();
                }
            }
            Err(e) => warn!(error = %e, "Failed to snapshot existing runs"),
        }
    }

    /// Submits a parsed job specification to the execution backend.
    ///
    /// On success the loop switches to the running stage and starts the
    /// poller. On failure it stays in exploring and retries with a fresh
    /// exploring prompt after a delay.
    async fn submit_job(&self, epoch: u64, spec: JobSpec) {
        let parallelism = spec.max_runs.unwrap_or(1);

        let job = match self.backend.create_job(&spec).await {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, name = %spec.name, "Job creation failed, retrying exploration");
                self.record_error_and_retry(epoch, format!("job creation failed: {e}"))
                    .await;
                return;
            }
        };

        if let Err(e) = self.backend.start_job(&job.id, parallelism).await {
            warn!(error = %e, job = %job.id, "Job start failed, retrying exploration");
            self.record_error_and_retry(epoch, format!("job start failed: {e}"))
                .await;
            return;
        }

        {
            let mut core = self.core.lock().await;
            if core.epoch != epoch || !core.state.active {
                return;
            }
            info!(job = %job.id, name = %job.name, runs = job.run_ids.len(), "Job submitted, monitoring");
            core.state.stage = Stage::Running;
            core.state.tracked_job_id = Some(job.id);
            core.state.job_reporting = false;
            core.state.last_error = None;
            core.last_run_status.clear();
            core.seen_alerts.clear();
            core.analysis_triggered = false;
            core.pending_alert_count = 0;
        }

        poller::spawn(self.clone(), epoch);
    }

    /// Submits an alert-resolution directive parsed from a response.
    async fn resolve_alert(&self, epoch: u64, resolution: AlertResolution) {
        match self
            .backend
            .respond_to_alert(&resolution.alert_id, &resolution.choice)
            .await
        {
            Ok(()) => {
                info!(alert = %resolution.alert_id, choice = %resolution.choice, "Alert resolution submitted");
            }
            Err(e) => {
                warn!(error = %e, alert = %resolution.alert_id, "Alert resolution failed");
                let mut core = self.core.lock().await;
                if core.epoch == epoch {
                    core.state.last_error = Some(format!("alert resolution failed: {e}"));
                }
            }
        }
    }

    async fn record_error_and_retry(&self, epoch: u64, message: String) {
        let next = {
            let mut core = self.core.lock().await;
            if core.epoch != epoch || !core.state.active {
                return;
            }
            core.state.last_error = Some(message);
            core.state.iteration + 1
        };
        self.schedule_exploring(EXPLORE_DELAY, epoch, next);
    }

    /// Queues the exploring prompt for `next_iteration`, re-checking the
    /// loop guards at delivery time.
    async fn enqueue_exploring_now(&self, epoch: u64, next_iteration: u64) {
        let goal = {
            let core = self.core.lock().await;
            if !exploring_guard(&core, epoch) {
                return;
            }
            core.state.goal.clone()
        };

        let (prompt, provenance) = self.prompts.exploring(&goal, next_iteration).await;

        let mut core = self.core.lock().await;
        // A stop/pause/stage change may have raced the render.
        if !exploring_guard(&core, epoch) {
            return;
        }
        let mut event = QueuedEvent::new(
            format!("exploring-{next_iteration}"),
            EventKind::Exploring,
            priority::EXPLORING,
            format!("Exploration step {next_iteration}"),
            prompt,
        );
        if let Some(record) = provenance {
            event = event.with_provenance(record);
        }
        if core.queue.enqueue(event) {
            debug!(iteration = next_iteration, "Queued exploring prompt");
        }
    }

    /// Schedules a delayed exploring prompt; a stop, pause, or stage change
    /// during the delay voids it.
    fn schedule_exploring(&self, delay: Duration, epoch: u64, next_iteration: u64) {
        let wild = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            wild.enqueue_exploring_now(epoch, next_iteration).await;
        });
    }
}

/// True while the loop can still accept an exploring prompt for `epoch`.
fn exploring_guard(core: &LoopCore, epoch: u64) -> bool {
    core.epoch == epoch
        && core.state.active
        && !core.state.paused
        && core.state.stage == Stage::Exploring
}
