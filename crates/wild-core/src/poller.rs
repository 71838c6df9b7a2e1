//! Polling-based detection of job status changes.
//!
//! While the loop is in the running stage a background task polls the
//! execution backend on a fixed cadence, diffs the observed run and alert
//! state against the previous tick, and enqueues an event for anything new.
//! Once every member run is terminal and no alerts are pending the loop
//! advances to the analyzing stage; a one-shot guard keeps that transition
//! and its analysis event exactly-once even when ticks overlap a response
//! callback.

use crate::controller::{WildLoop, POLL_INTERVAL};
use tracing::{debug, info, warn};
use wild_proto::{
    priority, Alert, AlertSeverity, AlertStatus, EventKind, QueuedEvent, Run, RunStatus, Stage,
};

/// Lines of log output attached to a run-event prompt.
const LOG_TAIL_LINES: usize = 30;

/// Spawns the poll task for the current running-stage episode.
///
/// The task exits on its own when the epoch changes or the loop leaves the
/// running stage; a new episode spawns a new task.
pub(crate) fn spawn(wild: WildLoop, epoch: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if !wild.poll_tick(epoch).await {
                break;
            }
        }
        debug!(epoch, "Poller exited");
    });
}

impl WildLoop {
    /// Runs one poll cycle. Returns false when the poller should stop.
    pub(crate) async fn poll_tick(&self, epoch: u64) -> bool {
        let (job_id, goal) = {
            let core = self.core.lock().await;
            if core.epoch != epoch || !core.state.active || core.state.stage != Stage::Running {
                return false;
            }
            if core.state.paused {
                // Hold position; resume continues the same episode.
                return true;
            }
            let Some(job_id) = core.state.tracked_job_id.clone() else {
                return false;
            };
            (job_id, core.state.goal.clone())
        };

        // Fetch outside the lock; any backend failure skips this tick.
        let job = match self.backend.get_job(&job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, job = %job_id, "Status poll failed, skipping tick");
                return true;
            }
        };
        let runs = match self.backend.list_runs().await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "Run listing failed, skipping tick");
                return true;
            }
        };
        let alerts = match self.backend.list_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = %e, "Alert listing failed, skipping tick");
                return true;
            }
        };

        let members: Vec<Run> = runs
            .into_iter()
            .filter(|r| job.run_ids.contains(&r.id))
            .collect();
        let pending: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| a.status == AlertStatus::Pending && job.run_ids.contains(&a.run_id))
            .collect();

        // Diff against the previous tick under the lock.
        let mut new_alerts = Vec::new();
        let mut newly_terminal = Vec::new();
        let enter_analysis;
        {
            let mut core = self.core.lock().await;
            if core.epoch != epoch || !core.state.active || core.state.stage != Stage::Running {
                return false;
            }
            core.state.job_reporting = !members.is_empty();
            core.pending_alert_count = pending.len();

            for alert in &pending {
                if core.preexisting_runs.contains(&alert.run_id) {
                    continue;
                }
                if core.seen_alerts.insert(alert.id.clone()) {
                    new_alerts.push(alert.clone());
                }
            }

            for run in &members {
                let previous = core.last_run_status.insert(run.id.clone(), run.status);
                let was_terminal = previous.is_some_and(RunStatus::is_terminal);
                if run.status.is_terminal() && !was_terminal {
                    newly_terminal.push(run.clone());
                }
            }

            let all_terminal =
                !members.is_empty() && members.iter().all(|r| r.status.is_terminal());
            enter_analysis = all_terminal && pending.is_empty() && !core.analysis_triggered;
            if enter_analysis {
                // Set under the same lock that decided the transition, so an
                // overlapping tick cannot fire it a second time.
                core.analysis_triggered = true;
            }
        }

        // Render the prompts for anything new outside the lock.
        let mut events = Vec::new();
        for alert in new_alerts {
            let run_name = members
                .iter()
                .find(|r| r.id == alert.run_id)
                .map_or_else(|| alert.run_id.clone(), |r| r.name.clone());
            let (prompt, provenance) = self.prompts.alert(&goal, &alert, &run_name).await;
            let event_priority = match alert.severity {
                AlertSeverity::Critical => priority::ALERT_CRITICAL,
                AlertSeverity::Warning => priority::ALERT_WARNING,
            };
            let mut event = QueuedEvent::new(
                format!("alert-{}", alert.id),
                EventKind::Alert,
                event_priority,
                format!("Alert on {run_name}"),
                prompt,
            );
            if let Some(record) = provenance {
                event = event.with_provenance(record);
            }
            events.push(event);
        }

        let summary = batch_summary(&members);
        for run in newly_terminal {
            let log_tail = match self.backend.get_run_log(&run.id).await {
                Ok(log) => tail(&log, LOG_TAIL_LINES),
                Err(e) => {
                    warn!(error = %e, run = %run.id, "Failed to fetch run log");
                    String::new()
                }
            };
            let (prompt, provenance) = self.prompts.run_event(&goal, &run, &summary, &log_tail).await;
            let event_priority = if run.status == RunStatus::Succeeded {
                priority::RUN_SUCCEEDED
            } else {
                priority::RUN_FAILED
            };
            let mut event = QueuedEvent::new(
                format!("run-{}-{}", run.id, run.status.as_str()),
                EventKind::RunEvent,
                event_priority,
                format!("Run {} {}", run.name, run.status.as_str()),
                prompt,
            );
            if let Some(record) = provenance {
                event = event.with_provenance(record);
            }
            events.push(event);
        }

        let analysis_event = if enter_analysis {
            let succeeded = members
                .iter()
                .filter(|r| r.status == RunStatus::Succeeded)
                .count();
            let failed = members.len() - succeeded;
            let (prompt, provenance) = self.prompts.analysis(&goal, succeeded, failed).await;
            let mut event = QueuedEvent::new(
                format!("analysis-{job_id}"),
                EventKind::Analysis,
                priority::ANALYSIS,
                "Analyze sweep results",
                prompt,
            );
            if let Some(record) = provenance {
                event = event.with_provenance(record);
            }
            Some(event)
        } else {
            None
        };

        // Apply under the lock; a stop during the renders makes this a no-op.
        let mut core = self.core.lock().await;
        if core.epoch != epoch || !core.state.active {
            return false;
        }
        for event in events {
            if core.queue.enqueue(event) {
                debug!(job = %job_id, "Queued poll event");
            }
        }
        if let Some(event) = analysis_event {
            info!(job = %job_id, "All runs terminal with no pending alerts, analyzing");
            core.state.stage = Stage::Analyzing;
            core.queue.enqueue(event);
            return false;
        }
        true
    }
}

/// One-line pass/fail/in-flight summary of the batch, for run-event prompts.
fn batch_summary(members: &[Run]) -> String {
    let total = members.len();
    let terminal = members.iter().filter(|r| r.status.is_terminal()).count();
    let succeeded = members
        .iter()
        .filter(|r| r.status == RunStatus::Succeeded)
        .count();
    format!(
        "{terminal}/{total} runs finished, {succeeded} succeeded, {} failed",
        terminal - succeeded
    )
}

/// Returns the last `max_lines` lines of `log`.
fn tail(log: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            name: id.to_string(),
            status,
            command: "python train.py".to_string(),
        }
    }

    #[test]
    fn test_batch_summary_counts() {
        let members = vec![
            run("a", RunStatus::Succeeded),
            run("b", RunStatus::Failed),
            run("c", RunStatus::Running),
        ];
        assert_eq!(batch_summary(&members), "2/3 runs finished, 1 succeeded, 1 failed");
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let log = (1..=40).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail(&log, 30);
        assert!(tail.starts_with("11\n"));
        assert!(tail.ends_with("\n40"));
        assert_eq!(tail.lines().count(), 30);
    }

    #[test]
    fn test_tail_of_short_log_is_whole_log() {
        assert_eq!(tail("one\ntwo", 30), "one\ntwo");
        assert_eq!(tail("", 30), "");
    }
}
