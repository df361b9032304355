use std::sync::Arc;
use std::time::{Duration, Instant};

use marketdesk_models::AnalysisResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::OrchestratorApi;
use crate::error::ClientError;

/// Simulated progress never goes beyond this until real statuses arrive.
const SIMULATED_CAP: u8 = 95;
/// Reported progress stays below 100 until the run has completed.
const RUNNING_CAP: u8 = 99;

/// Best-effort, monotonic progress for a running analysis.
///
/// Uses per-agent statuses when the result lists them; otherwise falls back to
/// elapsed time against a per-agent estimate.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    expected_agents: usize,
    per_agent: Duration,
    started: Instant,
    last: u8,
}

impl ProgressEstimator {
    pub fn new(expected_agents: usize, per_agent: Duration) -> Self {
        Self {
            expected_agents,
            per_agent,
            started: Instant::now(),
            last: 0,
        }
    }

    /// Last reported value.
    pub fn current(&self) -> u8 {
        self.last
    }

    pub fn observe(&mut self, result: &AnalysisResult) -> u8 {
        self.observe_at(result, self.started.elapsed())
    }

    /// Progress after `elapsed` time since submission. Never decreases.
    pub fn observe_at(&mut self, result: &AnalysisResult, elapsed: Duration) -> u8 {
        let estimate = if result.is_terminal() && !result.is_failed() {
            100
        } else if !result.outputs.is_empty() {
            let total = result.outputs.len().max(self.expected_agents);
            let pct = result.finished_outputs() * 100 / total;
            (pct as u8).min(RUNNING_CAP)
        } else {
            self.simulated(elapsed)
        };

        self.last = self.last.max(estimate);
        self.last
    }

    fn simulated(&self, elapsed: Duration) -> u8 {
        let agents = u32::try_from(self.expected_agents.max(1)).unwrap_or(u32::MAX);
        let budget = self.per_agent.checked_mul(agents).unwrap_or(Duration::MAX);
        if budget.is_zero() {
            return SIMULATED_CAP;
        }
        let pct = elapsed.as_secs_f64() / budget.as_secs_f64() * 100.0;
        (pct.min(SIMULATED_CAP as f64)) as u8
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A terminal snapshot was reached (completed or failed).
    Finished(AnalysisResult),
    /// The cancellation token fired first; carries the last tracked result.
    Abandoned(AnalysisResult),
}

/// Polls `GET /result/{task_id}` until the run is terminal or the token fires.
pub struct ResultPoller {
    api: Arc<dyn OrchestratorApi>,
    interval: Duration,
}

impl ResultPoller {
    pub fn new(api: Arc<dyn OrchestratorApi>, interval: Duration) -> Self {
        Self { api, interval }
    }

    /// Poll once immediately, then every `interval`.
    ///
    /// Each snapshot is merged append-only into `tracked` and reported through
    /// `on_update` with the current progress. A poll error ends the loop; there
    /// are no retries.
    pub async fn run<F>(
        &self,
        mut tracked: AnalysisResult,
        progress: &mut ProgressEstimator,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<PollOutcome, ClientError>
    where
        F: FnMut(&AnalysisResult, u8),
    {
        let task_id = tracked.task_id.clone();
        debug!(task_id = %task_id, interval_ms = self.interval.as_millis() as u64, "Polling started");

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, "Polling abandoned");
                    return Ok(PollOutcome::Abandoned(tracked));
                }
                fetched = self.api.get_result(&task_id) => fetched?,
            };

            for agent in tracked.merge_snapshot(snapshot) {
                warn!(task_id = %task_id, agent_type = %agent, "Ignored revision of a completed agent output");
            }

            let pct = progress.observe(&tracked);
            debug!(
                task_id = %task_id,
                status = ?tracked.status,
                finished = tracked.finished_outputs(),
                progress = pct,
                "Result snapshot"
            );
            on_update(&tracked, pct);

            if tracked.is_terminal() {
                info!(task_id = %task_id, failed = tracked.is_failed(), "Analysis finished");
                return Ok(PollOutcome::Finished(tracked));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, "Polling abandoned");
                    return Ok(PollOutcome::Abandoned(tracked));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
