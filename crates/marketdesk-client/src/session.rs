use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use marketdesk_cache::{CacheKey, Collection, QueryCache};
use marketdesk_models::{AgentType, AnalysisRequest, AnalysisResult, Market, PollingConfig};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::OrchestratorApi;
use crate::error::ClientError;
use crate::poller::{PollOutcome, ProgressEstimator, ResultPoller};
use crate::selection::AgentSelection;

/// Configured poll intervals below this are raised to it.
const MIN_POLL_SECONDS: u64 = 1;

/// What the user has entered before starting a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDraft {
    pub ticker: String,
    pub market: Market,
    pub trade_date: Option<NaiveDate>,
    pub selection: AgentSelection,
    pub template_set_id: Option<String>,
    /// Free-text question; derived from ticker and market when absent.
    pub query: Option<String>,
}

impl AnalysisDraft {
    pub fn new(ticker: impl Into<String>, market: Market, selection: AgentSelection) -> Self {
        Self {
            ticker: ticker.into(),
            market,
            trade_date: None,
            selection,
            template_set_id: None,
            query: None,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.ticker.trim().is_empty() {
            return Err(ClientError::validation("ticker must not be empty"));
        }
        if self.selection.is_empty() {
            return Err(ClientError::validation("select at least one agent"));
        }
        if matches!(&self.template_set_id, Some(id) if id.trim().is_empty()) {
            return Err(ClientError::validation("template set id must not be blank"));
        }
        Ok(())
    }

    /// Validate and build the request body.
    pub fn to_request(&self) -> Result<AnalysisRequest, ClientError> {
        self.validate()?;
        let ticker = self.ticker.trim().to_string();
        let query = match &self.query {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => format!("Analyze {} ({} market)", ticker, self.market),
        };
        Ok(AnalysisRequest {
            query,
            ticker,
            market_type: self.market,
            trade_date: self.trade_date,
            selected_analysts: self.selection.agents(),
            template_set_id: self.template_set_id.as_ref().map(|s| s.trim().to_string()),
        })
    }
}

/// Lifecycle of one analysis in a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Submitting,
    Running {
        task_id: String,
        agents: Vec<AgentType>,
        progress: u8,
        result: AnalysisResult,
    },
    Completed(AnalysisResult),
    Failed {
        task_id: Option<String>,
        message: String,
    },
}

impl AnalysisState {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Submitting => "submitting",
            AnalysisState::Running { .. } => "running",
            AnalysisState::Completed(_) => "completed",
            AnalysisState::Failed { .. } => "failed",
        }
    }

    /// A run is in flight; starting another is rejected.
    pub fn is_busy(&self) -> bool {
        matches!(self, AnalysisState::Submitting | AnalysisState::Running { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            AnalysisState::Running { progress, .. } => *progress,
            AnalysisState::Completed(_) => 100,
            _ => 0,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            AnalysisState::Running { task_id, .. } => Some(task_id.as_str()),
            AnalysisState::Completed(result) => Some(result.task_id.as_str()),
            AnalysisState::Failed { task_id, .. } => task_id.as_deref(),
            _ => None,
        }
    }
}

/// Drives `idle -> submitting -> running -> completed | failed` for one user.
///
/// State changes are published on a `watch` channel. Polling is tied to a
/// per-run cancellation token that is a child of the session token, so dropping
/// the session stops any poll loop it started.
pub struct AnalysisSession {
    api: Arc<dyn OrchestratorApi>,
    cache: Option<Arc<QueryCache>>,
    state: watch::Sender<AnalysisState>,
    shutdown: CancellationToken,
    run_token: Mutex<CancellationToken>,
    poll_interval: Duration,
    per_agent: Duration,
}

impl AnalysisSession {
    pub fn new(api: Arc<dyn OrchestratorApi>, polling: &PollingConfig) -> Self {
        let (state, _) = watch::channel(AnalysisState::Idle);
        let shutdown = CancellationToken::new();
        let run_token = Mutex::new(shutdown.child_token());
        Self {
            api,
            cache: None,
            state,
            shutdown,
            run_token,
            poll_interval: Duration::from_secs(polling.interval_seconds.max(MIN_POLL_SECONDS)),
            per_agent: Duration::from_secs(polling.simulated_seconds_per_agent),
        }
    }

    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }

    /// Token of the current run. Cancelling it abandons polling.
    pub async fn cancel_token(&self) -> CancellationToken {
        self.run_token.lock().await.clone()
    }

    /// Validate the draft and start a run. Returns the task id.
    ///
    /// A validation failure sends nothing and leaves the state unchanged. A
    /// submission failure moves the session to `Failed` with the error message.
    pub async fn submit(&self, draft: &AnalysisDraft) -> Result<String, ClientError> {
        let request = draft.to_request()?;

        let accepted = self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = AnalysisState::Submitting;
            true
        });
        if !accepted {
            return Err(ClientError::validation("an analysis is already in progress"));
        }

        info!(
            ticker = %request.ticker,
            market = %request.market_type,
            agents = request.selected_analysts.len(),
            "Submitting analysis"
        );

        let start = match self.api.start_analysis(&request).await {
            Ok(start) => start,
            Err(e) => {
                warn!(ticker = %request.ticker, error = %e, "Analysis submission failed");
                self.state.send_replace(AnalysisState::Failed {
                    task_id: None,
                    message: e.user_message(),
                });
                return Err(e);
            }
        };

        *self.run_token.lock().await = self.shutdown.child_token();
        if let Some(cache) = &self.cache {
            cache.invalidate(&[Collection::History]).await;
        }

        info!(task_id = %start.task_id, message = %start.message, "Analysis running");
        self.state.send_replace(AnalysisState::Running {
            task_id: start.task_id.clone(),
            agents: request.selected_analysts.clone(),
            progress: 0,
            result: AnalysisResult::pending(&start.task_id, &request.ticker, request.market_type),
        });
        Ok(start.task_id)
    }

    /// Poll the running task until it finishes or is abandoned.
    ///
    /// Returns the final result (completed or failed), or `None` when the run
    /// was abandoned; the session is then back to `Idle`.
    pub async fn follow(&self) -> Result<Option<AnalysisResult>, ClientError> {
        let (task_id, agents, tracked) = match self.state() {
            AnalysisState::Running {
                task_id,
                agents,
                result,
                ..
            } => (task_id, agents, result),
            other => {
                return Err(ClientError::validation(format!(
                    "no analysis is running (state: {})",
                    other.name()
                )))
            }
        };

        let token = self.cancel_token().await;
        let poller = ResultPoller::new(Arc::clone(&self.api), self.poll_interval);
        let mut progress = ProgressEstimator::new(agents.len(), self.per_agent);

        let outcome = poller
            .run(tracked, &mut progress, &token, |result, pct| {
                self.state.send_if_modified(|state| {
                    let current = matches!(
                        state,
                        AnalysisState::Running { task_id, .. } if *task_id == result.task_id
                    );
                    if current {
                        *state = AnalysisState::Running {
                            task_id: result.task_id.clone(),
                            agents: agents.clone(),
                            progress: pct,
                            result: result.clone(),
                        };
                    }
                    current
                });
            })
            .await;

        if let Some(cache) = &self.cache {
            cache.invalidate(&[Collection::History]).await;
        }

        match outcome {
            Ok(PollOutcome::Finished(result)) if result.is_failed() => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Analysis failed".to_string());
                warn!(task_id = %task_id, error = %message, "Analysis failed");
                self.settle(
                    &task_id,
                    AnalysisState::Failed {
                        task_id: Some(task_id.clone()),
                        message,
                    },
                );
                Ok(Some(result))
            }
            Ok(PollOutcome::Finished(result)) => {
                self.settle(&task_id, AnalysisState::Completed(result.clone()));
                Ok(Some(result))
            }
            Ok(PollOutcome::Abandoned(_)) => {
                self.settle(&task_id, AnalysisState::Idle);
                Ok(None)
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Polling failed");
                self.settle(
                    &task_id,
                    AnalysisState::Failed {
                        task_id: Some(task_id.clone()),
                        message: e.user_message(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Replace the state only while it still tracks `task_id`; a newer run
    /// submitted after an abandon keeps its own state.
    fn settle(&self, task_id: &str, next: AnalysisState) {
        let settled = self.state.send_if_modified(|state| {
            let current = matches!(
                state,
                AnalysisState::Running { task_id: running, .. } if running.as_str() == task_id
            );
            if current {
                *state = next;
            }
            current
        });
        if !settled {
            debug!(task_id, "Run no longer current, state left unchanged");
        }
    }

    /// Submit and follow to the end.
    pub async fn run(&self, draft: &AnalysisDraft) -> Result<Option<AnalysisResult>, ClientError> {
        self.submit(draft).await?;
        self.follow().await
    }

    /// Stop polling the current run and return to `Idle`. The backend task is
    /// not cancelled.
    pub async fn abandon(&self) {
        self.run_token.lock().await.cancel();
        self.state.send_if_modified(|state| {
            if matches!(state, AnalysisState::Running { .. }) {
                *state = AnalysisState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Past analyses, newest first as returned by the orchestrator.
    pub async fn history(&self) -> Result<Vec<AnalysisResult>, ClientError> {
        match &self.cache {
            Some(cache) => {
                let api = Arc::clone(&self.api);
                cache
                    .get_or_fetch(CacheKey::History, || async move { api.history().await })
                    .await
            }
            None => self.api.history().await,
        }
    }

    pub async fn result(&self, task_id: &str) -> Result<AnalysisResult, ClientError> {
        self.api.get_result(task_id).await
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
