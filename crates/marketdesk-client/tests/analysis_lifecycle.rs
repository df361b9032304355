//! Integration tests for the analysis lifecycle: submission guards, polling to
//! a terminal state, failure reporting, abandonment and append-only merging.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marketdesk_cache::{CacheKey, QueryCache};
use marketdesk_client::{
    AgentSelection, AnalysisDraft, AnalysisSession, AnalysisState, ClientError,
    InMemoryOrchestrator, OrchestratorApi,
};
use marketdesk_models::{
    AgentOutput, AgentStatus, AgentType, AnalysisRequest, AnalysisResult, AnalysisStart,
    FinalDecision, Market, NewTemplate, NewTemplateSet, PollingConfig, PromptTemplate, RiskLevel,
    TaskStatus, TemplateSet, TemplateUpdate, TradeAction,
};
use rust_decimal_macros::dec;

fn session(api: Arc<dyn OrchestratorApi>) -> AnalysisSession {
    AnalysisSession::new(api, &PollingConfig::default()).with_poll_interval(Duration::from_millis(2))
}

fn draft(ticker: &str) -> AnalysisDraft {
    let mut selection = AgentSelection::new();
    selection.toggle_optional(AgentType::NewsAnalyst).unwrap();
    AnalysisDraft::new(ticker, Market::Us, selection)
}

/// Scripted orchestrator: fixed start response, queued result snapshots.
struct ScriptedApi {
    start_error: Option<(u16, String)>,
    snapshots: Mutex<VecDeque<AnalysisResult>>,
}

impl ScriptedApi {
    fn failing_start(status: u16, message: &str) -> Self {
        Self {
            start_error: Some((status, message.to_string())),
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    fn with_snapshots(snapshots: Vec<AnalysisResult>) -> Self {
        Self {
            start_error: None,
            snapshots: Mutex::new(snapshots.into()),
        }
    }
}

fn unsupported() -> ClientError {
    ClientError::Server {
        status: 501,
        message: "not scripted".to_string(),
    }
}

#[async_trait]
impl OrchestratorApi for ScriptedApi {
    async fn list_templates(
        &self,
        _agent_type: Option<AgentType>,
    ) -> Result<Vec<PromptTemplate>, ClientError> {
        Err(unsupported())
    }

    async fn get_template(&self, _id: &str) -> Result<PromptTemplate, ClientError> {
        Err(unsupported())
    }

    async fn create_template(
        &self,
        _template: &NewTemplate,
    ) -> Result<PromptTemplate, ClientError> {
        Err(unsupported())
    }

    async fn update_template(
        &self,
        _id: &str,
        _update: &TemplateUpdate,
    ) -> Result<PromptTemplate, ClientError> {
        Err(unsupported())
    }

    async fn delete_template(&self, _id: &str) -> Result<(), ClientError> {
        Err(unsupported())
    }

    async fn list_template_sets(&self) -> Result<Vec<TemplateSet>, ClientError> {
        Err(unsupported())
    }

    async fn create_template_set(
        &self,
        _set: &NewTemplateSet,
    ) -> Result<TemplateSet, ClientError> {
        Err(unsupported())
    }

    async fn apply_template_set(
        &self,
        _set_id: &str,
    ) -> Result<BTreeMap<AgentType, PromptTemplate>, ClientError> {
        Err(unsupported())
    }

    async fn start_analysis(
        &self,
        _request: &AnalysisRequest,
    ) -> Result<AnalysisStart, ClientError> {
        match &self.start_error {
            Some((status, message)) => Err(ClientError::Server {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(AnalysisStart {
                task_id: "scripted".to_string(),
                message: "Analysis started".to_string(),
            }),
        }
    }

    async fn history(&self) -> Result<Vec<AnalysisResult>, ClientError> {
        Ok(Vec::new())
    }

    async fn get_result(&self, task_id: &str) -> Result<AnalysisResult, ClientError> {
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClientError::not_found(format!("result {task_id}")))
    }
}

fn output(agent: AgentType, status: AgentStatus, content: &str) -> AgentOutput {
    AgentOutput {
        agent_type: agent,
        status,
        content: content.to_string(),
        updated_at: None,
    }
}

fn snapshot(status: TaskStatus, outputs: Vec<AgentOutput>) -> AnalysisResult {
    let mut result = AnalysisResult::pending("scripted", "NVDA", Market::Us);
    result.status = status;
    result.outputs = outputs;
    result
}

#[tokio::test]
async fn empty_ticker_makes_no_request() {
    let api = Arc::new(InMemoryOrchestrator::new());
    let session = session(api.clone());

    let err = session.submit(&draft("   ")).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(api.calls(), 0);
    assert_eq!(session.state(), AnalysisState::Idle);
}

#[tokio::test]
async fn run_completes_with_decision() {
    let api = Arc::new(InMemoryOrchestrator::new());
    let session = session(api.clone());
    let mut states = session.subscribe();

    let result = session.run(&draft("AAPL")).await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.outputs.len(), 4);
    assert!(result.outputs.iter().all(|o| o.status == AgentStatus::Completed));
    assert_eq!(result.decision.as_ref().unwrap().confidence, dec!(0.60));

    let state = states.borrow_and_update().clone();
    assert_eq!(state, AnalysisState::Completed(result));
    assert_eq!(state.progress(), 100);
}

#[tokio::test]
async fn submitted_agents_follow_selection_order() {
    let api = Arc::new(InMemoryOrchestrator::new());
    api.hold_progress(true).unwrap();
    let session = session(api.clone());

    let mut d = draft("TSLA");
    d.selection.set_risk_pair(true);
    session.submit(&d).await.unwrap();

    match session.state() {
        AnalysisState::Running { agents, progress, .. } => {
            assert_eq!(progress, 0);
            assert_eq!(
                agents,
                vec![
                    AgentType::MarketAnalyst,
                    AgentType::FundamentalsAnalyst,
                    AgentType::ResearchManager,
                    AgentType::NewsAnalyst,
                    AgentType::RiskyDebater,
                    AgentType::SafeDebater,
                    AgentType::NeutralDebater,
                    AgentType::RiskManager,
                ]
            );
        }
        other => panic!("expected running, got {other:?}"),
    }
}

#[tokio::test]
async fn second_submit_while_running_is_rejected() {
    let api = Arc::new(InMemoryOrchestrator::new());
    let session = session(api.clone());

    let task_id = session.submit(&draft("AAPL")).await.unwrap();
    let err = session.submit(&draft("MSFT")).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(session.state().task_id(), Some(task_id.as_str()));

    // Finishing frees the session for another run.
    session.follow().await.unwrap();
    session.submit(&draft("MSFT")).await.unwrap();
}

#[tokio::test]
async fn agent_failure_fails_the_run() {
    let api = Arc::new(InMemoryOrchestrator::new());
    api.fail_agent(Some(AgentType::NewsAnalyst)).unwrap();
    let session = session(api.clone());

    let result = session.run(&draft("AAPL")).await.unwrap().unwrap();
    assert!(result.is_failed());
    match session.state() {
        AnalysisState::Failed { task_id, message } => {
            assert_eq!(task_id.as_deref(), Some(result.task_id.as_str()));
            assert!(message.starts_with("News Analyst failed"));
        }
        other => panic!("expected failed, got {other:?}"),
    }
}

#[tokio::test]
async fn submission_error_is_shown_verbatim() {
    let api = Arc::new(ScriptedApi::failing_start(503, "Orchestrator is warming up"));
    let session = session(api);

    let err = session.submit(&draft("AAPL")).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
    assert_eq!(
        session.state(),
        AnalysisState::Failed {
            task_id: None,
            message: "Orchestrator is warming up".to_string(),
        }
    );

    // A failed session may start again.
    let err = session.submit(&draft("AAPL")).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { .. }));
}

#[tokio::test]
async fn poll_error_fails_the_run() {
    let api = Arc::new(ScriptedApi::with_snapshots(vec![snapshot(
        TaskStatus::Running,
        vec![output(AgentType::MarketAnalyst, AgentStatus::Running, "")],
    )]));
    let session = session(api);

    let err = session.run(&draft("NVDA")).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
    assert!(matches!(
        session.state(),
        AnalysisState::Failed { task_id: Some(_), .. }
    ));
}

#[tokio::test]
async fn completed_outputs_are_never_revised() {
    let decision = FinalDecision {
        action: TradeAction::Buy,
        confidence: dec!(0.81),
        target_price: Some(dec!(140.00)),
        risk_level: RiskLevel::High,
        reasoning: "Data center demand".to_string(),
    };
    let mut last = snapshot(
        TaskStatus::Completed,
        vec![
            output(AgentType::MarketAnalyst, AgentStatus::Completed, "Rewritten history"),
            output(AgentType::FundamentalsAnalyst, AgentStatus::Completed, "Margins expanding"),
        ],
    );
    last.decision = Some(decision);

    let api = Arc::new(ScriptedApi::with_snapshots(vec![
        snapshot(
            TaskStatus::Running,
            vec![
                output(AgentType::MarketAnalyst, AgentStatus::Completed, "Breakout above 130"),
                output(AgentType::FundamentalsAnalyst, AgentStatus::Running, ""),
            ],
        ),
        last,
    ]));
    let session = session(api);

    let result = session.run(&draft("NVDA")).await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(
        result.output(AgentType::MarketAnalyst).unwrap().content,
        "Breakout above 130"
    );
    assert_eq!(
        result.output(AgentType::FundamentalsAnalyst).unwrap().content,
        "Margins expanding"
    );
}

#[tokio::test]
async fn abandon_stops_polling_and_returns_to_idle() {
    let api = Arc::new(InMemoryOrchestrator::new());
    api.hold_progress(true).unwrap();
    let session = Arc::new(session(api.clone()));

    session.submit(&draft("AAPL")).await.unwrap();
    let follower = {
        let session = session.clone();
        tokio::spawn(async move { session.follow().await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    session.abandon().await;

    let outcome = follower.await.unwrap().unwrap();
    assert!(outcome.is_none());
    assert_eq!(session.state(), AnalysisState::Idle);

    let polls = api.calls();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(api.calls(), polls);

    // A new run gets a fresh token.
    session.submit(&draft("AAPL")).await.unwrap();
    assert!(!session.cancel_token().await.is_cancelled());
}

#[tokio::test]
async fn abandoned_follow_leaves_the_next_run_alone() {
    let api = Arc::new(InMemoryOrchestrator::new());
    api.hold_progress(true).unwrap();
    let session = Arc::new(session(api.clone()));

    let first = session.submit(&draft("AAPL")).await.unwrap();
    let follower = {
        let session = session.clone();
        tokio::spawn(async move { session.follow().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    session.abandon().await;
    let second = session.submit(&draft("MSFT")).await.unwrap();
    assert_ne!(first, second);

    assert!(follower.await.unwrap().unwrap().is_none());
    assert_eq!(session.state().task_id(), Some(second.as_str()));
    assert_eq!(session.state().name(), "running");

    api.hold_progress(false).unwrap();
    let result = session.follow().await.unwrap().unwrap();
    assert_eq!(result.task_id, second);
    assert_eq!(result.status, TaskStatus::Completed);
}

#[tokio::test]
async fn dropping_the_session_cancels_its_run() {
    let api = Arc::new(InMemoryOrchestrator::new());
    let session = session(api);
    session.submit(&draft("AAPL")).await.unwrap();

    let token = session.cancel_token().await;
    assert!(!token.is_cancelled());
    drop(session);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn submit_invalidates_cached_history() {
    let api = Arc::new(InMemoryOrchestrator::new());
    let cache = Arc::new(QueryCache::new(100, Duration::from_secs(300)));
    let session = session(api.clone()).with_cache(cache.clone());

    assert!(session.history().await.unwrap().is_empty());
    let cached: Option<Vec<AnalysisResult>> = cache.get(&CacheKey::History).await.unwrap();
    assert!(cached.is_some());

    let task_id = session.submit(&draft("AAPL")).await.unwrap();
    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id, task_id);
}
