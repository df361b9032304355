use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketdesk_models::{
    AgentOutput, AgentStatus, AgentType, AnalysisRequest, AnalysisResult, AnalysisStart,
    FinalDecision, NewTemplate, NewTemplateSet, PromptTemplate, RiskLevel, TaskStatus,
    TemplateSet, TemplateUpdate, TradeAction,
};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::OrchestratorApi;
use crate::defaults::default_templates;
use crate::error::ClientError;

/// Short ids in the orchestrator's format: the first eight hex digits of a v4 uuid.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// A simulated run: one agent finishes per poll, in submission order.
#[derive(Debug, Clone)]
struct SimulatedTask {
    request: AnalysisRequest,
    created_at: DateTime<Utc>,
    step: usize,
    snapshot: AnalysisResult,
}

impl SimulatedTask {
    fn new(task_id: &str, request: AnalysisRequest, now: DateTime<Utc>) -> Self {
        let mut snapshot = AnalysisResult::pending(task_id, &request.ticker, request.market_type);
        snapshot.created_at = Some(now);
        Self {
            request,
            created_at: now,
            step: 0,
            snapshot,
        }
    }

    /// Render the snapshot for the current step.
    ///
    /// Step `k` has agents `[..k]` completed and agent `k` running. Once every
    /// agent is completed the run is completed with a decision. A failing agent
    /// ends the run as failed at its step.
    fn render(&mut self, fail_agent: Option<AgentType>, now: DateTime<Utc>) {
        if self.snapshot.is_terminal() {
            return;
        }

        let agents = &self.request.selected_analysts;
        let ticker = &self.request.ticker;
        let mut outputs = Vec::with_capacity(agents.len());
        let mut failed = None;

        for (i, agent) in agents.iter().enumerate() {
            let (status, content) = if i < self.step {
                (AgentStatus::Completed, report_for(*agent, ticker))
            } else if i == self.step && fail_agent == Some(*agent) {
                failed = Some(*agent);
                (AgentStatus::Error, "Upstream model call failed".to_string())
            } else if i == self.step {
                (AgentStatus::Running, String::new())
            } else {
                (AgentStatus::Pending, String::new())
            };
            outputs.push(AgentOutput {
                agent_type: *agent,
                status,
                content,
                updated_at: (status != AgentStatus::Pending).then_some(now),
            });
        }

        self.snapshot.outputs = outputs;
        if let Some(agent) = failed {
            self.snapshot.status = TaskStatus::Failed;
            self.snapshot.error = Some(format!("{} failed: upstream model call failed", agent.label()));
            self.snapshot.completed_at = Some(now);
        } else if self.step >= agents.len() {
            self.snapshot.status = TaskStatus::Completed;
            self.snapshot.decision = Some(FinalDecision {
                action: TradeAction::Hold,
                confidence: Decimal::new(60, 2),
                target_price: None,
                risk_level: RiskLevel::Medium,
                reasoning: format!(
                    "Consensus of {} agents on {}: no clear edge at current levels",
                    agents.len(),
                    ticker
                ),
            });
            self.snapshot.completed_at = Some(now);
        } else {
            self.snapshot.status = TaskStatus::Running;
        }
    }
}

fn report_for(agent: AgentType, ticker: &str) -> String {
    format!("{} report for {}: analysis complete.", agent.label(), ticker)
}

#[derive(Debug, Default)]
struct State {
    templates: Vec<PromptTemplate>,
    sets: Vec<TemplateSet>,
    tasks: Vec<(String, SimulatedTask)>,
    hold_progress: bool,
    fail_agent: Option<AgentType>,
}

impl State {
    fn template_mut(&mut self, id: &str) -> Result<&mut PromptTemplate, ClientError> {
        self.templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ClientError::not_found(format!("template {id}: Template not found")))
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut SimulatedTask, ClientError> {
        self.tasks
            .iter_mut()
            .find(|(id, _)| id == task_id)
            .map(|(_, task)| task)
            .ok_or_else(|| ClientError::not_found(format!("result {task_id}: Task not found")))
    }
}

/// Process-local [`OrchestratorApi`] used for offline mode and as the test double.
///
/// Seeded with the default template catalogue. Analyses are simulated: every
/// `get_result` call advances the run by one agent unless progress is held.
pub struct InMemoryOrchestrator {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::with_templates(default_templates(Utc::now()))
    }

    pub fn with_templates(templates: Vec<PromptTemplate>) -> Self {
        Self {
            state: Mutex::new(State {
                templates,
                ..State::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of API calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Freeze simulated runs at their current step.
    pub fn hold_progress(&self, hold: bool) -> Result<(), ClientError> {
        self.lock()?.hold_progress = hold;
        Ok(())
    }

    /// Make the given agent fail when its turn comes.
    pub fn fail_agent(&self, agent: Option<AgentType>) -> Result<(), ClientError> {
        self.lock()?.fail_agent = agent;
        Ok(())
    }

    /// Insert a template set verbatim, bypassing any validation.
    pub fn insert_template_set(&self, set: TemplateSet) -> Result<(), ClientError> {
        self.lock()?.sets.push(set);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ClientError> {
        self.state.lock().map_err(|e| ClientError::Server {
            status: 500,
            message: format!("orchestrator state poisoned: {e}"),
        })
    }

    fn serve(&self, endpoint: &str) -> Result<MutexGuard<'_, State>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint, "In-memory orchestrator call");
        self.lock()
    }
}

#[async_trait]
impl OrchestratorApi for InMemoryOrchestrator {
    async fn list_templates(
        &self,
        agent_type: Option<AgentType>,
    ) -> Result<Vec<PromptTemplate>, ClientError> {
        let state = self.serve("GET /templates")?;
        Ok(state
            .templates
            .iter()
            .filter(|t| agent_type.map_or(true, |a| t.agent_type == a))
            .cloned()
            .collect())
    }

    async fn get_template(&self, id: &str) -> Result<PromptTemplate, ClientError> {
        let mut state = self.serve("GET /templates/{id}")?;
        state.template_mut(id).map(|t| t.clone())
    }

    async fn create_template(
        &self,
        template: &NewTemplate,
    ) -> Result<PromptTemplate, ClientError> {
        let mut state = self.serve("POST /templates")?;
        let now = Utc::now();
        let created = PromptTemplate {
            id: short_id(),
            name: template.name.clone(),
            agent_type: template.agent_type,
            content: template.content.clone(),
            variables: template.variables.clone(),
            description: template.description.clone(),
            is_default: false,
            created_at: now,
            updated_at: now,
        };
        info!(id = %created.id, agent_type = %created.agent_type, "Created template");
        state.templates.push(created.clone());
        Ok(created)
    }

    async fn update_template(
        &self,
        id: &str,
        update: &TemplateUpdate,
    ) -> Result<PromptTemplate, ClientError> {
        let mut state = self.serve("PUT /templates/{id}")?;
        let template = state.template_mut(id)?;
        update.apply_to(template, Utc::now());
        Ok(template.clone())
    }

    async fn delete_template(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.serve("DELETE /templates/{id}")?;
        let before = state.templates.len();
        state.templates.retain(|t| t.id != id);
        if state.templates.len() == before {
            return Err(ClientError::not_found(format!(
                "template {id}: Template not found"
            )));
        }
        Ok(())
    }

    async fn list_template_sets(&self) -> Result<Vec<TemplateSet>, ClientError> {
        let state = self.serve("GET /template-sets")?;
        Ok(state.sets.clone())
    }

    async fn create_template_set(
        &self,
        set: &NewTemplateSet,
    ) -> Result<TemplateSet, ClientError> {
        let mut state = self.serve("POST /template-sets")?;
        let created = TemplateSet {
            id: short_id(),
            name: set.name.clone(),
            description: set.description.clone(),
            template_ids: set.template_ids.clone(),
            is_default: false,
            created_at: Utc::now(),
        };
        info!(id = %created.id, name = %created.name, "Created template set");
        state.sets.push(created.clone());
        Ok(created)
    }

    async fn apply_template_set(
        &self,
        set_id: &str,
    ) -> Result<BTreeMap<AgentType, PromptTemplate>, ClientError> {
        let state = self.serve("POST /template-sets/{id}/apply")?;
        let not_found =
            || ClientError::not_found(format!("template set {set_id}: Template set not found"));

        let set = state.sets.iter().find(|s| s.id == set_id).ok_or_else(not_found)?;
        // References that no longer resolve are skipped, like the real orchestrator.
        let applied: BTreeMap<AgentType, PromptTemplate> = set
            .template_ids
            .iter()
            .filter_map(|(agent, id)| {
                state
                    .templates
                    .iter()
                    .find(|t| &t.id == id)
                    .map(|t| (*agent, t.clone()))
            })
            .collect();

        if applied.is_empty() {
            return Err(not_found());
        }
        Ok(applied)
    }

    async fn start_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisStart, ClientError> {
        let mut state = self.serve("POST /analyze")?;
        if request.selected_analysts.is_empty() {
            return Err(ClientError::Server {
                status: 422,
                message: "selected_analysts must not be empty".to_string(),
            });
        }

        let task_id = short_id();
        let task = SimulatedTask::new(&task_id, request.clone(), Utc::now());
        info!(
            task_id = %task_id,
            ticker = %request.ticker,
            market = %request.market_type,
            agents = request.selected_analysts.len(),
            "Simulated analysis started"
        );
        state.tasks.push((task_id.clone(), task));

        let subject = if request.ticker.is_empty() {
            &request.query
        } else {
            &request.ticker
        };
        Ok(AnalysisStart {
            message: format!("Analysis started for {subject}"),
            task_id,
        })
    }

    async fn history(&self) -> Result<Vec<AnalysisResult>, ClientError> {
        let state = self.serve("GET /history")?;
        let mut tasks: Vec<&SimulatedTask> = state.tasks.iter().map(|(_, t)| t).collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks.into_iter().map(|t| t.snapshot.clone()).collect())
    }

    async fn get_result(&self, task_id: &str) -> Result<AnalysisResult, ClientError> {
        let mut state = self.serve("GET /result/{task_id}")?;
        let hold = state.hold_progress;
        let fail_agent = state.fail_agent;
        let task = state.task_mut(task_id)?;

        task.render(fail_agent, Utc::now());
        if !hold && !task.snapshot.is_terminal() {
            task.step += 1;
        }
        Ok(task.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketdesk_models::Market;

    fn request(agents: Vec<AgentType>) -> AnalysisRequest {
        AnalysisRequest {
            query: "Analyze AAPL".to_string(),
            ticker: "AAPL".to_string(),
            market_type: Market::Us,
            trade_date: None,
            selected_analysts: agents,
            template_set_id: None,
        }
    }

    #[test]
    fn short_ids_are_eight_hex_digits() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn seeded_with_defaults() {
        let api = InMemoryOrchestrator::new();
        let all = api.list_templates(None).await.unwrap();
        assert_eq!(all.len(), 12);

        let news = api.list_templates(Some(AgentType::NewsAnalyst)).await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].id, "default_news");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn update_keeps_agent_type_and_unknown_id_is_not_found() {
        let api = InMemoryOrchestrator::new();
        let update = TemplateUpdate {
            name: Some("Tape reader".to_string()),
            ..Default::default()
        };
        let updated = api.update_template("default_market", &update).await.unwrap();
        assert_eq!(updated.agent_type, AgentType::MarketAnalyst);
        assert_eq!(updated.name, "Tape reader");

        let err = api.update_template("nope", &update).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let api = InMemoryOrchestrator::new();
        api.delete_template("default_trader").await.unwrap();
        let err = api.delete_template("default_trader").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn apply_skips_dangling_and_empty_is_not_found() {
        let api = InMemoryOrchestrator::new();
        let set = api
            .create_template_set(&NewTemplateSet {
                name: "Pair".to_string(),
                description: String::new(),
                template_ids: BTreeMap::from([
                    (AgentType::MarketAnalyst, "default_market".to_string()),
                    (AgentType::TraderAi, "gone".to_string()),
                ]),
            })
            .await
            .unwrap();

        let applied = api.apply_template_set(&set.id).await.unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied.contains_key(&AgentType::MarketAnalyst));

        api.delete_template("default_market").await.unwrap();
        let err = api.apply_template_set(&set.id).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn simulated_run_completes_one_agent_per_poll() {
        let api = InMemoryOrchestrator::new();
        let agents = vec![AgentType::MarketAnalyst, AgentType::FundamentalsAnalyst];
        let start = api.start_analysis(&request(agents)).await.unwrap();
        assert_eq!(start.message, "Analysis started for AAPL");

        let first = api.get_result(&start.task_id).await.unwrap();
        assert_eq!(first.status, TaskStatus::Running);
        assert_eq!(first.outputs[0].status, AgentStatus::Running);
        assert_eq!(first.outputs[1].status, AgentStatus::Pending);

        let second = api.get_result(&start.task_id).await.unwrap();
        assert_eq!(second.outputs[0].status, AgentStatus::Completed);
        assert_eq!(second.outputs[1].status, AgentStatus::Running);

        let third = api.get_result(&start.task_id).await.unwrap();
        assert_eq!(third.status, TaskStatus::Completed);
        assert!(third.is_terminal());
        assert_eq!(third.decision.unwrap().confidence, Decimal::new(60, 2));
    }

    #[tokio::test]
    async fn held_progress_does_not_advance() {
        let api = InMemoryOrchestrator::new();
        api.hold_progress(true).unwrap();
        let start = api
            .start_analysis(&request(vec![AgentType::MarketAnalyst]))
            .await
            .unwrap();

        for _ in 0..3 {
            let snapshot = api.get_result(&start.task_id).await.unwrap();
            assert_eq!(snapshot.outputs[0].status, AgentStatus::Running);
        }
    }

    #[tokio::test]
    async fn failing_agent_fails_the_run() {
        let api = InMemoryOrchestrator::new();
        api.fail_agent(Some(AgentType::FundamentalsAnalyst)).unwrap();
        let start = api
            .start_analysis(&request(vec![
                AgentType::MarketAnalyst,
                AgentType::FundamentalsAnalyst,
            ]))
            .await
            .unwrap();

        api.get_result(&start.task_id).await.unwrap();
        let failed = api.get_result(&start.task_id).await.unwrap();
        assert!(failed.is_failed());
        assert_eq!(failed.outputs[1].status, AgentStatus::Error);
        assert!(failed.error.unwrap().starts_with("Fundamentals"));
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let api = InMemoryOrchestrator::new();
        let first = api
            .start_analysis(&request(vec![AgentType::MarketAnalyst]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = api
            .start_analysis(&request(vec![AgentType::MarketAnalyst]))
            .await
            .unwrap();

        let history = api.history().await.unwrap();
        assert_eq!(history[0].task_id, second.task_id);
        assert_eq!(history[1].task_id, first.task_id);

        let err = api.get_result("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }
}
