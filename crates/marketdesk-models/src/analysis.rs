use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentType;

/// Market the ticker trades on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    #[default]
    China,
    Hk,
    Us,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown market: {0} (expected china, hk or us)")]
pub struct UnknownMarket(pub String);

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::China => "china",
            Market::Hk => "hk",
            Market::Us => "us",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = UnknownMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "china" | "cn" | "a" => Ok(Market::China),
            "hk" | "hongkong" => Ok(Market::Hk),
            "us" => Ok(Market::Us),
            _ => Err(UnknownMarket(s.to_string())),
        }
    }
}

/// Body of `POST /orchestrator/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub query: String,
    pub ticker: String,
    #[serde(default)]
    pub market_type: Market,
    /// `YYYY-MM-DD`; the orchestrator uses the latest session when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<NaiveDate>,
    /// Resolved selection in execution order.
    pub selected_analysts: Vec<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_set_id: Option<String>,
}

/// Acknowledgement returned by `POST /orchestrator/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisStart {
    pub task_id: String,
    #[serde(default)]
    pub message: String,
}

/// Status of a single agent's output section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }
}

/// Overall status of an analysis task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }
}

/// One agent's contribution to a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutput {
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub content: String,
    #[serde(default, with = "crate::timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    #[serde(alias = "BUY")]
    Buy,
    #[serde(alias = "HOLD")]
    Hold,
    #[serde(alias = "SELL")]
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Final aggregated decision of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalDecision {
    pub action: TradeAction,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reasoning: String,
}

/// Payload of `GET /orchestrator/result/{task_id}` and of the history list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub task_id: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub market_type: Market,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub outputs: Vec<AgentOutput>,
    #[serde(default)]
    pub decision: Option<FinalDecision>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, with = "crate::timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisResult {
    /// An empty result for a freshly acknowledged task.
    pub fn pending(task_id: &str, ticker: &str, market_type: Market) -> Self {
        Self {
            task_id: task_id.to_string(),
            ticker: ticker.to_string(),
            market_type,
            status: TaskStatus::Pending,
            outputs: Vec::new(),
            decision: None,
            error: None,
            created_at: None,
            completed_at: None,
        }
    }

    /// Whether polling can stop.
    ///
    /// The overall status is authoritative when it says so; otherwise a result
    /// with a decision and no unfinished agent section is also terminal.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Completed | TaskStatus::Failed => true,
            TaskStatus::Pending | TaskStatus::Running => {
                self.decision.is_some()
                    && !self.outputs.is_empty()
                    && self.outputs.iter().all(|o| o.status.is_finished())
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn output(&self, agent: AgentType) -> Option<&AgentOutput> {
        self.outputs.iter().find(|o| o.agent_type == agent)
    }

    pub fn finished_outputs(&self) -> usize {
        self.outputs
            .iter()
            .filter(|o| o.status.is_finished())
            .count()
    }

    /// Merge a newer snapshot of the same task into this one.
    ///
    /// Results are append-only: a completed agent output is never revised, an
    /// output missing from the newer snapshot is kept, and a decision once seen
    /// is kept. Returns the agents whose completed output the snapshot tried to
    /// change.
    pub fn merge_snapshot(&mut self, newer: AnalysisResult) -> Vec<AgentType> {
        let mut refused = Vec::new();

        for incoming in newer.outputs {
            match self
                .outputs
                .iter_mut()
                .find(|o| o.agent_type == incoming.agent_type)
            {
                Some(existing) if existing.status == AgentStatus::Completed => {
                    if existing.content != incoming.content
                        || existing.status != incoming.status
                    {
                        refused.push(incoming.agent_type);
                    }
                }
                Some(existing) => *existing = incoming,
                None => self.outputs.push(incoming),
            }
        }

        // Status only moves forward.
        if !self.is_terminal() && newer.status.rank() >= self.status.rank() {
            self.status = newer.status;
        }
        if newer.decision.is_some() && self.decision.is_none() {
            self.decision = newer.decision;
        }
        if newer.error.is_some() {
            self.error = newer.error;
        }
        if self.ticker.is_empty() {
            self.ticker = newer.ticker;
        }
        self.created_at = self.created_at.or(newer.created_at);
        self.completed_at = self.completed_at.or(newer.completed_at);

        refused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn output(agent: AgentType, status: AgentStatus, content: &str) -> AgentOutput {
        AgentOutput {
            agent_type: agent,
            status,
            content: content.to_string(),
            updated_at: None,
        }
    }

    fn decision() -> FinalDecision {
        FinalDecision {
            action: TradeAction::Buy,
            confidence: dec!(0.72),
            target_price: Some(dec!(1850.00)),
            risk_level: RiskLevel::Medium,
            reasoning: "Earnings momentum outweighs valuation risk".to_string(),
        }
    }

    #[test]
    fn request_wire_format() {
        let request = AnalysisRequest {
            query: "Analyze 600519".to_string(),
            ticker: "600519".to_string(),
            market_type: Market::China,
            trade_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            selected_analysts: vec![AgentType::MarketAnalyst, AgentType::NewsAnalyst],
            template_set_id: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["market_type"], "china");
        assert_eq!(json["trade_date"], "2025-03-01");
        assert_eq!(
            json["selected_analysts"],
            serde_json::json!(["market_analyst", "news_analyst"])
        );
        assert!(json.get("template_set_id").is_none());
    }

    #[test]
    fn market_parsing() {
        assert_eq!("HK".parse::<Market>().unwrap(), Market::Hk);
        assert_eq!(" us ".parse::<Market>().unwrap(), Market::Us);
        assert!("moon".parse::<Market>().is_err());
    }

    #[test]
    fn result_from_payload_with_decimal_strings() {
        let payload = serde_json::json!({
            "task_id": "7f3a9c21",
            "ticker": "AAPL",
            "market_type": "us",
            "status": "completed",
            "outputs": [
                {"agent_type": "market_analyst", "status": "completed", "content": "Uptrend"},
                {"agent_type": "news_analyst", "status": "error", "content": "feed down"}
            ],
            "decision": {
                "action": "BUY",
                "confidence": "0.65",
                "target_price": "212.50",
                "risk_level": "medium",
                "reasoning": "Trend intact"
            },
            "created_at": "2025-03-01T09:30:00"
        });

        let result: AnalysisResult = serde_json::from_value(payload).unwrap();
        assert!(result.is_terminal());
        let decision = result.decision.unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.target_price, Some(dec!(212.50)));
        assert_eq!(result.outputs[1].status, AgentStatus::Error);
    }

    #[test]
    fn error_status_alias_maps_to_failed() {
        let result: AnalysisResult = serde_json::from_value(serde_json::json!({
            "task_id": "t",
            "status": "error",
            "error": "LLM quota exhausted"
        }))
        .unwrap();
        assert!(result.is_failed());
        assert!(result.is_terminal());
    }

    #[test]
    fn running_result_is_not_terminal() {
        let mut result = AnalysisResult::pending("t", "AAPL", Market::Us);
        result.status = TaskStatus::Running;
        result.outputs = vec![
            output(AgentType::MarketAnalyst, AgentStatus::Completed, "done"),
            output(AgentType::FundamentalsAnalyst, AgentStatus::Running, ""),
        ];
        assert!(!result.is_terminal());
        assert_eq!(result.finished_outputs(), 1);
    }

    #[test]
    fn decision_with_all_outputs_finished_is_terminal() {
        let mut result = AnalysisResult::pending("t", "AAPL", Market::Us);
        result.status = TaskStatus::Running;
        result.outputs = vec![output(
            AgentType::MarketAnalyst,
            AgentStatus::Completed,
            "done",
        )];
        result.decision = Some(decision());
        assert!(result.is_terminal());
    }

    #[test]
    fn merge_never_revises_completed_output() {
        let mut tracked = AnalysisResult::pending("t", "AAPL", Market::Us);
        tracked.outputs = vec![output(
            AgentType::MarketAnalyst,
            AgentStatus::Completed,
            "Uptrend",
        )];

        let mut newer = AnalysisResult::pending("t", "AAPL", Market::Us);
        newer.status = TaskStatus::Running;
        newer.outputs = vec![
            output(AgentType::MarketAnalyst, AgentStatus::Completed, "Downtrend"),
            output(AgentType::FundamentalsAnalyst, AgentStatus::Running, ""),
        ];

        let refused = tracked.merge_snapshot(newer);
        assert_eq!(refused, vec![AgentType::MarketAnalyst]);
        assert_eq!(tracked.outputs[0].content, "Uptrend");
        assert_eq!(tracked.outputs.len(), 2);
        assert_eq!(tracked.status, TaskStatus::Running);
    }

    #[test]
    fn merge_keeps_outputs_missing_from_newer_snapshot() {
        let mut tracked = AnalysisResult::pending("t", "AAPL", Market::Us);
        tracked.outputs = vec![output(
            AgentType::NewsAnalyst,
            AgentStatus::Running,
            "",
        )];

        let newer = AnalysisResult::pending("t", "AAPL", Market::Us);
        assert!(tracked.merge_snapshot(newer).is_empty());
        assert_eq!(tracked.outputs.len(), 1);
    }

    #[test]
    fn merge_never_moves_status_backwards() {
        let mut tracked = AnalysisResult::pending("t", "AAPL", Market::Us);
        tracked.status = TaskStatus::Running;

        let stale = AnalysisResult::pending("t", "AAPL", Market::Us);
        tracked.merge_snapshot(stale);
        assert_eq!(tracked.status, TaskStatus::Running);

        let mut failed = AnalysisResult::pending("t", "AAPL", Market::Us);
        failed.status = TaskStatus::Failed;
        tracked.merge_snapshot(failed);
        assert_eq!(tracked.status, TaskStatus::Failed);
    }

    #[test]
    fn merge_keeps_first_decision() {
        let mut tracked = AnalysisResult::pending("t", "AAPL", Market::Us);
        tracked.decision = Some(decision());

        let mut newer = AnalysisResult::pending("t", "AAPL", Market::Us);
        let mut other = decision();
        other.action = TradeAction::Sell;
        newer.decision = Some(other);

        tracked.merge_snapshot(newer);
        assert_eq!(tracked.decision.unwrap().action, TradeAction::Buy);
    }
}
