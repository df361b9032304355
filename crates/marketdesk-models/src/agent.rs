use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed roles of the analysis workflow.
///
/// Variant order is the declaration order used everywhere a stable ordering
/// of agent types is needed (`Ord`, [`AgentType::ALL`], template set listings).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    MarketAnalyst,
    FundamentalsAnalyst,
    NewsAnalyst,
    SocialAnalyst,
    BullResearcher,
    BearResearcher,
    ResearchManager,
    RiskyDebater,
    SafeDebater,
    NeutralDebater,
    RiskManager,
    TraderAi,
}

/// Grouping used for display and for the default template catalogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    Analyst,
    Researcher,
    Risk,
    Decision,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown agent type: {0}")]
pub struct UnknownAgentType(pub String);

impl AgentType {
    pub const ALL: [AgentType; 12] = [
        AgentType::MarketAnalyst,
        AgentType::FundamentalsAnalyst,
        AgentType::NewsAnalyst,
        AgentType::SocialAnalyst,
        AgentType::BullResearcher,
        AgentType::BearResearcher,
        AgentType::ResearchManager,
        AgentType::RiskyDebater,
        AgentType::SafeDebater,
        AgentType::NeutralDebater,
        AgentType::RiskManager,
        AgentType::TraderAi,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyst => "market_analyst",
            AgentType::FundamentalsAnalyst => "fundamentals_analyst",
            AgentType::NewsAnalyst => "news_analyst",
            AgentType::SocialAnalyst => "social_analyst",
            AgentType::BullResearcher => "bull_researcher",
            AgentType::BearResearcher => "bear_researcher",
            AgentType::ResearchManager => "research_manager",
            AgentType::RiskyDebater => "risky_debater",
            AgentType::SafeDebater => "safe_debater",
            AgentType::NeutralDebater => "neutral_debater",
            AgentType::RiskManager => "risk_manager",
            AgentType::TraderAi => "trader_ai",
        }
    }

    pub fn category(&self) -> AgentCategory {
        match self {
            AgentType::MarketAnalyst
            | AgentType::FundamentalsAnalyst
            | AgentType::NewsAnalyst
            | AgentType::SocialAnalyst => AgentCategory::Analyst,
            AgentType::BullResearcher
            | AgentType::BearResearcher
            | AgentType::ResearchManager => AgentCategory::Researcher,
            AgentType::RiskyDebater
            | AgentType::SafeDebater
            | AgentType::NeutralDebater
            | AgentType::RiskManager => AgentCategory::Risk,
            AgentType::TraderAi => AgentCategory::Decision,
        }
    }

    /// Human-readable label for tables and notices.
    pub fn label(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyst => "Market Analyst",
            AgentType::FundamentalsAnalyst => "Fundamentals Analyst",
            AgentType::NewsAnalyst => "News Analyst",
            AgentType::SocialAnalyst => "Social Media Analyst",
            AgentType::BullResearcher => "Bull Researcher",
            AgentType::BearResearcher => "Bear Researcher",
            AgentType::ResearchManager => "Research Manager",
            AgentType::RiskyDebater => "Aggressive Risk Debater",
            AgentType::SafeDebater => "Conservative Risk Debater",
            AgentType::NeutralDebater => "Neutral Risk Debater",
            AgentType::RiskManager => "Risk Manager",
            AgentType::TraderAi => "Trader",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = UnknownAgentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AgentType::ALL
            .iter()
            .copied()
            .find(|agent| agent.as_str() == wanted)
            .ok_or_else(|| UnknownAgentType(s.to_string()))
    }
}
