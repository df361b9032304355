pub mod agent;
pub mod analysis;
pub mod config;
pub mod envelope;
pub mod template;
pub mod timestamp;

pub use agent::{AgentCategory, AgentType, UnknownAgentType};
pub use analysis::{
    AgentOutput, AgentStatus, AnalysisRequest, AnalysisResult, AnalysisStart, FinalDecision,
    Market, RiskLevel, TaskStatus, TradeAction, UnknownMarket,
};
pub use config::{ApiConfig, CacheConfig, MarketDeskConfig, PollingConfig, SelectionConfig};
pub use envelope::{ApiEnvelope, ErrorBody};
pub use template::{NewTemplate, NewTemplateSet, PromptTemplate, TemplateSet, TemplateUpdate};
