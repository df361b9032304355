pub mod api;
pub mod defaults;
pub mod error;
pub mod http;
pub mod memory;
pub mod notice;
pub mod placeholders;
pub mod poller;
pub mod selection;
pub mod session;
pub mod templates;

pub use api::OrchestratorApi;
pub use error::ClientError;
pub use http::HttpOrchestratorClient;
pub use memory::InMemoryOrchestrator;
pub use notice::{guarded, Notice, NoticeLevel};
pub use placeholders::{check_variables, parse_variable_list, placeholders, VariableReport};
pub use poller::{PollOutcome, ProgressEstimator, ResultPoller};
pub use selection::{
    compute_selection, AgentSelection, PairToggles, CORE_AGENTS, OPTIONAL_POOL, RESEARCH_PAIR,
    RISK_PAIR,
};
pub use session::{AnalysisDraft, AnalysisSession, AnalysisState};
pub use templates::TemplateService;
