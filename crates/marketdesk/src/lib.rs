//! MarketDesk - client for a multi-agent market analysis orchestrator.
//!
//! Picks the participating agents, manages prompt templates and template
//! sets, submits analyses and follows them to a final trading decision.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use marketdesk::client::{AgentSelection, AnalysisDraft, AnalysisSession};
//! use marketdesk::models::{Market, MarketDeskConfig};
//! use marketdesk::Desk;
//! ```

pub use marketdesk_cache as cache;
pub use marketdesk_client as client;
pub use marketdesk_models as models;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use marketdesk_cache::QueryCache;
use marketdesk_client::{
    AgentSelection, AnalysisSession, HttpOrchestratorClient, InMemoryOrchestrator,
    OrchestratorApi, TemplateService,
};
use marketdesk_models::MarketDeskConfig;

/// Load configuration from a TOML file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> anyhow::Result<MarketDeskConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(MarketDeskConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Build the orchestrator backend: HTTP, or the in-memory simulation when offline.
pub fn build_api(
    config: &MarketDeskConfig,
    offline: bool,
) -> anyhow::Result<Arc<dyn OrchestratorApi>> {
    if offline {
        tracing::info!("Using in-memory orchestrator");
        return Ok(Arc::new(InMemoryOrchestrator::new()));
    }
    let client = HttpOrchestratorClient::new(&config.api)
        .context("Failed to build HTTP client")?;
    tracing::info!(base_url = %config.api.base_url, "Using orchestrator service");
    Ok(Arc::new(client))
}

pub fn build_cache(config: &MarketDeskConfig) -> Arc<QueryCache> {
    Arc::new(QueryCache::new(
        config.cache.max_capacity,
        Duration::from_secs(config.cache.ttl_seconds),
    ))
}

/// Everything one front end needs, sharing a backend and a query cache.
pub struct Desk {
    config: MarketDeskConfig,
    api: Arc<dyn OrchestratorApi>,
    cache: Arc<QueryCache>,
}

impl Desk {
    pub fn new(config: MarketDeskConfig, api: Arc<dyn OrchestratorApi>) -> Self {
        let cache = build_cache(&config);
        Self { config, api, cache }
    }

    pub fn from_config(config: MarketDeskConfig, offline: bool) -> anyhow::Result<Self> {
        let api = build_api(&config, offline)?;
        Ok(Self::new(config, api))
    }

    pub fn config(&self) -> &MarketDeskConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn OrchestratorApi> {
        &self.api
    }

    pub fn templates(&self) -> TemplateService {
        TemplateService::new(Arc::clone(&self.api), Arc::clone(&self.cache))
    }

    pub fn session(&self) -> AnalysisSession {
        AnalysisSession::new(Arc::clone(&self.api), &self.config.polling)
            .with_cache(Arc::clone(&self.cache))
    }

    /// The configured starting selection.
    pub fn default_selection(&self) -> Result<AgentSelection, client::ClientError> {
        AgentSelection::from_config(&self.config.selection)
    }
}
