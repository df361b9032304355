use serde::{Deserialize, Serialize};

use crate::agent::AgentType;

/// Top-level configuration for MarketDesk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketDeskConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Where the orchestrator service lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL; endpoints are resolved under `{base_url}/orchestrator`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds. Expiry surfaces as a network error.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Result polling while an analysis runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,
    /// Rough time each agent takes; drives the simulated progress estimate
    /// when the result payload carries no per-agent statuses yet.
    #[serde(default = "default_seconds_per_agent")]
    pub simulated_seconds_per_agent: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
            simulated_seconds_per_agent: default_seconds_per_agent(),
        }
    }
}

/// In-memory query cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Initial agent selection for a new session. Core agents are always on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectionConfig {
    #[serde(default)]
    pub optional: Vec<AgentType>,
    #[serde(default)]
    pub research_pair: bool,
    #[serde(default)]
    pub risk_pair: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    3
}
fn default_seconds_per_agent() -> u64 {
    10
}
fn default_cache_capacity() -> u64 {
    1_000
}
fn default_cache_ttl() -> u64 {
    300
}
