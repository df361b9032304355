use std::fmt;

use marketdesk_models::agent::AgentType;

/// Resource collections of the orchestrator API. Mutations invalidate whole
/// collections; every cached query belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Templates,
    TemplateSets,
    History,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Templates => "templates",
            Collection::TemplateSets => "template-sets",
            Collection::History => "history",
        };
        f.write_str(name)
    }
}

/// Identity of one cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `GET /templates`, optionally filtered by agent type.
    Templates(Option<AgentType>),
    /// `GET /templates/{id}`.
    Template(String),
    TemplateSets,
    History,
}

impl CacheKey {
    pub fn collection(&self) -> Collection {
        match self {
            CacheKey::Templates(_) | CacheKey::Template(_) => Collection::Templates,
            CacheKey::TemplateSets => Collection::TemplateSets,
            CacheKey::History => Collection::History,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Templates(None) => write!(f, "templates"),
            CacheKey::Templates(Some(agent)) => write!(f, "templates?agent_type={agent}"),
            CacheKey::Template(id) => write!(f, "templates/{id}"),
            CacheKey::TemplateSets => write!(f, "template-sets"),
            CacheKey::History => write!(f, "history"),
        }
    }
}
