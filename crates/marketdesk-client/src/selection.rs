use std::collections::BTreeSet;

use marketdesk_models::{AgentType, SelectionConfig};

use crate::error::ClientError;

/// Always selected, never individually toggleable.
pub const CORE_AGENTS: [AgentType; 3] = [
    AgentType::MarketAnalyst,
    AgentType::FundamentalsAnalyst,
    AgentType::ResearchManager,
];

/// Analysts the user may add one by one, in declaration order.
pub const OPTIONAL_POOL: [AgentType; 2] = [AgentType::NewsAnalyst, AgentType::SocialAnalyst];

/// Investment debate: enabled or disabled as a unit.
pub const RESEARCH_PAIR: [AgentType; 2] = [AgentType::BullResearcher, AgentType::BearResearcher];

/// Risk debate: enabled or disabled as a unit.
pub const RISK_PAIR: [AgentType; 4] = [
    AgentType::RiskyDebater,
    AgentType::SafeDebater,
    AgentType::NeutralDebater,
    AgentType::RiskManager,
];

/// On/off switches for the two debate groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairToggles {
    pub research: bool,
    pub risk: bool,
}

fn push_unique(selection: &mut Vec<AgentType>, agent: AgentType) {
    if !selection.contains(&agent) {
        selection.push(agent);
    }
}

/// Resolve the ordered, duplicate-free list of participating agents.
///
/// Order: `core`, then optional agents in pool order, then the research pair,
/// then the risk pair. Optional entries outside [`OPTIONAL_POOL`] are ignored.
/// This order is the execution order sent to the orchestrator.
pub fn compute_selection(
    core: &[AgentType],
    optional: &BTreeSet<AgentType>,
    pairs: PairToggles,
) -> Vec<AgentType> {
    let mut selection = Vec::with_capacity(
        core.len() + OPTIONAL_POOL.len() + RESEARCH_PAIR.len() + RISK_PAIR.len(),
    );

    for agent in core {
        push_unique(&mut selection, *agent);
    }
    for agent in OPTIONAL_POOL.iter().filter(|a| optional.contains(a)) {
        push_unique(&mut selection, *agent);
    }
    if pairs.research {
        for agent in RESEARCH_PAIR {
            push_unique(&mut selection, agent);
        }
    }
    if pairs.risk {
        for agent in RISK_PAIR {
            push_unique(&mut selection, agent);
        }
    }

    selection
}

/// The user's agent choices for one configuration session.
///
/// Only optional analysts and the two pair switches are state; the agent list
/// itself is derived on demand by [`AgentSelection::agents`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSelection {
    optional: BTreeSet<AgentType>,
    pairs: PairToggles,
}

impl AgentSelection {
    /// Core agents only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SelectionConfig) -> Result<Self, ClientError> {
        let mut selection = Self::new();
        for agent in &config.optional {
            ensure_optional(*agent)?;
            selection.optional.insert(*agent);
        }
        selection.pairs = PairToggles {
            research: config.research_pair,
            risk: config.risk_pair,
        };
        Ok(selection)
    }

    /// Rebuild a selection from a previously resolved agent list.
    ///
    /// A pair is enabled only when all of its members are listed; agents that are
    /// neither optional nor part of a complete pair are ignored.
    pub fn from_agents(agents: &[AgentType]) -> Self {
        let listed = |group: &[AgentType]| group.iter().all(|a| agents.contains(a));
        Self {
            optional: OPTIONAL_POOL
                .iter()
                .copied()
                .filter(|a| agents.contains(a))
                .collect(),
            pairs: PairToggles {
                research: listed(&RESEARCH_PAIR),
                risk: listed(&RISK_PAIR),
            },
        }
    }

    /// Add the optional analyst if absent, remove it if present.
    /// Returns whether it is selected afterwards.
    pub fn toggle_optional(&mut self, agent: AgentType) -> Result<bool, ClientError> {
        ensure_optional(agent)?;
        if self.optional.remove(&agent) {
            Ok(false)
        } else {
            self.optional.insert(agent);
            Ok(true)
        }
    }

    pub fn set_research_pair(&mut self, enabled: bool) {
        self.pairs.research = enabled;
    }

    pub fn set_risk_pair(&mut self, enabled: bool) {
        self.pairs.risk = enabled;
    }

    pub fn toggle_research_pair(&mut self) -> bool {
        self.pairs.research = !self.pairs.research;
        self.pairs.research
    }

    pub fn toggle_risk_pair(&mut self) -> bool {
        self.pairs.risk = !self.pairs.risk;
        self.pairs.risk
    }

    pub fn optional(&self) -> &BTreeSet<AgentType> {
        &self.optional
    }

    pub fn pairs(&self) -> PairToggles {
        self.pairs
    }

    /// Participating agents in execution order. Never empty.
    pub fn agents(&self) -> Vec<AgentType> {
        compute_selection(&CORE_AGENTS, &self.optional, self.pairs)
    }

    pub fn contains(&self, agent: AgentType) -> bool {
        self.agents().contains(&agent)
    }

    pub fn len(&self) -> usize {
        self.agents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents().is_empty()
    }
}

pub fn is_core(agent: AgentType) -> bool {
    CORE_AGENTS.contains(&agent)
}

fn ensure_optional(agent: AgentType) -> Result<(), ClientError> {
    if OPTIONAL_POOL.contains(&agent) {
        return Ok(());
    }
    let reason = if is_core(agent) {
        "is a core agent and always selected"
    } else if RESEARCH_PAIR.contains(&agent) {
        "belongs to the research debate pair; toggle the pair instead"
    } else if RISK_PAIR.contains(&agent) {
        "belongs to the risk debate pair; toggle the pair instead"
    } else {
        "cannot be selected"
    };
    Err(ClientError::validation(format!("{agent} {reason}")))
}
