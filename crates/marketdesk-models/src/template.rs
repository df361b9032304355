use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentType;

/// A reusable prompt body for one agent type.
///
/// `content` may contain `{variable}` placeholders; binding values to them is
/// done by the orchestrator at analysis time, never by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    /// Fixed for the lifetime of the template.
    pub agent_type: AgentType,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Advisory: at most one default per agent type, not enforced here.
    #[serde(default)]
    pub is_default: bool,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /orchestrator/templates`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTemplate {
    pub name: String,
    pub agent_type: AgentType,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Body of `PUT /orchestrator/templates/{id}`.
///
/// There is deliberately no `agent_type` field: a template keeps the agent type
/// it was created with. Unknown JSON fields (including `agent_type`) are dropped
/// on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content.is_none()
            && self.variables.is_none()
            && self.description.is_none()
    }

    /// Apply the present fields to `template`. Identity and agent type are untouched.
    pub fn apply_to(&self, template: &mut PromptTemplate, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            template.name = name.clone();
        }
        if let Some(content) = &self.content {
            template.content = content.clone();
        }
        if let Some(variables) = &self.variables {
            template.variables = variables.clone();
        }
        if let Some(description) = &self.description {
            template.description = description.clone();
        }
        template.updated_at = now;
    }
}

/// A named mapping from agent type to template id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template_ids: BTreeMap<AgentType, String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl TemplateSet {
    /// Agent types the set has no template for, in declaration order.
    pub fn missing_agents(&self) -> Vec<AgentType> {
        missing_agents(&self.template_ids)
    }

    /// A set is only usable once it covers every agent type.
    pub fn is_total(&self) -> bool {
        self.missing_agents().is_empty()
    }
}

/// Body of `POST /orchestrator/template-sets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTemplateSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template_ids: BTreeMap<AgentType, String>,
}

pub fn missing_agents(template_ids: &BTreeMap<AgentType, String>) -> Vec<AgentType> {
    AgentType::ALL
        .iter()
        .copied()
        .filter(|agent| !template_ids.contains_key(agent))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> PromptTemplate {
        let now = Utc::now();
        PromptTemplate {
            id: "default_market".to_string(),
            name: "Default market analyst".to_string(),
            agent_type: AgentType::MarketAnalyst,
            content: "Analyze {ticker} on {trade_date}".to_string(),
            variables: vec!["ticker".to_string(), "trade_date".to_string()],
            description: String::new(),
            is_default: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn template_from_orchestrator_payload() {
        let payload = serde_json::json!({
            "id": "a1b2c3d4",
            "name": "Momentum",
            "agent_type": "market_analyst",
            "content": "Focus on {ticker} momentum",
            "variables": ["ticker"],
            "description": "",
            "is_default": false,
            "created_at": "2025-03-01T09:30:00.123456",
            "updated_at": "2025-03-01T09:31:00.000001"
        });

        let template: PromptTemplate = serde_json::from_value(payload).unwrap();
        assert_eq!(template.agent_type, AgentType::MarketAnalyst);
        assert_eq!(template.variables, vec!["ticker"]);
        assert!(template.updated_at > template.created_at);
    }

    #[test]
    fn template_defaults_for_optional_fields() {
        let payload = serde_json::json!({
            "id": "x",
            "name": "Bare",
            "agent_type": "trader_ai",
            "content": "Decide.",
            "created_at": "2025-03-01T09:30:00Z",
            "updated_at": "2025-03-01T09:30:00Z"
        });

        let template: PromptTemplate = serde_json::from_value(payload).unwrap();
        assert!(template.variables.is_empty());
        assert!(template.description.is_empty());
        assert!(!template.is_default);
    }

    #[test]
    fn update_body_omits_absent_fields() {
        let update = TemplateUpdate {
            content: Some("new body".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"content": "new body"}));
    }

    #[test]
    fn update_ignores_agent_type_in_json() {
        let update: TemplateUpdate = serde_json::from_value(serde_json::json!({
            "name": "Renamed",
            "agent_type": "risk_manager"
        }))
        .unwrap();

        let mut template = sample_template();
        update.apply_to(&mut template, Utc::now());
        assert_eq!(template.name, "Renamed");
        assert_eq!(template.agent_type, AgentType::MarketAnalyst);
        assert!(!serde_json::to_string(&update).unwrap().contains("agent_type"));
    }

    #[test]
    fn apply_keeps_identity_and_bumps_updated_at() {
        let mut template = sample_template();
        let created = template.created_at;
        let later = created + chrono::Duration::seconds(5);
        TemplateUpdate {
            variables: Some(vec!["ticker".to_string()]),
            ..Default::default()
        }
        .apply_to(&mut template, later);

        assert_eq!(template.id, "default_market");
        assert_eq!(template.created_at, created);
        assert_eq!(template.updated_at, later);
        assert_eq!(template.variables, vec!["ticker"]);
    }

    #[test]
    fn template_set_totality() {
        let mut ids: BTreeMap<AgentType, String> = AgentType::ALL
            .iter()
            .map(|a| (*a, format!("default_{a}")))
            .collect();
        let mut set = TemplateSet {
            id: "s1".to_string(),
            name: "Balanced".to_string(),
            description: String::new(),
            template_ids: ids.clone(),
            is_default: false,
            created_at: Utc::now(),
        };
        assert!(set.is_total());

        ids.remove(&AgentType::SafeDebater);
        ids.remove(&AgentType::BullResearcher);
        set.template_ids = ids;
        assert_eq!(
            set.missing_agents(),
            vec![AgentType::BullResearcher, AgentType::SafeDebater]
        );
    }

    #[test]
    fn template_set_keys_are_agent_names() {
        let payload = serde_json::json!({
            "id": "s1",
            "name": "Aggressive",
            "template_ids": {"market_analyst": "t1", "trader_ai": "t2"},
            "created_at": "2025-03-01T09:30:00"
        });
        let set: TemplateSet = serde_json::from_value(payload).unwrap();
        assert_eq!(set.template_ids[&AgentType::TraderAi], "t2");
        assert_eq!(set.template_ids.len(), 2);
    }
}
