use std::collections::BTreeMap;
use std::sync::Arc;

use marketdesk_cache::{CacheKey, Collection, QueryCache};
use marketdesk_models::{
    AgentType, NewTemplate, NewTemplateSet, PromptTemplate, TemplateSet, TemplateUpdate,
};
use tracing::{debug, info, warn};

use crate::api::OrchestratorApi;
use crate::error::ClientError;
use crate::placeholders::{check_variables, parse_variable_list, VariableReport};

/// Template and template-set operations with read-through caching.
///
/// Reads go through the [`QueryCache`]; every mutation invalidates the
/// collection it touched so the next read refetches.
pub struct TemplateService {
    api: Arc<dyn OrchestratorApi>,
    cache: Arc<QueryCache>,
}

fn ensure_present(field: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn sort_templates(templates: &mut [PromptTemplate]) {
    templates.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl TemplateService {
    pub fn new(api: Arc<dyn OrchestratorApi>, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// All templates, or those of one agent type, oldest first (ties by id).
    pub async fn list_templates(
        &self,
        agent_type: Option<AgentType>,
    ) -> Result<Vec<PromptTemplate>, ClientError> {
        let api = Arc::clone(&self.api);
        let mut templates: Vec<PromptTemplate> = self
            .cache
            .get_or_fetch(CacheKey::Templates(agent_type), || async move {
                api.list_templates(agent_type).await
            })
            .await?;

        // The backend may ignore the filter; never show another agent's templates.
        if let Some(agent) = agent_type {
            templates.retain(|t| t.agent_type == agent);
        }
        sort_templates(&mut templates);
        Ok(templates)
    }

    pub async fn get_template(&self, id: &str) -> Result<PromptTemplate, ClientError> {
        let api = Arc::clone(&self.api);
        let owned = id.to_string();
        self.cache
            .get_or_fetch(CacheKey::Template(id.to_string()), || async move {
                api.get_template(&owned).await
            })
            .await
    }

    /// Create from form input: `variables` is a comma-separated list.
    pub async fn create_template(
        &self,
        name: &str,
        agent_type: AgentType,
        content: &str,
        variables: &str,
        description: &str,
    ) -> Result<PromptTemplate, ClientError> {
        self.create(NewTemplate {
            name: name.trim().to_string(),
            agent_type,
            content: content.to_string(),
            variables: parse_variable_list(variables),
            description: description.to_string(),
        })
        .await
    }

    pub async fn create(&self, template: NewTemplate) -> Result<PromptTemplate, ClientError> {
        ensure_present("name", &template.name)?;
        ensure_present("content", &template.content)?;

        let report = check_variables(&template.content, &template.variables);
        if !report.is_clean() {
            debug!(
                undeclared = ?report.undeclared,
                unused = ?report.unused,
                "Template variables do not match placeholders"
            );
        }

        let created = self.api.create_template(&template).await?;
        self.cache.invalidate(&[Collection::Templates]).await;
        info!(id = %created.id, agent_type = %created.agent_type, "Template created");
        Ok(created)
    }

    /// Apply a partial update. The agent type of a template never changes.
    pub async fn update_template(
        &self,
        id: &str,
        update: &TemplateUpdate,
    ) -> Result<PromptTemplate, ClientError> {
        if let Some(name) = &update.name {
            ensure_present("name", name)?;
        }
        if let Some(content) = &update.content {
            ensure_present("content", content)?;
        }
        if update.is_empty() {
            debug!(id, "Empty template update");
        }

        let updated = self.api.update_template(id, update).await?;
        self.cache.invalidate(&[Collection::Templates]).await;
        info!(id, "Template updated");
        Ok(updated)
    }

    pub async fn delete_template(&self, id: &str) -> Result<(), ClientError> {
        self.api.delete_template(id).await?;
        self.cache.invalidate(&[Collection::Templates]).await;
        info!(id, "Template deleted");
        Ok(())
    }

    /// Placeholder check for display next to a template.
    pub fn variable_report(template: &PromptTemplate) -> VariableReport {
        check_variables(&template.content, &template.variables)
    }

    /// Template sets, oldest first (ties by id).
    pub async fn list_template_sets(&self) -> Result<Vec<TemplateSet>, ClientError> {
        let api = Arc::clone(&self.api);
        let mut sets: Vec<TemplateSet> = self
            .cache
            .get_or_fetch(CacheKey::TemplateSets, || async move {
                api.list_template_sets().await
            })
            .await?;
        sets.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sets)
    }

    /// Create a set. The mapping must cover every agent type.
    pub async fn create_template_set(
        &self,
        name: &str,
        description: &str,
        template_ids: BTreeMap<AgentType, String>,
    ) -> Result<TemplateSet, ClientError> {
        ensure_present("name", name)?;
        let missing = marketdesk_models::template::missing_agents(&template_ids);
        if !missing.is_empty() {
            return Err(ClientError::validation(format!(
                "template set must cover every agent type; missing: {}",
                join_agents(&missing)
            )));
        }
        if let Some((agent, _)) = template_ids.iter().find(|(_, id)| id.trim().is_empty()) {
            return Err(ClientError::validation(format!(
                "template id for {agent} must not be empty"
            )));
        }

        let created = self
            .api
            .create_template_set(&NewTemplateSet {
                name: name.trim().to_string(),
                description: description.to_string(),
                template_ids,
            })
            .await?;
        self.cache.invalidate(&[Collection::TemplateSets]).await;
        info!(id = %created.id, name = %created.name, "Template set created");
        Ok(created)
    }

    /// Resolve a stored set into one template per agent type.
    ///
    /// Unknown sets and ids that no longer resolve are `NotFound`; a stored set
    /// that does not cover every agent type is a `Validation` error.
    pub async fn apply_template_set(
        &self,
        set_id: &str,
    ) -> Result<BTreeMap<AgentType, PromptTemplate>, ClientError> {
        let set = match self.find_template_set(set_id).await? {
            Some(set) => set,
            None => {
                // Another client may have created it since the list was cached.
                debug!(set_id, "Template set not in cached list, refetching");
                self.cache.invalidate(&[Collection::TemplateSets]).await;
                self.find_template_set(set_id)
                    .await?
                    .ok_or_else(|| ClientError::not_found(format!("template set {set_id}")))?
            }
        };

        let missing = set.missing_agents();
        if !missing.is_empty() {
            return Err(ClientError::validation(format!(
                "template set '{}' is partial; missing: {}",
                set.name,
                join_agents(&missing)
            )));
        }

        let mut applied = self.api.apply_template_set(set_id).await?;

        let mut resolved = BTreeMap::new();
        for (agent, id) in &set.template_ids {
            match applied.remove(agent) {
                Some(template) if &template.id == id => {
                    resolved.insert(*agent, template);
                }
                Some(template) => {
                    warn!(
                        set_id,
                        agent_type = %agent,
                        expected = %id,
                        got = %template.id,
                        "Applied template does not match the stored set"
                    );
                    return Err(ClientError::not_found(format!(
                        "template {id} referenced by set {set_id} for {agent}"
                    )));
                }
                None => {
                    return Err(ClientError::not_found(format!(
                        "template {id} referenced by set {set_id} for {agent}"
                    )));
                }
            }
        }

        info!(set_id, templates = resolved.len(), "Template set applied");
        Ok(resolved)
    }

    async fn find_template_set(&self, set_id: &str) -> Result<Option<TemplateSet>, ClientError> {
        Ok(self
            .list_template_sets()
            .await?
            .into_iter()
            .find(|s| s.id == set_id))
    }
}

fn join_agents(agents: &[AgentType]) -> String {
    agents
        .iter()
        .map(AgentType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
