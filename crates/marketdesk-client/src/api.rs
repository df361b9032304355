use std::collections::BTreeMap;

use async_trait::async_trait;
use marketdesk_models::{
    AgentType, AnalysisRequest, AnalysisResult, AnalysisStart, NewTemplate, NewTemplateSet,
    PromptTemplate, TemplateSet, TemplateUpdate,
};

use crate::error::ClientError;

/// The orchestrator endpoints the client consumes. Mockable for testing.
///
/// Implementations return unwrapped payloads; envelope handling and status
/// mapping happen inside the implementation.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// `GET /orchestrator/templates[?agent_type=X]`
    async fn list_templates(
        &self,
        agent_type: Option<AgentType>,
    ) -> Result<Vec<PromptTemplate>, ClientError>;

    /// `GET /orchestrator/templates/{id}`
    async fn get_template(&self, id: &str) -> Result<PromptTemplate, ClientError>;

    /// `POST /orchestrator/templates`
    async fn create_template(&self, template: &NewTemplate)
        -> Result<PromptTemplate, ClientError>;

    /// `PUT /orchestrator/templates/{id}`
    async fn update_template(
        &self,
        id: &str,
        update: &TemplateUpdate,
    ) -> Result<PromptTemplate, ClientError>;

    /// `DELETE /orchestrator/templates/{id}`
    async fn delete_template(&self, id: &str) -> Result<(), ClientError>;

    /// `GET /orchestrator/template-sets`
    async fn list_template_sets(&self) -> Result<Vec<TemplateSet>, ClientError>;

    /// `POST /orchestrator/template-sets`
    async fn create_template_set(&self, set: &NewTemplateSet)
        -> Result<TemplateSet, ClientError>;

    /// `POST /orchestrator/template-sets/{id}/apply`
    async fn apply_template_set(
        &self,
        set_id: &str,
    ) -> Result<BTreeMap<AgentType, PromptTemplate>, ClientError>;

    /// `POST /orchestrator/analyze`
    async fn start_analysis(&self, request: &AnalysisRequest)
        -> Result<AnalysisStart, ClientError>;

    /// `GET /orchestrator/history`
    async fn history(&self) -> Result<Vec<AnalysisResult>, ClientError>;

    /// `GET /orchestrator/result/{task_id}`
    async fn get_result(&self, task_id: &str) -> Result<AnalysisResult, ClientError>;
}
