use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use marketdesk_models::{
    AgentType, AnalysisRequest, AnalysisResult, AnalysisStart, ApiConfig, ApiEnvelope, ErrorBody,
    NewTemplate, NewTemplateSet, PromptTemplate, TemplateSet, TemplateUpdate,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::OrchestratorApi;
use crate::error::ClientError;

/// [`OrchestratorApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrchestratorClient {
    client: Client,
    base: String,
}

impl HttpOrchestratorClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base: format!("{}/orchestrator", config.base_url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Send a request and unwrap the `data` field of the envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ClientError> {
        let body = self.send_raw(request, what).await?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body)?;
        Ok(envelope.into_data())
    }

    async fn send_raw(&self, request: RequestBuilder, what: &str) -> Result<Vec<u8>, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(what, status = status.as_u16(), bytes = body.len(), "Orchestrator response");

        if !status.is_success() {
            let err = error_from_response(status, &body, what);
            warn!(what, status = status.as_u16(), error = %err, "Orchestrator request failed");
            return Err(err);
        }
        Ok(body.to_vec())
    }
}

/// Map a non-2xx response to the client error taxonomy.
pub(crate) fn error_from_response(status: StatusCode, body: &[u8], what: &str) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message())
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(format!("{what}: {message}"))
    } else {
        ClientError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl OrchestratorApi for HttpOrchestratorClient {
    async fn list_templates(
        &self,
        agent_type: Option<AgentType>,
    ) -> Result<Vec<PromptTemplate>, ClientError> {
        let mut request = self.client.get(self.url("/templates"));
        if let Some(agent) = agent_type {
            request = request.query(&[("agent_type", agent.as_str())]);
        }
        self.send(request, "templates").await
    }

    async fn get_template(&self, id: &str) -> Result<PromptTemplate, ClientError> {
        let request = self.client.get(self.url(&format!("/templates/{id}")));
        self.send(request, &format!("template {id}")).await
    }

    async fn create_template(
        &self,
        template: &NewTemplate,
    ) -> Result<PromptTemplate, ClientError> {
        let request = self.client.post(self.url("/templates")).json(template);
        self.send(request, "create template").await
    }

    async fn update_template(
        &self,
        id: &str,
        update: &TemplateUpdate,
    ) -> Result<PromptTemplate, ClientError> {
        let request = self
            .client
            .put(self.url(&format!("/templates/{id}")))
            .json(update);
        self.send(request, &format!("template {id}")).await
    }

    async fn delete_template(&self, id: &str) -> Result<(), ClientError> {
        let request = self.client.delete(self.url(&format!("/templates/{id}")));
        // Body (if any) carries nothing the client needs.
        self.send_raw(request, &format!("template {id}")).await?;
        Ok(())
    }

    async fn list_template_sets(&self) -> Result<Vec<TemplateSet>, ClientError> {
        let request = self.client.get(self.url("/template-sets"));
        self.send(request, "template sets").await
    }

    async fn create_template_set(
        &self,
        set: &NewTemplateSet,
    ) -> Result<TemplateSet, ClientError> {
        let request = self.client.post(self.url("/template-sets")).json(set);
        self.send(request, "create template set").await
    }

    async fn apply_template_set(
        &self,
        set_id: &str,
    ) -> Result<BTreeMap<AgentType, PromptTemplate>, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/template-sets/{set_id}/apply")));
        self.send(request, &format!("template set {set_id}")).await
    }

    async fn start_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisStart, ClientError> {
        let http = self.client.post(self.url("/analyze")).json(request);
        self.send(http, "analyze").await
    }

    async fn history(&self) -> Result<Vec<AnalysisResult>, ClientError> {
        let request = self.client.get(self.url("/history"));
        self.send(request, "history").await
    }

    async fn get_result(&self, task_id: &str) -> Result<AnalysisResult, ClientError> {
        let request = self.client.get(self.url(&format!("/result/{task_id}")));
        self.send(request, &format!("result {task_id}")).await
    }
}
