/// JSON-over-HTTP service adapter
///
/// POSTs the request struct as JSON to a configured endpoint and deserialises
/// the response body. One client serves all three providers; each provider
/// fails with a clear error when its endpoint is not configured.

use crate::config::ServiceConfig;
use crate::services::{
    ModelProvider, ModelRequest, ModelResponse, RetrievalProvider, RetrievalRequest,
    RetrievalResponse, SearchProvider, SearchRequest, SearchResponse,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// HTTP client for external model, retrieval and search services
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpServiceClient {
    /// Create a client from service configuration
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client, config })
    }

    async fn post_json<Req, Resp>(&self, service: &str, url: Option<&str>, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = url.ok_or_else(|| anyhow::anyhow!("No {} endpoint configured", service))?;
        tracing::debug!("🌍 {} request: POST {}", service, url);

        let mut request = self.client.post(url).json(body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{} request failed: {}", service, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {} response body: {}", service, e))?;

        tracing::debug!("📡 {} response status: {}", service, status);

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "{} service returned {}: {}",
                service,
                status,
                truncate(&text, 200)
            ));
        }

        serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Invalid {} response: {}", service, e))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text.to_string(),
    }
}

#[async_trait]
impl ModelProvider for HttpServiceClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse> {
        self.post_json("model", self.config.model_url.as_deref(), &request)
            .await
    }
}

#[async_trait]
impl RetrievalProvider for HttpServiceClient {
    async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        self.post_json("retrieval", self.config.retrieval_url.as_deref(), &request)
            .await
    }
}

#[async_trait]
impl SearchProvider for HttpServiceClient {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.post_json("search", self.config.search_url.as_deref(), &request)
            .await
    }
}
