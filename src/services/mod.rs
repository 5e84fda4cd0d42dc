/// External service collaborators
///
/// Model inference, knowledge-base retrieval and web search are injected into
/// the node handlers through these traits. The engine only knows "send a
/// request payload, get a result payload or an error"; transport is the
/// implementation's business. `http` ships a generic JSON-over-HTTP adapter.

// JSON-over-HTTP adapter for all three providers
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Request for a single model completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Model identifier as configured on the node
    pub model: String,
    /// Prompt after `{{variable}}` substitution
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Tool names an agent may use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Iteration cap for agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
}

/// Token accounting reported by a model provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Completion returned by a model provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub response: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Knowledge-base retrieval request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
    pub top_k: usize,
    pub retrieval_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
}

/// One ranked passage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub content: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Retrieval result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    #[serde(default)]
    pub passages: Vec<Passage>,
}

/// Web search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// One web search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Web search result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

/// Model inference capability used by `llm` and `agent` nodes
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse>;
}

/// Retrieval capability used by `rag` nodes
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResponse>;
}

/// Search capability used by `web-search` nodes
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;
}

/// Optional set of injected providers
///
/// A node whose provider is missing fails with a descriptive error; the run
/// carries on under the usual continuation policy.
#[derive(Clone, Default)]
pub struct ServiceHub {
    model: Option<Arc<dyn ModelProvider>>,
    retrieval: Option<Arc<dyn RetrievalProvider>>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl std::fmt::Debug for ServiceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHub")
            .field("model", &self.model.is_some())
            .field("retrieval", &self.retrieval.is_some())
            .field("search", &self.search.is_some())
            .finish()
    }
}

impl ServiceHub {
    /// Hub without any providers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(provider);
        self
    }

    pub fn with_retrieval(mut self, provider: Arc<dyn RetrievalProvider>) -> Self {
        self.retrieval = Some(provider);
        self
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Model provider or a configuration error
    pub fn model(&self) -> Result<&Arc<dyn ModelProvider>> {
        self.model
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No model provider configured"))
    }

    /// Retrieval provider or a configuration error
    pub fn retrieval(&self) -> Result<&Arc<dyn RetrievalProvider>> {
        self.retrieval
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No retrieval provider configured"))
    }

    /// Search provider or a configuration error
    pub fn search(&self) -> Result<&Arc<dyn SearchProvider>> {
        self.search
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No search provider configured"))
    }
}
