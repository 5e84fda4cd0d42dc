/// Model-backed node handlers (llm, agent)
///
/// Both node types render their prompt templates against the context and send
/// one request to the injected `ModelProvider`. Agents additionally pass their
/// tool list and iteration cap. When a node has no prompt, the primary input
/// text is used as the prompt.

use super::input_text;
use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::NodeHandler;
use crate::runtime::template;
use crate::services::{ModelRequest, ServiceHub};
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Llm,
    Agent,
}

/// Handler for `llm` and `agent` nodes
#[derive(Debug, Clone)]
pub struct ModelHandler {
    services: ServiceHub,
    kind: ModelKind,
}

impl ModelHandler {
    pub fn llm(services: ServiceHub) -> Self {
        Self {
            services,
            kind: ModelKind::Llm,
        }
    }

    pub fn agent(services: ServiceHub) -> Self {
        Self {
            services,
            kind: ModelKind::Agent,
        }
    }

    fn build_request(&self, node: &Node, ctx: &ExecutionContext) -> Result<ModelRequest> {
        let model = node
            .data_str("model")
            .ok_or_else(|| anyhow::anyhow!("Node '{}' has no model configured", node.id))?;

        let prompt = match node.data_str("prompt") {
            Some(raw) => template::render(raw, ctx),
            None => input_text(node, ctx)
                .ok_or_else(|| anyhow::anyhow!("Node '{}' has no prompt and no input", node.id))?,
        };

        let system_source = match self.kind {
            ModelKind::Llm => node.data_str("systemPrompt"),
            ModelKind::Agent => node
                .data_str("instructions")
                .or_else(|| node.data_str("systemPrompt")),
        };

        let mut request = ModelRequest {
            model: model.to_string(),
            prompt,
            system_prompt: system_source.map(|raw| template::render(raw, ctx)),
            temperature: node.data_f64("temperature"),
            max_tokens: node
                .data_f64("maxTokens")
                .filter(|n| *n >= 1.0)
                .map(|n| n as u64),
            ..ModelRequest::default()
        };

        if self.kind == ModelKind::Agent {
            request.tools = tool_names(node.field("tools"));
            request.max_iterations = node
                .data_f64("maxIterations")
                .filter(|n| *n >= 1.0)
                .map(|n| n as u64);
        }

        Ok(request)
    }
}

/// Tool names from either `["search"]` or `[{"name": "search"}]`
fn tool_names(tools: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = tools else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter(|name| !name.trim().is_empty())
        .collect()
}

#[async_trait]
impl NodeHandler for ModelHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let provider = self.services.model()?;
        let request = self.build_request(node, ctx)?;

        tracing::debug!(
            "🤖 Calling model '{}' for node '{}' ({} prompt chars)",
            request.model,
            node.id,
            request.prompt.len()
        );

        let response = provider
            .generate(request.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Model call failed: {}", e))?;

        let model = if response.model.is_empty() {
            request.model
        } else {
            response.model
        };

        Ok(json!({
            "response": response.response,
            "model": model,
            "usage": response.usage,
            "prompt": request.prompt,
        }))
    }
}
