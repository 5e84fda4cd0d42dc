/// Retrieval (rag) node handler
///
/// Passages below `similarityThreshold` are dropped, the rest are ranked by
/// descending score and truncated to `topK`. The joined passage text is
/// exposed as `context` for downstream prompts.

use super::{positive_usize, templated_or_input};
use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::NodeHandler;
use crate::services::{Passage, RetrievalRequest, ServiceHub};
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_RETRIEVAL_METHOD: &str = "similarity";

#[derive(Debug, Clone)]
pub struct RetrievalHandler {
    services: ServiceHub,
}

impl RetrievalHandler {
    pub fn new(services: ServiceHub) -> Self {
        Self { services }
    }
}

/// Filter, rank and truncate passages
pub fn rank_passages(
    mut passages: Vec<Passage>,
    threshold: Option<f64>,
    top_k: usize,
) -> Vec<Passage> {
    if let Some(threshold) = threshold {
        passages.retain(|passage| passage.score >= threshold);
    }
    passages.sort_by(|a, b| b.score.total_cmp(&a.score));
    passages.truncate(top_k);
    passages
}

#[async_trait]
impl NodeHandler for RetrievalHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let provider = self.services.retrieval()?;

        let query = templated_or_input(node, "query", ctx)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Retrieval node '{}' has no query", node.id))?;

        let top_k = positive_usize(node, "topK", DEFAULT_TOP_K);
        let threshold = node.data_f64("similarityThreshold");
        let request = RetrievalRequest {
            query: query.clone(),
            knowledge_base_id: node.data_str("knowledgeBaseId").map(str::to_string),
            top_k,
            retrieval_method: node
                .data_str("retrievalMethod")
                .unwrap_or(DEFAULT_RETRIEVAL_METHOD)
                .to_string(),
            similarity_threshold: threshold,
        };

        tracing::debug!("🔍 Retrieving top {} passages for node '{}'", top_k, node.id);

        let response = provider
            .retrieve(request)
            .await
            .map_err(|e| anyhow::anyhow!("Retrieval failed: {}", e))?;

        let passages = rank_passages(response.passages, threshold, top_k);
        let context = passages
            .iter()
            .map(|passage| passage.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(json!({
            "query": query,
            "count": passages.len(),
            "passages": passages,
            "context": context,
        }))
    }
}
