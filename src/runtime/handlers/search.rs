/// Web search node handler

use super::{positive_usize, templated_or_input};
use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::NodeHandler;
use crate::services::{SearchRequest, ServiceHub};
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone)]
pub struct SearchHandler {
    services: ServiceHub,
}

impl SearchHandler {
    pub fn new(services: ServiceHub) -> Self {
        Self { services }
    }
}

#[async_trait]
impl NodeHandler for SearchHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let provider = self.services.search()?;

        let query = templated_or_input(node, "query", ctx)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Search node '{}' has no query", node.id))?;
        let max_results = positive_usize(node, "maxResults", DEFAULT_MAX_RESULTS);

        tracing::debug!("🌐 Searching '{}' (max {})", query, max_results);

        let mut response = provider
            .search(SearchRequest {
                query: query.clone(),
                max_results,
                provider: node.data_str("searchProvider").map(str::to_string),
            })
            .await
            .map_err(|e| anyhow::anyhow!("Search failed: {}", e))?;
        response.results.truncate(max_results);

        Ok(json!({
            "query": query,
            "count": response.results.len(),
            "results": response.results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::input_key;
    use crate::services::{SearchHit, SearchProvider, SearchResponse};
    use crate::workflow::types::NodeType;
    use std::sync::Arc;

    struct ManyHits;

    #[async_trait]
    impl SearchProvider for ManyHits {
        async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
            let results = (0..10)
                .map(|i| SearchHit {
                    title: format!("{} #{}", request.query, i),
                    url: format!("https://example.test/{}", i),
                    snippet: String::new(),
                })
                .collect();
            Ok(SearchResponse { results })
        }
    }

    #[tokio::test]
    async fn test_results_are_truncated() {
        let handler = SearchHandler::new(ServiceHub::new().with_search(Arc::new(ManyHits)));
        let node = Node::new("ws", NodeType::WebSearch, json!({"query": "rust", "maxResults": 3}));
        let mut ctx = ExecutionContext::new();

        let output = handler.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(output["count"], json!(3));
        assert_eq!(output["results"][0]["title"], json!("rust #0"));
    }

    #[tokio::test]
    async fn test_query_defaults_to_primary_input() {
        let handler = SearchHandler::new(ServiceHub::new().with_search(Arc::new(ManyHits)));
        let node = Node::new("ws", NodeType::WebSearch, json!({}));
        let mut ctx = ExecutionContext::new();
        ctx.set(input_key("ws"), json!("tokio"));

        let output = handler.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(output["query"], json!("tokio"));
        assert_eq!(output["count"], json!(DEFAULT_MAX_RESULTS));
    }
}
