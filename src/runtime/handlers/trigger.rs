/// Trigger node handler
///
/// The payload is the caller-supplied trigger input when present, otherwise
/// the node's configured `payload`, otherwise an empty object. Payloads stored
/// by the editor as JSON text are parsed.

use crate::runtime::context::{ExecutionContext, TRIGGER_KEY};
use crate::runtime::executor::NodeHandler;
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerHandler;

#[async_trait]
impl NodeHandler for TriggerHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let payload = match (ctx.trigger_input(), node.field("payload")) {
            (Some(input), _) => input.clone(),
            (None, Some(Value::String(text))) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            (None, Some(configured)) => configured.clone(),
            (None, None) => json!({}),
        };

        let trigger_type = node.data_str("triggerType").unwrap_or("manual");
        tracing::debug!(
            "🎯 Trigger '{}' ({}) payload: {}",
            node.id,
            trigger_type,
            payload
        );
        ctx.set(TRIGGER_KEY, payload.clone());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeType;

    #[tokio::test]
    async fn test_caller_input_wins_over_configured_payload() {
        let node = Node::new("t", NodeType::Trigger, json!({"payload": {"from": "node"}}));
        let mut ctx = ExecutionContext::with_trigger_input(Some(json!({"from": "caller"})));
        let output = TriggerHandler.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(output, json!({"from": "caller"}));
        assert_eq!(ctx.get(TRIGGER_KEY), Some(&output));
    }

    #[tokio::test]
    async fn test_payload_text_and_default() {
        let node = Node::new("t", NodeType::Trigger, json!({"payload": "{\"n\": 1}"}));
        let mut ctx = ExecutionContext::new();
        assert_eq!(TriggerHandler.execute(&node, &mut ctx).await.unwrap(), json!({"n": 1}));

        let bare = Node::new("t", NodeType::Trigger, json!({}));
        assert_eq!(TriggerHandler.execute(&bare, &mut ctx).await.unwrap(), json!({}));
    }
}
