/// Conditional node handler
///
/// Expression mode substitutes `{{var}}` placeholders with expression literals
/// (strings quoted and escaped) and hands the text to the expression
/// interpreter, whose identifiers resolve against the context.
/// Structured mode compares `left operator right`; an operand written as a
/// single `{{path}}` keeps the typed context value instead of its text.

use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::NodeHandler;
use crate::runtime::expression::{compare, evaluate_condition, literal, BinaryOp};
use crate::runtime::template;
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalHandler;

/// Resolve a structured-mode operand
fn operand(raw: Option<&Value>, ctx: &ExecutionContext) -> Value {
    match raw {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            let single_placeholder = trimmed
                .strip_prefix("{{")
                .and_then(|rest| rest.strip_suffix("}}"))
                .filter(|inner| !inner.contains("{{") && !inner.contains("}}"));

            match single_placeholder.and_then(|path| ctx.get_path(path)) {
                Some(value) => value.clone(),
                None => Value::String(template::render(text, ctx)),
            }
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

#[async_trait]
impl NodeHandler for ConditionalHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        if let Some(expression) = node.data_str("expression") {
            let rendered =
                template::render_with(expression, |path| ctx.get_path(path).map(literal));
            let result = evaluate_condition(&rendered, &*ctx)
                .map_err(|e| anyhow::anyhow!("Condition '{}' failed: {}", rendered, e))?;

            tracing::debug!("🔀 Condition '{}' evaluated to {}", rendered, result);
            return Ok(json!({ "result": result, "condition": rendered }));
        }

        let symbol = node.data_str("operator").ok_or_else(|| {
            anyhow::anyhow!("Conditional node '{}' has no expression or operator", node.id)
        })?;
        let op = BinaryOp::comparison(symbol)
            .ok_or_else(|| anyhow::anyhow!("Unknown conditional operator '{}'", symbol))?;

        let left = operand(node.field("left"), ctx);
        let right = operand(node.field("right"), ctx);
        let result = compare(op, &left, &right);
        let condition = format!("{} {} {}", left, op, right);

        tracing::debug!("🔀 Condition '{}' evaluated to {}", condition, result);
        Ok(json!({ "result": result, "condition": condition }))
    }
}
