/// Built-in node handlers
///
/// One handler per node type. Handlers that call external services receive a
/// `ServiceHub`; the function handler receives the script sandbox.

// Entry point, seeds the run payload
pub mod trigger;

// Typed workflow variables
pub mod variables;

// Model-backed nodes (llm, agent)
pub mod model;

// Knowledge-base retrieval
pub mod retrieval;

// Web search
pub mod search;

// Sandboxed comparisons and expressions
pub mod conditional;

// User code in the Lua sandbox
pub mod function;

pub use conditional::ConditionalHandler;
pub use function::FunctionHandler;
pub use model::ModelHandler;
pub use retrieval::RetrievalHandler;
pub use search::SearchHandler;
pub use trigger::TriggerHandler;
pub use variables::{coerce, InputHandler, OutputHandler};

use crate::runtime::context::ExecutionContext;
use crate::runtime::template;
use crate::workflow::types::Node;
use serde_json::Value;

/// Text form of a node's primary input
///
/// Model outputs contribute their `response` text rather than the whole object.
pub(crate) fn input_text(node: &Node, ctx: &ExecutionContext) -> Option<String> {
    let input = ctx.primary_input(&node.id)?;
    let text = match input {
        Value::Object(map) => match map.get("response").and_then(Value::as_str) {
            Some(response) => response.to_string(),
            None => input.to_string(),
        },
        other => template::value_to_text(other),
    };
    Some(text).filter(|text| !text.trim().is_empty())
}

/// Render a templated string field, falling back to the primary input
pub(crate) fn templated_or_input(
    node: &Node,
    key: &str,
    ctx: &ExecutionContext,
) -> Option<String> {
    match node.data_str(key) {
        Some(raw) => Some(template::render(raw, ctx)),
        None => input_text(node, ctx),
    }
}

/// Positive integer field with a default
pub(crate) fn positive_usize(node: &Node, key: &str, default: usize) -> usize {
    node.data_f64(key)
        .filter(|value| *value >= 1.0)
        .map(|value| value as usize)
        .unwrap_or(default)
}
