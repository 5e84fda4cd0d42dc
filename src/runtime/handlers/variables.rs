/// Input and output node handlers
///
/// An input node resolves a named variable and coerces it to its declared type.
/// Lookup order: an existing context variable, the same field on the trigger
/// payload, then `defaultValue`. A value that fails to parse falls back to the
/// default. An output node copies its primary input (or the existing variable)
/// into its named variable and marks it captured for final-output gathering.

use crate::runtime::context::{ExecutionContext, TRIGGER_KEY};
use crate::runtime::executor::NodeHandler;
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value};

/// Coerce a value to one of the declared data types
///
/// Returns `None` when the value cannot be represented. Unknown type names pass
/// the value through unchanged.
pub fn coerce(value: &Value, data_type: &str) -> Option<Value> {
    match data_type {
        "string" => match value {
            Value::Null => None,
            Value::String(s) => Some(Value::String(s.clone())),
            other => Some(Value::String(other.to_string())),
        },
        "number" => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(int) = trimmed.parse::<i64>() {
                    return Some(Value::Number(int.into()));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
            Value::Bool(b) => Some(Value::Number(u8::from(*b).into())),
            _ => None,
        },
        "boolean" => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" | "" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        "object" => match value {
            Value::Object(_) => Some(value.clone()),
            Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
            _ => None,
        },
        "array" => match value {
            Value::Array(_) => Some(value.clone()),
            Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_array),
            _ => None,
        },
        _ => Some(value.clone()),
    }
}

fn variable_name(node: &Node) -> Result<&str> {
    node.data_str("variableName")
        .ok_or_else(|| anyhow::anyhow!("{} node '{}' has no variableName", node.node_type, node.id))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let variable = variable_name(node)?;
        let data_type = node.data_str("dataType");
        let default = node.field("defaultValue");

        let provided = ctx
            .get(variable)
            .filter(|value| !value.is_null())
            .or_else(|| {
                ctx.get(TRIGGER_KEY)
                    .and_then(|payload| payload.get(variable))
                    .filter(|value| !value.is_null())
            })
            .cloned();

        let value = match (provided, default) {
            (None, None) if node.data_bool("required").unwrap_or(false) => {
                return Err(anyhow::anyhow!("Required input '{}' has no value", variable));
            }
            (None, None) => Value::Null,
            (Some(raw), default) => match data_type {
                None => raw,
                Some(data_type) => match coerce(&raw, data_type) {
                    Some(value) => value,
                    None => {
                        tracing::warn!(
                            "⚠️ Input '{}' value {} is not a valid {}, using default",
                            variable,
                            raw,
                            data_type
                        );
                        default
                            .map(|d| coerce(d, data_type).unwrap_or_else(|| d.clone()))
                            .unwrap_or(Value::Null)
                    }
                },
            },
            (None, Some(default)) => data_type
                .and_then(|data_type| coerce(default, data_type))
                .unwrap_or_else(|| default.clone()),
        };

        tracing::debug!("📥 Input '{}' = {}", variable, value);
        ctx.set(variable, value.clone());
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let variable = variable_name(node)?;

        let raw = ctx
            .primary_input(&node.id)
            .or_else(|| ctx.get(variable))
            .cloned()
            .unwrap_or(Value::Null);

        let value = match node.data_str("dataType") {
            Some(data_type) => coerce(&raw, data_type).unwrap_or(raw),
            None => raw,
        };

        tracing::debug!("📤 Output '{}' = {}", variable, value);
        ctx.set(variable, value.clone());
        ctx.capture(variable);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::input_key;
    use crate::workflow::types::NodeType;
    use serde_json::json;

    fn input(data: Value) -> Node {
        Node::new("in", NodeType::Input, data)
    }

    #[test]
    fn test_coercions() {
        assert_eq!(coerce(&json!("42"), "number"), Some(json!(42)));
        assert_eq!(coerce(&json!(" 2.5 "), "number"), Some(json!(2.5)));
        assert_eq!(coerce(&json!("abc"), "number"), None);
        assert_eq!(coerce(&json!("Yes"), "boolean"), Some(json!(true)));
        assert_eq!(coerce(&json!(0), "boolean"), Some(json!(false)));
        assert_eq!(coerce(&json!(7), "string"), Some(json!("7")));
        assert_eq!(coerce(&json!("{\"a\":1}"), "object"), Some(json!({"a": 1})));
        assert_eq!(coerce(&json!("[1]"), "object"), None);
        assert_eq!(coerce(&json!("[1,2]"), "array"), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_default_value_is_coerced() {
        let node = input(json!({"variableName": "x", "dataType": "number", "defaultValue": "5"}));
        let mut ctx = ExecutionContext::new();
        assert_eq!(InputHandler.execute(&node, &mut ctx).await.unwrap(), json!(5));
        assert_eq!(ctx.get("x"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_trigger_payload_overrides_default() {
        let node = input(json!({"variableName": "x", "dataType": "number", "defaultValue": 5}));
        let mut ctx = ExecutionContext::new();
        ctx.set(TRIGGER_KEY, json!({"x": "9"}));
        assert_eq!(InputHandler.execute(&node, &mut ctx).await.unwrap(), json!(9));
    }

    #[tokio::test]
    async fn test_unparseable_value_falls_back_to_default() {
        let node = input(json!({"variableName": "x", "dataType": "number", "defaultValue": 1}));
        let mut ctx = ExecutionContext::new();
        ctx.set("x", json!("not a number"));
        assert_eq!(InputHandler.execute(&node, &mut ctx).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_required_input_without_value_fails() {
        let node = input(json!({"variableName": "x", "required": true}));
        let mut ctx = ExecutionContext::new();
        assert!(InputHandler.execute(&node, &mut ctx).await.is_err());

        let optional = input(json!({"variableName": "x"}));
        assert_eq!(InputHandler.execute(&optional, &mut ctx).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_output_prefers_primary_input_and_captures() {
        let node = Node::new("out", NodeType::Output, json!({"variableName": "answer"}));
        let mut ctx = ExecutionContext::new();
        ctx.set("answer", json!("stale"));
        ctx.set(input_key("out"), json!("fresh"));

        assert_eq!(OutputHandler.execute(&node, &mut ctx).await.unwrap(), json!("fresh"));
        assert_eq!(ctx.get("answer"), Some(&json!("fresh")));
        assert_eq!(ctx.captured(), ["answer".to_string()]);
    }

    #[tokio::test]
    async fn test_output_falls_back_to_existing_variable() {
        let node = Node::new("out", NodeType::Output, json!({"variableName": "x"}));
        let mut ctx = ExecutionContext::new();
        ctx.set("x", json!(5));
        assert_eq!(OutputHandler.execute(&node, &mut ctx).await.unwrap(), json!(5));
    }
}
