/// Function node handler
///
/// Runs the node's Lua `code` in the script sandbox. The script sees `input`,
/// `inputs` and a read-only `context` snapshot; its return value is the output.

use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::NodeHandler;
use crate::runtime::sandbox::{ScriptBindings, ScriptSandbox};
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FunctionHandler {
    sandbox: ScriptSandbox,
}

impl FunctionHandler {
    pub fn new(sandbox: ScriptSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl NodeHandler for FunctionHandler {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        let code = node
            .data_str("code")
            .ok_or_else(|| anyhow::anyhow!("Function node '{}' has no code", node.id))?;

        let timeout = node
            .data_f64("timeoutMs")
            .filter(|ms| *ms > 0.0)
            .map(|ms| Duration::from_millis(ms as u64));

        let bindings = ScriptBindings {
            input: ctx.primary_input(&node.id).cloned().unwrap_or(Value::Null),
            inputs: ctx.inputs(&node.id),
            context: ctx.snapshot(),
        };

        self.sandbox
            .run(code, bindings, timeout)
            .await
            .map_err(|e| anyhow::anyhow!("Function node '{}' failed: {}", node.id, e))
    }
}
