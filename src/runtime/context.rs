/// Run-scoped execution context
///
/// A key/value store created empty at the start of every run and dropped at the
/// end. Node results are published under `{nodeId}` and `{nodeId}_output`, the
/// executor prepares `{nodeId}_input` / `{nodeId}_inputs` before dispatch, and
/// input/output nodes write named variables. `trigger` is reserved for the run
/// payload.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reserved key holding the trigger payload
pub const TRIGGER_KEY: &str = "trigger";

/// Key under which a node's primary input is stored
pub fn input_key(node_id: &str) -> String {
    format!("{}_input", node_id)
}

/// Key under which all of a node's incoming outputs are stored
pub fn inputs_key(node_id: &str) -> String {
    format!("{}_inputs", node_id)
}

/// Key under which a node's output is stored next to the bare node id
pub fn output_key(node_id: &str) -> String {
    format!("{}_output", node_id)
}

/// Key/value store shared by the nodes of a single run
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Context variables
    values: HashMap<String, Value>,
    /// Payload supplied by the caller for trigger nodes
    trigger_input: Option<Value>,
    /// Variable names captured by output nodes, in capture order
    captured: Vec<String>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context carrying a caller-supplied trigger payload
    pub fn with_trigger_input(trigger_input: Option<Value>) -> Self {
        Self {
            trigger_input,
            ..Self::default()
        }
    }

    /// Payload supplied by the caller, if any
    pub fn trigger_input(&self) -> Option<&Value> {
        self.trigger_input.as_ref()
    }

    /// Read a variable by exact key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolve a dotted path such as `llm-1.response` or `items.0.title`
    ///
    /// Exact keys win over path traversal so node ids containing dots still resolve.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if let Some(value) = self.values.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write a variable
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// True if the key is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Primary input prepared for a node
    pub fn primary_input(&self, node_id: &str) -> Option<&Value> {
        self.values
            .get(&input_key(node_id))
            .filter(|value| !value.is_null())
    }

    /// All incoming outputs prepared for a node
    pub fn inputs(&self, node_id: &str) -> Vec<Value> {
        match self.values.get(&inputs_key(node_id)) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Record that an output node captured the given variable
    pub fn capture(&mut self, variable: &str) {
        if !self.captured.iter().any(|name| name == variable) {
            self.captured.push(variable.to_string());
        }
    }

    /// Captured variable names in capture order
    pub fn captured(&self) -> &[String] {
        &self.captured
    }

    /// Publish a successful node result under both output keys
    pub fn publish_output(&mut self, node_id: &str, output: Value) {
        self.values.insert(output_key(node_id), output.clone());
        self.values.insert(node_id.to_string(), output);
    }

    /// Read-only JSON snapshot of every variable, handed to sandboxed code
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }
}
