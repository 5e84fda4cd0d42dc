/// Core workflow type definitions
///
/// Defines workflows, nodes and edges exactly as the graph editor exports them.
/// Field names are camelCase on the wire so an exported JSON document round-trips
/// through these types unchanged; `viewport`, `metadata` and `position` are opaque
/// pass-through values the engine never interprets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are validated and ordered into a DAG before execution. A workflow
/// can have several entry points (trigger nodes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-research")
    #[serde(default)]
    pub id: String,
    /// Human-readable workflow name
    #[serde(default)]
    pub name: String,
    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// List of nodes in this workflow
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// List of edges connecting nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Editor viewport state, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Value>,
    /// Editor metadata, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Workflow {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// All trigger nodes in declaration order
    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| node.node_type == NodeType::Trigger)
    }
}

/// A single node in the workflow graph
///
/// `data` is a type-specific attribute bag. Handlers only read it and write
/// their results into the execution context, never back into the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "llm-1")
    pub id: String,
    /// The type of node which determines execution behavior
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Node-specific configuration as flexible JSON
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Canvas position, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Node {
    /// Create a node with the given data bag
    pub fn new(id: impl Into<String>, node_type: NodeType, data: Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            data,
            position: None,
        }
    }

    /// Raw data field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|value| !value.is_null())
    }

    /// String data field, ignoring blank strings
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Numeric data field; numeric strings are accepted since editors often store them that way
    pub fn data_f64(&self, key: &str) -> Option<f64> {
        match self.data.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean data field
    pub fn data_bool(&self, key: &str) -> Option<bool> {
        match self.data.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// User-facing label, if one was set
    pub fn label(&self) -> Option<&str> {
        self.data_str("label")
    }

    /// Label when present, otherwise the node id
    pub fn display_name(&self) -> &str {
        self.label().unwrap_or(&self.id)
    }
}

/// Available node types
///
/// - `trigger`: entry point, seeds the run payload
/// - `llm` / `agent`: model invocation through an injected provider
/// - `rag`: knowledge-base retrieval (`vector-store` is accepted as an alias)
/// - `web-search`: search through an injected provider
/// - `conditional`: sandboxed boolean expression or structured comparison
/// - `function`: user code in the sandboxed script VM
/// - `input` / `output`: typed workflow variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Trigger,
    Llm,
    #[serde(alias = "vector-store")]
    Rag,
    WebSearch,
    Conditional,
    Function,
    Input,
    Output,
    Agent,
}

impl NodeType {
    /// Every node type, in the order the editor palette lists them
    pub const ALL: [NodeType; 9] = [
        NodeType::Trigger,
        NodeType::Llm,
        NodeType::Rag,
        NodeType::WebSearch,
        NodeType::Conditional,
        NodeType::Function,
        NodeType::Input,
        NodeType::Output,
        NodeType::Agent,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Llm => "llm",
            NodeType::Rag => "rag",
            NodeType::WebSearch => "web-search",
            NodeType::Conditional => "conditional",
            NodeType::Function => "function",
            NodeType::Input => "input",
            NodeType::Output => "output",
            NodeType::Agent => "agent",
        }
    }

    /// Node types that call out to a paid or slow external service
    pub fn is_expensive(&self) -> bool {
        matches!(
            self,
            NodeType::Llm | NodeType::Agent | NodeType::Rag | NodeType::WebSearch
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed data dependency between two nodes
///
/// The target consumes the source's output. `sourceHandle` additionally seeds a
/// context variable named after the handle when the edge is followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Edge identifier
    #[serde(default)]
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    /// Named output handle on the source node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Named input handle on the target node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create an edge with an id derived from its endpoints
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    /// Attach a source handle
    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// A (workflow, cron expression) pairing fired unattended by the scheduler
///
/// Counters and timestamps are only mutated by the scheduler, under its
/// registry write lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledWorkflow {
    pub id: String,
    pub workflow_id: String,
    pub cron_expression: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledWorkflow {
    /// Fold a finished run into the counters
    pub fn record_run(&mut self, at: DateTime<Utc>, error: Option<String>) {
        self.last_run = Some(at);
        self.run_count += 1;
        if let Some(error) = error {
            self.error_count += 1;
            self.last_error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_editor_export_round_trips() {
        let exported = json!({
            "id": "wf-1",
            "name": "Research",
            "nodes": [
                {"id": "t", "type": "trigger", "data": {"label": "Start"}, "position": {"x": 10, "y": 20}},
                {"id": "kb", "type": "vector-store", "data": {"topK": 3}},
                {"id": "s", "type": "web-search", "data": {}}
            ],
            "edges": [
                {"id": "e1", "source": "t", "target": "kb", "sourceHandle": "out"}
            ],
            "viewport": {"x": 0, "y": 0, "zoom": 1.5}
        });

        let workflow: Workflow = serde_json::from_value(exported).unwrap();
        assert_eq!(workflow.nodes[1].node_type, NodeType::Rag);
        assert_eq!(workflow.nodes[2].node_type, NodeType::WebSearch);
        assert_eq!(workflow.edges[0].source_handle.as_deref(), Some("out"));

        let back = serde_json::to_value(&workflow).unwrap();
        assert_eq!(back["viewport"]["zoom"], json!(1.5));
        assert_eq!(back["nodes"][0]["position"]["y"], json!(20));
        assert_eq!(back["nodes"][1]["type"], json!("rag"));
        assert_eq!(back["edges"][0]["sourceHandle"], json!("out"));
    }

    #[test]
    fn test_missing_data_defaults_to_empty_object() {
        let node: Node = serde_json::from_value(json!({"id": "n", "type": "output"})).unwrap();
        assert!(node.data.is_object());
        assert_eq!(node.display_name(), "n");
    }

    #[test]
    fn test_data_accessors_accept_editor_strings() {
        let node = Node::new(
            "n",
            NodeType::Rag,
            json!({"topK": "4", "label": "  ", "required": "true"}),
        );
        assert_eq!(node.data_f64("topK"), Some(4.0));
        assert_eq!(node.label(), None);
        assert_eq!(node.data_bool("required"), Some(true));
    }
}
