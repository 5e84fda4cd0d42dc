/// Execution result types
///
/// One `NodeExecutionResult` is recorded per dispatched node; one
/// `WorkflowExecutionResult` is produced per run and never mutated afterwards.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler time in milliseconds
    pub execution_time: u64,
}

impl NodeExecutionResult {
    pub fn success(output: Value, elapsed: Duration) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time: millis(elapsed),
        }
    }

    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time: millis(elapsed),
        }
    }
}

/// Aggregate counters for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub nodes_executed: usize,
    pub successful_nodes: usize,
    pub errors_encountered: usize,
    /// Whole-run time in milliseconds
    pub total_execution_time: u64,
}

/// Terminal result of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub success: bool,
    /// Named final outputs
    pub output: Map<String, Value>,
    pub node_results: BTreeMap<String, NodeExecutionResult>,
    /// Computed topological order, empty when the run was refused
    pub execution_order: Vec<String>,
    /// Whole-run time in milliseconds
    pub execution_time: u64,
    pub logs: Vec<String>,
    pub stats: ExecutionStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecutionResult {
    /// Failed result for a run that never dispatched a node
    pub fn refused(error: &EngineError, logs: Vec<String>, elapsed: Duration) -> Self {
        let elapsed = millis(elapsed);
        Self {
            success: false,
            output: Map::new(),
            node_results: BTreeMap::new(),
            execution_order: Vec::new(),
            execution_time: elapsed,
            logs,
            stats: ExecutionStats {
                total_execution_time: elapsed,
                ..Default::default()
            },
            error: Some(error.to_string()),
        }
    }

    /// Result of a node by id
    pub fn node(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.node_results.get(node_id)
    }
}

pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
