/// Lifecycle callbacks
///
/// Callbacks fire synchronously in run order, never batched or deferred, so a
/// watcher sees a live trace. Every method has a no-op default.

use crate::runtime::result::WorkflowExecutionResult;
use serde_json::Value;

/// Receiver of run lifecycle events
pub trait ExecutionObserver: Send + Sync {
    fn on_node_start(&self, _node_id: &str) {}

    fn on_node_complete(&self, _node_id: &str, _output: &Value) {}

    fn on_node_error(&self, _node_id: &str, _error: &str) {}

    fn on_log_update(&self, _line: &str) {}

    /// Fires exactly once per `execute` call, including refused runs
    fn on_workflow_complete(&self, _result: &WorkflowExecutionResult) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Observer that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_node_start(&self, node_id: &str) {
        tracing::debug!("▶️ Node started: {}", node_id);
    }

    fn on_node_complete(&self, node_id: &str, output: &Value) {
        tracing::debug!("📤 Node '{}' output: {}", node_id, output);
    }

    fn on_node_error(&self, node_id: &str, error: &str) {
        tracing::warn!("⚠️ Node '{}' failed: {}", node_id, error);
    }

    fn on_workflow_complete(&self, result: &WorkflowExecutionResult) {
        tracing::info!(
            "🏁 Workflow finished: success={} nodes={} errors={} in {}ms",
            result.success,
            result.stats.nodes_executed,
            result.stats.errors_encountered,
            result.execution_time
        );
    }
}
