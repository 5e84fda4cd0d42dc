/// Engine-level error taxonomy
///
/// Node handlers and infrastructure code work with `anyhow::Result`. The errors
/// below are the ones the executor itself raises and turns into failed
/// `WorkflowExecutionResult`s instead of propagating to callers.

use thiserror::Error;

/// Errors raised by the executor outside of individual node handlers
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow failed validation and was refused before any node ran
    #[error("Workflow validation failed: {}", errors.join("; "))]
    InvalidWorkflow { errors: Vec<String> },

    /// Another run is already in flight on this executor instance
    #[error("Workflow execution already in progress")]
    AlreadyRunning,

    /// The caller requested a stop between two nodes
    #[error("Workflow execution cancelled")]
    Cancelled,

    /// Topological ordering could not place every node
    #[error("Execution order incomplete, unordered nodes: {}", nodes.join(", "))]
    UnorderedNodes { nodes: Vec<String> },

    /// A trigger node failed, which halts the run
    #[error("Trigger node '{node_id}' failed: {reason}")]
    TriggerFailed { node_id: String, reason: String },

    /// Catch-all for unexpected failures escaping node dispatch
    #[error("Internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create an internal error from any displayable message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_workflow_joins_messages() {
        let err = EngineError::InvalidWorkflow {
            errors: vec!["no trigger".to_string(), "cycle a -> b -> a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Workflow validation failed: no trigger; cycle a -> b -> a"
        );
    }

    #[test]
    fn test_trigger_failed_names_node() {
        let err = EngineError::TriggerFailed {
            node_id: "start".to_string(),
            reason: "boom".to_string(),
        };
        assert!(err.to_string().contains("'start'"));
        assert!(err.to_string().contains("boom"));
    }
}
