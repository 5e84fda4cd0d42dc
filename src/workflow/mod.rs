/// Workflow Management Layer
///
/// This module handles workflow definitions, analysis and persistence:
/// - Type definitions (Workflow, Node, Edge, ScheduledWorkflow)
/// - petgraph view used for ordering, cycle and reachability checks
/// - Structural and best-practice validation
/// - Store traits with lock-free in-memory and SQLite implementations

// Core workflow type definitions
pub mod types;

// petgraph-based graph analysis
pub mod graph;

// Validation before save and before every run
pub mod validator;

// Persistence capabilities
pub mod store;

// Lock-free in-memory stores using ArcSwap
pub mod registry;

// SQLite persistence with sqlx
pub mod storage;

// Re-export commonly used types
pub use graph::{ExecutionOrder, WorkflowGraph};
pub use store::{ScheduleStore, WorkflowStore};
pub use types::{Edge, Node, NodeType, ScheduledWorkflow, Workflow};
pub use validator::{ValidationIssue, ValidationResult, WorkflowValidator};
