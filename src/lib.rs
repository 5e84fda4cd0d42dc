/// Flowsmith: workflow validation, execution and scheduling engine
///
/// Workflows are directed graphs of typed nodes. This library validates them,
/// runs them in dependency order with a shared run context, and fires them on
/// cron-like schedules.

// Core configuration and setup
pub mod config;

// Engine error kinds
pub mod error;

// External model, retrieval and search capabilities
pub mod services;

// Workflow management layer - definitions, graph analysis, validation, storage
pub mod workflow;

// Runtime execution engine - ordering, handlers, sandbox and scheduling
pub mod runtime;

// HTTP API layer - REST endpoints for workflows, executions and schedules
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::EngineError;
pub use runtime::{WorkflowExecutionResult, WorkflowExecutor, WorkflowScheduler};
pub use server::start_server;
pub use workflow::{Edge, Node, NodeType, ScheduledWorkflow, Workflow, WorkflowValidator};
