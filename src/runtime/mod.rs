/// Runtime Execution Engine
///
/// This module runs validated workflows and fires them on schedules.
/// It handles:
/// - Kahn ordering with triggers first and a sequential node walk
/// - Context propagation between connected nodes
/// - Per-type node handlers behind a registry
/// - Sandboxed expressions and Lua scripts
/// - Cron-like scheduling with one-shot timers

// Run-scoped key/value store shared by the nodes of a run
pub mod context;

// `{{variable}}` substitution
pub mod template;

// Expression interpreter for conditional nodes
pub mod expression;

// Lua sandbox for function nodes
pub mod sandbox;

// Lifecycle callbacks
pub mod observer;

// Per-node and per-run results
pub mod result;

// Handler trait, registry and node dispatch
pub mod executor;

// Built-in handlers for every node type
pub mod handlers;

// Workflow executor: validate, order, walk, gather
pub mod engine;

// Next-run evaluator
pub mod cron;

// Background scheduler for workflows
pub mod scheduler;

// Re-export main types
pub use context::ExecutionContext;
pub use engine::WorkflowExecutor;
pub use executor::{HandlerRegistry, NodeExecutor, NodeHandler};
pub use observer::{ExecutionObserver, NoopObserver, TracingObserver};
pub use result::{ExecutionStats, NodeExecutionResult, WorkflowExecutionResult};
pub use sandbox::{SandboxLimits, ScriptSandbox};
pub use scheduler::WorkflowScheduler;
