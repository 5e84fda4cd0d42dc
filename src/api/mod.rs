/// HTTP API Layer
///
/// This module provides the REST API endpoints for the engine. It handles:
/// - Workflow CRUD operations and validation
/// - On-demand execution and cooperative stop
/// - Schedule management and manual triggers

// Workflow management and execution endpoints
pub mod workflows;

// Schedule management endpoints
pub mod schedules;

use crate::runtime::{engine::WorkflowExecutor, scheduler::WorkflowScheduler};
use crate::workflow::store::WorkflowStore;
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow persistence
    pub workflows: Arc<dyn WorkflowStore>,
    /// Single-run executor shared by API and scheduler
    pub executor: Arc<WorkflowExecutor>,
    /// Background scheduler
    pub scheduler: WorkflowScheduler,
}

// Re-export router builders
pub use schedules::create_schedule_routes;
pub use workflows::create_workflow_routes;
