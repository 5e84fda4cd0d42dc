/// Persistence capabilities used by the API layer and the scheduler
///
/// The engine only needs workflows by id and the scheduled set as a whole.
/// `registry` provides in-memory implementations, `storage` a SQLite one.

use crate::workflow::types::{ScheduledWorkflow, Workflow};
use anyhow::Result;
use async_trait::async_trait;

/// Workflow definitions by id
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Workflow>>;

    /// Insert or replace
    async fn save(&self, workflow: &Workflow) -> Result<()>;

    async fn list(&self) -> Result<Vec<Workflow>>;

    /// Returns false when nothing was stored under the id
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// The full set of scheduled workflows
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<ScheduledWorkflow>>;

    /// Replace the stored set with `entries`
    async fn save_all(&self, entries: &[ScheduledWorkflow]) -> Result<()>;
}
