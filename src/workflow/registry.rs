/// In-memory stores using ArcSwap
///
/// Reads are lock-free. Each write clones the current map, applies the change
/// and swaps the pointer, so runs holding an older snapshot are never blocked.
/// Used as the default store when no database is configured and in tests.

use crate::workflow::store::{ScheduleStore, WorkflowStore};
use crate::workflow::types::{ScheduledWorkflow, Workflow};
use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

/// Lock-free workflow registry
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Key: workflow id
    workflows: ArcSwap<BTreeMap<String, Arc<Workflow>>>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(BTreeMap::new())),
        }
    }

    /// Registry pre-populated with workflows
    pub fn with_workflows(workflows: impl IntoIterator<Item = Workflow>) -> Self {
        let map = workflows
            .into_iter()
            .map(|workflow| (workflow.id.clone(), Arc::new(workflow)))
            .collect();
        Self {
            workflows: ArcSwap::new(Arc::new(map)),
        }
    }

    /// Lock-free lookup
    pub fn get_workflow(&self, id: &str) -> Option<Arc<Workflow>> {
        self.workflows.load().get(id).cloned()
    }

    /// Insert or replace with an atomic swap
    pub fn insert(&self, workflow: Workflow) {
        let id = workflow.id.clone();
        let workflow = Arc::new(workflow);
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(id.clone(), workflow.clone());
            next
        });
        tracing::info!("🔥 Hot-reloaded workflow: {}", id);
    }

    /// Remove with an atomic swap
    pub fn remove(&self, id: &str) -> bool {
        if !self.workflows.load().contains_key(id) {
            return false;
        }
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(id);
            next
        });
        tracing::info!("🗑️ Removed workflow from registry: {}", id);
        true
    }

    pub fn len(&self) -> usize {
        self.workflows.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.load().is_empty()
    }
}

#[async_trait]
impl WorkflowStore for WorkflowRegistry {
    async fn get(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.get_workflow(id).map(|workflow| (*workflow).clone()))
    }

    async fn save(&self, workflow: &Workflow) -> Result<()> {
        self.insert(workflow.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Workflow>> {
        Ok(self
            .workflows
            .load()
            .values()
            .map(|workflow| (**workflow).clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.remove(id))
    }
}

/// In-memory schedule set
#[derive(Debug)]
pub struct MemoryScheduleStore {
    entries: ArcSwap<Vec<ScheduledWorkflow>>,
}

impl Default for MemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::new(Arc::new(Vec::new())),
        }
    }

    /// Snapshot of what was last saved
    pub fn snapshot(&self) -> Arc<Vec<ScheduledWorkflow>> {
        self.entries.load_full()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn list_all(&self) -> Result<Vec<ScheduledWorkflow>> {
        Ok((**self.entries.load()).clone())
    }

    async fn save_all(&self, entries: &[ScheduledWorkflow]) -> Result<()> {
        self.entries.store(Arc::new(entries.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(id: &str) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: format!("Workflow {}", id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_survives_swap() {
        let registry = WorkflowRegistry::with_workflows([workflow("a")]);
        let before = registry.get_workflow("a").unwrap();

        let mut renamed = workflow("a");
        renamed.name = "Renamed".to_string();
        registry.save(&renamed).await.unwrap();

        assert_eq!(before.name, "Workflow a");
        assert_eq!(registry.get("a").await.unwrap().unwrap().name, "Renamed");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let registry = WorkflowRegistry::with_workflows([workflow("a"), workflow("b")]);
        assert!(registry.delete("a").await.unwrap());
        assert!(!registry.delete("a").await.unwrap());
        let ids: Vec<String> = registry.list().await.unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["b"]);
    }
}
