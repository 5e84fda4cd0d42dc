/// Background scheduler for workflows
///
/// Each enabled `ScheduledWorkflow` owns at most one pending one-shot job in
/// tokio-cron-scheduler, armed for its `nextRun`. When the job fires the
/// workflow is loaded from the store and executed, the entry's counters are
/// updated under the registry write lock, `nextRun` is recomputed and the next
/// job is armed. Failed runs are recorded on the entry and never stop future
/// fires.

use crate::runtime::cron;
use crate::runtime::engine::WorkflowExecutor;
use crate::runtime::observer::TracingObserver;
use crate::runtime::result::WorkflowExecutionResult;
use crate::workflow::store::{ScheduleStore, WorkflowStore};
use crate::workflow::types::{ScheduledWorkflow, Workflow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Schedules workflows and fires them unattended
///
/// Cheap to clone; all clones share the same registry and job scheduler.
#[derive(Clone)]
pub struct WorkflowScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    /// One-shot timer jobs
    jobs: RwLock<JobScheduler>,
    /// Registry of scheduled entries by id
    entries: RwLock<HashMap<String, ScheduledWorkflow>>,
    /// Pending job per entry id
    timers: RwLock<HashMap<String, Uuid>>,
    workflows: Arc<dyn WorkflowStore>,
    schedules: Arc<dyn ScheduleStore>,
    executor: Arc<WorkflowExecutor>,
}

impl std::fmt::Debug for WorkflowScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowScheduler").finish_non_exhaustive()
    }
}

impl WorkflowScheduler {
    /// Create a scheduler over the given stores and executor
    pub async fn new(
        workflows: Arc<dyn WorkflowStore>,
        schedules: Arc<dyn ScheduleStore>,
        executor: Arc<WorkflowExecutor>,
    ) -> Result<Self> {
        let jobs = JobScheduler::new()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create job scheduler: {}", e))?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                jobs: RwLock::new(jobs),
                entries: RwLock::new(HashMap::new()),
                timers: RwLock::new(HashMap::new()),
                workflows,
                schedules,
                executor,
            }),
        })
    }

    /// Load persisted entries, re-arm the enabled ones and start firing
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting workflow scheduler");

        let stored = match self.inner.schedules.list_all().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("❌ Failed to load scheduled workflows: {}", e);
                Vec::new()
            }
        };

        let now = Utc::now();
        let mut to_arm = Vec::new();
        {
            let mut entries = self.inner.entries.write().await;
            for mut entry in stored {
                if entry.enabled {
                    if entry.next_run <= now {
                        entry.next_run = cron::next_run(&entry.cron_expression, now);
                    }
                    to_arm.push((entry.id.clone(), entry.next_run));
                }
                entries.insert(entry.id.clone(), entry);
            }
        }

        for (id, next_run) in &to_arm {
            if let Err(e) = self.arm(id, *next_run).await {
                self.record_error(id, format!("Failed to arm timer: {}", e)).await;
            }
        }

        {
            let jobs = self.inner.jobs.read().await;
            jobs.start()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to start job scheduler: {}", e))?;
        }

        self.persist().await;
        tracing::info!("✅ Workflow scheduler started with {} armed schedules", to_arm.len());
        Ok(())
    }

    /// Cancel every pending timer and stop the job scheduler
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping workflow scheduler");

        let pending: Vec<String> = self.inner.timers.read().await.keys().cloned().collect();
        for id in pending {
            self.disarm(&id).await;
        }

        let mut jobs = self.inner.jobs.write().await;
        jobs.shutdown()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to stop job scheduler: {}", e))?;

        tracing::info!("✅ Workflow scheduler stopped");
        Ok(())
    }

    /// Schedule a workflow on a cron-like expression
    ///
    /// The workflow is upserted into the workflow store. Infrastructure
    /// failures are logged and kept in `lastError`; the entry is still created.
    pub async fn schedule(&self, workflow: &Workflow, cron_expression: &str) -> ScheduledWorkflow {
        let now = Utc::now();
        let cron_expression = cron_expression.trim().to_string();
        if !cron::is_recognised(&cron_expression) {
            tracing::warn!(
                "⚠️ Schedule '{}' for workflow '{}' is not recognised, defaulting to hourly",
                cron_expression,
                workflow.id
            );
        }

        let mut entry = ScheduledWorkflow {
            id: format!("schedule-{}", Uuid::new_v4()),
            workflow_id: workflow.id.clone(),
            next_run: cron::next_run(&cron_expression, now),
            cron_expression,
            enabled: true,
            last_run: None,
            run_count: 0,
            error_count: 0,
            last_error: None,
            created_at: now,
        };

        if let Err(e) = self.inner.workflows.save(workflow).await {
            tracing::error!("❌ Failed to store workflow '{}': {}", workflow.id, e);
            entry.last_error = Some(format!("Failed to store workflow: {}", e));
        }

        self.inner
            .entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());

        if let Err(e) = self.arm(&entry.id, entry.next_run).await {
            let message = format!("Failed to arm timer: {}", e);
            self.record_error(&entry.id, message.clone()).await;
            entry.last_error = Some(message);
        }

        self.persist().await;
        tracing::info!(
            "📅 Scheduled workflow '{}' as {} ('{}'), next run {}",
            entry.workflow_id,
            entry.id,
            entry.cron_expression,
            entry.next_run
        );
        entry
    }

    /// Remove a schedule and cancel its timer
    pub async fn unschedule(&self, id: &str) -> bool {
        let removed = self.inner.entries.write().await.remove(id);
        if removed.is_none() {
            return false;
        }

        self.disarm(id).await;
        self.persist().await;
        tracing::info!("🗑️ Unscheduled {}", id);
        true
    }

    /// Enable or disable a schedule
    ///
    /// Disabling cancels the pending timer. Enabling re-arms it, recomputing
    /// `nextRun` if it already passed.
    pub async fn toggle(&self, id: &str, enabled: bool) -> bool {
        let now = Utc::now();
        let next_run = {
            let mut entries = self.inner.entries.write().await;
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            entry.enabled = enabled;
            if enabled && entry.next_run <= now {
                entry.next_run = cron::next_run(&entry.cron_expression, now);
            }
            enabled.then_some(entry.next_run)
        };

        match next_run {
            Some(next_run) => {
                if let Err(e) = self.arm(id, next_run).await {
                    self.record_error(id, format!("Failed to arm timer: {}", e)).await;
                }
            }
            None => self.disarm(id).await,
        }

        self.persist().await;
        tracing::info!("🔁 Schedule {} {}", id, if enabled { "enabled" } else { "disabled" });
        true
    }

    /// Run a scheduled workflow now without touching its timer
    ///
    /// Returns `None` for an unknown schedule or a workflow that could not be
    /// loaded; the latter still counts as a failed run.
    pub async fn trigger(&self, id: &str) -> Option<WorkflowExecutionResult> {
        tracing::info!("👆 Manual trigger of schedule {}", id);
        self.run_entry(id, false).await
    }

    /// All entries, oldest first
    pub async fn list(&self) -> Vec<ScheduledWorkflow> {
        let mut entries: Vec<ScheduledWorkflow> =
            self.inner.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledWorkflow> {
        self.inner.entries.read().await.get(id).cloned()
    }

    /// True while a timer is armed for the entry
    pub async fn has_pending_timer(&self, id: &str) -> bool {
        self.inner.timers.read().await.contains_key(id)
    }

    /// Execute an entry's workflow and fold the outcome into its counters
    ///
    /// A timer-driven run also recomputes `nextRun` and re-arms when the entry
    /// is still enabled.
    pub(crate) async fn run_entry(&self, id: &str, from_timer: bool) -> Option<WorkflowExecutionResult> {
        let workflow_id = self.inner.entries.read().await.get(id)?.workflow_id.clone();
        if from_timer {
            self.inner.timers.write().await.remove(id);
        }

        // STEP 1: load and execute
        let (result, error) = match self.inner.workflows.get(&workflow_id).await {
            Ok(Some(workflow)) => {
                let result = self.inner.executor.execute(&workflow, &TracingObserver).await;
                let error = (!result.success).then(|| {
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "Workflow execution failed".to_string())
                });
                (Some(result), error)
            }
            Ok(None) => (None, Some(format!("Workflow '{}' not found", workflow_id))),
            Err(e) => (
                None,
                Some(format!("Failed to load workflow '{}': {}", workflow_id, e)),
            ),
        };

        match &error {
            Some(error) => tracing::warn!("⚠️ Scheduled run {} failed: {}", id, error),
            None => tracing::info!("✅ Scheduled run {} succeeded", id),
        }

        // STEP 2: counters and next run under the write lock
        let now = Utc::now();
        let rearm = {
            let mut entries = self.inner.entries.write().await;
            let Some(entry) = entries.get_mut(id) else {
                tracing::debug!("⏭️ Schedule {} was removed during its run", id);
                return result;
            };
            entry.record_run(now, error);
            if from_timer {
                entry.next_run = cron::next_run(&entry.cron_expression, now);
            }
            (from_timer && entry.enabled).then_some(entry.next_run)
        };

        // STEP 3: re-arm and persist
        if let Some(next_run) = rearm {
            if let Err(e) = self.arm(id, next_run).await {
                self.record_error(id, format!("Failed to arm timer: {}", e)).await;
            }
        }
        self.persist().await;

        result
    }

    /// Replace any pending timer for the entry with one firing at `next_run`
    async fn arm(&self, id: &str, next_run: DateTime<Utc>) -> Result<()> {
        self.disarm(id).await;

        let delay = (next_run - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let inner = Arc::downgrade(&self.inner);
        let entry_id = id.to_string();

        let job = Job::new_one_shot_async(delay, move |_uuid, _l| fire(inner.clone(), entry_id.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to create timer job: {}", e))?;

        let job_uuid = {
            let jobs = self.inner.jobs.read().await;
            jobs.add(job)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to add timer job: {}", e))?
        };

        self.inner
            .timers
            .write()
            .await
            .insert(id.to_string(), job_uuid);
        tracing::debug!("⏰ Armed {} for {} (in {:?})", id, next_run, delay);
        Ok(())
    }

    /// Cancel the pending timer for the entry, if any
    async fn disarm(&self, id: &str) {
        let Some(job_uuid) = self.inner.timers.write().await.remove(id) else {
            return;
        };

        let jobs = self.inner.jobs.read().await;
        if let Err(e) = jobs.remove(&job_uuid).await {
            tracing::warn!("⚠️ Failed to remove timer for {}: {}", id, e);
        } else {
            tracing::debug!("🛑 Cancelled timer for {}", id);
        }
    }

    async fn record_error(&self, id: &str, message: String) {
        tracing::error!("❌ Schedule {}: {}", id, message);
        if let Some(entry) = self.inner.entries.write().await.get_mut(id) {
            entry.last_error = Some(message);
        }
    }

    /// Save the whole registry through the schedule store
    async fn persist(&self) {
        let entries = self.list().await;
        if let Err(e) = self.inner.schedules.save_all(&entries).await {
            tracing::error!("❌ Failed to persist {} schedules: {}", entries.len(), e);
        }
    }
}

/// Timer callback; holds only a weak handle so pending jobs do not keep the
/// scheduler alive
fn fire(inner: Weak<SchedulerInner>, id: String) -> BoxFuture<'static, ()> {
    async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        tracing::debug!("🔔 Timer fired for {}", id);
        WorkflowScheduler { inner }.run_entry(&id, true).await;
    }
    .boxed()
}
