//! The operations exposed to the CLI and the monitor.

use std::sync::Arc;

use crate::config::JobqConfig;
use crate::error::{JobqError, Result};
use crate::scheduler::{JobSpec, JobStatus, JobTable};
use crate::store::Store;
use crate::system::{ProcSystem, SystemProbe};
use crate::worker::{DispatchOutcome, Dispatcher, ReconcileReport, Reconciler};

#[derive(Clone)]
pub struct JobService {
    store: Store,
    system: Arc<dyn SystemProbe>,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
}

impl JobService {
    /// Service backed by the host's `/proc`.
    pub fn new(config: JobqConfig) -> Self {
        Self::with_system(config, Arc::new(ProcSystem::new()))
    }

    pub fn with_system(config: JobqConfig, system: Arc<dyn SystemProbe>) -> Self {
        let store = Store::new(config.store);
        let dispatcher = Dispatcher::new(store.clone(), system.clone(), config.dispatch);
        let reconciler = Reconciler::new(store.clone(), system.clone());
        Self {
            store,
            system,
            dispatcher,
            reconciler,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn system(&self) -> &Arc<dyn SystemProbe> {
        &self.system
    }

    /// Queues a new job and returns its id.
    pub async fn submit(&self, spec: JobSpec) -> Result<u64> {
        spec.validate()?;
        let user = spec.user.clone();
        let job_id = self.store.transaction(move |table| Ok(table.submit(spec))).await?;
        tracing::info!(job_id, user = %user, "Job submitted");
        Ok(job_id)
    }

    /// One admission attempt for the job at the head of the queue.
    pub async fn run_next(&self) -> Result<DispatchOutcome> {
        self.dispatcher.run_next().await
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconciler.reconcile().await
    }

    /// Moves a queued job to the front of the queue.
    pub async fn prioritize(&self, job_id: u64) -> Result<()> {
        if job_id == 0 {
            return Err(JobqError::InvalidArgument("job id must be positive".into()));
        }
        self.store
            .transaction(|table| {
                if table.prioritize(job_id) {
                    Ok(())
                } else {
                    Err(JobqError::JobNotQueued(job_id))
                }
            })
            .await?;
        tracing::info!(job_id, "Job prioritized");
        Ok(())
    }

    /// Removes all jobs with `status` from queue and history, returning how
    /// many history entries were removed.
    pub async fn clear_by_status(&self, status: JobStatus) -> Result<usize> {
        let removed = self
            .store
            .transaction(|table| Ok(table.clear_by_status(status)))
            .await?;
        tracing::info!(status = %status, removed, "Cleared jobs");
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Result<JobTable> {
        self.store.snapshot().await
    }
}
