use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;
use crate::system::SystemProbe;

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Running jobs whose process was gone, now marked failed
    pub failed: Vec<u64>,
    /// Executed jobs removed from the history
    pub pruned: Vec<u64>,
}

/// Repairs `running` records left behind by a dispatcher that died before
/// writing the final status.
#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    system: Arc<dyn SystemProbe>,
}

impl Reconciler {
    pub fn new(store: Store, system: Arc<dyn SystemProbe>) -> Self {
        Self { store, system }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let system = self.system.clone();
        let report = self
            .store
            .transaction(move |table| {
                let mut failed = Vec::new();
                for job in table.running_jobs_mut() {
                    let Some(pid) = job.pid else { continue };
                    let state = system.process_state(pid);
                    if !state.is_alive() {
                        // The exit code is unrecoverable without the
                        // supervising dispatcher.
                        tracing::warn!(
                            job_id = job.job_id,
                            pid,
                            state = ?state,
                            "Running job has no live process, marking failed"
                        );
                        job.mark_failed();
                        failed.push(job.job_id);
                    }
                }

                let pruned = table.prune_executed();
                Ok(ReconcileReport { failed, pruned })
            })
            .await?;

        tracing::info!(
            failed = report.failed.len(),
            pruned = report.pruned.len(),
            "Reconciled job history"
        );
        Ok(report)
    }
}
