use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::{Child, Command};

use crate::config::DispatchConfig;
use crate::error::{JobqError, Result};
use crate::scheduler::{Job, JobStatus};
use crate::store::Store;
use crate::system::SystemProbe;
use crate::worker::supervisor::Supervisor;

/// Result of one `run_next` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The queue was empty
    Idle,
    /// The head job needs more memory than is available; it stays at the head
    Deferred {
        job_id: u64,
        required: u64,
        available: u64,
    },
    /// The head job was launched and ran to completion
    Finished {
        job_id: u64,
        status: JobStatus,
        exit_code: Option<i32>,
    },
}

/// Admits the job at the head of the queue and supervises it to completion.
///
/// Admission is strictly head-of-line: if the head job does not fit in the
/// available memory nothing else is tried. Only `memory` gates admission;
/// `compute` is informational.
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    system: Arc<dyn SystemProbe>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(store: Store, system: Arc<dyn SystemProbe>, config: DispatchConfig) -> Self {
        Self {
            store,
            system,
            config,
        }
    }

    pub async fn run_next(&self) -> Result<DispatchOutcome> {
        let mut tx = self.store.begin().await?;

        let Some(mut job) = tx.table_mut().pop_front() else {
            tracing::debug!("Queue is empty, nothing to dispatch");
            return Ok(DispatchOutcome::Idle);
        };
        let job_id = job.job_id;

        // On error the transaction is dropped unsaved and the job stays queued.
        let available = self.system.available_memory()?;
        if available < job.memory {
            let required = job.memory;
            tx.table_mut().push_front(job);
            tx.commit().await?;
            tracing::info!(
                job_id,
                required,
                available,
                "Job is on hold due to insufficient memory"
            );
            return Ok(DispatchOutcome::Deferred {
                job_id,
                required,
                available,
            });
        }

        let (mut child, pid) = match self.launch(&job) {
            Ok(launched) => launched,
            Err(source) => {
                job.mark_failed();
                tx.table_mut().replace_in_history(job);
                tx.commit().await?;
                tracing::error!(job_id, error = %source, "Job could not be launched");
                return Err(JobqError::Launch { job_id, source });
            }
        };

        job.mark_running(pid);
        tx.table_mut().replace_in_history(job.clone());
        if let Err(e) = tx.commit().await {
            // The job was never recorded as running; don't leave an
            // untracked process behind.
            tracing::error!(job_id, pid, error = %e, "Failed to record running job, killing it");
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(e);
        }

        tracing::info!(
            job_id,
            pid,
            user = %job.user,
            command = %job.command,
            "Job started"
        );

        let supervisor = Supervisor::new(self.config.checkpoint_interval());
        let watched = supervisor
            .watch(&mut child, || self.checkpoint(&job))
            .await;
        let exit_code = settle_exit(job_id, &mut child, watched);

        job.mark_finished(exit_code);
        let status = job.status;
        self.store
            .transaction(move |table| {
                table.replace_in_history(job);
                Ok(())
            })
            .await?;

        tracing::info!(job_id, status = %status, exit_code = ?exit_code, "Job completed");

        Ok(DispatchOutcome::Finished {
            job_id,
            status,
            exit_code,
        })
    }

    fn launch(&self, job: &Job) -> io::Result<(Child, u32)> {
        let child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&job.command)
            .spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("process exited before its pid was read"))?;
        Ok((child, pid))
    }

    /// Re-writes the running record so readers keep seeing it while the
    /// process runs, even if another transaction dropped it.
    async fn checkpoint(&self, job: &Job) {
        let record = job.clone();
        let result = self
            .store
            .transaction(move |table| {
                table.replace_in_history(record);
                Ok(())
            })
            .await;

        match result {
            Ok(()) => tracing::trace!(job_id = job.job_id, "Checkpointed running job"),
            Err(e) => tracing::warn!(job_id = job.job_id, error = %e, "Checkpoint failed"),
        }
    }
}

/// Exit code to record for a supervised child. If waiting failed the record
/// is about to lose its pid, so the process is killed rather than left
/// running untracked.
fn settle_exit(job_id: u64, child: &mut Child, watched: io::Result<ExitStatus>) -> Option<i32> {
    match watched {
        Ok(status) => status.code(),
        Err(e) => {
            let pid = child.id();
            tracing::error!(
                job_id,
                pid = ?pid,
                error = %e,
                "Lost track of job process, killing it"
            );
            if let Err(e) = child.start_kill() {
                tracing::error!(job_id, pid = ?pid, error = %e, "Failed to kill job process");
            }
            None
        }
    }
}
