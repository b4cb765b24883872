use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::scheduler::job::{Job, JobSpec, JobStatus};

/// The queue of not-yet-started jobs together with the job history.
///
/// This is exactly what is persisted: the queue keeps FIFO order, the
/// history is the system of record for status and holds each `job_id` once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTable {
    #[serde(rename = "job_queue", default)]
    queue: VecDeque<Job>,
    #[serde(rename = "job_history", default)]
    history: Vec<Job>,
    /// Next id to hand out; never decreases, so ids are not reused after
    /// jobs are cleared from history.
    #[serde(default)]
    next_job_id: u64,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new queued job to the queue and the history, returning its id.
    pub fn submit(&mut self, spec: JobSpec) -> u64 {
        let job_id = self.allocate_id();
        let job = Job::new(job_id, spec);
        self.queue.push_back(job.clone());
        self.history.push(job);
        job_id
    }

    fn allocate_id(&mut self) -> u64 {
        // Documents written without a counter fall back to the largest id seen.
        let highest = self
            .history
            .iter()
            .chain(self.queue.iter())
            .map(|j| j.job_id)
            .max()
            .unwrap_or(0);
        let job_id = self.next_job_id.max(highest + 1).max(1);
        self.next_job_id = job_id + 1;
        job_id
    }

    pub fn queue(&self) -> &VecDeque<Job> {
        &self.queue
    }

    pub fn history(&self) -> &[Job] {
        &self.history
    }

    pub fn pop_front(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }

    pub fn push_front(&mut self, job: Job) {
        self.queue.push_front(job);
    }

    /// Get a history entry by id
    pub fn get_job(&self, job_id: u64) -> Option<&Job> {
        self.history.iter().find(|j| j.job_id == job_id)
    }

    /// Replaces the history entry for `job.job_id`: every stale entry with
    /// that id is dropped and the new record is appended.
    pub fn replace_in_history(&mut self, job: Job) {
        self.history.retain(|j| j.job_id != job.job_id);
        self.history.push(job);
    }

    /// Moves a queued job to the front of the queue. Returns false if no
    /// queued job has this id.
    pub fn prioritize(&mut self, job_id: u64) -> bool {
        let Some(position) = self
            .queue
            .iter()
            .position(|j| j.job_id == job_id && j.status == JobStatus::Queued)
        else {
            return false;
        };
        if let Some(job) = self.queue.remove(position) {
            self.queue.push_front(job);
        }
        true
    }

    /// Removes every job with `status` from both the queue and the history.
    /// Returns the number of history entries removed.
    pub fn clear_by_status(&mut self, status: JobStatus) -> usize {
        self.queue.retain(|j| j.status != status);
        let before = self.history.len();
        self.history.retain(|j| j.status != status);
        before - self.history.len()
    }

    /// Drops executed jobs from the history, returning their ids.
    pub fn prune_executed(&mut self) -> Vec<u64> {
        let pruned = self
            .history
            .iter()
            .filter(|j| j.status == JobStatus::Executed)
            .map(|j| j.job_id)
            .collect();
        self.history.retain(|j| j.status != JobStatus::Executed);
        pruned
    }

    /// Running jobs that carry a pid, for reconciliation.
    pub fn running_jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.history
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running && j.pid.is_some())
    }

    /// Checks the persisted invariants: unique history ids, `pid` iff
    /// running, and every queue entry queued and mirrored in history.
    pub fn is_coherent(&self) -> bool {
        let mut ids: Vec<u64> = self.history.iter().map(|j| j.job_id).collect();
        ids.sort_unstable();
        let unique = ids.windows(2).all(|w| w[0] != w[1]);

        let pids_ok = self.history.iter().all(Job::pid_consistent)
            && self.queue.iter().all(Job::pid_consistent);

        let queue_mirrored = self.queue.iter().all(|queued| {
            queued.status == JobStatus::Queued && self.get_job(queued.job_id) == Some(queued)
        });

        unique && pids_ok && queue_mirrored
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.history.is_empty()
    }
}
