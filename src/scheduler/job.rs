use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobqError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Executed,
    Failed,
}

impl JobStatus {
    /// `executed` and `failed` are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Executed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Executed => write!(f, "executed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = JobqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "executed" => Ok(JobStatus::Executed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobqError::InvalidArgument(format!(
                "unknown job status '{}', expected one of queued, running, executed, failed",
                other
            ))),
        }
    }
}

/// What a client asks for when submitting a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub user: String,
    pub command: String,
    pub priority: i64,
    /// Required resident memory in bytes
    pub memory: u64,
    /// Required compute share, percent of one core
    pub compute: u32,
}

impl JobSpec {
    pub fn new(user: impl Into<String>, command: impl Into<String>, memory: u64) -> Self {
        Self {
            user: user.into(),
            command: command.into(),
            priority: 0,
            memory,
            compute: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_compute(mut self, compute: u32) -> Self {
        self.compute = compute;
        self
    }

    /// Rejects submissions without a user or a command.
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(JobqError::InvalidArgument("user must not be empty".into()));
        }
        if self.command.trim().is_empty() {
            return Err(JobqError::InvalidArgument(
                "command must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: u64,
    pub user: String,
    pub command: String,
    pub priority: i64,
    pub memory: u64,
    pub compute: u32,
    pub status: JobStatus,
    pub pid: Option<u32>,
    /// Absent in documents written before submission times were recorded.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl Job {
    pub fn new(job_id: u64, spec: JobSpec) -> Self {
        Self {
            job_id,
            user: spec.user,
            command: spec.command,
            priority: spec.priority,
            memory: spec.memory,
            compute: spec.compute,
            status: JobStatus::Queued,
            pid: None,
            submitted_at: Some(Utc::now()),
            exit_code: None,
        }
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.status = JobStatus::Running;
        self.pid = Some(pid);
    }

    /// Records the outcome observed by the supervising dispatcher.
    pub fn mark_finished(&mut self, exit_code: Option<i32>) {
        self.status = if exit_code == Some(0) {
            JobStatus::Executed
        } else {
            JobStatus::Failed
        };
        self.pid = None;
        self.exit_code = exit_code;
    }

    /// Failure without a known exit code: the process never started, or it
    /// vanished while nobody was supervising it.
    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
        self.pid = None;
    }

    /// `pid` is present exactly while the job is running.
    pub fn pid_consistent(&self) -> bool {
        (self.status == JobStatus::Running) == self.pid.is_some()
    }
}
