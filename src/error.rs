use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobqError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job {0} is not in the queue")]
    JobNotQueued(u64),

    #[error("Failed to launch job {job_id}: {source}")]
    Launch {
        job_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System probe error: {0}")]
    Probe(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobqError>;
