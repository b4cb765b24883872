pub mod job;
pub mod queue;

pub use job::{Job, JobSpec, JobStatus};
pub use queue::JobTable;
