//! Job dispatch and crash recovery.
//!
//! - [`Dispatcher`]: one admission decision per call; launches the head job
//!   as `sh -c <command>` and supervises it, checkpointing its record while
//!   it runs and writing the final status when it exits
//! - [`Reconciler`]: marks `running` jobs whose process has disappeared as
//!   `failed` and prunes `executed` jobs from the history
//!
//! Neither holds the coordination lock while a job runs, so any number of
//! invocations can each supervise their own job.

pub mod dispatcher;
pub mod reconciler;
pub mod supervisor;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use reconciler::{ReconcileReport, Reconciler};
pub use supervisor::Supervisor;
