pub mod config;
pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod system;
pub mod worker;

pub use error::{JobqError, Result};
pub use service::JobService;
