use std::path::{Path, PathBuf};
use std::time::Duration;

const STATE_FILE_NAME: &str = "jobs.json";
const LOCK_FILE_NAME: &str = "jobs.lock";

/// Location of the shared state document and its lock file.
///
/// Every invocation pointed at the same `state_dir` coordinates through the
/// same pair of files.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub state_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
        }
    }
}

impl StoreConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Path of the JSON document holding the queue and history.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    /// Path of the file that carries the advisory lock.
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE_NAME)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

/// Settings for launching and supervising a dispatched job.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often the running job's record is re-written while it runs
    pub checkpoint_interval_ms: u64,
    /// Shell used to run the job command (`<shell> -c <command>`)
    pub shell: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_ms: 1000,
            shell: "sh".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }
}

/// Settings for the live monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub refresh_interval_ms: u64,
    /// Number of cells in each usage bar
    pub bar_width: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            bar_width: 20,
        }
    }
}

impl MonitorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobqConfig {
    pub store: StoreConfig,
    pub dispatch: DispatchConfig,
    pub monitor: MonitorConfig,
}

impl JobqConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig::new(state_dir),
            ..Default::default()
        }
    }

    pub fn with_checkpoint_interval_ms(mut self, interval_ms: u64) -> Self {
        self.dispatch.checkpoint_interval_ms = interval_ms;
        self
    }

    pub fn with_refresh_interval_ms(mut self, interval_ms: u64) -> Self {
        self.monitor.refresh_interval_ms = interval_ms;
        self
    }
}
