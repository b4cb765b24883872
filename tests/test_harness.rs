//! Shared helpers for jobq integration tests.
//!
//! Each test gets its own state directory and a [`FakeSystem`] whose
//! available memory and process table are set by the test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use jobq::config::JobqConfig;
use jobq::scheduler::JobSpec;
use jobq::system::{ProcSystem, ProcessState, ProcessUsage, SystemProbe};
use jobq::JobService;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Probe with a fixed amount of available memory. Process queries fall
/// through to `/proc` unless a pid has been overridden.
#[derive(Debug)]
pub struct FakeSystem {
    available: AtomicU64,
    states: Mutex<HashMap<u32, ProcessState>>,
    usage: Mutex<HashMap<u32, ProcessUsage>>,
    real: ProcSystem,
}

impl FakeSystem {
    pub fn new(available: u64) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicU64::new(available),
            states: Mutex::new(HashMap::new()),
            usage: Mutex::new(HashMap::new()),
            real: ProcSystem::new(),
        })
    }

    pub fn set_available(&self, available: u64) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_state(&self, pid: u32, state: ProcessState) {
        self.states.lock().unwrap().insert(pid, state);
    }

    pub fn set_usage(&self, pid: u32, usage: ProcessUsage) {
        self.usage.lock().unwrap().insert(pid, usage);
    }
}

impl SystemProbe for FakeSystem {
    fn available_memory(&self) -> jobq::Result<u64> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn process_state(&self, pid: u32) -> ProcessState {
        if let Some(state) = self.states.lock().unwrap().get(&pid) {
            return *state;
        }
        self.real.process_state(pid)
    }

    fn process_usage(&self, pid: u32) -> Option<ProcessUsage> {
        if let Some(usage) = self.usage.lock().unwrap().get(&pid) {
            return Some(*usage);
        }
        self.real.process_usage(pid)
    }
}

/// A service over a fresh temporary state directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub system: Arc<FakeSystem>,
    pub service: JobService,
}

impl TestEnv {
    pub fn new(available: u64) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let system = FakeSystem::new(available);
        let service = JobService::with_system(test_config(&dir), system.clone());
        Self {
            dir,
            system,
            service,
        }
    }

    /// Another service over the same state directory, as a separate
    /// invocation would see it.
    pub fn second_invocation(&self) -> JobService {
        JobService::with_system(test_config(&self.dir), self.system.clone())
    }

    pub async fn submit(&self, user: &str, command: &str, memory: u64) -> u64 {
        self.service
            .submit(JobSpec::new(user, command, memory))
            .await
            .expect("submit failed")
    }
}

/// Config with a short checkpoint interval for faster tests.
pub fn test_config(dir: &TempDir) -> JobqConfig {
    JobqConfig::new(dir.path()).with_checkpoint_interval_ms(20)
}

/// A pid that is (almost certainly) not in use.
pub fn unused_pid() -> u32 {
    let mut pid = 4_000_000;
    while std::path::Path::new(&format!("/proc/{}", pid)).exists() {
        pid += 1;
    }
    pid
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn assert_eventually<F, Fut>(timeout: Duration, mut check: F, msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("Condition not met within {:?}: {}", timeout, msg);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
