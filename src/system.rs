//! Host queries used for admission control, reconciliation and monitoring.
//!
//! [`ProcSystem`] answers them from Linux `/proc`; tests substitute their own
//! [`SystemProbe`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::{JobqError, Result};

/// State of an OS process as far as reconciliation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie,
    Dead,
    Missing,
}

impl ProcessState {
    /// Whether the process can still make progress.
    pub fn is_alive(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// Sampled resource usage of one process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub rss_bytes: u64,
    /// Share of the whole machine's CPU capacity, 0–100
    pub cpu_percent: f64,
}

pub trait SystemProbe: Send + Sync {
    /// Memory available for new processes, in bytes.
    fn available_memory(&self) -> Result<u64>;

    fn process_state(&self, pid: u32) -> ProcessState;

    /// Returns `None` if the pid no longer resolves.
    fn process_usage(&self, pid: u32) -> Option<ProcessUsage>;
}

/// `/proc`-backed probe.
///
/// CPU usage is the tick delta between two calls for the same pid, so the
/// first sample of a process reports 0%.
#[derive(Debug)]
pub struct ProcSystem {
    root: PathBuf,
    clock_ticks: f64,
    cpus: f64,
    samples: Mutex<HashMap<u32, (u64, Instant)>>,
}

impl Default for ProcSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcSystem {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        // SAFETY: sysconf has no preconditions and only reads a constant.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            root: root.into(),
            clock_ticks: if ticks > 0 { ticks as f64 } else { 100.0 },
            cpus: cpus as f64,
            samples: Mutex::new(HashMap::new()),
        }
    }

    fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(relative)).ok()
    }

    fn cpu_ticks(&self, pid: u32) -> Option<u64> {
        let stat = self.read(&format!("{}/stat", pid))?;
        let fields = stat_fields_after_comm(&stat)?;
        // utime and stime are fields 14 and 15 of /proc/<pid>/stat.
        let utime: u64 = fields.get(11)?.parse().ok()?;
        let stime: u64 = fields.get(12)?.parse().ok()?;
        Some(utime + stime)
    }
}

impl SystemProbe for ProcSystem {
    fn available_memory(&self) -> Result<u64> {
        let meminfo = self
            .read("meminfo")
            .ok_or_else(|| JobqError::Probe("cannot read meminfo".into()))?;
        parse_meminfo_kib(&meminfo, "MemAvailable")
            .map(|kib| kib * 1024)
            .ok_or_else(|| JobqError::Probe("MemAvailable missing from meminfo".into()))
    }

    fn process_state(&self, pid: u32) -> ProcessState {
        match self.read(&format!("{}/stat", pid)) {
            Some(stat) => parse_process_state(&stat),
            None => ProcessState::Missing,
        }
    }

    fn process_usage(&self, pid: u32) -> Option<ProcessUsage> {
        let status = self.read(&format!("{}/status", pid))?;
        let rss_bytes = parse_meminfo_kib(&status, "VmRSS").unwrap_or(0) * 1024;
        let ticks = self.cpu_ticks(pid)?;

        let now = Instant::now();
        let previous = self
            .samples
            .lock()
            .ok()
            .and_then(|mut samples| samples.insert(pid, (ticks, now)));

        let cpu_percent = match previous {
            Some((prev_ticks, prev_at)) => {
                let elapsed = now.duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    let busy = ticks.saturating_sub(prev_ticks) as f64 / self.clock_ticks;
                    (busy / elapsed / self.cpus * 100.0).min(100.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        Some(ProcessUsage {
            rss_bytes,
            cpu_percent,
        })
    }
}

/// Reads a `Key:   1234 kB` line as used by `/proc/meminfo` and
/// `/proc/<pid>/status`.
pub fn parse_meminfo_kib(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Classifies the state letter (field 3) of `/proc/<pid>/stat`.
pub fn parse_process_state(stat: &str) -> ProcessState {
    match stat_fields_after_comm(stat).and_then(|f| f.first().copied()) {
        Some("Z") => ProcessState::Zombie,
        Some("X") | Some("x") => ProcessState::Dead,
        Some(_) => ProcessState::Running,
        None => ProcessState::Missing,
    }
}

// comm (field 2) is parenthesised and may contain spaces or parens, so split
// after the last ')'.
fn stat_fields_after_comm(stat: &str) -> Option<Vec<&str>> {
    let after_comm = stat.rsplit_once(')')?.1;
    Some(after_comm.split_whitespace().collect())
}
