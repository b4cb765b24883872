//! Live, read-only view of the job history with per-job resource usage.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;

use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::scheduler::{JobStatus, JobTable};
use crate::service::JobService;
use crate::system::ProcessUsage;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const MIB: f64 = 1024.0 * 1024.0;

pub struct Monitor {
    service: JobService,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(service: JobService, config: MonitorConfig) -> Self {
        Self { service, config }
    }

    /// Usage of every running job with a pid. Pids that no longer resolve
    /// report zero usage.
    pub fn sample(&self, table: &JobTable) -> HashMap<u64, ProcessUsage> {
        table
            .history()
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .filter_map(|j| {
                let pid = j.pid?;
                let usage = self.service.system().process_usage(pid).unwrap_or_default();
                Some((j.job_id, usage))
            })
            .collect()
    }

    /// Takes one snapshot and renders it.
    pub async fn frame(&self) -> Result<String> {
        let table = self.service.snapshot().await?;
        let usage = self.sample(&table);
        Ok(render(&table, &usage, self.config.bar_width))
    }

    /// Redraw every refresh interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.refresh_interval());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Monitor stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let frame = self.frame().await?;
                    let mut stdout = std::io::stdout().lock();
                    write!(stdout, "{}{}", CLEAR_SCREEN, frame)?;
                    stdout.flush()?;
                }
            }
        }
    }
}

/// Renders the history as a table. Running jobs get their sampled memory and
/// CPU usage plus bars relative to what they declared.
pub fn render(table: &JobTable, usage: &HashMap<u64, ProcessUsage>, bar_width: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6} {:<10} {:<12} {:<8} {:<10} COMMAND",
        "JOB ID", "USER", "MEMORY (MB)", "CPU (%)", "STATUS"
    );
    let _ = writeln!(out, "{}", "-".repeat(78));

    for job in table.history() {
        if job.status == JobStatus::Running {
            let sampled = usage.get(&job.job_id).copied().unwrap_or_default();
            let memory_ratio = ratio(sampled.rss_bytes as f64, job.memory as f64);
            let cpu_ratio = ratio(sampled.cpu_percent, job.compute as f64);
            let _ = writeln!(
                out,
                "{:<6} {:<10} {:<12.2} {:<8.2} {:<10} {} {} {}",
                job.job_id,
                job.user,
                sampled.rss_bytes as f64 / MIB,
                sampled.cpu_percent,
                job.status,
                progress_bar(memory_ratio, bar_width),
                progress_bar(cpu_ratio, bar_width),
                job.command
            );
        } else {
            let _ = writeln!(
                out,
                "{:<6} {:<10} {:<12} {:<8} {:<10} {}",
                job.job_id, job.user, "-", "-", job.status, job.command
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} queued, {} in history",
        table.queue().len(),
        table.history().len()
    );
    out
}

fn ratio(used: f64, declared: f64) -> f64 {
    if declared <= 0.0 {
        0.0
    } else {
        (used / declared).clamp(0.0, 1.0)
    }
}

/// `[####----]` with `width` cells filled in proportion to `fraction`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64) as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
