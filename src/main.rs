use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use jobq::config::JobqConfig;
use jobq::monitor::Monitor;
use jobq::scheduler::{Job, JobSpec, JobStatus};
use jobq::shutdown::install_shutdown_handler;
use jobq::worker::DispatchOutcome;
use jobq::JobService;

#[derive(Parser, Debug)]
#[command(name = "jobq")]
#[command(version)]
#[command(about = "A single-host job dispatcher with memory-gated admission")]
#[command(propagate_version = true)]
struct Args {
    /// Directory holding jobs.json and jobs.lock
    #[arg(long, global = true, env = "JOBQ_STATE_DIR", default_value = ".")]
    state_dir: PathBuf,

    /// Interval between checkpoints of a running job, in milliseconds
    #[arg(long, global = true, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    checkpoint_ms: u64,

    /// Monitor refresh interval, in milliseconds
    #[arg(long, global = true, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    refresh_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Queue a new job
    Submit {
        /// Submitting user
        user: String,

        /// Shell command to run (e.g., "make -j4")
        command: String,

        /// Priority hint, only used when reordering by hand
        #[arg(long, short = 'p', default_value = "0")]
        priority: i64,

        /// Required memory in bytes
        #[arg(long, short = 'm')]
        memory: u64,

        /// Required compute share, percent of one core
        #[arg(long, short = 'c', default_value = "0")]
        compute: u32,
    },

    /// Try to dispatch the job at the head of the queue and wait for it
    Run,

    /// Mark running jobs whose process is gone as failed, prune executed jobs
    #[command(alias = "update")]
    Reconcile,

    /// Move a queued job to the front of the queue
    Prioritize {
        /// The job ID
        job_id: u64,
    },

    /// Remove all jobs with the given status
    Clear {
        /// Status to clear (queued, running, executed, failed)
        #[arg(long, short = 's')]
        status: JobStatus,
    },

    /// Print the queue and history once
    List {
        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Live view of jobs and their resource usage
    Monitor,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobListOutput<'a> {
    queue: Vec<&'a Job>,
    history: Vec<&'a Job>,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_submit(service: &JobService, spec: JobSpec) -> jobq::Result<()> {
    let user = spec.user.clone();
    let job_id = service.submit(spec).await?;
    println!("Job {} submitted by {}", job_id, user);
    Ok(())
}

async fn handle_run(service: &JobService) -> jobq::Result<()> {
    match service.run_next().await? {
        DispatchOutcome::Idle => println!("No queued jobs."),
        DispatchOutcome::Deferred {
            job_id,
            required,
            available,
        } => println!(
            "Job {} is on hold due to insufficient memory ({} bytes required, {} available)",
            job_id, required, available
        ),
        DispatchOutcome::Finished {
            job_id,
            status,
            exit_code,
        } => match exit_code {
            Some(code) => println!("Job {} {} (exit code {})", job_id, status, code),
            None => println!("Job {} {}", job_id, status),
        },
    }
    Ok(())
}

async fn handle_reconcile(service: &JobService) -> jobq::Result<()> {
    let report = service.reconcile().await?;
    for job_id in &report.failed {
        println!("Job {} marked failed: process no longer running", job_id);
    }
    if !report.pruned.is_empty() {
        println!("Pruned {} executed job(s)", report.pruned.len());
    }
    Ok(())
}

async fn handle_list(service: &JobService, output: &OutputFormat) -> jobq::Result<()> {
    let table = service.snapshot().await?;

    match output {
        OutputFormat::Json => {
            let out = JobListOutput {
                queue: table.queue().iter().collect(),
                history: table.history().iter().collect(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            if table.history().is_empty() {
                println!("No jobs found.");
                return Ok(());
            }

            println!(
                "{:<6} {:<10} {:<9} {:<12} {:<8} {:<8} COMMAND",
                "JOB ID", "USER", "STATUS", "MEMORY", "COMPUTE", "PID"
            );
            println!("{}", "-".repeat(78));
            for job in table.history() {
                let pid = job
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string());
                // Truncate command if too long
                let cmd_display = if job.command.chars().count() > 30 {
                    format!("{}...", job.command.chars().take(27).collect::<String>())
                } else {
                    job.command.clone()
                };
                println!(
                    "{:<6} {:<10} {:<9} {:<12} {:<8} {:<8} {}",
                    job.job_id, job.user, job.status, job.memory, job.compute, pid, cmd_display
                );
            }
            println!();
            let queued: Vec<String> = table.queue().iter().map(|j| j.job_id.to_string()).collect();
            if queued.is_empty() {
                println!("Queue: (empty)");
            } else {
                println!("Queue: {}", queued.join(" "));
            }
        }
    }
    Ok(())
}

async fn handle_monitor(service: JobService, config: &JobqConfig) -> jobq::Result<()> {
    let cancel = install_shutdown_handler()?;
    Monitor::new(service, config.monitor.clone()).run(cancel).await
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so tables and JSON on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = JobqConfig::new(args.state_dir)
        .with_checkpoint_interval_ms(args.checkpoint_ms)
        .with_refresh_interval_ms(args.refresh_ms);
    let service = JobService::new(config.clone());

    let result = match args.command {
        Commands::Submit {
            user,
            command,
            priority,
            memory,
            compute,
        } => {
            let spec = JobSpec::new(user, command, memory)
                .with_priority(priority)
                .with_compute(compute);
            handle_submit(&service, spec).await
        }
        Commands::Run => handle_run(&service).await,
        Commands::Reconcile => handle_reconcile(&service).await,
        Commands::Prioritize { job_id } => service.prioritize(job_id).await.map(|()| {
            println!("Job {} has been prioritized", job_id);
        }),
        Commands::Clear { status } => service.clear_by_status(status).await.map(|removed| {
            println!("Cleared {} job(s) with status '{}'", removed, status);
        }),
        Commands::List { output } => handle_list(&service, &output).await,
        Commands::Monitor => handle_monitor(service.clone(), &config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
