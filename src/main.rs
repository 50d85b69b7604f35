use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use jobsched::config::{SchedulerConfig, ServerConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_SOCKET_PATH};
use jobsched::ingest::client;
use jobsched::ingest::message::Reply;
use jobsched::ingest::{Submission, SubmissionIngestor};
use jobsched::process::ProcessController;
use jobsched::scheduler::{
    HistoryEntry, HistoryRecorder, HistorySummary, SchedulerEngine, MAX_PRIORITY, MIN_PRIORITY,
};
use jobsched::shutdown::install_shutdown_handler;

/// Pending submissions buffered between the ingestor and the engine.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "jobsched")]
#[command(version)]
#[command(about = "A priority round-robin job scheduler that time-slices shell commands")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the scheduler
    Server(ServerArgs),

    /// Submit a command to a running scheduler
    Submit(SubmitArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Maximum number of jobs running at the same time (NCPU)
    ncpu: u64,

    /// Quantum length in milliseconds (TSLICE)
    tslice: u64,

    /// Path of the submission socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Maximum number of admitted jobs
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    capacity: usize,

    /// Format of the history dump printed on shutdown
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Path of the submission socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Job priority, 1 is scheduled first
    #[arg(
        long,
        short = 'p',
        default_value_t = MIN_PRIORITY,
        value_parser = clap::value_parser!(u32).range(MIN_PRIORITY as i64..=MAX_PRIORITY as i64)
    )]
    priority: u32,

    /// The command to run and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct HistoryOutput<'a> {
    jobs: &'a [HistoryEntry],
    summary: HistorySummary,
}

fn print_history(
    history: &HistoryRecorder,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Table => print!("{}", history.render()),
        OutputFormat::Json => {
            let output = HistoryOutput {
                jobs: history.entries(),
                summary: history.summary(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

// =============================================================================
// Server
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout is reserved for the history dump
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let scheduler = SchedulerConfig::new(args.ncpu, args.tslice)?.with_capacity(args.capacity)?;
    let config = ServerConfig::new(scheduler).with_socket_path(args.socket);

    let shutdown = install_shutdown_handler()?;
    let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let ingestor = SubmissionIngestor::bind(&config.socket_path, request_tx)?;
    let ingest_handle = tokio::spawn(ingestor.run(shutdown.clone()));

    let engine = SchedulerEngine::new(config.scheduler.clone(), ProcessController::new());
    let outcome = engine.run(request_rx, shutdown.clone()).await;
    shutdown.cancel();
    let history = outcome?;

    print_history(&history, &args.output)?;
    if let Err(e) = ingest_handle.await {
        tracing::warn!(error = %e, "Ingestor task ended abnormally");
    }
    Ok(())
}

// =============================================================================
// Client
// =============================================================================

async fn run_submit(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let submission = Submission::new(args.command, args.priority);

    match client::submit(&args.socket, &submission).await? {
        Some(Reply::Accepted { job_id, pid }) => {
            println!("Job submitted: {} (pid {})", job_id, pid);
            Ok(())
        }
        Some(Reply::Rejected(reason)) => Err(format!("Submission rejected: {}", reason).into()),
        None => Err("Scheduler closed the connection without a reply".into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with 1 like every other configuration error
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
        Commands::Submit(submit_args) => run_submit(submit_args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
