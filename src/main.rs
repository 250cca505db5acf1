use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atelier::cmd;

#[derive(Parser)]
#[command(name = "atelier", version, about = "Software-synthesis pipeline orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8090)]
        port: u16,
        /// External worker command line (defaults to ATELIER_WORKER_CMD)
        #[arg(long)]
        worker_cmd: Option<String>,
    },
    /// Run the whole pipeline for a project description
    Run {
        /// What to build
        description: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        worker_cmd: Option<String>,
        /// Refinement iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Initialize and plan a project, print the decomposition
    Plan {
        description: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        worker_cmd: Option<String>,
    },
    /// List or clear recorded pipeline runs
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Fetch the status snapshot from a running server
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8090")]
        url: String,
    },
    /// Request a cooperative stop on a running server
    Stop {
        #[arg(long, default_value = "http://127.0.0.1:8090")]
        url: String,
    },
    /// Report an external error to a running server
    ReportError {
        message: String,
        #[arg(long, default_value = "http://127.0.0.1:8090")]
        url: String,
        #[arg(long)]
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Serve {
            host,
            port,
            worker_cmd,
        } => cmd::serve(host, port, worker_cmd).await,
        Command::Run {
            description,
            name,
            worker_cmd,
            max_iterations,
        } => cmd::run(description, name, worker_cmd, max_iterations).await,
        Command::Plan {
            description,
            name,
            worker_cmd,
        } => cmd::plan(description, name, worker_cmd).await,
        Command::History { clear } => cmd::history(clear).await,
        Command::Status { url } => cmd::status(url).await,
        Command::Stop { url } => cmd::stop(url).await,
        Command::ReportError { message, url, file } => cmd::report_error(url, message, file).await,
    }
}
