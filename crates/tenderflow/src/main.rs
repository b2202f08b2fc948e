//! Tenderflow CLI
//!
//! Drives the workflow engine against a local database: tender lifecycle,
//! proposal intake, scoring and ranking, the award quorum, and post-award
//! disputes. The acting principal is supplied as `--as <id>:<role>`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tenderflow_engine::TenderEngine;
use tenderflow_logging::{default_db_path, init_logging, LogConfig};
use tracing::error;

mod cli;

use cli::{award, dispute, submission, tender};

#[derive(Parser, Debug)]
#[command(name = "tenderflow", about = "Tender evaluation and award workflow", version)]
struct Cli {
    /// Database path (default: ~/.tenderflow/tenderflow.sqlite3)
    #[arg(long, global = true, env = "TENDERFLOW_DB")]
    db: Option<PathBuf>,

    /// Acting principal as <id>:<role> (procurement, vendor, evaluator, admin)
    #[arg(long = "as", global = true, value_name = "ID:ROLE")]
    principal: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage tenders (create, publish, close, cancel, show, list, history)
    Tender {
        #[command(subcommand)]
        command: tender::TenderCommand,
    },
    /// Submit or amend a proposal against an open tender
    Submit(submission::SubmitArgs),
    /// List the submissions on a tender
    Submissions { tender_id: String },
    /// Record an evaluator score for one criterion
    Score(submission::ScoreArgs),
    /// Show the ranking of fully scored submissions
    Rank { tender_id: String },
    /// Award decisions (propose, approve, show)
    Award {
        #[command(subcommand)]
        command: award::AwardCommand,
    },
    /// Post-award disputes (file, investigate, resolve, list)
    Dispute {
        #[command(subcommand)]
        command: dispute::DisputeCommand,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "tenderflow",
        verbose: args.verbose,
    }) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let db_path = args.db.unwrap_or_else(default_db_path);
    let engine = TenderEngine::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let principal = args
        .principal
        .as_deref()
        .map(cli::parse_principal)
        .transpose()?;

    match args.command {
        Commands::Tender { command } => tender::run(&engine, principal, command).await,
        Commands::Submit(submit) => submission::submit(&engine, principal, submit).await,
        Commands::Submissions { tender_id } => submission::list(&engine, &tender_id).await,
        Commands::Score(score) => submission::score(&engine, principal, score).await,
        Commands::Rank { tender_id } => submission::rank(&engine, &tender_id).await,
        Commands::Award { command } => award::run(&engine, principal, command).await,
        Commands::Dispute { command } => dispute::run(&engine, principal, command).await,
    }
}
