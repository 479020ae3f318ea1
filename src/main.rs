//! mrgate - inspect CODEOWNERS files and merge gates from the command line

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MRGATE_LOG";

#[derive(Parser)]
#[command(name = "mrgate", version, about = "Merge request gate tooling")]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CODEOWNERS file and resolve its owners
    Codeowners {
        /// CODEOWNERS file
        file: PathBuf,

        /// Changed files to suggest reviewers for
        #[arg(long, num_args = 1..)]
        files: Vec<String>,
    },

    /// Evaluate a merge gate fixture (exit code 2 when blocked)
    Gate {
        /// Fixture TOML with the rule, reviews and merge request state
        fixture: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let args = Cli::parse();
    let ctx = cli::CommandContext::load(args.config.as_deref(), args.json)?;

    match args.command {
        Commands::Codeowners { file, files } => {
            cli::run_codeowners(&ctx, &file, &files).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Gate { fixture } => {
            let verdict = cli::run_gate(&ctx, &fixture)?;
            Ok(if verdict.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}
