mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pyjudge-cli")]
#[command(about = "PyJudge CLI - Check and run Python submissions locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Statically validate a submission without running it
    Check {
        /// Python source file
        #[arg(short, long)]
        file: PathBuf,

        /// Comma separated allowed imports (e.g., "math, collections")
        #[arg(short, long, default_value = "")]
        allow: String,

        /// Comma separated operations to exempt from the forbidden set
        #[arg(long)]
        allow_ops: Option<String>,
    },

    /// Validate, extract and run a submission against test cases
    Run {
        /// Python source file
        #[arg(short, long)]
        file: PathBuf,

        /// Comma separated allowed imports
        #[arg(short, long, default_value = "")]
        allow: String,

        /// Comma separated operations to exempt from the forbidden set
        #[arg(long)]
        allow_ops: Option<String>,

        /// Test cases: a literal like "[{'id': 1, 'input': [1, 2], 'expected': 3}]" or a file containing one
        #[arg(short, long)]
        tests: String,

        /// Per-test timeout in seconds (defaults to the configured value)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file, allow, allow_ops } => {
            commands::check(&file, &allow, allow_ops.as_deref())?;
        }
        Commands::Run {
            file,
            allow,
            allow_ops,
            tests,
            timeout,
        } => {
            commands::run(&file, &allow, allow_ops.as_deref(), &tests, timeout).await?;
        }
        Commands::ShowConfig => {
            commands::show_config()?;
        }
    }

    Ok(())
}
