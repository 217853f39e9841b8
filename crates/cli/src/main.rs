//! Biomarker Analysis CLI
//!
//! A command-line tool for running analyses against a combined data
//! document and inspecting stored models, the training ledger and results.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, inspect, show};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Biomarker Analysis CLI
#[derive(Parser)]
#[command(name = "bma")]
#[command(author, version, about = "CLI for Biomarker Analysis", long_about = None)]
pub struct Cli {
    /// Model artifact and ledger directory (can also be set via BMA_MODEL_DIR)
    #[arg(long, env = "BMA_MODEL_DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// Analysis result document (can also be set via BMA_RESULTS_FILE)
    #[arg(long, env = "BMA_RESULTS_FILE", global = true)]
    pub results_file: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the biomarker pipeline on a combined data document
    Analyze {
        /// Combined data document
        #[arg(long, short)]
        data: PathBuf,

        /// Menstrual cycle phase (none, ovulation, menstruation); overrides the document
        #[arg(long)]
        phase: Option<String>,

        /// Do not write models, ledger or result
        #[arg(long)]
        no_save: bool,

        /// New samples required before a stored model is retrained
        #[arg(long, default_value_t = analysis_lib::store::DEFAULT_RETRAIN_THRESHOLD)]
        retrain_threshold: u64,
    },

    /// Show the stored analysis result
    Show {
        /// Only show the result if it was produced on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the training ledger
    Ledger,

    /// Show stored model artifacts
    Models,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let settings = config::Config::load()?.resolve(cli.model_dir, cli.results_file, cli.format);

    match cli.command {
        Commands::Analyze {
            data,
            phase,
            no_save,
            retrain_threshold,
        } => {
            analyze::run_analysis(
                &settings,
                &data,
                phase.as_deref(),
                no_save,
                retrain_threshold,
            )?;
        }
        Commands::Show { date } => {
            show::show_result(&settings, date.as_deref())?;
        }
        Commands::Ledger => {
            inspect::show_ledger(&settings)?;
        }
        Commands::Models => {
            inspect::show_models(&settings)?;
        }
    }

    Ok(())
}
