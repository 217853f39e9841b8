//! Output formatting utilities

use analysis_lib::BiomarkerReading;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or `json` as pretty JSON
pub fn print_rows<T: Tabled, J: Serialize + ?Sized>(
    rows: Vec<T>,
    json: &J,
    format: OutputFormat,
    empty_message: &str,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(json)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                print_warning(empty_message);
                return Ok(());
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
    }
    Ok(())
}

pub fn print_json<J: Serialize + ?Sized>(value: &J) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Readings in green, the insufficient-data sentinel in yellow
pub fn color_reading(reading: BiomarkerReading) -> String {
    match reading {
        BiomarkerReading::Value(_) => reading.to_string().green().to_string(),
        BiomarkerReading::InsufficientData => reading.to_string().yellow().to_string(),
    }
}
