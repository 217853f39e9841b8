//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Optional defaults read from `~/.config/bma/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub model_dir: Option<PathBuf>,
    pub results_file: Option<PathBuf>,
    /// Default output format ("table" or "json")
    pub default_format: Option<String>,
}

/// Effective settings after merging flags, config file and defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub model_dir: PathBuf,
    pub results_file: PathBuf,
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from file, defaults if it does not exist
    pub fn load() -> Result<Self> {
        let Some(config_path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))
    }

    /// Command-line values win over the config file
    pub fn resolve(
        self,
        model_dir: Option<PathBuf>,
        results_file: Option<PathBuf>,
        format: Option<OutputFormat>,
    ) -> Settings {
        let configured_format = self
            .default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok());

        Settings {
            model_dir: model_dir
                .or(self.model_dir)
                .unwrap_or_else(|| PathBuf::from("models")),
            results_file: results_file
                .or(self.results_file)
                .unwrap_or_else(|| PathBuf::from("analysis_results.json")),
            format: format.or(configured_format).unwrap_or_default(),
        }
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("bma").join("config.json"))
    }
}
