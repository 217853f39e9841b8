//! Analyzer configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Analyzer configuration, read from `ANALYZER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Combined data document written by the mobile client
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Model artifact and ledger directory
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,

    /// Seconds between analyses; 0 runs once and exits
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    /// New samples required before a model is retrained
    #[serde(default = "default_retrain_threshold")]
    pub retrain_threshold: u64,

    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string())
}

fn default_data_file() -> PathBuf {
    PathBuf::from("combined_data.json")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("analysis_results.json")
}

fn default_analysis_interval() -> u64 {
    300
}

fn default_retrain_threshold() -> u64 {
    analysis_lib::store::DEFAULT_RETRAIN_THRESHOLD
}

fn default_smoothing_alpha() -> f64 {
    analysis_lib::predictor::DEFAULT_SMOOTHING_ALPHA
}

fn default_api_port() -> u16 {
    8080
}

impl AnalyzerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ANALYZER").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("Invalid ANALYZER_* configuration")
    }

    /// `None` when the analyzer should run once and exit
    pub fn analysis_interval(&self) -> Option<Duration> {
        (self.analysis_interval_secs > 0).then(|| Duration::from_secs(self.analysis_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_source() {
        let config: AnalyzerConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.data_file, PathBuf::from("combined_data.json"));
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert_eq!(config.results_file, PathBuf::from("analysis_results.json"));
        assert_eq!(config.retrain_threshold, 50);
        assert_eq!(config.smoothing_alpha, 0.2);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.analysis_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_interval_means_run_once() {
        let config: AnalyzerConfig = config::Config::builder()
            .set_override("analysis_interval_secs", 0)
            .unwrap()
            .set_override("smoothing_alpha", 0.5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.analysis_interval(), None);
        assert_eq!(config.smoothing_alpha, 0.5);
    }
}
