//! Observability infrastructure for biomarker analysis
//!
//! Provides:
//! - Prometheus metrics (run/training latency, retrain and reuse counts, failures)
//! - Structured JSON logging with tracing

use crate::error::AnalysisError;
use crate::models::{BiomarkerKind, PredictionResult};
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for pipeline and training latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalysisMetricsInner> = OnceLock::new();

struct AnalysisMetricsInner {
    analysis_runs: IntCounter,
    analysis_failures: IntCounterVec,
    analysis_latency_seconds: Histogram,
    training_latency_seconds: HistogramVec,
    models_retrained: IntCounterVec,
    models_reused: IntCounterVec,
    insufficient_data: IntCounterVec,
    last_success_timestamp: IntGauge,
}

impl AnalysisMetricsInner {
    fn new() -> Self {
        Self {
            analysis_runs: register_int_counter!(
                "biomarker_analysis_runs_total",
                "Total number of completed analysis runs"
            )
            .expect("Failed to register analysis_runs"),

            analysis_failures: register_int_counter_vec!(
                "biomarker_analysis_failures_total",
                "Total number of failed analysis runs by error kind",
                &["error_kind"]
            )
            .expect("Failed to register analysis_failures"),

            analysis_latency_seconds: register_histogram!(
                "biomarker_analysis_latency_seconds",
                "Wall time of one full pipeline run",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            training_latency_seconds: register_histogram_vec!(
                "biomarker_training_latency_seconds",
                "Time spent fitting a biomarker model",
                &["biomarker"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),

            models_retrained: register_int_counter_vec!(
                "biomarker_models_retrained_total",
                "Number of times a biomarker model was fitted",
                &["biomarker"]
            )
            .expect("Failed to register models_retrained"),

            models_reused: register_int_counter_vec!(
                "biomarker_models_reused_total",
                "Number of estimates served from a stored model",
                &["biomarker"]
            )
            .expect("Failed to register models_reused"),

            insufficient_data: register_int_counter_vec!(
                "biomarker_insufficient_data_total",
                "Number of estimates skipped for lack of samples",
                &["biomarker"]
            )
            .expect("Failed to register insufficient_data"),

            last_success_timestamp: register_int_gauge!(
                "biomarker_analysis_last_success_timestamp_seconds",
                "Unix time of the last successful analysis run"
            )
            .expect("Failed to register last_success_timestamp"),
        }
    }
}

/// Handle to the process-wide analysis metrics. Clones share the same
/// registered collectors.
#[derive(Clone)]
pub struct AnalysisMetrics {
    _private: (),
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalysisMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalysisMetricsInner {
        GLOBAL_METRICS.get_or_init(AnalysisMetricsInner::new)
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_latency(&self, kind: BiomarkerKind, duration_secs: f64) {
        self.inner()
            .training_latency_seconds
            .with_label_values(&[kind.key()])
            .observe(duration_secs);
    }

    pub fn inc_analysis_runs(&self) {
        self.inner().analysis_runs.inc();
        self.inner()
            .last_success_timestamp
            .set(chrono::Utc::now().timestamp());
    }

    pub fn inc_analysis_failures(&self, error_kind: &str) {
        self.inner()
            .analysis_failures
            .with_label_values(&[error_kind])
            .inc();
    }

    pub fn inc_model_retrained(&self, kind: BiomarkerKind) {
        self.inner()
            .models_retrained
            .with_label_values(&[kind.key()])
            .inc();
    }

    pub fn inc_model_reused(&self, kind: BiomarkerKind) {
        self.inner().models_reused.with_label_values(&[kind.key()]).inc();
    }

    pub fn inc_insufficient_data(&self, kind: BiomarkerKind) {
        self.inner()
            .insufficient_data
            .with_label_values(&[kind.key()])
            .inc();
    }

    pub fn analysis_runs(&self) -> u64 {
        self.inner().analysis_runs.get()
    }

    pub fn models_retrained(&self, kind: BiomarkerKind) -> u64 {
        self.inner()
            .models_retrained
            .with_label_values(&[kind.key()])
            .get()
    }
}

/// Structured logger for analysis events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("local")
    }
}

impl StructuredLogger {
    pub fn new(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a completed pipeline run
    pub fn log_analysis(&self, result: &PredictionResult, duration_ms: u64) {
        info!(
            event = "analysis_completed",
            instance = %self.instance,
            estrogen = %result.estrogen_level,
            cortisol = %result.cortisol_level,
            immunity = %result.immunity_score,
            timestamp = %result.timestamp_string(),
            duration_ms = duration_ms,
            "Biomarker analysis completed"
        );
    }

    pub fn log_analysis_failed(&self, err: &AnalysisError) {
        error!(
            event = "analysis_failed",
            instance = %self.instance,
            error_kind = err.kind_label(),
            error = %err,
            "Biomarker analysis failed"
        );
    }

    pub fn log_model_retrained(
        &self,
        kind: BiomarkerKind,
        samples: usize,
        support_vectors: usize,
        duration_ms: u64,
    ) {
        info!(
            event = "model_retrained",
            instance = %self.instance,
            biomarker = %kind,
            samples = samples,
            support_vectors = support_vectors,
            duration_ms = duration_ms,
            "Biomarker model fitted"
        );
    }

    pub fn log_model_reused(&self, kind: BiomarkerKind, trained_on: u64, samples: usize) {
        info!(
            event = "model_reused",
            instance = %self.instance,
            biomarker = %kind,
            trained_on = trained_on,
            samples = samples,
            "Reusing stored biomarker model"
        );
    }

    pub fn log_insufficient_data(&self, kind: BiomarkerKind, available: usize, required: usize) {
        warn!(
            event = "insufficient_data",
            instance = %self.instance,
            biomarker = %kind,
            available = available,
            required_more_than = required,
            "Not enough samples to estimate biomarker"
        );
    }

    pub fn log_startup(&self, version: &str, model_dir: &str) {
        info!(
            event = "analyzer_started",
            instance = %self.instance,
            analyzer_version = %version,
            model_dir = %model_dir,
            "Biomarker analyzer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "analyzer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Biomarker analyzer shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_metrics_observable() {
        let metrics = AnalysisMetrics::new();
        let before = metrics.models_retrained(BiomarkerKind::Cortisol);

        metrics.observe_analysis_latency(0.02);
        metrics.observe_training_latency(BiomarkerKind::Cortisol, 0.01);
        metrics.inc_model_retrained(BiomarkerKind::Cortisol);
        metrics.inc_model_reused(BiomarkerKind::Estrogen);
        metrics.inc_insufficient_data(BiomarkerKind::Immunity);
        metrics.inc_analysis_failures("invalid_input");

        assert!(metrics.models_retrained(BiomarkerKind::Cortisol) > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.instance(), "test-host");
        assert_eq!(StructuredLogger::default().instance(), "local");
    }
}
