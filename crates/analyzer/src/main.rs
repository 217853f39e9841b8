//! Biomarker Analyzer - periodic biomarker estimation service
//!
//! Watches the combined data document uploaded by the mobile client, runs
//! the estrogen → cortisol → immunity pipeline when it changes, and serves
//! health and metrics endpoints.

use analysis_lib::{
    AnalysisMetrics, AnalysisOutcome, AnalysisScheduler, AnalyzerHealth, FileModelStore,
    FileResultStore, InferencePipeline, PipelineConfig, SchedulerConfig, StructuredLogger,
};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting biomarker-analyzer");

    let config = config::AnalyzerConfig::load()?;
    info!(
        data_file = %config.data_file.display(),
        model_dir = %config.model_dir.display(),
        interval_secs = config.analysis_interval_secs,
        "Analyzer configured"
    );

    let metrics = AnalysisMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(ANALYZER_VERSION, &config.model_dir.display().to_string());

    let store = FileModelStore::open(&config.model_dir)
        .with_context(|| format!("Failed to open model store {:?}", config.model_dir))?;
    let pipeline = InferencePipeline::new(
        Arc::new(store),
        PipelineConfig {
            retrain_threshold: config.retrain_threshold,
            smoothing_alpha: config.smoothing_alpha,
        },
    )
    .context("Invalid pipeline configuration")?
    .with_result_store(Arc::new(FileResultStore::new(&config.results_file)))
    .with_logger(logger.clone());

    let health = AnalyzerHealth::new();
    let (scheduler, mut outcomes) = AnalysisScheduler::new(
        Arc::new(pipeline),
        SchedulerConfig {
            data_file: config.data_file.clone(),
            interval: config.analysis_interval().unwrap_or_default(),
        },
    );

    // One-shot mode: analyse once and report through the exit status
    if config.analysis_interval().is_none() {
        let outcome = scheduler.run_once().await;
        record_outcome(&health, &outcome).await;
        logger.log_shutdown("single run complete");
        if let Some(error) = outcome.error {
            bail!("Analysis failed: {error}");
        }
        return Ok(());
    }

    let app_state = Arc::new(api::AppState::new(health.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(Arc::new(scheduler).run(shutdown_rx));

    loop {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => record_outcome(&health, &outcome).await,
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                logger.log_shutdown("SIGINT received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

async fn record_outcome(health: &AnalyzerHealth, outcome: &AnalysisOutcome) {
    if let Some(result) = &outcome.result {
        health.record_success(result).await;
    } else if let Some(error) = &outcome.error {
        warn!(error = %error, duration_us = outcome.duration_us, "Scheduled analysis failed");
        health.record_failure(error.clone()).await;
    }
}
