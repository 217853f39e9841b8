//! Periodic analysis loop
//!
//! Re-analyses the combined data document on a fixed interval, skipping
//! ticks where the document has not changed since the last successful run.

use crate::ingest::load_combined;
use crate::models::PredictionResult;
use crate::pipeline::InferencePipeline;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default analysis interval (5 minutes)
pub const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Combined data document to analyse
    pub data_file: PathBuf,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("combined_data.json"),
            interval: DEFAULT_ANALYSIS_INTERVAL,
        }
    }
}

/// Outcome of one scheduled attempt
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: Option<PredictionResult>,
    pub error: Option<String>,
    pub skipped_reason: Option<String>,
    pub duration_us: u64,
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }
}

/// Runs the pipeline against the data file on every tick
pub struct AnalysisScheduler {
    pipeline: Arc<InferencePipeline>,
    config: SchedulerConfig,
    // Modification time of the data file at the last successful run
    last_analyzed: RwLock<Option<SystemTime>>,
    outcome_tx: mpsc::Sender<AnalysisOutcome>,
}

impl AnalysisScheduler {
    pub fn new(
        pipeline: Arc<InferencePipeline>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::Receiver<AnalysisOutcome>) {
        let (tx, rx) = mpsc::channel(100);
        let scheduler = Self {
            pipeline,
            config,
            last_analyzed: RwLock::new(None),
            outcome_tx: tx,
        };
        (scheduler, rx)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the analysis loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            data_file = %self.config.data_file.display(),
            "Starting analysis scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down analysis scheduler");
                    break;
                }
            }
        }
    }

    /// Analyse the data file now, unless it is unchanged since the last
    /// successful run. The outcome is also sent on the outcome channel.
    pub async fn run_once(&self) -> AnalysisOutcome {
        let start = Instant::now();
        let path = self.config.data_file.clone();

        let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(data_file = %path.display(), error = %e, "Data file unavailable");
                return self.finish(AnalysisOutcome {
                    result: None,
                    error: Some(format!("data file {} unavailable: {e}", path.display())),
                    skipped_reason: None,
                    duration_us: start.elapsed().as_micros() as u64,
                });
            }
        };

        if *self.last_analyzed.read().await == Some(modified) {
            debug!(data_file = %path.display(), "Data unchanged, skipping analysis");
            return self.finish(AnalysisOutcome {
                result: None,
                error: None,
                skipped_reason: Some("Data unchanged since last analysis".to_string()),
                duration_us: start.elapsed().as_micros() as u64,
            });
        }

        let pipeline = self.pipeline.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let input = load_combined(&path)?;
            pipeline.run(&input)
        })
        .await;

        let (result, error) = match joined {
            Ok(Ok(result)) => {
                *self.last_analyzed.write().await = Some(modified);
                (Some(result), None)
            }
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(e) => (None, Some(format!("analysis task failed: {e}"))),
        };

        self.finish(AnalysisOutcome {
            result,
            error,
            skipped_reason: None,
            duration_us: start.elapsed().as_micros() as u64,
        })
    }

    /// Report `outcome` without waiting on the consumer
    fn finish(&self, outcome: AnalysisOutcome) -> AnalysisOutcome {
        match self.outcome_tx.try_send(outcome.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outcome channel full, dropping analysis outcome");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outcome receiver gone");
            }
        }
        outcome
    }
}
