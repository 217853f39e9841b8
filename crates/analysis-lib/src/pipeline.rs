//! Chained biomarker inference pipeline
//!
//! One run walks `BuildFeatures → EstimateEstrogen → EstimateCortisol →
//! EstimateImmunity → Persist → Done`. Each estimation stage feeds its
//! unrounded prediction to the next one as a constant column. Nothing is
//! written unless every stage before Persist succeeded.

use crate::error::{AnalysisError, Result};
use crate::models::{
    now_seconds, BiomarkerKind, BiomarkerSample, FeatureVector, HealthProfile, MenstrualPhase,
    PredictionResult,
};
use crate::observability::{AnalysisMetrics, StructuredLogger};
use crate::predictor::{
    BiomarkerEstimator, Estimate, FeatureBuilder, SeriesSmoother, TrainingSet,
    DEFAULT_SMOOTHING_ALPHA,
};
use crate::results::ResultStore;
use crate::store::{ModelStore, RetrainPolicy, DEFAULT_RETRAIN_THRESHOLD};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span};

/// Pipeline tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub retrain_threshold: u64,
    pub smoothing_alpha: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

/// Everything one run consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub profile: HealthProfile,
    pub estrogen: Vec<BiomarkerSample>,
    pub cortisol: Vec<BiomarkerSample>,
    pub immunity: Vec<BiomarkerSample>,
    pub phase: Option<MenstrualPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    BuildFeatures,
    EstimateEstrogen,
    EstimateCortisol,
    EstimateImmunity,
    Persist,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildFeatures => "build_features",
            Self::EstimateEstrogen => "estimate_estrogen",
            Self::EstimateCortisol => "estimate_cortisol",
            Self::EstimateImmunity => "estimate_immunity",
            Self::Persist => "persist",
            Self::Done => "done",
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::BuildFeatures => Some(Self::EstimateEstrogen),
            Self::EstimateEstrogen => Some(Self::EstimateCortisol),
            Self::EstimateCortisol => Some(Self::EstimateImmunity),
            Self::EstimateImmunity => Some(Self::Persist),
            Self::Persist => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, ordered series ready for matrix construction
#[derive(Debug)]
struct PreparedInput {
    features: FeatureVector,
    estrogen: Vec<f64>,
    cortisol: Vec<f64>,
    immunity: Vec<f64>,
}

/// A non-target, non-feature column of a training matrix
enum Column<'a> {
    /// Series aligned to the most recent rows, 0 where it has no sample
    Aligned(&'a [f64]),
    /// Upstream prediction repeated on every row
    Constant(f64),
}

/// Runs the estrogen → cortisol → immunity chain
pub struct InferencePipeline {
    estimator: BiomarkerEstimator,
    store: Arc<dyn ModelStore>,
    results: Option<Arc<dyn ResultStore>>,
    smoother: SeriesSmoother,
    metrics: AnalysisMetrics,
    logger: StructuredLogger,
}

impl InferencePipeline {
    pub fn new(store: Arc<dyn ModelStore>, config: PipelineConfig) -> Result<Self> {
        let smoother = SeriesSmoother::new(config.smoothing_alpha)?;
        let estimator =
            BiomarkerEstimator::new(store.clone(), RetrainPolicy::new(config.retrain_threshold));
        Ok(Self {
            estimator,
            store,
            results: None,
            smoother,
            metrics: AnalysisMetrics::new(),
            logger: StructuredLogger::default(),
        })
    }

    /// Record every successful run in `results`
    pub fn with_result_store(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.estimator = self.estimator.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    pub fn result_store(&self) -> Option<&Arc<dyn ResultStore>> {
        self.results.as_ref()
    }

    /// Convenience entry point taking the parts of an [`AnalysisInput`]
    pub fn run_with(
        &self,
        profile: &HealthProfile,
        estrogen: &[BiomarkerSample],
        cortisol: &[BiomarkerSample],
        immunity: &[BiomarkerSample],
        phase: Option<MenstrualPhase>,
    ) -> Result<PredictionResult> {
        self.run(&AnalysisInput {
            profile: profile.clone(),
            estrogen: estrogen.to_vec(),
            cortisol: cortisol.to_vec(),
            immunity: immunity.to_vec(),
            phase,
        })
    }

    /// Execute one full run
    pub fn run(&self, input: &AnalysisInput) -> Result<PredictionResult> {
        let start = Instant::now();
        match self.execute(input) {
            Ok(result) => {
                let elapsed = start.elapsed();
                self.metrics.observe_analysis_latency(elapsed.as_secs_f64());
                self.metrics.inc_analysis_runs();
                self.logger.log_analysis(&result, elapsed.as_millis() as u64);
                Ok(result)
            }
            Err(e) => {
                self.metrics.inc_analysis_failures(e.kind_label());
                self.logger.log_analysis_failed(&e);
                Err(e)
            }
        }
    }

    fn execute(&self, input: &AnalysisInput) -> Result<PredictionResult> {
        let prepared = {
            let _span = stage_span(PipelineStage::BuildFeatures);
            self.prepare(input)?
        };

        let estrogen = {
            let _span = stage_span(PipelineStage::EstimateEstrogen);
            let training = training_set(
                &prepared.estrogen,
                &[Column::Aligned(&prepared.immunity)],
                &prepared.features,
            )?;
            self.estimator.estimate(BiomarkerKind::Estrogen, &training)?
        };

        let cortisol = {
            let _span = stage_span(PipelineStage::EstimateCortisol);
            let training = training_set(
                &prepared.cortisol,
                &[
                    Column::Aligned(&prepared.immunity),
                    Column::Constant(estrogen.chained_value()),
                ],
                &prepared.features,
            )?;
            self.estimator.estimate(BiomarkerKind::Cortisol, &training)?
        };

        let immunity = {
            let _span = stage_span(PipelineStage::EstimateImmunity);
            let training = training_set(
                &prepared.immunity,
                &[Column::Constant(cortisol.chained_value())],
                &prepared.features,
            )?;
            self.estimator.estimate(BiomarkerKind::Immunity, &training)?
        };

        let result = PredictionResult {
            estrogen_level: estrogen.reading(),
            cortisol_level: cortisol.reading(),
            immunity_score: immunity.reading(),
            timestamp: now_seconds(),
        };

        {
            let _span = stage_span(PipelineStage::Persist);
            self.persist([estrogen, cortisol, immunity], &result)?;
        }

        debug!(stage = %PipelineStage::Done, timestamp = %result.timestamp_string(), "Pipeline finished");
        Ok(result)
    }

    fn prepare(&self, input: &AnalysisInput) -> Result<PreparedInput> {
        input.profile.validate()?;
        let features = FeatureBuilder::build(&input.profile);

        let mut estrogen = ordered_values(BiomarkerKind::Estrogen, &input.estrogen)?;
        let cortisol = ordered_values(BiomarkerKind::Cortisol, &input.cortisol)?;
        let immunity = ordered_values(BiomarkerKind::Immunity, &input.immunity)?;

        if !estrogen.is_empty() {
            let multiplier = input.phase.unwrap_or_default().estrogen_multiplier();
            estrogen = self
                .smoother
                .smooth(&estrogen)?
                .into_iter()
                .map(|v| v * multiplier)
                .collect();
        }

        Ok(PreparedInput {
            features,
            estrogen,
            cortisol,
            immunity,
        })
    }

    /// Write pending artifacts in chain order, then the result. Dropping
    /// the estimates afterwards releases their store locks.
    fn persist(&self, mut estimates: [Estimate; 3], result: &PredictionResult) -> Result<()> {
        for estimate in estimates.iter_mut() {
            if let Some(artifact) = estimate.take_pending() {
                self.store.save(estimate.kind, &artifact)?;
            }
        }
        if let Some(results) = &self.results {
            results.record(result)?;
        }
        Ok(())
    }
}

fn stage_span(stage: PipelineStage) -> tracing::span::EnteredSpan {
    info_span!("pipeline_stage", stage = %stage).entered()
}

/// Validate sample values and return them in chronological order
fn ordered_values(kind: BiomarkerKind, samples: &[BiomarkerSample]) -> Result<Vec<f64>> {
    if let Some((i, sample)) = samples.iter().enumerate().find(|(_, s)| !s.value.is_finite()) {
        return Err(AnalysisError::invalid(format!(
            "{kind} sample {i} is not a finite number ({})",
            sample.value
        )));
    }

    if samples.iter().all(|s| s.observed_at.is_some()) {
        let mut ordered: Vec<&BiomarkerSample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.observed_at);
        Ok(ordered.into_iter().map(|s| s.value).collect())
    } else {
        Ok(samples.iter().map(|s| s.value).collect())
    }
}

/// Build `[target, columns…, features…]` rows, one per target sample
fn training_set(target: &[f64], columns: &[Column<'_>], features: &FeatureVector) -> Result<TrainingSet> {
    let rows = target.len();
    let width = 1 + columns.len() + features.as_slice().len();
    let mut x = Array2::<f64>::zeros((rows, width));

    for (i, mut row) in x.rows_mut().into_iter().enumerate() {
        row[0] = target[i];
        for (j, column) in columns.iter().enumerate() {
            row[1 + j] = match column {
                Column::Aligned(series) => (i + series.len())
                    .checked_sub(rows)
                    .map(|idx| series[idx])
                    .unwrap_or(0.0),
                Column::Constant(value) => *value,
            };
        }
        for (j, feature) in features.as_slice().iter().enumerate() {
            row[1 + columns.len() + j] = *feature;
        }
    }

    TrainingSet::new(x, Array1::from(target.to_vec()))
}
