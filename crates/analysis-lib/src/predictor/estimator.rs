//! Per-biomarker train-or-reuse estimation
//!
//! Each biomarker owns a hyperparameter set and a minimum sample count. The
//! estimator decides, under the biomarker's store lock, whether the stored
//! artifact can be reused or a fresh one must be fitted. Fresh artifacts are
//! handed back with the estimate and only written once the whole chain has
//! succeeded.

use super::features::FEATURE_SCHEMA_VERSION;
use super::scaler::StandardScaler;
use super::svr::{Gamma, KernelKind, SvrModel, SvrParams};
use crate::error::{AnalysisError, Result};
use crate::models::{now_seconds, BiomarkerKind, BiomarkerReading};
use crate::observability::{AnalysisMetrics, StructuredLogger};
use crate::store::{KeyGuard, ModelArtifact, ModelStore, RetrainPolicy};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Hyperparameters and sample floor for one biomarker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorSpec {
    pub kind: BiomarkerKind,
    /// An estimate needs strictly more samples than this
    pub min_samples: usize,
    pub params: SvrParams,
}

impl EstimatorSpec {
    pub fn for_kind(kind: BiomarkerKind) -> Self {
        match kind {
            BiomarkerKind::Estrogen => Self {
                kind,
                min_samples: 5,
                params: SvrParams::new(KernelKind::Linear, 10.0, 0.1),
            },
            BiomarkerKind::Cortisol => Self {
                kind,
                min_samples: 1,
                params: SvrParams::new(KernelKind::Rbf(Gamma::Auto), 100.0, 0.1),
            },
            BiomarkerKind::Immunity => Self {
                kind,
                min_samples: 1,
                params: SvrParams::new(KernelKind::Rbf(Gamma::Auto), 100.0, 0.1),
            },
        }
    }

    pub fn has_enough(&self, samples: usize) -> bool {
        samples > self.min_samples
    }

    pub fn require_samples(&self, samples: usize) -> Result<()> {
        if self.has_enough(samples) {
            Ok(())
        } else {
            Err(AnalysisError::InsufficientData {
                kind: self.kind,
                available: samples,
                required: self.min_samples,
            })
        }
    }
}

/// Design matrix and target for one biomarker. The last row is the one
/// the estimate is produced for.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl TrainingSet {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(AnalysisError::invalid(format!(
                "training matrix has {} rows but target has {} values",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid("training data contains non-finite values"));
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn n_columns(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    fn last_row(&self) -> Option<ArrayView1<'_, f64>> {
        self.len().checked_sub(1).map(|i| self.x.row(i))
    }
}

/// Round to one decimal, halves to even
pub fn round_reading(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Outcome of one biomarker stage.
///
/// Holds the biomarker's store lock while alive, so a run keeps exclusive
/// ownership of the key from the retrain decision until its artifact is
/// written.
#[derive(Debug)]
pub struct Estimate {
    pub kind: BiomarkerKind,
    /// Unrounded model output, `None` when the stage had too few samples
    pub prediction: Option<f64>,
    pub retrained: bool,
    pending: Option<ModelArtifact>,
    _guard: Option<KeyGuard>,
}

impl Estimate {
    pub fn insufficient(kind: BiomarkerKind) -> Self {
        Self {
            kind,
            prediction: None,
            retrained: false,
            pending: None,
            _guard: None,
        }
    }

    pub fn reading(&self) -> BiomarkerReading {
        match self.prediction {
            Some(v) => BiomarkerReading::Value(round_reading(v)),
            None => BiomarkerReading::InsufficientData,
        }
    }

    /// Value fed to the next stage of the chain
    pub fn chained_value(&self) -> f64 {
        self.prediction.unwrap_or(0.0)
    }

    pub fn pending_artifact(&self) -> Option<&ModelArtifact> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<ModelArtifact> {
        self.pending.take()
    }
}

/// Trains or reuses per-biomarker regressors against a model store
pub struct BiomarkerEstimator {
    store: Arc<dyn ModelStore>,
    policy: RetrainPolicy,
    metrics: AnalysisMetrics,
    logger: StructuredLogger,
}

impl BiomarkerEstimator {
    pub fn new(store: Arc<dyn ModelStore>, policy: RetrainPolicy) -> Self {
        Self {
            store,
            policy,
            metrics: AnalysisMetrics::new(),
            logger: StructuredLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn policy(&self) -> &RetrainPolicy {
        &self.policy
    }

    /// Estimate `kind` for the last row of `training`.
    ///
    /// Returns an insufficient estimate when the sample floor is not met.
    /// Otherwise the store lock for `kind` is taken and carried by the
    /// returned estimate.
    pub fn estimate(&self, kind: BiomarkerKind, training: &TrainingSet) -> Result<Estimate> {
        let spec = EstimatorSpec::for_kind(kind);
        let samples = training.len();
        match spec.require_samples(samples) {
            Ok(()) => {}
            Err(AnalysisError::InsufficientData {
                available,
                required,
                ..
            }) => {
                self.metrics.inc_insufficient_data(kind);
                self.logger.log_insufficient_data(kind, available, required);
                return Ok(Estimate::insufficient(kind));
            }
            Err(e) => return Err(e),
        }
        let last_row = training
            .last_row()
            .ok_or_else(|| AnalysisError::invalid(format!("no rows to estimate {kind} from")))?;

        let guard = self.store.lock(kind)?;

        let reusable = if self.policy.should_retrain(self.store.as_ref(), kind, samples) {
            None
        } else {
            match self.store.load(kind)? {
                Some(artifact) if artifact.is_compatible(training.n_columns()) => Some(artifact),
                Some(artifact) => {
                    warn!(
                        biomarker = %kind,
                        schema_version = artifact.feature_schema_version,
                        columns = training.n_columns(),
                        "Stored model does not match current feature layout, retraining"
                    );
                    None
                }
                None => {
                    debug!(biomarker = %kind, "Ledger entry without stored model, retraining");
                    None
                }
            }
        };

        let (artifact, retrained) = match reusable {
            Some(artifact) => {
                self.metrics.inc_model_reused(kind);
                self.logger
                    .log_model_reused(kind, artifact.trained_on_count, samples);
                (artifact, false)
            }
            None => (self.train(&spec, training)?, true),
        };

        let scaled = artifact.scaler.transform_row(last_row)?;
        let raw = artifact.regressor.predict_row(scaled.view())?;
        if !raw.is_finite() {
            return Err(AnalysisError::Training {
                kind,
                message: format!("model produced a non-finite estimate ({raw})"),
            });
        }

        debug!(biomarker = %kind, estimate = raw, retrained, "Biomarker estimated");

        Ok(Estimate {
            kind,
            prediction: Some(raw),
            retrained,
            pending: retrained.then_some(artifact),
            _guard: Some(guard),
        })
    }

    fn train(&self, spec: &EstimatorSpec, training: &TrainingSet) -> Result<ModelArtifact> {
        let kind = spec.kind;
        let start = Instant::now();

        let scaler = StandardScaler::fit(training.x())?;
        let scaled = scaler.transform(training.x())?;
        let regressor = SvrModel::fit(scaled.view(), training.y(), &spec.params).map_err(|e| {
            AnalysisError::Training {
                kind,
                message: e.to_string(),
            }
        })?;

        let elapsed = start.elapsed();
        self.metrics
            .observe_training_latency(kind, elapsed.as_secs_f64());
        self.metrics.inc_model_retrained(kind);
        self.logger.log_model_retrained(
            kind,
            training.len(),
            regressor.n_support(),
            elapsed.as_millis() as u64,
        );

        Ok(ModelArtifact {
            regressor,
            scaler,
            trained_on_count: training.len() as u64,
            trained_at: now_seconds(),
            feature_schema_version: FEATURE_SCHEMA_VERSION,
        })
    }
}
