//! Biomarker estimation engine

mod estimator;
mod features;
mod scaler;
mod smoothing;
mod svr;

pub use estimator::{round_reading, BiomarkerEstimator, EstimatorSpec, Estimate, TrainingSet};
pub use features::{FeatureBuilder, FEATURE_SCHEMA_VERSION, FEATURE_WEIGHTS};
pub use scaler::StandardScaler;
pub use smoothing::{SeriesSmoother, DEFAULT_SMOOTHING_ALPHA};
pub use svr::{Gamma, Kernel, KernelKind, SvrModel, SvrParams, DEFAULT_MAX_ITER, DEFAULT_TOLERANCE};
