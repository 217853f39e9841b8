//! Biomarker analysis library
//!
//! This crate provides the core functionality for:
//! - Feature engineering from wearable health profiles
//! - Per-biomarker model lifecycle (train-or-reuse) and chained estimation
//! - Model artifact and training ledger persistence
//! - Periodic analysis scheduling, health and observability

pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod results;
pub mod scheduler;
pub mod store;

pub use error::{AnalysisError, Result};
pub use health::{AnalyzerHealth, ComponentStatus, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{AnalysisMetrics, StructuredLogger};
pub use pipeline::{AnalysisInput, InferencePipeline, PipelineConfig, PipelineStage};
pub use results::{FileResultStore, MemoryResultStore, ResultStore};
pub use scheduler::{AnalysisOutcome, AnalysisScheduler, SchedulerConfig};
pub use store::{FileModelStore, MemoryModelStore, ModelArtifact, ModelStore, RetrainPolicy};
