//! Model artifact and training ledger persistence
//!
//! A store keeps one artifact per biomarker plus a ledger recording how many
//! samples each artifact was trained on. Writers for the same biomarker are
//! serialized through [`ModelStore::lock`].

mod file;
mod lock;
mod memory;
mod policy;

pub use file::{FileModelStore, LEDGER_FILE};
pub use lock::{FileLock, KeyGuard, KeyLocks};
pub use memory::MemoryModelStore;
pub use policy::{RetrainPolicy, DEFAULT_RETRAIN_THRESHOLD};

pub(crate) use file::write_atomic;

use crate::error::Result;
use crate::models::{timefmt, BiomarkerKind, TrainingLedgerEntry};
use crate::predictor::{StandardScaler, SvrModel, FEATURE_SCHEMA_VERSION};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Everything needed to reproduce an estimate: the fitted regressor, the
/// scaler fitted on the same matrix, and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub regressor: SvrModel,
    pub scaler: StandardScaler,
    pub trained_on_count: u64,
    #[serde(with = "timefmt")]
    pub trained_at: NaiveDateTime,
    pub feature_schema_version: u32,
}

impl ModelArtifact {
    /// Whether this artifact can score rows of `n_columns` built with the
    /// current feature schema
    pub fn is_compatible(&self, n_columns: usize) -> bool {
        self.feature_schema_version == FEATURE_SCHEMA_VERSION
            && self.scaler.n_features() == n_columns
            && self.regressor.n_features() == n_columns
    }
}

/// Trait for model persistence backends
pub trait ModelStore: Send + Sync {
    /// Load the artifact for `kind`, `None` if none has been saved
    fn load(&self, kind: BiomarkerKind) -> Result<Option<ModelArtifact>>;

    /// Write the artifact and record `trained_on_count` with the current
    /// time in the ledger
    fn save(&self, kind: BiomarkerKind, artifact: &ModelArtifact) -> Result<()>;

    /// Ledger entry for `kind`. Unreadable ledgers read as empty.
    fn ledger_entry(&self, kind: BiomarkerKind) -> Option<TrainingLedgerEntry>;

    /// All ledger entries in chain order
    fn ledger(&self) -> Vec<TrainingLedgerEntry> {
        BiomarkerKind::CHAIN
            .iter()
            .filter_map(|kind| self.ledger_entry(*kind))
            .collect()
    }

    /// Sample count the current artifact was trained on, 0 if never trained
    fn ledger_count(&self, kind: BiomarkerKind) -> u64 {
        self.ledger_entry(kind).map(|e| e.data_count).unwrap_or(0)
    }

    /// Block until this caller owns the key
    fn lock(&self, kind: BiomarkerKind) -> Result<KeyGuard>;
}
