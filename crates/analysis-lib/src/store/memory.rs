//! In-process model store for tests and one-shot runs

use super::lock::{KeyGuard, KeyLocks};
use super::{ModelArtifact, ModelStore};
use crate::error::Result;
use crate::models::{now_seconds, BiomarkerKind, TrainingLedgerEntry};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct State {
    artifacts: HashMap<BiomarkerKind, ModelArtifact>,
    ledger: HashMap<BiomarkerKind, TrainingLedgerEntry>,
}

/// Model store held entirely in memory
#[derive(Default)]
pub struct MemoryModelStore {
    state: RwLock<State>,
    locks: KeyLocks,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, kind: BiomarkerKind) -> bool {
        self.locks.is_held(kind)
    }
}

impl ModelStore for MemoryModelStore {
    fn load(&self, kind: BiomarkerKind) -> Result<Option<ModelArtifact>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.artifacts.get(&kind).cloned())
    }

    fn save(&self, kind: BiomarkerKind, artifact: &ModelArtifact) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.artifacts.insert(kind, artifact.clone());
        state.ledger.insert(
            kind,
            TrainingLedgerEntry {
                model_key: kind,
                data_count: artifact.trained_on_count,
                last_trained: now_seconds(),
            },
        );
        Ok(())
    }

    fn ledger_entry(&self, kind: BiomarkerKind) -> Option<TrainingLedgerEntry> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.ledger.get(&kind).cloned()
    }

    fn lock(&self, kind: BiomarkerKind) -> Result<KeyGuard> {
        Ok(self.locks.acquire(kind))
    }
}
