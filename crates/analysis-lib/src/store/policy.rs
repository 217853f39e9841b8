//! Retrain decision

use super::ModelStore;
use crate::models::BiomarkerKind;
use tracing::debug;

/// New samples required before a stored model is replaced
pub const DEFAULT_RETRAIN_THRESHOLD: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrainPolicy {
    pub threshold: u64,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_RETRAIN_THRESHOLD,
        }
    }
}

impl RetrainPolicy {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Retrain when the key was never trained, or when at least `threshold`
    /// samples arrived since the last training. A shrinking series keeps
    /// the stored model.
    pub fn should_retrain(&self, store: &dyn ModelStore, kind: BiomarkerKind, samples: usize) -> bool {
        let Some(entry) = store.ledger_entry(kind) else {
            debug!(biomarker = %kind, "No training ledger entry");
            return true;
        };
        let current = samples as u64;
        let retrain = current
            .checked_sub(entry.data_count)
            .map(|delta| delta >= self.threshold)
            .unwrap_or(false);
        debug!(
            biomarker = %kind,
            samples = current,
            last_trained_on = entry.data_count,
            threshold = self.threshold,
            retrain,
            "Retrain decision"
        );
        retrain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_seconds;
    use crate::store::{KeyGuard, ModelArtifact};
    use crate::{Result, TrainingLedgerEntry};

    struct LedgerOnly(Option<u64>);

    impl ModelStore for LedgerOnly {
        fn load(&self, _kind: BiomarkerKind) -> Result<Option<ModelArtifact>> {
            Ok(None)
        }

        fn save(&self, _kind: BiomarkerKind, _artifact: &ModelArtifact) -> Result<()> {
            Ok(())
        }

        fn ledger_entry(&self, kind: BiomarkerKind) -> Option<TrainingLedgerEntry> {
            self.0.map(|data_count| TrainingLedgerEntry {
                model_key: kind,
                data_count,
                last_trained: now_seconds(),
            })
        }

        fn lock(&self, _kind: BiomarkerKind) -> Result<KeyGuard> {
            unreachable!("policy never locks")
        }
    }

    #[test]
    fn test_never_trained_retrains() {
        let policy = RetrainPolicy::default();
        assert!(policy.should_retrain(&LedgerOnly(None), BiomarkerKind::Estrogen, 0));
        assert!(policy.should_retrain(&LedgerOnly(None), BiomarkerKind::Estrogen, 10));
    }

    #[test]
    fn test_threshold_boundary() {
        let policy = RetrainPolicy::default();
        let store = LedgerOnly(Some(10));
        assert!(!policy.should_retrain(&store, BiomarkerKind::Cortisol, 10));
        assert!(!policy.should_retrain(&store, BiomarkerKind::Cortisol, 59));
        assert!(policy.should_retrain(&store, BiomarkerKind::Cortisol, 60));
    }

    #[test]
    fn test_shrinking_series_keeps_model() {
        let policy = RetrainPolicy::new(1);
        assert!(!policy.should_retrain(&LedgerOnly(Some(100)), BiomarkerKind::Immunity, 3));
    }
}
