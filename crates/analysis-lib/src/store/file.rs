//! Directory-backed model store
//!
//! Layout:
//! - `model_<key>.json`: artifact wrapped with its SHA-256 checksum
//! - `model_last_trained.json`: `{key: {data_count, last_trained}}`
//! - `model_<key>.lock`, `model_last_trained.lock`: advisory lock files
//!
//! Every file is written to a uniquely named temp file, synced and renamed
//! into place, so readers never observe a partial write. Key and ledger
//! exclusion go through lock files so separate handles and processes on the
//! same directory serialize too.

use super::lock::{FileLock, KeyGuard, KeyLocks};
use super::{ModelArtifact, ModelStore};
use crate::error::{AnalysisError, Result};
use crate::models::{now_seconds, timefmt, BiomarkerKind, TrainingLedgerEntry};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Training ledger file name inside the model directory
pub const LEDGER_FILE: &str = "model_last_trained.json";

const LEDGER_LOCK_FILE: &str = "model_last_trained.lock";

#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    sha256: String,
    artifact: ModelArtifact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerRecord {
    data_count: u64,
    #[serde(with = "timefmt")]
    last_trained: NaiveDateTime,
}

type Ledger = BTreeMap<String, LedgerRecord>;

/// Model store rooted at a directory
pub struct FileModelStore {
    dir: PathBuf,
    locks: KeyLocks,
}

impl FileModelStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AnalysisError::storage(&dir, e))?;
        debug!(model_dir = %dir.display(), "Model store opened");
        Ok(Self {
            dir,
            locks: KeyLocks::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, kind: BiomarkerKind) -> PathBuf {
        self.dir.join(format!("model_{}.json", kind.key()))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn key_lock_path(&self, kind: BiomarkerKind) -> PathBuf {
        self.dir.join(format!("model_{}.lock", kind.key()))
    }

    pub fn is_locked(&self, kind: BiomarkerKind) -> bool {
        self.locks.is_held(kind)
    }

    fn read_ledger(&self) -> Result<Ledger> {
        let path = self.ledger_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| AnalysisError::storage(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Ledger::new()),
            Err(e) => Err(AnalysisError::storage(&path, e)),
        }
    }
}

impl ModelStore for FileModelStore {
    fn load(&self, kind: BiomarkerKind) -> Result<Option<ModelArtifact>> {
        let path = self.artifact_path(kind);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AnalysisError::storage(&path, e)),
        };

        let envelope: ArtifactEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| AnalysisError::storage(&path, e))?;
        let actual = compute_checksum(&serde_json::to_vec(&envelope.artifact)?);
        if actual != envelope.sha256 {
            return Err(AnalysisError::storage(
                &path,
                format!(
                    "checksum mismatch: expected {}, got {}",
                    envelope.sha256, actual
                ),
            ));
        }

        debug!(biomarker = %kind, path = %path.display(), "Model artifact loaded");
        Ok(Some(envelope.artifact))
    }

    fn save(&self, kind: BiomarkerKind, artifact: &ModelArtifact) -> Result<()> {
        // Held across the artifact write and the ledger read-modify-write
        let _ledger_lock = FileLock::acquire(&self.dir.join(LEDGER_LOCK_FILE))?;

        let payload = serde_json::to_vec(artifact)?;
        let envelope = ArtifactEnvelope {
            sha256: compute_checksum(&payload),
            artifact: artifact.clone(),
        };
        let path = self.artifact_path(kind);
        write_atomic(&path, &serde_json::to_vec_pretty(&envelope)?)?;

        // An unreadable ledger is replaced rather than blocking the save
        let mut ledger = self.read_ledger().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable training ledger");
            Ledger::new()
        });
        ledger.insert(
            kind.key().to_string(),
            LedgerRecord {
                data_count: artifact.trained_on_count,
                last_trained: now_seconds(),
            },
        );
        write_atomic(&self.ledger_path(), &serde_json::to_vec_pretty(&ledger)?)?;

        info!(
            biomarker = %kind,
            path = %path.display(),
            trained_on = artifact.trained_on_count,
            "Model artifact saved"
        );
        Ok(())
    }

    fn ledger_entry(&self, kind: BiomarkerKind) -> Option<TrainingLedgerEntry> {
        let ledger = match self.read_ledger() {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(error = %e, "Training ledger unreadable, treating as empty");
                return None;
            }
        };
        ledger.get(kind.key()).map(|record| TrainingLedgerEntry {
            model_key: kind,
            data_count: record.data_count,
            last_trained: record.last_trained,
        })
    }

    fn lock(&self, kind: BiomarkerKind) -> Result<KeyGuard> {
        let guard = self.locks.acquire(kind);
        let file = FileLock::acquire(&self.key_lock_path(kind))?;
        Ok(guard.holding(file))
    }
}

/// Write `bytes` to `path` through a synced temp file and a rename.
///
/// The temp file gets a unique name in the target directory, so concurrent
/// writers never share one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| AnalysisError::storage(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| AnalysisError::storage(parent, e))?;
    temp.write_all(bytes)
        .map_err(|e| AnalysisError::storage(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| AnalysisError::storage(temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| AnalysisError::storage(path, e.error))?;
    Ok(())
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{KernelKind, StandardScaler, SvrModel, SvrParams, FEATURE_SCHEMA_VERSION};
    use ndarray::array;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn artifact(count: u64) -> ModelArtifact {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 3.0, 5.0];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();
        let regressor =
            SvrModel::fit(scaled.view(), y.view(), &SvrParams::new(KernelKind::Linear, 10.0, 0.1))
                .unwrap();
        ModelArtifact {
            regressor,
            scaler,
            trained_on_count: count,
            trained_at: now_seconds(),
            feature_schema_version: FEATURE_SCHEMA_VERSION,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();

        assert!(store.load(BiomarkerKind::Estrogen).unwrap().is_none());
        assert!(store.ledger_entry(BiomarkerKind::Estrogen).is_none());

        let saved = artifact(7);
        store.save(BiomarkerKind::Estrogen, &saved).unwrap();

        assert_eq!(store.load(BiomarkerKind::Estrogen).unwrap(), Some(saved));
        assert!(store.artifact_path(BiomarkerKind::Estrogen).exists());

        let entry = store.ledger_entry(BiomarkerKind::Estrogen).unwrap();
        assert_eq!(entry.data_count, 7);
        assert_eq!(store.ledger_count(BiomarkerKind::Cortisol), 0);
    }

    #[test]
    fn test_ledger_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        store.save(BiomarkerKind::Cortisol, &artifact(3)).unwrap();
        store.save(BiomarkerKind::Immunity, &artifact(4)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.ledger_path()).unwrap()).unwrap();
        assert_eq!(raw["cortisol"]["data_count"], 3);
        assert_eq!(raw["immunity"]["data_count"], 4);
        assert!(raw["cortisol"]["last_trained"].is_string());

        let kinds: Vec<_> = store.ledger().iter().map(|e| e.model_key).collect();
        assert_eq!(kinds, vec![BiomarkerKind::Cortisol, BiomarkerKind::Immunity]);
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        store.save(BiomarkerKind::Estrogen, &artifact(7)).unwrap();

        let path = store.artifact_path(BiomarkerKind::Estrogen);
        let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        raw["artifact"]["trained_on_count"] = serde_json::json!(700);
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        assert!(matches!(
            store.load(BiomarkerKind::Estrogen),
            Err(AnalysisError::Storage { .. })
        ));
    }

    #[test]
    fn test_corrupt_ledger_reads_empty_and_is_replaced() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        fs::write(store.ledger_path(), b"{not json").unwrap();

        assert!(store.ledger_entry(BiomarkerKind::Estrogen).is_none());

        store.save(BiomarkerKind::Estrogen, &artifact(9)).unwrap();
        assert_eq!(store.ledger_count(BiomarkerKind::Estrogen), 9);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        store.save(BiomarkerKind::Immunity, &artifact(2)).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "model_immunity.json".to_string(),
                "model_last_trained.json".to_string(),
                "model_last_trained.lock".to_string(),
            ]
        );
    }

    #[test]
    fn test_handles_on_one_dir_share_key_lock() {
        let dir = TempDir::new().unwrap();
        let first = FileModelStore::open(dir.path()).unwrap();
        let second = Arc::new(FileModelStore::open(dir.path()).unwrap());

        let guard = first.lock(BiomarkerKind::Estrogen).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let second = second.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let _guard = second.lock(BiomarkerKind::Estrogen).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        // Other keys stay free
        drop(second.lock(BiomarkerKind::Cortisol).unwrap());

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_saves_from_separate_handles_keep_every_entry() {
        let dir = TempDir::new().unwrap();
        let handles: Vec<_> = BiomarkerKind::CHAIN
            .into_iter()
            .enumerate()
            .map(|(i, kind)| {
                let path = dir.path().to_path_buf();
                thread::spawn(move || {
                    let store = FileModelStore::open(path).unwrap();
                    for round in 0..20 {
                        store.save(kind, &artifact((i * 100 + round) as u64)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FileModelStore::open(dir.path()).unwrap();
        assert_eq!(store.ledger_count(BiomarkerKind::Estrogen), 19);
        assert_eq!(store.ledger_count(BiomarkerKind::Cortisol), 119);
        assert_eq!(store.ledger_count(BiomarkerKind::Immunity), 219);
        for kind in BiomarkerKind::CHAIN {
            assert!(store.load(kind).unwrap().is_some());
        }
    }

    #[test]
    fn test_concurrent_atomic_writes_to_one_path() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("shared.json"));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        write_atomic(&path, format!("{{\"writer\": {i}}}").as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(path.as_path()).unwrap()).unwrap();
        assert!(raw["writer"].is_number());
    }
}
