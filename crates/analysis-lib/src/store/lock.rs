//! Per-biomarker exclusive locks
//!
//! Guards are owned values so they can travel with an estimate across
//! pipeline stages. Callers that need several keys take them in chain order.
//!
//! [`KeyLocks`] only excludes threads sharing one store handle. Stores that
//! other handles or processes can open also attach a [`FileLock`] to the
//! guard.

use crate::error::{AnalysisError, Result};
use crate::models::BiomarkerKind;
use dashmap::DashMap;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Default)]
struct KeySlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Lock table keyed by biomarker
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: DashMap<BiomarkerKind, Arc<KeySlot>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: BiomarkerKind) -> Arc<KeySlot> {
        self.slots.entry(kind).or_default().value().clone()
    }

    /// Block until `kind` is free, then hold it until the guard drops
    pub fn acquire(&self, kind: BiomarkerKind) -> KeyGuard {
        let slot = self.slot(kind);
        {
            let mut held = slot.held.lock().unwrap_or_else(PoisonError::into_inner);
            while *held {
                held = slot
                    .released
                    .wait(held)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *held = true;
        }
        KeyGuard {
            kind,
            slot,
            file: None,
        }
    }

    pub fn is_held(&self, kind: BiomarkerKind) -> bool {
        self.slots
            .get(&kind)
            .map(|slot| *slot.held.lock().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or(false)
    }
}

/// Exclusive hold on one biomarker key
#[derive(Debug)]
pub struct KeyGuard {
    kind: BiomarkerKind,
    slot: Arc<KeySlot>,
    file: Option<FileLock>,
}

impl KeyGuard {
    pub fn kind(&self) -> BiomarkerKind {
        self.kind
    }

    /// Also hold `file` until this guard drops
    pub fn holding(mut self, file: FileLock) -> Self {
        self.file = Some(file);
        self
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.file.take());
        let mut held = self.slot.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.slot.released.notify_one();
    }
}

/// Advisory exclusive lock on a file, released on drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock on `path` is ours. The file is created if missing.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| AnalysisError::storage(path, e))?;
        FileExt::lock_exclusive(&file).map_err(|e| AnalysisError::storage(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock anyway
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to unlock");
        }
    }
}
