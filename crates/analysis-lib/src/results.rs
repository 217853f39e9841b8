//! Latest-result persistence

use crate::error::{AnalysisError, Result};
use crate::models::PredictionResult;
use crate::store::write_atomic;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

/// Where finished predictions are kept
pub trait ResultStore: Send + Sync {
    /// Replace the stored result
    fn record(&self, result: &PredictionResult) -> Result<()>;

    /// Most recent result, `None` if nothing has been recorded
    fn latest(&self) -> Result<Option<PredictionResult>>;

    /// Stored result whose timestamp falls on `date`
    fn find_by_date(&self, date: NaiveDate) -> Result<PredictionResult> {
        self.latest()?
            .filter(|result| result.timestamp.date() == date)
            .ok_or_else(|| AnalysisError::NotFound(format!("no analysis result for {date}")))
    }
}

/// Single JSON document holding the last result
pub struct FileResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultStore for FileResultStore {
    fn record(&self, result: &PredictionResult) -> Result<()> {
        let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_atomic(&self.path, &serde_json::to_vec_pretty(result)?)?;
        debug!(path = %self.path.display(), timestamp = %result.timestamp_string(), "Result recorded");
        Ok(())
    }

    fn latest(&self) -> Result<Option<PredictionResult>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AnalysisError::storage(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AnalysisError::storage(&self.path, e)),
        }
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    latest: RwLock<Option<PredictionResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn record(&self, result: &PredictionResult) -> Result<()> {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        Ok(())
    }

    fn latest(&self) -> Result<Option<PredictionResult>> {
        Ok(self
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
