//! Training ledger and model artifact inspection

use analysis_lib::{predictor::Kernel, BiomarkerKind, FileModelStore, ModelStore, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::config::Settings;
use crate::output::print_rows;

#[derive(Tabled)]
struct LedgerRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Data Count")]
    data_count: u64,
    #[tabled(rename = "Last Trained")]
    last_trained: String,
}

#[derive(Debug, Serialize)]
struct ModelSummary {
    model: BiomarkerKind,
    kernel: String,
    columns: usize,
    support_vectors: usize,
    trained_on: u64,
    trained_at: String,
    schema_version: u32,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Kernel")]
    kernel: String,
    #[tabled(rename = "Columns")]
    columns: usize,
    #[tabled(rename = "SVs")]
    support_vectors: usize,
    #[tabled(rename = "Trained On")]
    trained_on: u64,
    #[tabled(rename = "Trained At")]
    trained_at: String,
    #[tabled(rename = "Schema")]
    schema_version: u32,
}

fn open_store(settings: &Settings) -> Result<FileModelStore> {
    FileModelStore::open(&settings.model_dir)
        .with_context(|| format!("Failed to open model store {:?}", settings.model_dir))
}

/// Show when each model was last trained and on how many samples
pub fn show_ledger(settings: &Settings) -> Result<()> {
    let ledger = open_store(settings)?.ledger();

    let rows = ledger
        .iter()
        .map(|entry| LedgerRow {
            model: entry.model_key.to_string(),
            data_count: entry.data_count,
            last_trained: entry.last_trained.format(TIMESTAMP_FORMAT).to_string(),
        })
        .collect();

    print_rows(rows, &ledger, settings.format, "No models trained yet")
}

/// Show a summary of every stored model artifact
pub fn show_models(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;

    let mut summaries = Vec::new();
    for kind in BiomarkerKind::CHAIN {
        let Some(artifact) = store
            .load(kind)
            .with_context(|| format!("Failed to load {kind} model"))?
        else {
            continue;
        };
        summaries.push(ModelSummary {
            model: kind,
            kernel: describe_kernel(artifact.regressor.kernel()),
            columns: artifact.regressor.n_features(),
            support_vectors: artifact.regressor.n_support(),
            trained_on: artifact.trained_on_count,
            trained_at: artifact.trained_at.format(TIMESTAMP_FORMAT).to_string(),
            schema_version: artifact.feature_schema_version,
        });
    }

    let rows = summaries
        .iter()
        .map(|s| ModelRow {
            model: s.model.to_string(),
            kernel: s.kernel.clone(),
            columns: s.columns,
            support_vectors: s.support_vectors,
            trained_on: s.trained_on,
            trained_at: s.trained_at.clone(),
            schema_version: s.schema_version,
        })
        .collect();

    print_rows(rows, &summaries, settings.format, "No stored models")
}

fn describe_kernel(kernel: Kernel) -> String {
    match kernel {
        Kernel::Linear => "linear".to_string(),
        Kernel::Rbf { gamma } => format!("rbf (gamma {gamma:.4})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_kernel() {
        assert_eq!(describe_kernel(Kernel::Linear), "linear");
        assert_eq!(describe_kernel(Kernel::Rbf { gamma: 0.0625 }), "rbf (gamma 0.0625)");
    }
}
