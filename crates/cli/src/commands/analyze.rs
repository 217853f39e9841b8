//! Run the pipeline from the command line

use analysis_lib::{
    ingest::load_combined,
    store::KeyGuard,
    BiomarkerKind, FileModelStore, FileResultStore, InferencePipeline, MenstrualPhase,
    ModelArtifact, ModelStore, PipelineConfig, PredictionResult, TrainingLedgerEntry,
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;
use tracing::debug;

use crate::config::Settings;
use crate::output::{
    color_reading, print_info, print_rows, print_success, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Biomarker")]
    biomarker: String,
    #[tabled(rename = "Reading")]
    reading: String,
}

/// Reads stored models but drops every write
struct DryRunStore {
    inner: FileModelStore,
}

impl ModelStore for DryRunStore {
    fn load(&self, kind: BiomarkerKind) -> analysis_lib::Result<Option<ModelArtifact>> {
        self.inner.load(kind)
    }

    fn save(&self, kind: BiomarkerKind, artifact: &ModelArtifact) -> analysis_lib::Result<()> {
        debug!(
            biomarker = %kind,
            trained_on = artifact.trained_on_count,
            "Dry run, model not saved"
        );
        Ok(())
    }

    fn ledger_entry(&self, kind: BiomarkerKind) -> Option<TrainingLedgerEntry> {
        self.inner.ledger_entry(kind)
    }

    fn lock(&self, kind: BiomarkerKind) -> analysis_lib::Result<KeyGuard> {
        self.inner.lock(kind)
    }
}

/// Analyse a combined data document and print the readings
pub fn run_analysis(
    settings: &Settings,
    data: &Path,
    phase: Option<&str>,
    no_save: bool,
    retrain_threshold: u64,
) -> Result<()> {
    let mut input =
        load_combined(data).with_context(|| format!("Failed to load {}", data.display()))?;
    if let Some(phase) = phase {
        input.phase = Some(phase.parse::<MenstrualPhase>()?);
    }

    let files = FileModelStore::open(&settings.model_dir)
        .with_context(|| format!("Failed to open model store {:?}", settings.model_dir))?;
    let store: Arc<dyn ModelStore> = if no_save {
        Arc::new(DryRunStore { inner: files })
    } else {
        Arc::new(files)
    };

    let config = PipelineConfig {
        retrain_threshold,
        ..Default::default()
    };
    let mut pipeline = InferencePipeline::new(store, config)?;
    if !no_save {
        pipeline = pipeline.with_result_store(Arc::new(FileResultStore::new(&settings.results_file)));
    }

    let result = pipeline.run(&input).context("Analysis failed")?;
    print_result(&result, settings)?;

    if matches!(settings.format, OutputFormat::Table) {
        if no_save {
            print_warning("Dry run - models and result were not saved");
        } else {
            print_success(&format!(
                "Result saved to {}",
                settings.results_file.display()
            ));
        }
    }
    Ok(())
}

/// Print one result as a biomarker table or JSON document
pub fn print_result(result: &PredictionResult, settings: &Settings) -> Result<()> {
    let rows: Vec<ReadingRow> = BiomarkerKind::CHAIN
        .iter()
        .map(|kind| ReadingRow {
            biomarker: kind.to_string(),
            reading: color_reading(result.reading(*kind)),
        })
        .collect();

    print_rows(rows, result, settings.format, "No readings")?;
    if matches!(settings.format, OutputFormat::Table) {
        print_info(&format!("Analysed at {}", result.timestamp_string()));
    }
    Ok(())
}
