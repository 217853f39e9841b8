//! Combined data document loader
//!
//! The mobile client uploads one JSON document holding every sample series,
//! the latest health record and the current cycle phase. Field names follow
//! the client's wire format.

use crate::error::{AnalysisError, Result};
use crate::models::{BiomarkerKind, BiomarkerSample, HealthProfile, MenstrualPhase, TIMESTAMP_FORMAT};
use crate::pipeline::AnalysisInput;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CombinedDocument {
    #[serde(rename = "Estrogen Data", default)]
    estrogen: Vec<RawSample>,
    #[serde(rename = "Cortisol Data", default)]
    cortisol: Vec<RawSample>,
    #[serde(rename = "Immunity Data", default)]
    immunity: Vec<RawSample>,
    #[serde(rename = "Health Data", default)]
    health: Option<HealthSection>,
    #[serde(default)]
    menstrual_cycle_phase: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HealthSection {
    // Arrays must be tried first: a struct also accepts a positional sequence
    Many(Vec<HealthProfile>),
    One(HealthProfile),
}

impl HealthSection {
    fn into_profile(self) -> HealthProfile {
        match self {
            Self::Many(records) => records.into_iter().last().unwrap_or_default(),
            Self::One(profile) => profile,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default, alias = "Estrogen", alias = "Cortisol", alias = "Immunity Score")]
    value: Option<f64>,
    #[serde(default, alias = "date")]
    observed_at: Option<String>,
}

/// Read and parse a combined data document from disk
pub fn load_combined(path: &Path) -> Result<AnalysisInput> {
    let raw = fs::read_to_string(path).map_err(|e| AnalysisError::storage(path, e))?;
    let input = parse_combined(&raw)?;
    debug!(
        path = %path.display(),
        estrogen = input.estrogen.len(),
        cortisol = input.cortisol.len(),
        immunity = input.immunity.len(),
        "Combined data loaded"
    );
    Ok(input)
}

/// Parse a combined data document
pub fn parse_combined(raw: &str) -> Result<AnalysisInput> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AnalysisError::invalid(format!("combined data is not valid JSON: {e}")))?;
    match value.as_object() {
        Some(map) if !map.is_empty() => {}
        Some(_) => return Err(AnalysisError::invalid("combined data document is empty")),
        None => return Err(AnalysisError::invalid("combined data must be a JSON object")),
    }

    let doc: CombinedDocument = serde_json::from_value(value)
        .map_err(|e| AnalysisError::invalid(format!("malformed combined data: {e}")))?;

    let phase = match doc.menstrual_cycle_phase.as_deref() {
        Some(raw) => Some(raw.parse::<MenstrualPhase>()?),
        None => None,
    };

    Ok(AnalysisInput {
        profile: doc.health.map(HealthSection::into_profile).unwrap_or_default(),
        estrogen: convert_samples(BiomarkerKind::Estrogen, doc.estrogen)?,
        cortisol: convert_samples(BiomarkerKind::Cortisol, doc.cortisol)?,
        immunity: convert_samples(BiomarkerKind::Immunity, doc.immunity)?,
        phase,
    })
}

fn convert_samples(kind: BiomarkerKind, raw: Vec<RawSample>) -> Result<Vec<BiomarkerSample>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, sample)| {
            let value = match (sample.value, kind) {
                (Some(value), _) => value,
                // A missing immunity score reads as 0
                (None, BiomarkerKind::Immunity) => 0.0,
                (None, _) => {
                    return Err(AnalysisError::invalid(format!("{kind} sample {i} has no value")))
                }
            };
            let observed_at = sample
                .observed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(|e| AnalysisError::invalid(format!("{kind} sample {i}: {e}")))?;
            Ok(BiomarkerSample { value, observed_at })
        })
        .collect()
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` in local time
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|_| format!("unrecognised timestamp '{raw}'"))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| format!("timestamp '{raw}' does not exist in local time"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_document() {
        let input = parse_combined(
            r#"{
                "Estrogen Data": [{"Estrogen": 12.0, "date": "2025-04-01 08:00:00"}, {"value": 13.5}],
                "Cortisol Data": [{"Cortisol": 9.5}],
                "Immunity Data": [{"Immunity Score": 70}],
                "Health Data": {"height": 165, "sleep_duration": 6.5, "source_type": "ring"},
                "menstrual_cycle_phase": "ovulation"
            }"#,
        )
        .unwrap();

        assert_eq!(input.estrogen.len(), 2);
        assert_eq!(input.estrogen[0].value, 12.0);
        assert!(input.estrogen[0].observed_at.is_some());
        assert!(input.estrogen[1].observed_at.is_none());
        assert_eq!(input.cortisol[0].value, 9.5);
        assert_eq!(input.immunity[0].value, 70.0);
        assert_eq!(input.profile.height(), 165.0);
        assert_eq!(input.profile.sleep_hours(), 6.5);
        assert_eq!(input.phase, Some(MenstrualPhase::Ovulation));
    }

    #[test]
    fn test_health_list_last_wins() {
        let input = parse_combined(
            r#"{"Health Data": [{"weight": 50}, {"weight": 55, "age": 41}]}"#,
        )
        .unwrap();
        assert_eq!(input.profile.weight(), 55.0);
        assert_eq!(input.profile.age(), 41.0);

        let input = parse_combined(r#"{"Health Data": []}"#).unwrap();
        assert_eq!(input.profile, HealthProfile::default());
        assert!(input.estrogen.is_empty());
        assert_eq!(input.phase, None);
    }

    #[test]
    fn test_rfc3339_timestamps() {
        let input = parse_combined(
            r#"{"Cortisol Data": [{"value": 1, "observed_at": "2025-04-01T08:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(
            input.cortisol[0].observed_at.unwrap().to_rfc3339(),
            "2025-04-01T08:00:00+00:00"
        );
    }

    #[test]
    fn test_rejected_documents() {
        for raw in [
            "{}",
            "[]",
            "not json",
            r#"{"Estrogen Data": [{"date": "2025-04-01 08:00:00"}]}"#,
            r#"{"Cortisol Data": [{"Cortisol": 4.0}, {"date": "2025-04-01 08:00:00"}]}"#,
            r#"{"Cortisol Data": [{"value": 1, "date": "yesterday"}]}"#,
            r#"{"Immunity Data": [{"value": 1}], "menstrual_cycle_phase": "luteal"}"#,
        ] {
            assert!(
                matches!(parse_combined(raw), Err(AnalysisError::InvalidInput(_))),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_missing_immunity_score_defaults_to_zero() {
        let input = parse_combined(
            r#"{"Immunity Data": [{"Immunity Score": 70}, {"date": "2025-04-02 08:00:00"}]}"#,
        )
        .unwrap();
        let values: Vec<f64> = input.immunity.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![70.0, 0.0]);
        assert!(input.immunity[1].observed_at.is_some());
    }

    #[test]
    fn test_load_missing_file_is_storage_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_combined(&dir.path().join("combined_data.json")).unwrap_err();
        assert!(matches!(err, AnalysisError::Storage { .. }));

        let path = dir.path().join("combined_data.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"Cortisol Data": [{"value": 3}]}"#).unwrap();
        assert_eq!(load_combined(&path).unwrap().cortisol.len(), 1);
    }
}
