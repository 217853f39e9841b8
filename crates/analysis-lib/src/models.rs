//! Core data models for biomarker analysis

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Placeholder reported instead of a value when a biomarker has too few samples.
/// The mobile client matches on this exact string.
pub const INSUFFICIENT_DATA_SENTINEL: &str = "⚠ データ不足";

/// Timestamp layout used for results and the training ledger
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The three estimated biomarkers, in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiomarkerKind {
    Estrogen,
    Cortisol,
    Immunity,
}

impl BiomarkerKind {
    /// Chain order: each stage consumes the previous stage's prediction
    pub const CHAIN: [BiomarkerKind; 3] = [Self::Estrogen, Self::Cortisol, Self::Immunity];

    /// Storage key for models and ledger entries
    pub fn key(&self) -> &'static str {
        match self {
            Self::Estrogen => "estrogen",
            Self::Cortisol => "cortisol",
            Self::Immunity => "immunity",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "estrogen" => Some(Self::Estrogen),
            "cortisol" => Some(Self::Cortisol),
            "immunity" => Some(Self::Immunity),
            _ => None,
        }
    }
}

impl fmt::Display for BiomarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Wearable-derived health profile. Every field is optional; defaults are
/// applied by the accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthProfile {
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub body_fat: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub steps: Option<f64>,
    #[serde(default, alias = "sleep_duration")]
    pub sleep_hours: Option<f64>,
    #[serde(default)]
    pub systolic_bp: Option<f64>,
    #[serde(default)]
    pub diastolic_bp: Option<f64>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub exercise_habit: Option<bool>,
    #[serde(default, alias = "blood_oxygen")]
    pub spo2: Option<f64>,
}

impl HealthProfile {
    pub fn height(&self) -> f64 {
        self.height.unwrap_or(170.0)
    }

    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(60.0)
    }

    pub fn body_fat(&self) -> f64 {
        self.body_fat.unwrap_or(20.0)
    }

    pub fn heart_rate(&self) -> f64 {
        self.heart_rate.unwrap_or(70.0)
    }

    pub fn steps(&self) -> f64 {
        self.steps.unwrap_or(5000.0)
    }

    pub fn sleep_hours(&self) -> f64 {
        self.sleep_hours.unwrap_or(7.0)
    }

    pub fn systolic_bp(&self) -> f64 {
        self.systolic_bp.unwrap_or(120.0)
    }

    pub fn diastolic_bp(&self) -> f64 {
        self.diastolic_bp.unwrap_or(80.0)
    }

    pub fn age(&self) -> f64 {
        self.age.unwrap_or(30.0)
    }

    pub fn exercise_habit(&self) -> bool {
        self.exercise_habit.unwrap_or(false)
    }

    pub fn spo2(&self) -> f64 {
        self.spo2.unwrap_or(98.0)
    }

    pub fn bmi(&self) -> f64 {
        let height_m = self.height() / 100.0;
        self.weight() / (height_m * height_m)
    }

    pub fn blood_pressure_ratio(&self) -> f64 {
        self.systolic_bp() / self.diastolic_bp().max(1.0)
    }

    pub fn exercise_index(&self) -> f64 {
        if self.exercise_habit() {
            self.steps() / 10_000.0
        } else {
            0.0
        }
    }

    /// Reject values that would poison the feature vector
    pub fn validate(&self) -> Result<()> {
        let numeric = [
            ("height", self.height),
            ("weight", self.weight),
            ("body_fat", self.body_fat),
            ("heart_rate", self.heart_rate),
            ("steps", self.steps),
            ("sleep_hours", self.sleep_hours),
            ("systolic_bp", self.systolic_bp),
            ("diastolic_bp", self.diastolic_bp),
            ("age", self.age),
            ("spo2", self.spo2),
        ];
        for (name, value) in numeric {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(AnalysisError::invalid(format!("{name} is not a finite number")));
                }
            }
        }
        if self.height() <= 0.0 {
            return Err(AnalysisError::invalid(format!(
                "height must be positive, got {}",
                self.height()
            )));
        }
        if self.steps() < 0.0 {
            return Err(AnalysisError::invalid(format!(
                "steps must not be negative, got {}",
                self.steps()
            )));
        }
        Ok(())
    }
}

/// One observation of a biomarker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerSample {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl BiomarkerSample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            observed_at: None,
        }
    }

    pub fn at(value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            observed_at: Some(observed_at),
        }
    }
}

/// Menstrual cycle phase tag applied to estrogen values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenstrualPhase {
    #[default]
    None,
    Ovulation,
    Menstruation,
}

impl MenstrualPhase {
    pub fn estrogen_multiplier(&self) -> f64 {
        match self {
            Self::None => 1.0,
            Self::Ovulation => 1.5,
            Self::Menstruation => 0.5,
        }
    }
}

impl std::str::FromStr for MenstrualPhase {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "ovulation" => Ok(Self::Ovulation),
            "menstruation" => Ok(Self::Menstruation),
            other => Err(AnalysisError::invalid(format!(
                "unknown menstrual phase '{other}'"
            ))),
        }
    }
}

/// Number of weighted health features
pub const FEATURE_COUNT: usize = 13;

/// Weighted health features in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Outcome for a single biomarker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiomarkerReading {
    Value(f64),
    InsufficientData,
}

impl BiomarkerReading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientData)
    }
}

impl fmt::Display for BiomarkerReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:.1}"),
            Self::InsufficientData => f.write_str(INSUFFICIENT_DATA_SENTINEL),
        }
    }
}

impl Serialize for BiomarkerReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::InsufficientData => serializer.serialize_str(INSUFFICIENT_DATA_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for BiomarkerReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Self::Value(v),
            Raw::Text(_) => Self::InsufficientData,
        })
    }
}

/// Bundle returned by one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "estrogen_Level")]
    pub estrogen_level: BiomarkerReading,
    #[serde(rename = "cortisol_Level")]
    pub cortisol_level: BiomarkerReading,
    #[serde(rename = "immunity_Score")]
    pub immunity_score: BiomarkerReading,
    #[serde(with = "timefmt")]
    pub timestamp: NaiveDateTime,
}

impl PredictionResult {
    pub fn reading(&self, kind: BiomarkerKind) -> BiomarkerReading {
        match kind {
            BiomarkerKind::Estrogen => self.estrogen_level,
            BiomarkerKind::Cortisol => self.cortisol_level,
            BiomarkerKind::Immunity => self.immunity_score,
        }
    }

    /// Timestamp rendered the way it is persisted
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Durable record of the last training for one biomarker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLedgerEntry {
    pub model_key: BiomarkerKind,
    pub data_count: u64,
    #[serde(with = "timefmt")]
    pub last_trained: NaiveDateTime,
}

/// Current local time truncated to whole seconds
pub fn now_seconds() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Serde adapter for `YYYY-MM-DD HH:MM:SS` timestamps
pub mod timefmt {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile = HealthProfile::default();
        assert_eq!(profile.height(), 170.0);
        assert_eq!(profile.weight(), 60.0);
        assert_eq!(profile.spo2(), 98.0);
        assert!(!profile.exercise_habit());
        assert!((profile.bmi() - 60.0 / (1.7 * 1.7)).abs() < 1e-12);
        assert_eq!(profile.blood_pressure_ratio(), 1.5);
        assert_eq!(profile.exercise_index(), 0.0);
    }

    #[test]
    fn test_profile_wire_aliases() {
        let profile: HealthProfile = serde_json::from_str(
            r#"{"sleep_duration": 6.5, "blood_oxygen": 96, "source_type": "watch", "exercise_habit": true}"#,
        )
        .unwrap();
        assert_eq!(profile.sleep_hours(), 6.5);
        assert_eq!(profile.spo2(), 96.0);
        assert_eq!(profile.exercise_index(), 0.5);
    }

    #[test]
    fn test_diastolic_floor() {
        let profile = HealthProfile {
            diastolic_bp: Some(0.0),
            ..Default::default()
        };
        assert_eq!(profile.blood_pressure_ratio(), 120.0);
    }

    #[test]
    fn test_profile_validation() {
        assert!(HealthProfile::default().validate().is_ok());

        let zero_height = HealthProfile {
            height: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            zero_height.validate(),
            Err(AnalysisError::InvalidInput(_))
        ));

        let nan_weight = HealthProfile {
            weight: Some(f64::NAN),
            ..Default::default()
        };
        assert!(nan_weight.validate().is_err());
    }

    #[test]
    fn test_reading_serialization() {
        let result = PredictionResult {
            estrogen_level: BiomarkerReading::Value(12.3),
            cortisol_level: BiomarkerReading::InsufficientData,
            immunity_score: BiomarkerReading::Value(70.0),
            timestamp: NaiveDateTime::parse_from_str("2025-04-01 14:30:00", TIMESTAMP_FORMAT)
                .unwrap(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["estrogen_Level"], 12.3);
        assert_eq!(json["cortisol_Level"], INSUFFICIENT_DATA_SENTINEL);
        assert_eq!(json["timestamp"], "2025-04-01 14:30:00");

        let back: PredictionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!("Ovulation".parse::<MenstrualPhase>().unwrap(), MenstrualPhase::Ovulation);
        assert_eq!(MenstrualPhase::Menstruation.estrogen_multiplier(), 0.5);
        assert!("luteal".parse::<MenstrualPhase>().is_err());
    }
}
