//! Feature construction for biomarker models
//!
//! Turns a health profile into the fixed, weighted 13-column vector shared by
//! every biomarker model. The weight table is part of the model contract:
//! artifacts record the schema version they were trained with.

use crate::models::{FeatureVector, HealthProfile, FEATURE_COUNT};

/// Bumped whenever the column order or any weight changes
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Column names and weights, in vector order
pub const FEATURE_WEIGHTS: [(&str, f64); FEATURE_COUNT] = [
    ("height", 0.8),
    ("weight", 0.8),
    ("body_fat", 1.2),
    ("heart_rate", 1.1),
    ("steps", 1.0),
    ("sleep_hours", 1.2),
    ("systolic_bp", 1.1),
    ("diastolic_bp", 1.1),
    ("age", 1.5),
    ("bmi", 1.3),
    ("blood_pressure_ratio", 1.2),
    ("exercise_index", 1.3),
    ("spo2", 0.9),
];

/// Builds feature vectors from health profiles
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn build(profile: &HealthProfile) -> FeatureVector {
        let raw = [
            profile.height(),
            profile.weight(),
            profile.body_fat(),
            profile.heart_rate(),
            profile.steps(),
            profile.sleep_hours(),
            profile.systolic_bp(),
            profile.diastolic_bp(),
            profile.age(),
            profile.bmi(),
            profile.blood_pressure_ratio(),
            profile.exercise_index(),
            profile.spo2(),
        ];

        let mut weighted = [0.0; FEATURE_COUNT];
        for (slot, (value, (_, weight))) in weighted
            .iter_mut()
            .zip(raw.iter().zip(FEATURE_WEIGHTS.iter()))
        {
            *slot = value * weight;
        }
        FeatureVector(weighted)
    }

    pub fn column_names() -> impl Iterator<Item = &'static str> {
        FEATURE_WEIGHTS.iter().map(|(name, _)| *name)
    }
}
