//! Analyzer health tracking
//!
//! Health is derived from recent analysis outcomes: a failing run degrades
//! the analyzer, repeated failures make it unhealthy. Readiness flips once
//! the first analysis has succeeded.

use crate::models::PredictionResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failed runs before the analyzer reports unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last run failed but the analyzer keeps serving its previous result
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }

    fn from_failures(consecutive_failures: u32) -> Self {
        match consecutive_failures {
            0 => Self::Healthy,
            n if n < UNHEALTHY_AFTER_FAILURES => Self::Degraded,
            _ => Self::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub consecutive_failures: u32,
    pub total_runs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<PredictionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    consecutive_failures: u32,
    total_runs: u64,
    last_success_timestamp: Option<i64>,
    last_error: Option<String>,
    last_result: Option<PredictionResult>,
}

/// Shared health handle, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct AnalyzerHealth {
    state: Arc<RwLock<HealthState>>,
}

impl AnalyzerHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, result: &PredictionResult) {
        let mut state = self.state.write().await;
        state.consecutive_failures = 0;
        state.total_runs += 1;
        state.last_success_timestamp = Some(chrono::Utc::now().timestamp());
        state.last_error = None;
        state.last_result = Some(result.clone());
    }

    pub async fn record_failure(&self, error: impl Into<String>) {
        let mut state = self.state.write().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_runs += 1;
        state.last_error = Some(error.into());
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: ComponentStatus::from_failures(state.consecutive_failures),
            consecutive_failures: state.consecutive_failures,
            total_runs: state.total_runs,
            last_success_timestamp: state.last_success_timestamp,
            last_error: state.last_error.clone(),
            last_result: state.last_result.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if state.last_success_timestamp.is_some() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(
                    state
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "No analysis completed yet".to_string()),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_seconds, BiomarkerReading};

    fn result() -> PredictionResult {
        PredictionResult {
            estrogen_level: BiomarkerReading::Value(14.1),
            cortisol_level: BiomarkerReading::InsufficientData,
            immunity_score: BiomarkerReading::Value(71.5),
            timestamp: now_seconds(),
        }
    }

    #[tokio::test]
    async fn test_not_ready_before_first_success() {
        let health = AnalyzerHealth::new();
        let readiness = health.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);

        health.record_success(&result()).await;
        assert!(health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failures_escalate_and_recover() {
        let health = AnalyzerHealth::new();
        health.record_success(&result()).await;

        health.record_failure("storage error").await;
        let response = health.health().await;
        assert_eq!(response.status, ComponentStatus::Degraded);
        assert!(response.status.is_operational());
        assert!(response.last_result.is_some());

        health.record_failure("storage error").await;
        health.record_failure("storage error").await;
        let response = health.health().await;
        assert_eq!(response.status, ComponentStatus::Unhealthy);
        assert_eq!(response.consecutive_failures, 3);
        // Still ready: a previous result exists
        assert!(health.readiness().await.ready);

        health.record_success(&result()).await;
        let response = health.health().await;
        assert_eq!(response.status, ComponentStatus::Healthy);
        assert_eq!(response.total_runs, 5);
        assert!(response.last_error.is_none());
    }
}
