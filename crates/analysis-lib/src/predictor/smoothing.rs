//! Exponential smoothing of biomarker series

use crate::error::{AnalysisError, Result};

/// Default smoothing factor for estrogen series
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.2;

/// Exponential smoother: `s[0] = x[0]`, `s[i] = a*x[i] + (1-a)*s[i-1]`
#[derive(Debug, Clone, Copy)]
pub struct SeriesSmoother {
    alpha: f64,
}

impl Default for SeriesSmoother {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl SeriesSmoother {
    pub fn new(alpha: f64) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
            return Err(AnalysisError::invalid(format!(
                "smoothing factor must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn smooth(&self, data: &[f64]) -> Result<Vec<f64>> {
        let (first, rest) = data
            .split_first()
            .ok_or_else(|| AnalysisError::invalid("cannot smooth an empty series"))?;

        let mut smoothed = Vec::with_capacity(data.len());
        smoothed.push(*first);
        let mut prev = *first;
        for x in rest {
            prev = self.alpha * x + (1.0 - self.alpha) * prev;
            smoothed.push(prev);
        }
        Ok(smoothed)
    }
}
