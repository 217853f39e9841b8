//! Epsilon support vector regression
//!
//! Solves the SVR dual with SMO using second-order working set selection,
//! the same formulation libsvm uses:
//!
//! ```text
//! min 0.5 a'Qa + p'a   s.t.  y'a = 0,  0 <= a_t <= C,  t = 1..2l
//! ```
//!
//! where the first `l` variables carry `+1` labels and the mirrored second
//! half carries `-1`. Only support vectors are kept after training.

use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor for non-positive curvature in the SMO step
const TAU: f64 = 1e-12;

/// Default KKT violation tolerance
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Default cap on SMO iterations
pub const DEFAULT_MAX_ITER: usize = 100_000;

/// RBF width selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / n_features`
    Auto,
    Value(f64),
}

/// Kernel family requested at training time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelKind {
    Linear,
    Rbf(Gamma),
}

impl KernelKind {
    fn resolve(&self, n_features: usize) -> Kernel {
        match self {
            Self::Linear => Kernel::Linear,
            Self::Rbf(Gamma::Auto) => Kernel::Rbf {
                gamma: 1.0 / n_features.max(1) as f64,
            },
            Self::Rbf(Gamma::Value(gamma)) => Kernel::Rbf { gamma: *gamma },
        }
    }
}

/// Kernel with all parameters resolved, as stored in a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

impl Kernel {
    pub fn eval(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Linear => a.dot(&b),
            Self::Rbf { gamma } => {
                let dist_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist_sq).exp()
            }
        }
    }

    fn gram(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let l = x.nrows();
        let mut k = Array2::zeros((l, l));
        for i in 0..l {
            for j in i..l {
                let v = self.eval(x.row(i), x.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }
}

/// Hyperparameters for one SVR fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvrParams {
    pub kernel: KernelKind,
    pub c: f64,
    pub epsilon: f64,
    pub tolerance: f64,
    pub max_iter: usize,
}

impl SvrParams {
    pub fn new(kernel: KernelKind, c: f64, epsilon: f64) -> Self {
        Self {
            kernel,
            c,
            epsilon,
            tolerance: DEFAULT_TOLERANCE,
            max_iter: DEFAULT_MAX_ITER,
        }
    }
}

/// Trained SVR model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrModel {
    kernel: Kernel,
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    intercept: f64,
    n_features: usize,
}

impl SvrModel {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, params: &SvrParams) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(AnalysisError::invalid("cannot fit SVR on zero samples"));
        }
        if x.nrows() != y.len() {
            return Err(AnalysisError::invalid(format!(
                "SVR fit shape mismatch: {} rows, {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if !(params.c > 0.0) || !(params.epsilon >= 0.0) {
            return Err(AnalysisError::invalid(format!(
                "invalid SVR parameters C={} epsilon={}",
                params.c, params.epsilon
            )));
        }

        let kernel = params.kernel.resolve(x.ncols());
        let gram = kernel.gram(x);
        let solution = SmoSolver::new(&gram, y, params).solve();

        if !solution.converged {
            warn!(
                iterations = solution.iterations,
                samples = x.nrows(),
                "SVR solver hit iteration cap before convergence"
            );
        } else {
            debug!(iterations = solution.iterations, "SVR solver converged");
        }

        let support: Vec<usize> = solution
            .coef
            .iter()
            .enumerate()
            .filter(|(_, c)| c.abs() > 0.0)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            kernel,
            support_vectors: x.select(Axis(0), &support),
            dual_coef: support.iter().map(|&i| solution.coef[i]).collect(),
            intercept: -solution.rho,
            n_features: x.ncols(),
        })
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.len()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(AnalysisError::invalid(format!(
                "model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let sum: f64 = self
            .support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, coef)| coef * self.kernel.eval(sv, row))
            .sum();
        Ok(sum + self.intercept)
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

struct Solution {
    coef: Vec<f64>,
    rho: f64,
    iterations: usize,
    converged: bool,
}

struct SmoSolver<'a> {
    gram: &'a Array2<f64>,
    l: usize,
    c: f64,
    tolerance: f64,
    max_iter: usize,
    alpha: Vec<f64>,
    grad: Vec<f64>,
    diag: Vec<f64>,
}

impl<'a> SmoSolver<'a> {
    fn new(gram: &'a Array2<f64>, y: ArrayView1<'_, f64>, params: &SvrParams) -> Self {
        let l = y.len();
        let grad = (0..2 * l)
            .map(|t| {
                if t < l {
                    params.epsilon - y[t]
                } else {
                    params.epsilon + y[t - l]
                }
            })
            .collect();
        let diag = (0..2 * l).map(|t| gram[[t % l, t % l]]).collect();
        Self {
            gram,
            l,
            c: params.c,
            tolerance: params.tolerance,
            max_iter: params.max_iter,
            alpha: vec![0.0; 2 * l],
            grad,
            diag,
        }
    }

    fn sign(&self, t: usize) -> f64 {
        if t < self.l {
            1.0
        } else {
            -1.0
        }
    }

    fn k(&self, i: usize, j: usize) -> f64 {
        self.gram[[i % self.l, j % self.l]]
    }

    fn q(&self, i: usize, j: usize) -> f64 {
        self.sign(i) * self.sign(j) * self.k(i, j)
    }

    fn at_upper(&self, t: usize) -> bool {
        self.alpha[t] >= self.c
    }

    fn at_lower(&self, t: usize) -> bool {
        self.alpha[t] <= 0.0
    }

    /// Second-order working set selection; `None` once the KKT gap is
    /// within tolerance.
    fn select_working_set(&self) -> Option<(usize, usize)> {
        let n = 2 * self.l;

        let mut gmax = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..n {
            if self.sign(t) > 0.0 {
                if !self.at_upper(t) && -self.grad[t] >= gmax {
                    gmax = -self.grad[t];
                    i_sel = Some(t);
                }
            } else if !self.at_lower(t) && self.grad[t] >= gmax {
                gmax = self.grad[t];
                i_sel = Some(t);
            }
        }
        let i = i_sel?;

        let mut gmax2 = f64::NEG_INFINITY;
        let mut j_sel = None;
        let mut obj_min = f64::INFINITY;
        for t in 0..n {
            let grad_diff = if self.sign(t) > 0.0 {
                if self.at_lower(t) {
                    continue;
                }
                gmax2 = gmax2.max(self.grad[t]);
                gmax + self.grad[t]
            } else {
                if self.at_upper(t) {
                    continue;
                }
                gmax2 = gmax2.max(-self.grad[t]);
                gmax - self.grad[t]
            };

            if grad_diff > 0.0 {
                let quad = self.diag[i] + self.diag[t] - 2.0 * self.k(i, t);
                let obj = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                if obj <= obj_min {
                    obj_min = obj;
                    j_sel = Some(t);
                }
            }
        }

        if gmax + gmax2 < self.tolerance {
            return None;
        }
        j_sel.map(|j| (i, j))
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let c = self.c;
        let old_i = self.alpha[i];
        let old_j = self.alpha[j];
        let quad = {
            let q = self.diag[i] + self.diag[j] - 2.0 * self.k(i, j);
            if q > 0.0 {
                q
            } else {
                TAU
            }
        };

        let (mut ai, mut aj) = (old_i, old_j);
        if self.sign(i) != self.sign(j) {
            let delta = (-self.grad[i] - self.grad[j]) / quad;
            let diff = ai - aj;
            ai += delta;
            aj += delta;
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
        } else {
            let delta = (self.grad[i] - self.grad[j]) / quad;
            let sum = ai + aj;
            ai -= delta;
            aj += delta;
            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let delta_i = ai - old_i;
        let delta_j = aj - old_j;
        for t in 0..2 * self.l {
            let step = self.q(i, t) * delta_i + self.q(j, t) * delta_j;
            self.grad[t] += step;
        }
    }

    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;

        for t in 0..2 * self.l {
            let yg = self.sign(t) * self.grad[t];
            if self.at_upper(t) {
                if self.sign(t) < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if self.at_lower(t) {
                if self.sign(t) > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free_count += 1;
                free_sum += yg;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }

    fn solve(mut self) -> Solution {
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iter {
            match self.select_working_set() {
                Some((i, j)) => self.update_pair(i, j),
                None => {
                    converged = true;
                    break;
                }
            }
            iterations += 1;
        }

        let rho = self.rho();
        let coef = (0..self.l)
            .map(|t| self.alpha[t] - self.alpha[t + self.l])
            .collect();
        Solution {
            coef,
            rho,
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_linear_kernel_fits_line() {
        let x = Array::linspace(0.0, 2.0, 21).insert_axis(Axis(1));
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let params = SvrParams::new(KernelKind::Linear, 10.0, 0.1);
        let model = SvrModel::fit(x.view(), y.view(), &params).unwrap();

        for (row, target) in x.rows().into_iter().zip(y.iter()) {
            let pred = model.predict_row(row).unwrap();
            assert!((pred - target).abs() < 0.25, "pred {} target {}", pred, target);
        }
    }

    #[test]
    fn test_rbf_kernel_fits_curve() {
        let x = Array::linspace(0.0, 3.0, 30).insert_axis(Axis(1));
        let y = x.column(0).mapv(f64::sin);
        let params = SvrParams::new(KernelKind::Rbf(Gamma::Value(1.0)), 100.0, 0.05);
        let model = SvrModel::fit(x.view(), y.view(), &params).unwrap();

        let preds = model.predict(x.view()).unwrap();
        for (pred, target) in preds.iter().zip(y.iter()) {
            assert!((pred - target).abs() < 0.15, "pred {} target {}", pred, target);
        }
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![5.0, 5.0, 5.0];
        let params = SvrParams::new(KernelKind::Rbf(Gamma::Auto), 100.0, 0.1);
        let model = SvrModel::fit(x.view(), y.view(), &params).unwrap();

        assert_eq!(model.n_support(), 0);
        let pred = model.predict_row(array![1.5].view()).unwrap();
        assert!((pred - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_gamma_auto_uses_feature_count() {
        let x = array![[0.0, 0.0, 0.0, 0.0], [1.0, 1.0, 1.0, 1.0]];
        let y = array![0.0, 1.0];
        let params = SvrParams::new(KernelKind::Rbf(Gamma::Auto), 1.0, 0.1);
        let model = SvrModel::fit(x.view(), y.view(), &params).unwrap();
        assert_eq!(model.kernel(), Kernel::Rbf { gamma: 0.25 });
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0];
        let params = SvrParams::new(KernelKind::Linear, 1.0, 0.1);
        assert!(SvrModel::fit(x.view(), y.view(), &params).is_err());
    }

    #[test]
    fn test_model_serde_round_trip() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 4.0, 9.0];
        let params = SvrParams::new(KernelKind::Rbf(Gamma::Auto), 100.0, 0.1);
        let model = SvrModel::fit(x.view(), y.view(), &params).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let back: SvrModel = serde_json::from_str(&json).unwrap();
        let probe = array![1.5];
        assert_eq!(
            model.predict_row(probe.view()).unwrap(),
            back.predict_row(probe.view()).unwrap()
        );
    }
}
