//! Constrained mean-variance allocation.
//!
//! Solves
//!
//! ```text
//! maximize    w·μ − λ·wᵀΣw
//! subject to  Σ_i w_i = 1
//!             lo ≤ w_i ≤ hi
//! ```
//!
//! with `lo = minimum_allocation` (or −∞ when shorting is allowed) and
//! `hi = maximum_allocation`.
//!
//! The solver is deterministic:
//! - Σ is first repaired to the nearest positive-semi-definite matrix
//!   (negative eigenvalues clipped to zero), then `regularization · I` is
//!   added so the problem is strictly concave with a unique optimum.
//! - Accelerated projected gradient ascent with step `1/L`, `L = 2λ·λmax`,
//!   starting from equal weights, with restart whenever the objective drops.
//! - The projection onto the capped simplex is exact: a bisection on the
//!   common shift `τ` in `w_i = clamp(v_i − τ, lo, hi)`.
//!
//! Infeasible bounds are rejected by [`AllocationConfig::validate`] before any
//! numeric work. A run that exhausts `max_iterations` returns
//! [`Error::NotConverged`]; there is no silent fallback to equal weights.

use std::collections::BTreeMap;

use log::{debug, warn};
use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::returns::CovarianceMatrix;
use crate::series::Ticker;

const FEASIBILITY_SLACK: f64 = 1e-12;
const MIN_CURVATURE: f64 = 1e-6;
const BISECTION_STEPS: usize = 200;

/// Allocation constraints and solver settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AllocationConfig {
    /// Weight of the variance penalty. Higher is more conservative.
    pub risk_aversion: f64,
    /// Per-asset lower bound when shorting is disallowed.
    pub minimum_allocation: f64,
    /// Per-asset upper bound.
    pub maximum_allocation: f64,
    /// Drop the lower bound entirely (negative weight = short position).
    pub allow_short: bool,
    /// Ridge added to the covariance diagonal.
    pub regularization: f64,
    /// Convergence threshold on the projected-gradient step.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 3.0,
            minimum_allocation: 0.05,
            maximum_allocation: 0.30,
            allow_short: false,
            regularization: 1e-8,
            tolerance: 1e-10,
            max_iterations: 20_000,
        }
    }
}

impl AllocationConfig {
    /// Check the configuration against a basket of `n` instruments.
    pub fn validate(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::Config("no instruments to allocate".into()));
        }
        if !self.risk_aversion.is_finite() || self.risk_aversion <= 0.0 {
            return Err(Error::Config("risk_aversion must be finite and > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.minimum_allocation) {
            return Err(Error::Config("minimum_allocation must be in [0.0, 1.0]".into()));
        }
        if !(0.0..=1.0).contains(&self.maximum_allocation) {
            return Err(Error::Config("maximum_allocation must be in [0.0, 1.0]".into()));
        }
        if self.minimum_allocation > self.maximum_allocation {
            return Err(Error::Config(
                "minimum_allocation cannot exceed maximum_allocation".into(),
            ));
        }
        let floor = n as f64 * self.minimum_allocation;
        if floor > 1.0 + FEASIBILITY_SLACK {
            return Err(Error::Config(format!(
                "impossible to satisfy minimum allocation: {n} instruments × {} = {floor} > 1.0",
                self.minimum_allocation
            )));
        }
        let cap = n as f64 * self.maximum_allocation;
        if n > 1 && cap < 1.0 - FEASIBILITY_SLACK {
            return Err(Error::Config(format!(
                "impossible to be fully invested: {n} instruments × {} = {cap} < 1.0",
                self.maximum_allocation
            )));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(Error::Config("regularization must be finite and >= 0".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(Error::Config("tolerance must be finite and > 0".into()));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be > 0".into()));
        }
        Ok(())
    }

    /// Per-asset `(lo, hi)` box.
    pub fn bounds(&self) -> (f64, f64) {
        let lo = if self.allow_short {
            f64::NEG_INFINITY
        } else {
            self.minimum_allocation
        };
        (lo, self.maximum_allocation)
    }
}

/// Optimizer output, aligned with the covariance ordering.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Allocation {
    pub tickers: Vec<Ticker>,
    pub weights: Vec<f64>,
    /// `w·μ`
    pub expected_return: f64,
    /// `wᵀΣw` on the unregularized matrix.
    pub variance: f64,
    pub iterations: usize,
    /// Set when full investment overrode the box (single instrument).
    pub bounds_relaxed: bool,
}

impl Allocation {
    pub fn weight(&self, ticker: &Ticker) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.weights[i])
    }

    pub fn weights_by_ticker(&self) -> BTreeMap<Ticker, f64> {
        self.tickers
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }
}

/// Allocate across the instruments of `cov` using `expected` as μ.
///
/// Every instrument of `cov` needs an expected return and vice versa.
pub fn allocate(
    expected: &BTreeMap<Ticker, f64>,
    cov: &CovarianceMatrix,
    config: &AllocationConfig,
) -> Result<Allocation> {
    let n = cov.dim();
    config.validate(n)?;

    if expected.len() != n {
        return Err(Error::Config(format!(
            "{} expected returns for a {n}x{n} covariance matrix",
            expected.len()
        )));
    }
    let mut mu = Vec::with_capacity(n);
    for t in cov.tickers() {
        let m = expected
            .get(t)
            .ok_or_else(|| Error::Config(format!("no expected return for {t}")))?;
        if !m.is_finite() {
            return Err(Error::numerical(
                "allocation",
                format!("expected return for {t} is not finite"),
            ));
        }
        mu.push(*m);
    }

    let (weights, iterations) = optimize_mean_variance(&mu, cov.values(), config)?;

    let bounds_relaxed = n == 1 && config.maximum_allocation < 1.0;
    if bounds_relaxed {
        warn!(
            "single instrument {}: full investment overrides maximum_allocation {}",
            cov.tickers()[0],
            config.maximum_allocation
        );
    }

    let sigma_w = mat_vec_mul(cov.values(), &weights);
    Ok(Allocation {
        tickers: cov.tickers().to_vec(),
        expected_return: dot(&weights, &mu),
        variance: dot(&weights, &sigma_w),
        weights,
        iterations,
        bounds_relaxed,
    })
}

/// Solve the mean-variance program on raw slices.
///
/// Returns the weights and the number of iterations used. `cov` must be
/// `n × n` for `n = mu.len()`.
pub fn optimize_mean_variance(
    mu: &[f64],
    cov: &[Vec<f64>],
    config: &AllocationConfig,
) -> Result<(Vec<f64>, usize)> {
    let n = mu.len();
    config.validate(n)?;
    if cov.len() != n || cov.iter().any(|row| row.len() != n) {
        return Err(Error::Config(format!("covariance matrix must be {n}x{n}")));
    }

    if n == 1 {
        return Ok((vec![1.0], 0));
    }

    let (sigma, lambda_max) = repair_covariance(cov, config.regularization)?;
    let (lo, hi) = config.bounds();
    let risk = config.risk_aversion;

    let curvature = (2.0 * risk * lambda_max).max(MIN_CURVATURE);
    let step = 1.0 / curvature;

    let gradient = |w: &[f64]| -> Vec<f64> {
        let sw = mat_vec_mul(&sigma, w);
        mu.iter().zip(&sw).map(|(m, s)| m - 2.0 * risk * s).collect()
    };
    let objective = |w: &[f64]| -> f64 {
        let sw = mat_vec_mul(&sigma, w);
        dot(w, mu) - risk * dot(w, &sw)
    };
    let ascend = |w: &[f64], g: &[f64]| -> Vec<f64> {
        let candidate: Vec<f64> = w.iter().zip(g).map(|(wi, gi)| wi + step * gi).collect();
        project_capped_simplex(&candidate, lo, hi)
    };

    let mut w = project_capped_simplex(&equal_weights(n), lo, hi);
    let mut z = w.clone();
    let mut t = 1.0_f64;
    let mut f_w = objective(&w);
    let mut residual = f64::INFINITY;
    let mut restarted = false;

    for it in 1..=config.max_iterations {
        let next = ascend(&z, &gradient(&z));
        let f_next = objective(&next);

        if f_next < f_w && !restarted {
            // Momentum overshot; restart from the last iterate.
            t = 1.0;
            z = w.clone();
            restarted = true;
            continue;
        }
        restarted = false;

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let beta = (t - 1.0) / t_next;
        z = next
            .iter()
            .zip(&w)
            .map(|(a, b)| a + beta * (a - b))
            .collect();
        t = t_next;

        let fixed = ascend(&next, &gradient(&next));
        residual = squared_distance(&fixed, &next).sqrt();
        w = next;
        f_w = f_next;

        if residual < config.tolerance {
            debug!("allocator converged in {it} iterations (residual {residual:e})");
            return Ok((w, it));
        }
    }

    Err(Error::NotConverged {
        context: "allocation".into(),
        iterations: config.max_iterations,
        residual,
    })
}

/// Nearest PSD matrix plus `ridge · I`, and its largest eigenvalue.
fn repair_covariance(cov: &[Vec<f64>], ridge: f64) -> Result<(Vec<Vec<f64>>, f64)> {
    let n = cov.len();
    if cov.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::numerical("allocation", "covariance has non-finite entries"));
    }

    let m = DMatrix::from_fn(n, n, |i, j| 0.5 * (cov[i][j] + cov[j][i]));
    let mut eig = m.symmetric_eigen();

    let min_eig = eig.eigenvalues.min();
    if min_eig < 0.0 {
        debug!("clipping covariance eigenvalue {min_eig:e} to zero");
    }
    for v in eig.eigenvalues.iter_mut() {
        *v = v.max(0.0) + ridge;
    }
    let lambda_max = eig.eigenvalues.max();
    let repaired = eig.recompose();

    let out: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| 0.5 * (repaired[(i, j)] + repaired[(j, i)])).collect())
        .collect();

    if !lambda_max.is_finite() || out.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::numerical("allocation", "covariance repair produced non-finite values"));
    }
    Ok((out, lambda_max))
}

/// Euclidean projection onto `{w : Σw = 1, lo ≤ w_i ≤ hi}`.
///
/// `lo` may be `-inf`. Assumes the set is non-empty (`n·lo ≤ 1 ≤ n·hi`).
fn project_capped_simplex(v: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let n = v.len();
    let clamp_sum = |tau: f64| v.iter().map(|x| (x - tau).clamp(lo, hi)).sum::<f64>();

    let v_min = v.iter().copied().fold(f64::INFINITY, f64::min);
    let v_max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // S(tau) is non-increasing: S(a) >= 1 >= S(b).
    let mut a = v_min - hi;
    let mut b = if lo.is_finite() {
        v_max - lo
    } else {
        a.max((v.iter().sum::<f64>() - 1.0) / n as f64)
    };

    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (a + b);
        if mid <= a || mid >= b {
            break;
        }
        if clamp_sum(mid) > 1.0 {
            a = mid;
        } else {
            b = mid;
        }
    }

    let tau = 0.5 * (a + b);
    let mut w: Vec<f64> = v.iter().map(|x| (x - tau).clamp(lo, hi)).collect();

    // Spread the leftover rounding over coordinates strictly inside the box.
    let err = 1.0 - w.iter().sum::<f64>();
    let free: Vec<usize> = (0..n).filter(|&i| w[i] > lo && w[i] < hi).collect();
    if !free.is_empty() {
        let share = err / free.len() as f64;
        for i in free {
            w[i] = (w[i] + share).clamp(lo, hi);
        }
    }
    w
}

fn mat_vec_mul(matrix: &[Vec<f64>], vec: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vec).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
}

fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}
