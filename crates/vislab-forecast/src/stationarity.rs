//! Augmented Dickey–Fuller unit-root test (constant, no trend).

use serde::Serialize;
use vislab_core::stats::normal_cdf;

use crate::error::{validate_series, ForecastError, Result};

/// Asymptotic MacKinnon critical values for the constant-only regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

const CRITICAL_VALUES: CriticalValues = CriticalValues {
    one_pct: -3.43,
    five_pct: -2.86,
    ten_pct: -2.57,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub n_obs: usize,
    pub critical_values: CriticalValues,
}

impl AdfResult {
    /// Unit root rejected at the 5 % level.
    pub fn is_stationary(&self) -> bool {
        self.p_value < 0.05
    }
}

/// Default maximum lag, `12 · (n / 100)^¼`.
pub fn default_max_lags(n: usize) -> usize {
    (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize
}

/// Run the ADF regression `Δyₜ = α + β yₜ₋₁ + Σ γᵢ Δyₜ₋ᵢ + εₜ`.
///
/// The lag is chosen by AIC over `0..=max_lags` on a common sample, then the
/// regression is refitted on every available observation. The statistic is
/// the t-ratio of `β`.
pub fn adf_test(values: &[f64], max_lags: Option<usize>) -> Result<AdfResult> {
    validate_series(values)?;
    let n = values.len();
    let max_lags = max_lags
        .unwrap_or_else(|| default_max_lags(n))
        .min(n.saturating_sub(6) / 2);
    let needed = max_lags + 6;
    if n < needed {
        return Err(ForecastError::InsufficientData { needed, got: n });
    }

    let diff: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best = (0, f64::INFINITY);
    for lag in 0..=max_lags {
        if let Some(fit) = adf_regression(values, &diff, lag, max_lags) {
            let nobs = fit.nobs as f64;
            let aic = nobs * (fit.rss / nobs).ln() + 2.0 * (lag + 2) as f64;
            if aic < best.1 {
                best = (lag, aic);
            }
        }
    }
    let used_lag = best.0;

    let fit = adf_regression(values, &diff, used_lag, used_lag).ok_or_else(|| {
        ForecastError::ComputationError("singular ADF regression".to_string())
    })?;
    let statistic = fit.beta / fit.se_beta;
    if !statistic.is_finite() {
        return Err(ForecastError::ComputationError(
            "degenerate ADF statistic".to_string(),
        ));
    }

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag,
        n_obs: fit.nobs,
        critical_values: CRITICAL_VALUES,
    })
}

struct AdfFit {
    beta: f64,
    se_beta: f64,
    rss: f64,
    nobs: usize,
}

/// OLS of `Δyₜ` on `[1, yₜ₋₁, Δyₜ₋₁..Δyₜ₋ₗₐ₉]` for `t` starting after
/// `skip` lags.
fn adf_regression(values: &[f64], diff: &[f64], lag: usize, skip: usize) -> Option<AdfFit> {
    let k = lag + 2;
    let rows: Vec<(Vec<f64>, f64)> = (skip..diff.len())
        .map(|t| {
            let mut x = Vec::with_capacity(k);
            x.push(1.0);
            x.push(values[t]);
            x.extend((1..=lag).map(|i| diff[t - i]));
            (x, diff[t])
        })
        .collect();
    let nobs = rows.len();
    if nobs <= k {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (x, y) in &rows {
        for i in 0..k {
            xty[i] += x[i] * y;
            for j in 0..k {
                xtx[i][j] += x[i] * x[j];
            }
        }
    }

    let coef = solve(&xtx, &xty)?;
    let mut unit = vec![0.0; k];
    unit[1] = 1.0;
    let inv_col = solve(&xtx, &unit)?;

    let rss: f64 = rows
        .iter()
        .map(|(x, y)| {
            let fitted: f64 = x.iter().zip(&coef).map(|(a, b)| a * b).sum();
            (y - fitted).powi(2)
        })
        .sum();
    let sigma2 = rss / (nobs - k) as f64;
    let se_beta = (sigma2 * inv_col[1]).sqrt();
    if rss <= 0.0 || !se_beta.is_finite() || se_beta == 0.0 {
        return None;
    }
    Some(AdfFit {
        beta: coef[1],
        se_beta,
        rss,
        nobs,
    })
}

/// Gaussian elimination with partial pivoting; `None` when singular.
fn solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut m: Vec<Vec<f64>> = a
        .iter()
        .zip(b)
        .map(|(row, &rhs)| {
            let mut r = row.clone();
            r.push(rhs);
            r
        })
        .collect();
    let scale = a
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            m[i][col]
                .abs()
                .partial_cmp(&m[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() < 1e-12 * scale {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for c in col..=n {
                m[row][c] -= factor * m[col][c];
            }
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|c| m[row][c] * x[c]).sum();
        x[row] = (m[row][n] - tail) / m[row][row];
    }
    Some(x)
}

/// MacKinnon (1994) response-surface p-value for the constant-only case.
fn mackinnon_p_value(stat: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if stat <= TAU_STAR { &SMALL_P } else { &LARGE_P };
    let z = coefs.iter().rev().fold(0.0, |acc, c| acc * stat + c);
    normal_cdf(z)
}
