//! Diagnostics for model residuals: summary statistics, autocorrelation,
//! Ljung–Box and Jarque–Bera.

use serde::Serialize;
use vislab_core::stats::{chi_square_sf, mean, percentile, sorted, std_dev};

/// `count / mean / std / min / 25% / 50% / 75% / max`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Describe {
    let s = sorted(values);
    Describe {
        count: values.len(),
        mean: mean(values),
        std: std_dev(values),
        min: s.first().copied().unwrap_or(f64::NAN),
        q25: percentile(&s, 25.0),
        median: percentile(&s, 50.0),
        q75: percentile(&s, 75.0),
        max: s.last().copied().unwrap_or(f64::NAN),
    }
}

/// Sample autocorrelation for lags `0..=lags`. A constant series has
/// autocorrelation 1 at lag 0 and 0 elsewhere.
pub fn acf(values: &[f64], lags: usize) -> Vec<f64> {
    let n = values.len();
    let m = mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
    let denom: f64 = centered.iter().map(|v| v * v).sum();

    (0..=lags.min(n.saturating_sub(1)))
        .map(|k| {
            if k == 0 {
                return 1.0;
            }
            if denom == 0.0 {
                return 0.0;
            }
            centered
                .iter()
                .skip(k)
                .zip(&centered)
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / denom
        })
        .collect()
}

/// Ljung–Box portmanteau test result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LjungBoxResult {
    pub statistic: f64,
    pub p_value: f64,
    pub lags: usize,
    pub df: usize,
}

impl LjungBoxResult {
    /// No significant autocorrelation at level `alpha`.
    pub fn is_white_noise(&self, alpha: f64) -> bool {
        self.p_value > alpha
    }
}

/// `Q = n(n+2) Σ ρ̂ₖ² / (n−k)` against χ² with `lags − fitted_params`
/// degrees of freedom (at least 1). `lags` defaults to `min(10, n/5)`.
pub fn ljung_box(residuals: &[f64], lags: Option<usize>, fitted_params: usize) -> LjungBoxResult {
    let n = residuals.len();
    if n < 3 {
        return LjungBoxResult {
            statistic: f64::NAN,
            p_value: f64::NAN,
            lags: 0,
            df: 0,
        };
    }
    let lags = lags.unwrap_or_else(|| 10.min(n / 5).max(1)).min(n - 1);
    let rho = acf(residuals, lags);
    let q = n as f64
        * (n + 2) as f64
        * (1..=lags)
            .map(|k| rho[k] * rho[k] / (n - k) as f64)
            .sum::<f64>();
    let df = lags.saturating_sub(fitted_params).max(1);
    LjungBoxResult {
        statistic: q,
        p_value: chi_square_sf(q, df as f64),
        lags,
        df,
    }
}

/// Jarque–Bera normality test result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityResult {
    pub statistic: f64,
    pub p_value: f64,
    pub skewness: f64,
    /// Kurtosis (normal = 3).
    pub kurtosis: f64,
}

impl NormalityResult {
    /// Normality not rejected at 5 %.
    pub fn is_normal(&self) -> bool {
        self.p_value > 0.05
    }
}

/// `JB = n/6 (S² + (K − 3)²/4)` against χ²(2).
pub fn jarque_bera(values: &[f64]) -> NormalityResult {
    let n = values.len() as f64;
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    if values.len() < 3 || m2 == 0.0 {
        return NormalityResult {
            statistic: f64::NAN,
            p_value: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
        };
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2);
    let statistic = n / 6.0 * (skewness.powi(2) + (kurtosis - 3.0).powi(2) / 4.0);
    NormalityResult {
        statistic,
        p_value: chi_square_sf(statistic, 2.0),
        skewness,
        kurtosis,
    }
}

/// All residual checks in one place, as printed by `forecast --diagnostics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualReport {
    pub describe: Describe,
    pub acf: Vec<f64>,
    pub ljung_box: LjungBoxResult,
    pub normality: NormalityResult,
}

pub fn residual_report(residuals: &[f64], acf_lags: usize, fitted_params: usize) -> ResidualReport {
    ResidualReport {
        describe: describe(residuals),
        acf: acf(residuals, acf_lags),
        ljung_box: ljung_box(residuals, None, fitted_params),
        normality: jarque_bera(residuals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn noise(n: usize) -> Vec<f64> {
        let mut state: u64 = 3;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    // ── describe / acf ────────────────────────────────────────────────────────

    #[test]
    fn test_describe() {
        let d = describe(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(d.count, 5);
        assert_relative_eq!(d.mean, 3.0);
        assert_relative_eq!(d.std, 2.5_f64.sqrt());
        assert_relative_eq!(d.q25, 2.0);
        assert_relative_eq!(d.median, 3.0);
        assert_relative_eq!(d.max, 5.0);
    }

    #[test]
    fn test_acf_alternating() {
        let values: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let rho = acf(&values, 2);
        assert_eq!(rho.len(), 3);
        assert_relative_eq!(rho[0], 1.0);
        assert_relative_eq!(rho[1], -0.99, epsilon = 1e-12);
        assert_relative_eq!(rho[2], 0.98, epsilon = 1e-12);
    }

    #[test]
    fn test_acf_constant() {
        assert_eq!(acf(&[2.0; 5], 3), vec![1.0, 0.0, 0.0, 0.0]);
    }

    // ── Ljung–Box ─────────────────────────────────────────────────────────────

    #[test]
    fn test_ljung_box_white_noise() {
        let result = ljung_box(&noise(200), Some(10), 0);
        assert_eq!(result.df, 10);
        assert!(result.is_white_noise(0.01), "p = {}", result.p_value);
    }

    #[test]
    fn test_ljung_box_autocorrelated() {
        let e = noise(200);
        let mut values = vec![0.0];
        for t in 1..200 {
            values.push(0.9 * values[t - 1] + e[t]);
        }
        let result = ljung_box(&values, Some(10), 2);
        assert_eq!(result.df, 8);
        assert!(!result.is_white_noise(0.05));
    }

    #[test]
    fn test_ljung_box_short() {
        assert!(ljung_box(&[1.0, 2.0], None, 0).statistic.is_nan());
    }

    // ── Jarque–Bera ───────────────────────────────────────────────────────────

    #[test]
    fn test_jarque_bera_symmetric_sample() {
        // Symmetric sample: zero skewness.
        let values = [-2.0, -1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0];
        let result = jarque_bera(&values);
        assert_relative_eq!(result.skewness, 0.0, epsilon = 1e-12);
        assert!(result.is_normal());
    }

    #[test]
    fn test_jarque_bera_skewed_sample() {
        let mut values = vec![0.0; 95];
        values.extend([50.0, 60.0, 70.0, 80.0, 90.0]);
        let result = jarque_bera(&values);
        assert!(result.skewness > 2.0);
        assert!(!result.is_normal());
    }

    #[test]
    fn test_residual_report() {
        let report = residual_report(&noise(50), 30, 1);
        assert_eq!(report.acf.len(), 31);
        assert_eq!(report.describe.count, 50);
        assert!(report.ljung_box.p_value.is_finite());
    }
}
