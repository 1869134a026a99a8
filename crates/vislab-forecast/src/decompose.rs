//! Classical moving-average seasonal decomposition.

use serde::Serialize;

use crate::error::{validate_series, ForecastError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionModel {
    Additive,
    Multiplicative,
}

/// `observed = trend + seasonal + resid` (additive) or
/// `observed = trend · seasonal · resid` (multiplicative). Trend and
/// residual are undefined for the first and last `period / 2` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decomposition {
    pub model: DecompositionModel,
    pub period: usize,
    pub observed: Vec<f64>,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub resid: Vec<Option<f64>>,
}

impl Decomposition {
    /// One full cycle of the seasonal component, starting at phase 0.
    pub fn seasonal_pattern(&self) -> &[f64] {
        &self.seasonal[..self.period.min(self.seasonal.len())]
    }

    /// `max(0, 1 − Var(resid) / Var(seasonal + resid))` over the points
    /// where the residual is defined (additive scale).
    pub fn seasonal_strength(&self) -> f64 {
        let pairs: Vec<(f64, f64)> = self
            .resid
            .iter()
            .zip(&self.seasonal)
            .filter_map(|(r, s)| r.map(|r| (r, *s)))
            .collect();
        let var = |xs: &[f64]| {
            let m = xs.iter().sum::<f64>() / xs.len() as f64;
            xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
        };
        let resid: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let combined: Vec<f64> = match self.model {
            DecompositionModel::Additive => pairs.iter().map(|(r, s)| r + s).collect(),
            DecompositionModel::Multiplicative => pairs.iter().map(|(r, s)| r * s).collect(),
        };
        let total = var(&combined);
        if pairs.is_empty() || total == 0.0 {
            return 0.0;
        }
        (1.0 - var(&resid) / total).max(0.0)
    }
}

/// Centred moving average; a 2×m average for even `period`.
fn centred_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let weights: Vec<f64> = if period % 2 == 0 {
        let mut w = vec![1.0 / period as f64; period + 1];
        w[0] /= 2.0;
        w[period] /= 2.0;
        w
    } else {
        vec![1.0 / period as f64; period]
    };
    let half = weights.len() / 2;
    (0..values.len())
        .map(|t| {
            if t < half || t + half >= values.len() {
                return None;
            }
            Some(
                weights
                    .iter()
                    .enumerate()
                    .map(|(i, w)| w * values[t + i - half])
                    .sum(),
            )
        })
        .collect()
}

/// Decompose `values` with seasonal `period`; needs two full periods.
pub fn seasonal_decompose(
    values: &[f64],
    period: usize,
    model: DecompositionModel,
) -> Result<Decomposition> {
    validate_series(values)?;
    if period < 2 {
        return Err(ForecastError::InvalidParameter(format!(
            "period must be at least 2, got {period}"
        )));
    }
    if values.len() < 2 * period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * period,
            got: values.len(),
        });
    }
    if model == DecompositionModel::Multiplicative && values.iter().any(|v| *v <= 0.0) {
        return Err(ForecastError::InvalidParameter(
            "multiplicative decomposition requires strictly positive values".to_string(),
        ));
    }

    let trend = centred_moving_average(values, period);
    let detrended: Vec<Option<f64>> = values
        .iter()
        .zip(&trend)
        .map(|(v, t)| {
            t.map(|t| match model {
                DecompositionModel::Additive => v - t,
                DecompositionModel::Multiplicative => v / t,
            })
        })
        .collect();

    let mut phase_means: Vec<f64> = (0..period)
        .map(|phase| {
            let xs: Vec<f64> = detrended.iter().skip(phase).step_by(period).flatten().copied().collect();
            xs.iter().sum::<f64>() / xs.len() as f64
        })
        .collect();
    let overall = phase_means.iter().sum::<f64>() / period as f64;
    for m in phase_means.iter_mut() {
        match model {
            DecompositionModel::Additive => *m -= overall,
            DecompositionModel::Multiplicative => *m /= overall,
        }
    }

    let seasonal: Vec<f64> = (0..values.len()).map(|t| phase_means[t % period]).collect();
    let resid = detrended
        .iter()
        .zip(&seasonal)
        .map(|(d, s)| {
            d.map(|d| match model {
                DecompositionModel::Additive => d - s,
                DecompositionModel::Multiplicative => d / s,
            })
        })
        .collect();

    Ok(Decomposition {
        model,
        period,
        observed: values.to_vec(),
        trend,
        seasonal,
        resid,
    })
}
