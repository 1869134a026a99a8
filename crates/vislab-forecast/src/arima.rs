//! Seasonal ARIMA fitted by conditional sum of squares.
//!
//! The model is `φ(B)Φ(Bˢ)(1−B)ᵈ(1−Bˢ)ᴰ (yₜ − μ) = θ(B)Θ(Bˢ) εₜ` with the
//! mean `μ` only estimated when `d + D < 2`. Coefficients are bounded to
//! ±0.99 and found with [`nelder_mead`].

use std::fmt;

use serde::Serialize;
use vislab_core::stats::{mean, quantile_normal, std_dev};

use crate::diff::{difference, integrate, integrate_seasonal, seasonal_difference};
use crate::error::{validate_series, ForecastError, Result};
use crate::optimize::{nelder_mead, NelderMeadConfig};

const COEF_BOUND: f64 = 0.99;

// ── Order ─────────────────────────────────────────────────────────────────────

/// `(p, d, q)(P, D, Q)[s]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub cap_p: usize,
    pub cap_d: usize,
    pub cap_q: usize,
    /// Seasonal period; 0 for a non-seasonal model.
    pub period: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            cap_p: 0,
            cap_d: 0,
            cap_q: 0,
            period: 0,
        }
    }

    pub fn with_seasonal(mut self, cap_p: usize, cap_d: usize, cap_q: usize, period: usize) -> Self {
        self.cap_p = cap_p;
        self.cap_d = cap_d;
        self.cap_q = cap_q;
        self.period = period;
        self
    }

    pub fn is_seasonal(&self) -> bool {
        self.period > 1 && (self.cap_p > 0 || self.cap_d > 0 || self.cap_q > 0)
    }

    /// Lag of the seasonal polynomials; 0 when the model is not seasonal.
    fn season(&self) -> usize {
        if self.is_seasonal() {
            self.period
        } else {
            0
        }
    }

    /// Number of AR and MA coefficients.
    pub fn num_coefficients(&self) -> usize {
        let seasonal = if self.is_seasonal() {
            self.cap_p + self.cap_q
        } else {
            0
        };
        self.p + self.q + seasonal
    }

    /// Observations consumed by differencing.
    fn differencing_loss(&self) -> usize {
        self.d + self.cap_d * self.season()
    }

    /// Largest lag of the expanded AR polynomial.
    fn ar_lags(&self) -> usize {
        self.p + self.cap_p * self.season()
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.is_seasonal() {
            write!(f, "({},{},{})[{}]", self.cap_p, self.cap_d, self.cap_q, self.period)?;
        }
        Ok(())
    }
}

// ── Polynomials ───────────────────────────────────────────────────────────────

/// Multiply two lag polynomials (index = power of B).
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign * Σ cᵢ B^(i·step)`.
fn lag_poly(coefs: &[f64], step: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefs.len() * step + 1];
    poly[0] = 1.0;
    for (i, c) in coefs.iter().enumerate() {
        poly[(i + 1) * step] = sign * c;
    }
    poly
}

/// `(1 − B^step)^times`.
fn diff_poly(step: usize, times: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..times {
        poly = poly_mul(&poly, &lag_poly(&[1.0], step, -1.0));
    }
    poly
}

/// Coefficients split out of the flat optimiser vector.
#[derive(Debug, Clone, Default, PartialEq)]
struct Coefficients {
    mean: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sar: Vec<f64>,
    sma: Vec<f64>,
}

impl Coefficients {
    fn from_params(params: &[f64], order: &ArimaOrder, with_mean: bool) -> Self {
        let mut rest = params;
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n.min(rest.len()));
            rest = tail;
            head.to_vec()
        };
        let mean = if with_mean { take(1)[0] } else { 0.0 };
        let seasonal = order.is_seasonal();
        Self {
            mean,
            ar: take(order.p),
            ma: take(order.q),
            sar: take(if seasonal { order.cap_p } else { 0 }),
            sma: take(if seasonal { order.cap_q } else { 0 }),
        }
    }

    /// Expanded `φ(B)Φ(Bˢ)` as `yₜ = Σ aₖ yₜ₋ₖ` coefficients, index 0 unused.
    fn ar_expanded(&self, season: usize) -> Vec<f64> {
        let poly = poly_mul(
            &lag_poly(&self.ar, 1, -1.0),
            &lag_poly(&self.sar, season.max(1), -1.0),
        );
        poly.iter().map(|c| -c).collect()
    }

    /// Expanded `θ(B)Θ(Bˢ)`, index 0 unused.
    fn ma_expanded(&self, season: usize) -> Vec<f64> {
        poly_mul(&lag_poly(&self.ma, 1, 1.0), &lag_poly(&self.sma, season.max(1), 1.0))
    }
}

/// One-step residuals of the (stationary) series `w`; entries before the
/// largest AR lag are zero.
fn css_residuals(w: &[f64], ar: &[f64], ma: &[f64], mean: f64, start: usize) -> Vec<f64> {
    let mut residuals = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut pred = mean;
        for k in 1..ar.len().min(t + 1) {
            pred += ar[k] * (w[t - k] - mean);
        }
        for k in 1..ma.len().min(t + 1) {
            pred += ma[k] * residuals[t - k];
        }
        residuals[t] = w[t] - pred;
    }
    residuals
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// Point forecasts with symmetric normal intervals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Fit {
    original: Vec<f64>,
    differenced: Vec<f64>,
    /// Residuals from the first usable observation on.
    residuals: Vec<f64>,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
}

/// A seasonal ARIMA model.
#[derive(Debug, Clone)]
pub struct Arima {
    order: ArimaOrder,
    with_mean: bool,
    coefs: Coefficients,
    fit: Option<Fit>,
}

impl Arima {
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            order,
            with_mean: order.d + order.cap_d * usize::from(order.is_seasonal()) < 2,
            coefs: Coefficients::default(),
            fit: None,
        }
    }

    /// Force estimation of the mean (or drift) term on or off.
    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.with_mean = with_mean;
        self
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Number of estimated parameters including the innovation variance.
    pub fn num_params(&self) -> usize {
        self.order.num_coefficients() + usize::from(self.with_mean) + 1
    }

    /// Smallest series length [`fit`](Self::fit) accepts.
    pub fn min_length(&self) -> usize {
        self.order.differencing_loss() + self.order.ar_lags() + self.num_params() + 2
    }

    /// Estimate the coefficients on `values`.
    pub fn fit(&mut self, values: &[f64]) -> Result<()> {
        validate_series(values)?;
        let needed = self.min_length();
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: values.len(),
            });
        }

        let order = self.order;
        let season = order.season();
        let w = difference(&seasonal_difference(values, order.cap_d, season), order.d);
        let start = order.ar_lags();

        // Optimise on a unit-scale copy so the tolerance is relative.
        let scale = match std_dev(&w) {
            s if s.is_finite() && s > 0.0 => s,
            _ => 1.0,
        };
        let scaled: Vec<f64> = w.iter().map(|v| v / scale).collect();

        let mut initial = Vec::with_capacity(self.num_params());
        let mut bounds = Vec::with_capacity(self.num_params());
        if self.with_mean {
            initial.push(mean(&scaled));
            bounds.push((f64::NEG_INFINITY, f64::INFINITY));
        }
        for count in [
            order.p,
            order.q,
            if season > 0 { order.cap_p } else { 0 },
            if season > 0 { order.cap_q } else { 0 },
        ] {
            for i in 0..count {
                initial.push(0.1 / (i + 1) as f64);
                bounds.push((-COEF_BOUND, COEF_BOUND));
            }
        }

        let with_mean = self.with_mean;
        let css = |params: &[f64]| {
            let c = Coefficients::from_params(params, &order, with_mean);
            css_residuals(
                &scaled,
                &c.ar_expanded(season),
                &c.ma_expanded(season),
                c.mean,
                start,
            )[start..]
                .iter()
                .map(|e| e * e)
                .sum::<f64>()
        };

        let params = if initial.is_empty() {
            initial
        } else {
            let config = NelderMeadConfig {
                max_iter: 1000,
                tolerance: 1e-8,
                ..Default::default()
            };
            nelder_mead(css, &initial, Some(&bounds), &config).point
        };

        let mut coefs = Coefficients::from_params(&params, &order, with_mean);
        coefs.mean *= scale;
        let residuals = css_residuals(
            &w,
            &coefs.ar_expanded(season),
            &coefs.ma_expanded(season),
            coefs.mean,
            start,
        )
        .split_off(start);

        let n_eff = residuals.len() as f64;
        let sigma2 = (residuals.iter().map(|e| e * e).sum::<f64>() / n_eff).max(f64::MIN_POSITIVE);
        let log_likelihood =
            -0.5 * n_eff * (1.0 + sigma2.ln() + (2.0 * std::f64::consts::PI).ln());
        let k = self.num_params() as f64;
        if !log_likelihood.is_finite() {
            return Err(ForecastError::ComputationError(format!(
                "{order}: non-finite likelihood"
            )));
        }

        self.coefs = coefs;
        self.fit = Some(Fit {
            original: values.to_vec(),
            differenced: w,
            residuals,
            sigma2,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * k,
            bic: -2.0 * log_likelihood + k * n_eff.ln(),
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&Fit> {
        self.fit.as_ref().ok_or(ForecastError::FitRequired)
    }

    pub fn aic(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.aic)
    }

    pub fn bic(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.bic)
    }

    pub fn sigma2(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.sigma2)
    }

    pub fn log_likelihood(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.log_likelihood)
    }

    /// In-sample one-step residuals.
    pub fn residuals(&self) -> Option<&[f64]> {
        self.fit.as_ref().map(|f| f.residuals.as_slice())
    }

    /// Named coefficients in the `ar.L1` / `ma.S.L52` convention.
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        let season = self.order.season();
        let mut out = Vec::new();
        if self.with_mean {
            out.push(("intercept".to_string(), self.coefs.mean));
        }
        let named = |prefix: &str, coefs: &[f64], step: usize| {
            coefs
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("{prefix}{}", (i + 1) * step), *c))
                .collect::<Vec<_>>()
        };
        out.extend(named("ar.L", &self.coefs.ar, 1));
        out.extend(named("ma.L", &self.coefs.ma, 1));
        out.extend(named("ar.S.L", &self.coefs.sar, season));
        out.extend(named("ma.S.L", &self.coefs.sma, season));
        out
    }

    /// Point forecasts for the next `horizon` observations.
    pub fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let fit = self.fitted()?;
        let season = self.order.season();
        let ar = self.coefs.ar_expanded(season);
        let ma = self.coefs.ma_expanded(season);
        let mu = self.coefs.mean;

        let mut w = fit.differenced.clone();
        let mut e = vec![0.0; w.len() - fit.residuals.len()];
        e.extend_from_slice(&fit.residuals);
        for _ in 0..horizon {
            let t = w.len();
            let mut pred = mu;
            for k in 1..ar.len().min(t + 1) {
                pred += ar[k] * (w[t - k] - mu);
            }
            for k in 1..ma.len().min(t + 1) {
                pred += ma[k] * e[t - k];
            }
            w.push(pred);
            e.push(0.0);
        }
        let future = w.split_off(fit.differenced.len());

        let seasonal_history = seasonal_difference(&fit.original, self.order.cap_d, season);
        let z = integrate(&future, &seasonal_history, self.order.d);
        Ok(integrate_seasonal(&z, &fit.original, self.order.cap_d, season))
    }

    /// ψ-weights of the full model including differencing; `ψ₀ = 1`.
    pub fn psi_weights(&self, n: usize) -> Vec<f64> {
        let season = self.order.season();
        let ar_poly = {
            let stationary: Vec<f64> = self
                .coefs
                .ar_expanded(season)
                .iter()
                .enumerate()
                .map(|(k, a)| if k == 0 { 1.0 } else { -a })
                .collect();
            let nonseasonal = poly_mul(&stationary, &diff_poly(1, self.order.d));
            poly_mul(&nonseasonal, &diff_poly(season.max(1), self.order.cap_d))
        };
        let ma_poly = self.coefs.ma_expanded(season);

        let mut psi = Vec::with_capacity(n);
        for j in 0..n {
            let mut value = if j == 0 { 1.0 } else { ma_poly.get(j).copied().unwrap_or(0.0) };
            for k in 1..ar_poly.len().min(j + 1) {
                value -= ar_poly[k] * psi[j - k];
            }
            psi.push(value);
        }
        psi
    }

    /// Forecasts with `(1 − alpha)` intervals, `var_h = σ² Σ_{j<h} ψⱼ²`.
    pub fn predict_with_intervals(&self, horizon: usize, alpha: f64) -> Result<Prediction> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha must be in (0, 1), got {alpha}"
            )));
        }
        let mean = self.predict(horizon)?;
        let sigma2 = self.fitted()?.sigma2;
        let z = quantile_normal(1.0 - alpha / 2.0);

        let mut cumulative = 0.0;
        let (lower, upper): (Vec<f64>, Vec<f64>) = self
            .psi_weights(horizon)
            .iter()
            .zip(&mean)
            .map(|(psi, m)| {
                cumulative += psi * psi;
                let half = z * (sigma2 * cumulative).sqrt();
                (m - half, m + half)
            })
            .unzip();
        Ok(Prediction { mean, lower, upper })
    }

    /// Plain-text summary table.
    pub fn summary(&self) -> String {
        let mut out = format!("{}\n", self.order);
        match &self.fit {
            None => out.push_str("(not fitted)\n"),
            Some(fit) => {
                out.push_str(&format!("{:<18}{}\n", "No. Observations:", fit.original.len()));
                out.push_str(&format!("{:<18}{:.3}\n", "Log Likelihood:", fit.log_likelihood));
                out.push_str(&format!("{:<18}{:.3}\n", "AIC:", fit.aic));
                out.push_str(&format!("{:<18}{:.3}\n", "BIC:", fit.bic));
                out.push_str(&format!("{:<18}{:.4}\n", "sigma2:", fit.sigma2));
                out.push_str("Coefficients:\n");
                for (name, value) in self.coefficients() {
                    out.push_str(&format!("  {name:<12}{value:>12.4}\n"));
                }
            }
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
