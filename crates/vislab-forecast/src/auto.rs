//! Automatic ARIMA/SARIMA order selection.
//!
//! `d` is chosen by repeated ADF tests, `D` by the seasonal variance
//! reduction rule; `(p, q, P, Q)` by a stepwise neighbourhood search (or an
//! exhaustive grid) scored with AIC or BIC. Orders that fail to fit are
//! skipped.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::arima::{Arima, ArimaOrder};
use crate::diff::difference;
use crate::error::{validate_series, ForecastError, Result};
use crate::forecast::Forecast;
use crate::stationarity::adf_test;

const MAX_STEPS: usize = 100;

/// Information criterion used to rank candidate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Aic,
    Bic,
}

impl Criterion {
    fn score(self, model: &Arima) -> Option<f64> {
        match self {
            Criterion::Aic => model.aic(),
            Criterion::Bic => model.bic(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Criterion::Aic => "AIC",
            Criterion::Bic => "BIC",
        })
    }
}

impl FromStr for Criterion {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aic" => Ok(Criterion::Aic),
            "bic" => Ok(Criterion::Bic),
            other => Err(ForecastError::InvalidParameter(format!(
                "unknown information criterion '{other}'"
            ))),
        }
    }
}

/// Search limits and ranking for [`AutoArima`].
///
/// The default search is non-seasonal; `period` only takes effect once
/// [`AutoArimaConfig::with_seasonal_period`] turns the seasonal search on.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoArimaConfig {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub max_cap_p: usize,
    pub max_cap_d: usize,
    pub max_cap_q: usize,
    /// Upper bound on `p + q + P + Q`.
    pub max_order: usize,
    pub period: usize,
    pub seasonal: bool,
    pub stepwise: bool,
    pub criterion: Criterion,
    /// Default interval level used by [`AutoArima::predict`] callers.
    pub alpha: f64,
}

impl Default for AutoArimaConfig {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_d: 2,
            max_q: 5,
            max_cap_p: 2,
            max_cap_d: 1,
            max_cap_q: 2,
            max_order: 5,
            period: 52,
            seasonal: false,
            stepwise: true,
            criterion: Criterion::Aic,
            alpha: 0.05,
        }
    }
}

impl AutoArimaConfig {
    pub fn non_seasonal(mut self) -> Self {
        self.seasonal = false;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Also search seasonal orders with the given period.
    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.seasonal = true;
        self.period = period;
        self
    }

    pub fn exhaustive(mut self) -> Self {
        self.stepwise = false;
        self
    }
}

/// Build an order; `s == 0` yields a non-seasonal one.
#[allow(clippy::too_many_arguments)]
fn sarima(p: usize, d: usize, q: usize, cap_p: usize, cap_d: usize, cap_q: usize, s: usize) -> ArimaOrder {
    if s == 0 {
        ArimaOrder::new(p, d, q)
    } else {
        ArimaOrder::new(p, d, q).with_seasonal(cap_p, cap_d, cap_q, s)
    }
}

/// One evaluated candidate; `score` is `None` when the fit failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub order: ArimaOrder,
    pub score: Option<f64>,
    pub seconds: f64,
}

/// Auto-selected seasonal ARIMA.
#[derive(Debug, Clone)]
pub struct AutoArima {
    config: AutoArimaConfig,
    model: Option<Arima>,
    last_observed: Option<NaiveDate>,
    trace: Vec<Candidate>,
}

impl AutoArima {
    pub fn new(config: AutoArimaConfig) -> Self {
        Self {
            config,
            model: None,
            last_observed: None,
            trace: Vec::new(),
        }
    }

    pub fn config(&self) -> &AutoArimaConfig {
        &self.config
    }

    /// The selected model after a successful [`fit`](Self::fit).
    pub fn model(&self) -> Option<&Arima> {
        self.model.as_ref()
    }

    pub fn order(&self) -> Option<ArimaOrder> {
        self.model.as_ref().map(Arima::order)
    }

    /// Every candidate evaluated by the last fit, in evaluation order.
    pub fn trace(&self) -> &[Candidate] {
        &self.trace
    }

    /// Number of non-seasonal differences: difference until the ADF test
    /// rejects a unit root, at most `max_d` times.
    pub fn select_d(values: &[f64], max_d: usize) -> usize {
        let mut d = 0;
        while d < max_d {
            let series = difference(values, d);
            match adf_test(&series, None) {
                Ok(result) if !result.is_stationary() => d += 1,
                Ok(_) => break,
                Err(err) => {
                    debug!("ADF test failed at d={}: {}", d, err);
                    break;
                }
            }
        }
        d
    }

    /// Seasonal differences: 1 when lag-`period` differencing reduces the
    /// variance below 70 % of the original.
    pub fn select_cap_d(values: &[f64], period: usize, max_cap_d: usize) -> usize {
        if max_cap_d == 0 || period < 2 || values.len() < 2 * period {
            return 0;
        }
        let population_var = |xs: &[f64]| {
            let m = xs.iter().sum::<f64>() / xs.len() as f64;
            xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
        };
        let diffs: Vec<f64> = (period..values.len())
            .map(|i| values[i] - values[i - period])
            .collect();
        usize::from(population_var(&diffs) < 0.7 * population_var(values))
    }

    fn seasonal_period(&self, n: usize) -> usize {
        let period = self.config.period;
        if !self.config.seasonal || period < 2 {
            0
        } else if n < 3 * period {
            info!(
                "Series of {} points is shorter than three seasons of {}; fitting non-seasonal models",
                n, period
            );
            0
        } else {
            period
        }
    }

    fn within_limits(&self, o: &ArimaOrder) -> bool {
        let c = &self.config;
        o.p <= c.max_p
            && o.q <= c.max_q
            && o.cap_p <= c.max_cap_p
            && o.cap_q <= c.max_cap_q
            && o.p + o.q + o.cap_p + o.cap_q <= c.max_order
    }

    fn evaluate(&mut self, values: &[f64], order: ArimaOrder) -> Option<(Arima, f64)> {
        let start = Instant::now();
        let mut model = Arima::new(order);
        let outcome = model
            .fit(values)
            .ok()
            .and_then(|_| self.config.criterion.score(&model))
            .filter(|s| s.is_finite());
        let seconds = start.elapsed().as_secs_f64();
        match outcome {
            Some(score) => debug!(
                " {} : {}={:.3}, Time={:.2} sec",
                order, self.config.criterion, score, seconds
            ),
            None => debug!(" {} : {}=inf, Time={:.2} sec", order, self.config.criterion, seconds),
        }
        self.trace.push(Candidate {
            order,
            score: outcome,
            seconds,
        });
        outcome.map(|score| (model, score))
    }

    fn starting_orders(&self, d: usize, cap_d: usize, s: usize) -> Vec<ArimaOrder> {
        let seasonal = usize::from(s > 0);
        vec![
            sarima(2, d, 2, seasonal, cap_d, seasonal, s),
            sarima(0, d, 0, 0, cap_d, 0, s),
            sarima(1, d, 0, seasonal, cap_d, 0, s),
            sarima(0, d, 1, 0, cap_d, seasonal, s),
        ]
    }

    fn neighbours(&self, o: ArimaOrder, s: usize) -> Vec<ArimaOrder> {
        let step = |v: usize, delta: i32| -> Option<usize> {
            let next = v as i64 + delta as i64;
            (next >= 0).then_some(next as usize)
        };
        let mut deltas: Vec<[i32; 4]> = vec![
            [-1, 0, 0, 0],
            [1, 0, 0, 0],
            [0, -1, 0, 0],
            [0, 1, 0, 0],
            [-1, -1, 0, 0],
            [1, 1, 0, 0],
        ];
        if s > 0 {
            deltas.extend([
                [0, 0, -1, 0],
                [0, 0, 1, 0],
                [0, 0, 0, -1],
                [0, 0, 0, 1],
                [0, 0, -1, -1],
                [0, 0, 1, 1],
            ]);
        }
        deltas
            .into_iter()
            .filter_map(|[dp, dq, dcp, dcq]| {
                Some(sarima(
                    step(o.p, dp)?,
                    o.d,
                    step(o.q, dq)?,
                    step(o.cap_p, dcp)?,
                    o.cap_d,
                    step(o.cap_q, dcq)?,
                    s,
                ))
            })
            .collect()
    }

    fn exhaustive_orders(&self, d: usize, cap_d: usize, s: usize) -> Vec<ArimaOrder> {
        let c = &self.config;
        let (max_cp, max_cq) = if s > 0 { (c.max_cap_p, c.max_cap_q) } else { (0, 0) };
        let mut out = Vec::new();
        for p in 0..=c.max_p {
            for q in 0..=c.max_q {
                for cap_p in 0..=max_cp {
                    for cap_q in 0..=max_cq {
                        out.push(sarima(p, d, q, cap_p, cap_d, cap_q, s));
                    }
                }
            }
        }
        out
    }

    /// Select and fit the best model for `values`, whose last observation
    /// is the week ending `last_observed`.
    pub fn fit(&mut self, values: &[f64], last_observed: NaiveDate) -> Result<()> {
        validate_series(values)?;
        if values.len() < 10 {
            return Err(ForecastError::InsufficientData {
                needed: 10,
                got: values.len(),
            });
        }
        self.model = None;
        self.trace.clear();
        let start = Instant::now();

        let s = self.seasonal_period(values.len());
        let d = Self::select_d(values, self.config.max_d);
        let cap_d = if s > 0 {
            Self::select_cap_d(values, s, self.config.max_cap_d)
        } else {
            0
        };
        debug!("Selected d={} D={} (period {})", d, cap_d, s);

        let mut seen = HashSet::new();
        let mut best: Option<(Arima, f64)> = None;
        let mut consider = |this: &mut Self, order: ArimaOrder, best: &mut Option<(Arima, f64)>| -> bool {
            if !this.within_limits(&order) || !seen.insert(order) {
                return false;
            }
            match this.evaluate(values, order) {
                Some((model, score)) if best.as_ref().map_or(true, |b| score < b.1) => {
                    *best = Some((model, score));
                    true
                }
                _ => false,
            }
        };

        if self.config.stepwise {
            for order in self.starting_orders(d, cap_d, s) {
                consider(self, order, &mut best);
            }
            for _ in 0..MAX_STEPS {
                let Some(current) = best.as_ref().map(|b| b.0.order()) else {
                    break;
                };
                let mut improved = false;
                for order in self.neighbours(current, s) {
                    improved |= consider(self, order, &mut best);
                }
                if !improved {
                    break;
                }
            }
        } else {
            for order in self.exhaustive_orders(d, cap_d, s) {
                consider(self, order, &mut best);
            }
        }

        let (model, score) = best.ok_or_else(|| {
            ForecastError::ComputationError("no candidate ARIMA model could be fitted".to_string())
        })?;
        info!(
            "Best model: {} ({}={:.3}, {} candidates, {:.2} sec)",
            model.order(),
            self.config.criterion,
            score,
            self.trace.len(),
            start.elapsed().as_secs_f64()
        );
        self.model = Some(model);
        self.last_observed = Some(last_observed);
        Ok(())
    }

    /// Forecast `n` weeks ahead with `(1 − alpha)` intervals.
    pub fn predict(&self, n: usize, alpha: f64) -> Result<Forecast> {
        let (model, last) = self
            .model
            .as_ref()
            .zip(self.last_observed)
            .ok_or(ForecastError::FitRequired)?;
        let prediction = model.predict_with_intervals(n, alpha)?;
        Ok(Forecast::from_prediction(last, prediction, alpha))
    }

    /// Summary of the selected model, or a note when nothing is fitted.
    pub fn summary(&self) -> String {
        match &self.model {
            Some(model) => format!(
                "Best model: {}\nCandidates evaluated: {}\n{}",
                model.order(),
                self.trace.len(),
                model.summary()
            ),
            None => "No model fitted".to_string(),
        }
    }
}

impl Default for AutoArima {
    fn default() -> Self {
        Self::new(AutoArimaConfig::default())
    }
}
