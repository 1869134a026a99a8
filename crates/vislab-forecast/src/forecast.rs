//! Dated forecasts.

use chrono::NaiveDate;
use serde::Serialize;
use vislab_core::time_utils::next_week_endings;

use crate::arima::Prediction;

/// Forecast for the weeks following the last observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Week-ending Saturdays after the last observed date.
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Intervals cover `1 − alpha`.
    pub alpha: f64,
}

impl Forecast {
    pub fn from_prediction(last_observed: NaiveDate, prediction: Prediction, alpha: f64) -> Self {
        Self {
            dates: next_week_endings(last_observed, prediction.mean.len()),
            values: prediction.mean,
            lower: prediction.lower,
            upper: prediction.upper,
            alpha,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy with the point forecast and lower bound clipped at zero.
    pub fn clamped_at_zero(&self) -> Self {
        let clip = |xs: &[f64]| xs.iter().map(|x| x.max(0.0)).collect();
        Self {
            values: clip(&self.values),
            lower: clip(&self.lower),
            ..self.clone()
        }
    }

    /// `(date, value, lower, upper)` rows.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, f64, f64, f64)> + '_ {
        self.dates
            .iter()
            .zip(&self.values)
            .zip(self.lower.iter().zip(&self.upper))
            .map(|((d, v), (l, u))| (*d, *v, *l, *u))
    }

    /// Largest upper bound, 0 when empty.
    pub fn max_upper(&self) -> f64 {
        self.upper.iter().copied().fold(0.0, f64::max)
    }
}
