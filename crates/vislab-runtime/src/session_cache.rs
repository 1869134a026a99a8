//! Per-session memoization of series, fitted models and forecasts.
//!
//! Every value is keyed by the selection that produced it, so moving a
//! dashboard control back to an earlier selection is free. Entries never
//! expire: the dataset is loaded once per process and never changes.
//! Failures are not cached; the next call retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use vislab_core::models::Metric;
use vislab_data::dataset::Dataset;
use vislab_data::timeseries::{univariate, Univariate};
use vislab_forecast::{AutoArima, AutoArimaConfig, Forecast};

use crate::error::{Result, RuntimeError};

type SeriesKey = (String, Metric);
type ForecastKey = (String, Metric, usize);

/// Hit and miss counts across all three caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct SessionCache {
    dataset: Arc<Dataset>,
    config: AutoArimaConfig,
    series: HashMap<SeriesKey, Arc<Univariate>>,
    models: HashMap<SeriesKey, Arc<AutoArima>>,
    forecasts: HashMap<ForecastKey, Arc<Forecast>>,
    stats: CacheStats,
    last_error: Option<String>,
}

impl SessionCache {
    pub fn new(dataset: Arc<Dataset>, config: AutoArimaConfig) -> Self {
        Self {
            dataset,
            config,
            series: HashMap::new(),
            models: HashMap::new(),
            forecasts: HashMap::new(),
            stats: CacheStats::default(),
            last_error: None,
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn config(&self) -> &AutoArimaConfig {
        &self.config
    }

    /// Replace the model-selection configuration. Fitted models and
    /// forecasts were produced under the old one and are dropped.
    pub fn set_config(&mut self, config: AutoArimaConfig) {
        if config != self.config {
            self.config = config;
            self.models.clear();
            self.forecasts.clear();
            tracing::debug!("model configuration changed; models invalidated");
        }
    }

    /// Change the interval level. Models stay valid; forecasts do not.
    pub fn set_alpha(&mut self, alpha: f64) {
        if alpha != self.config.alpha {
            self.config.alpha = alpha;
            self.forecasts.clear();
        }
    }

    // ── Cached computations ───────────────────────────────────────────────

    /// Weekly values of `metric` for `state`, missing weeks skipped.
    pub fn timeseries(&mut self, state: &str, metric: Metric) -> Result<Arc<Univariate>> {
        let key = (state.to_string(), metric);
        if let Some(series) = self.series.get(&key) {
            self.stats.hits += 1;
            return Ok(Arc::clone(series));
        }
        self.stats.misses += 1;

        let series = self.record(univariate(&self.dataset, state, metric).map_err(RuntimeError::from))?;
        if series.is_empty() {
            return Err(self.record_err(RuntimeError::EmptySeries {
                state: state.to_string(),
                metric,
            }));
        }
        let series = Arc::new(series);
        self.series.insert(key, Arc::clone(&series));
        Ok(series)
    }

    /// Auto-ARIMA model fitted on [`timeseries`](Self::timeseries).
    pub fn model(&mut self, state: &str, metric: Metric) -> Result<Arc<AutoArima>> {
        let key = (state.to_string(), metric);
        if let Some(model) = self.models.get(&key) {
            self.stats.hits += 1;
            return Ok(Arc::clone(model));
        }
        self.stats.misses += 1;

        let series = self.timeseries(state, metric)?;
        let Some(last) = series.last_date() else {
            return Err(self.record_err(RuntimeError::EmptySeries {
                state: state.to_string(),
                metric,
            }));
        };
        let start = Instant::now();
        let mut model = AutoArima::new(self.config.clone());
        self.record(model.fit(&series.values, last).map_err(RuntimeError::from))?;
        tracing::info!(
            state,
            metric = metric.label(),
            seconds = start.elapsed().as_secs_f64(),
            "fitted forecast model"
        );

        let model = Arc::new(model);
        self.models.insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// `steps`-week forecast at the configured interval level.
    pub fn forecast(&mut self, state: &str, metric: Metric, steps: usize) -> Result<Arc<Forecast>> {
        let key = (state.to_string(), metric, steps);
        if let Some(forecast) = self.forecasts.get(&key) {
            self.stats.hits += 1;
            return Ok(Arc::clone(forecast));
        }
        self.stats.misses += 1;

        let model = self.model(state, metric)?;
        let forecast = Arc::new(self.record(model.predict(steps, self.config.alpha).map_err(RuntimeError::from))?);
        self.forecasts.insert(key, Arc::clone(&forecast));
        Ok(forecast)
    }

    // ── Bookkeeping ───────────────────────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of cached series, models and forecasts.
    pub fn len(&self) -> usize {
        self.series.len() + self.models.len() + self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached value; counters are kept.
    pub fn invalidate(&mut self) {
        self.series.clear();
        self.models.clear();
        self.forecasts.clear();
        tracing::debug!("session cache invalidated");
    }

    /// Message of the most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => Err(self.record_err(e)),
        }
    }

    fn record_err(&mut self, err: RuntimeError) -> RuntimeError {
        tracing::warn!(error = %err, "session computation failed");
        self.last_error = Some(err.to_string());
        err
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Datelike, Duration, NaiveDate};
    use vislab_core::models::{MetricValues, WeeklyRecord};

    /// 80 weeks of a trending, wavy COVID-19 series for Texas and a
    /// three-week series for Ohio.
    pub(crate) fn weekly_dataset() -> Dataset {
        let first = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let record = |state: &str, week: i64, covid: f64| {
            let end_date = first + Duration::weeks(week);
            WeeklyRecord {
                state: state.to_string(),
                start_date: end_date - Duration::days(6),
                end_date,
                mmwr_week: end_date.iso_week().week(),
                year: end_date.year(),
                month: end_date.month(),
                values: MetricValues {
                    covid19: Some(covid),
                    total: Some(2000.0),
                    ..Default::default()
                },
            }
        };
        let mut records: Vec<WeeklyRecord> = (0..80)
            .map(|w| record("Texas", w, 200.0 + 2.0 * w as f64 + 40.0 * (w as f64 / 4.0).sin()))
            .collect();
        records.extend((0..3).map(|w| record("Ohio", w, 10.0)));
        Dataset::new(records)
    }

    pub(crate) fn cache() -> SessionCache {
        SessionCache::new(Arc::new(weekly_dataset()), AutoArimaConfig::default().non_seasonal())
    }

    // ── timeseries ────────────────────────────────────────────────────────

    #[test]
    fn test_timeseries_miss_then_hit() {
        let mut cache = cache();
        let first = cache.timeseries("Texas", Metric::Covid19).unwrap();
        assert_eq!(first.len(), 80);
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 1 });

        let second = cache.timeseries("Texas", Metric::Covid19).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_timeseries_unknown_state_is_not_cached() {
        let mut cache = cache();
        assert!(matches!(
            cache.timeseries("Atlantis", Metric::Covid19),
            Err(RuntimeError::Data(_))
        ));
        assert!(cache.last_error().is_some());
        assert!(cache.is_empty());

        cache.timeseries("Texas", Metric::Covid19).unwrap();
        assert!(cache.last_error().is_none());
    }

    #[test]
    fn test_timeseries_empty_metric() {
        let mut cache = cache();
        let err = cache.timeseries("Texas", Metric::Influenza).unwrap_err();
        assert!(matches!(err, RuntimeError::EmptySeries { .. }));
        assert_eq!(err.to_string(), "No Influenza values for Texas");
    }

    // ── model / forecast ──────────────────────────────────────────────────

    #[test]
    fn test_model_fitted_once_per_selection() {
        let mut cache = cache();
        let a = cache.model("Texas", Metric::Covid19).unwrap();
        assert!(a.order().is_some());
        let b = cache.model("Texas", Metric::Covid19).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_forecast_keyed_by_steps() {
        let mut cache = cache();
        let ten = cache.forecast("Texas", Metric::Covid19, 10).unwrap();
        assert_eq!(ten.values.len(), 10);
        assert_eq!(ten.dates[0], NaiveDate::from_ymd_opt(2021, 7, 17).unwrap());

        let misses = cache.stats().misses;
        let five = cache.forecast("Texas", Metric::Covid19, 5).unwrap();
        assert_eq!(five.values.len(), 5);
        // New forecast, cached model.
        assert_eq!(cache.stats().misses, misses + 1);
        for (a, b) in five.values.iter().zip(&ten.values) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_short_series_fails() {
        let mut cache = cache();
        assert!(matches!(
            cache.model("Ohio", Metric::Covid19),
            Err(RuntimeError::Forecast(_))
        ));
        assert!(cache.last_error().unwrap().contains("10"));
    }

    // ── invalidation ──────────────────────────────────────────────────────

    #[test]
    fn test_invalidate_clears_entries() {
        let mut cache = cache();
        cache.forecast("Texas", Metric::Covid19, 3).unwrap();
        assert_eq!(cache.len(), 3);
        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_alpha_change_keeps_models() {
        let mut cache = cache();
        let narrow = cache.forecast("Texas", Metric::Covid19, 4).unwrap();
        cache.set_alpha(0.5);
        let wide = cache.forecast("Texas", Metric::Covid19, 4).unwrap();
        assert_eq!(wide.alpha, 0.5);
        assert!(wide.upper[0] - wide.lower[0] < narrow.upper[0] - narrow.lower[0]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_config_change_drops_models() {
        let mut cache = cache();
        cache.model("Texas", Metric::Covid19).unwrap();
        cache.set_config(AutoArimaConfig::default().non_seasonal().exhaustive());
        assert_eq!(cache.len(), 1);
    }
}
