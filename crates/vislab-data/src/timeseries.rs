//! Per-state time series extracted from the weekly dataset.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use vislab_core::error::{Result, VislabError};
use vislab_core::models::Metric;

use crate::dataset::Dataset;

/// Weekly values of several metrics for one state, indexed by End Date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiTimeSeries {
    pub state: String,
    pub metrics: Vec<Metric>,
    pub dates: Vec<NaiveDate>,
    /// `columns[i][t]` is metric `metrics[i]` at `dates[t]`.
    pub columns: Vec<Vec<Option<f64>>>,
}

impl MultiTimeSeries {
    pub fn column(&self, metric: Metric) -> Option<&[Option<f64>]> {
        self.metrics
            .iter()
            .position(|&m| m == metric)
            .map(|i| self.columns[i].as_slice())
    }

    /// Largest value across all columns, 0 when empty.
    pub fn max_value(&self) -> f64 {
        self.columns
            .iter()
            .flatten()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// One metric of one state as parallel date/value vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Univariate {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl Univariate {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Per-End-Date values of `metrics` for `state`, sorted by date.
///
/// Fails with `DuplicateEndDate` when the state has more than one row for
/// the same week ending.
pub fn create_multi_time_series(
    dataset: &Dataset,
    metrics: &[Metric],
    state: &str,
) -> Result<MultiTimeSeries> {
    let mut rows = dataset.filter_by_state(state)?;

    let mut seen = HashSet::with_capacity(rows.len());
    for row in &rows {
        if !seen.insert(row.end_date) {
            return Err(VislabError::DuplicateEndDate {
                state: state.to_string(),
                date: row.end_date.to_string(),
            });
        }
    }

    rows.sort_by_key(|r| r.end_date);
    let dates = rows.iter().map(|r| r.end_date).collect();
    let columns = metrics
        .iter()
        .map(|&m| rows.iter().map(|r| r.value(m)).collect())
        .collect();

    Ok(MultiTimeSeries {
        state: state.to_string(),
        metrics: metrics.to_vec(),
        dates,
        columns,
    })
}

/// `(dates, values)` of one metric; weeks without a value are skipped.
pub fn univariate(dataset: &Dataset, state: &str, metric: Metric) -> Result<Univariate> {
    let multi = create_multi_time_series(dataset, &[metric], state)?;
    let (dates, values) = multi
        .dates
        .iter()
        .zip(&multi.columns[0])
        .filter_map(|(d, v)| v.map(|v| (*d, v)))
        .unzip();
    Ok(Univariate { dates, values })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use vislab_core::models::{MetricValues, WeeklyRecord};

    fn record(state: &str, day: u32, covid: Option<f64>) -> WeeklyRecord {
        let end_date = NaiveDate::from_ymd_opt(2021, 1, day).unwrap();
        WeeklyRecord {
            state: state.to_string(),
            start_date: end_date - chrono::Duration::days(6),
            end_date,
            mmwr_week: 1,
            year: end_date.year(),
            month: end_date.month(),
            values: MetricValues {
                covid19: covid,
                total: Some(1500.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_multi_time_series_sorted_columns() {
        let ds = Dataset::new(vec![
            record("Texas", 16, Some(2.0)),
            record("Texas", 9, Some(1.0)),
            record("Ohio", 9, Some(9.0)),
        ]);
        let ts = create_multi_time_series(&ds, &[Metric::Covid19, Metric::Total], "Texas").unwrap();
        assert_eq!(ts.len(), 2);
        assert!(ts.dates[0] < ts.dates[1]);
        assert_eq!(ts.column(Metric::Covid19).unwrap(), &[Some(1.0), Some(2.0)]);
        assert_eq!(ts.max_value(), 1500.0);
        assert!(ts.column(Metric::Influenza).is_none());
    }

    #[test]
    fn test_multi_time_series_duplicate_end_date() {
        let ds = Dataset::new(vec![record("Texas", 9, Some(1.0)), record("Texas", 9, Some(2.0))]);
        let err = create_multi_time_series(&ds, &[Metric::Covid19], "Texas").unwrap_err();
        assert!(matches!(err, VislabError::DuplicateEndDate { .. }));
        assert!(err.to_string().contains("2021-01-09"));
    }

    #[test]
    fn test_multi_time_series_unknown_state() {
        let ds = Dataset::new(vec![record("Texas", 9, Some(1.0))]);
        assert!(matches!(
            create_multi_time_series(&ds, &[Metric::Covid19], "Ohio"),
            Err(VislabError::UnknownState(_))
        ));
    }

    #[test]
    fn test_univariate_skips_missing() {
        let ds = Dataset::new(vec![
            record("Texas", 2, Some(1.0)),
            record("Texas", 9, None),
            record("Texas", 16, Some(3.0)),
        ]);
        let series = univariate(&ds, "Texas", Metric::Covid19).unwrap();
        assert_eq!(series.values, vec![1.0, 3.0]);
        assert_eq!(series.last_date(), NaiveDate::from_ymd_opt(2021, 1, 16));
    }
}
