//! Grouped sums over the weekly dataset: per-month totals, per-year
//! monthly curves, state comparisons and relative death counts.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use vislab_core::colors::{gradient_with_gaps, MetricColors};
use vislab_core::error::Result;
use vislab_core::models::{Metric, MetricValues, WeeklyRecord};

use crate::dataset::Dataset;

// ── Monthly totals ────────────────────────────────────────────────────────────

/// Every metric summed over one (Year, Month) of one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub year: i32,
    pub month: u32,
    pub values: MetricValues,
    /// Weeks that contributed.
    pub weeks: usize,
}

impl MonthlyTotals {
    pub fn value(&self, metric: Metric) -> f64 {
        self.values.get(metric).unwrap_or(0.0)
    }
}

/// Group the state's rows by (Year, Month) and sum every metric.
///
/// Returns periods sorted by (Year, Month).
pub fn monthly_by_year(dataset: &Dataset, state: &str) -> Result<Vec<MonthlyTotals>> {
    let rows = dataset.filter_by_state(state)?;
    Ok(group_by_month(rows.into_iter()))
}

fn group_by_month<'a>(rows: impl Iterator<Item = &'a WeeklyRecord>) -> Vec<MonthlyTotals> {
    // BTreeMap for automatically sorted keys.
    let mut map: BTreeMap<(i32, u32), MonthlyTotals> = BTreeMap::new();
    for row in rows {
        let entry = map
            .entry((row.year, row.month))
            .or_insert_with(|| MonthlyTotals {
                year: row.year,
                month: row.month,
                values: MetricValues::default(),
                weeks: 0,
            });
        entry.values.accumulate(&row.values);
        entry.weeks += 1;
    }
    map.into_values().collect()
}

// ── Weekly deaths by year ─────────────────────────────────────────────────────

/// One line of the "by year" chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSeries {
    pub year: i32,
    /// Hex colour of the line.
    pub color: String,
    /// (month, summed deaths) for the months present in the data.
    pub points: Vec<(u32, f64)>,
}

/// Monthly curves of one metric for each year, oldest first. Earlier
/// years share a gradient of the primary colour, the most recent year
/// gets the accent colour.
pub fn weekly_deaths_by_year(
    dataset: &Dataset,
    state: &str,
    metric: Metric,
    colors: &MetricColors,
) -> Result<Vec<YearSeries>> {
    let months = monthly_by_year(dataset, state)?;

    let mut by_year: BTreeMap<i32, Vec<(u32, f64)>> = BTreeMap::new();
    for m in &months {
        by_year
            .entry(m.year)
            .or_default()
            .push((m.month, m.value(metric)));
    }

    let previous_years = by_year.len().saturating_sub(1);
    let mut palette = gradient_with_gaps(&colors.primary_color, previous_years)?;
    palette.truncate(previous_years);
    palette.push(colors.accent_color_1.clone());

    debug!(
        "By-year series for {} / {}: {} years",
        state,
        metric,
        by_year.len()
    );

    Ok(by_year
        .into_iter()
        .zip(palette)
        .map(|((year, points), color)| YearSeries {
            year,
            color,
            points,
        })
        .collect())
}

// ── State comparison ──────────────────────────────────────────────────────────

/// One (State, Category, Deaths) row of the melted comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySum {
    pub state: String,
    pub category: Metric,
    pub deaths: f64,
}

fn in_period(row: &WeeklyRecord, year: i32, month: Option<u32>) -> bool {
    row.year == year && month.map(|m| row.month == m).unwrap_or(true)
}

fn sum_metric<'a>(rows: impl Iterator<Item = &'a WeeklyRecord>, metric: Metric) -> f64 {
    rows.filter_map(|r| r.value(metric)).sum()
}

/// Per-state sums of COVID-19, Pneumonia and Influenza for `year` (and
/// `month` when given), melted category by category. States without rows
/// in the period sum to zero.
pub fn filter_sum(
    dataset: &Dataset,
    year: i32,
    month: Option<u32>,
    states: &[String],
) -> Vec<CategorySum> {
    let mut out = Vec::with_capacity(states.len() * Metric::COMPARED.len());
    for category in Metric::COMPARED {
        for state in states {
            let rows = dataset
                .records
                .iter()
                .filter(|r| &r.state == state && in_period(r, year, month));
            out.push(CategorySum {
                state: state.clone(),
                category,
                deaths: sum_metric(rows, category),
            });
        }
    }
    out
}

// ── Relative death counts ─────────────────────────────────────────────────────

/// Deaths of one metric as a share of all deaths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeCount {
    pub state: String,
    pub metric: Metric,
    pub deaths: f64,
    pub total: f64,
    /// `deaths / total`, or 0 when the total is zero.
    pub relative: f64,
}

/// Share of total deaths per (state, metric) within one month of one year.
/// Weekly rows of the month are summed before dividing.
pub fn relative_death_counts(
    dataset: &Dataset,
    year: i32,
    month: u32,
    states: &[String],
    metrics: &[Metric],
) -> Vec<RelativeCount> {
    let mut out = Vec::with_capacity(states.len() * metrics.len());
    for &metric in metrics {
        for state in states {
            let rows: Vec<&WeeklyRecord> = dataset
                .records
                .iter()
                .filter(|r| &r.state == state && in_period(r, year, Some(month)))
                .collect();
            if rows.is_empty() {
                continue;
            }
            let deaths = sum_metric(rows.iter().copied(), metric);
            let total = sum_metric(rows.iter().copied(), Metric::Total);
            let relative = if total == 0.0 { 0.0 } else { deaths / total };
            out.push(RelativeCount {
                state: state.clone(),
                metric,
                deaths,
                total,
                relative,
            });
        }
    }
    out
}

// ── Monthly trend ─────────────────────────────────────────────────────────────

/// Monthly COVID-19 / Pneumonia / Influenza sums of one state and year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub month: u32,
    pub covid19: f64,
    pub pneumonia: f64,
    pub influenza: f64,
}

pub fn monthly_trend(dataset: &Dataset, year: i32, state: &str) -> Result<Vec<TrendPoint>> {
    let rows = dataset.filter_by_state(state)?;
    let months = group_by_month(rows.into_iter().filter(|r| r.year == year));
    Ok(months
        .into_iter()
        .map(|m| TrendPoint {
            month: m.month,
            covid19: m.value(Metric::Covid19),
            pneumonia: m.value(Metric::Pneumonia),
            influenza: m.value(Metric::Influenza),
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
