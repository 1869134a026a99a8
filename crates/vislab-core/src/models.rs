use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VislabError};

// ── Column names ──────────────────────────────────────────────────────────────

pub const COL_STATE: &str = "State";
pub const COL_START_DATE: &str = "Start Date";
pub const COL_END_DATE: &str = "End Date";
pub const COL_MMWR_WEEK: &str = "MMWR Week";
pub const COL_YEAR: &str = "Year";
pub const COL_MONTH: &str = "Month";

/// Source column → display label renames applied right after ingest.
pub const COLUMN_RENAMES: [(&str, &str); 6] = [
    ("COVID-19 Deaths", "COVID-19"),
    ("Total Deaths", "Total"),
    ("Pneumonia Deaths", "Pneumonia"),
    ("Pneumonia and COVID-19 Deaths", "Pneumonia & COVID-19"),
    ("Influenza Deaths", "Influenza"),
    (
        "Pneumonia, Influenza, or COVID-19 Deaths",
        "Pneumonia, Influenza, or COVID-19",
    ),
];

/// Rows missing any of these columns are dropped during cleaning.
pub const REQUIRED_COLUMNS: [&str; 4] = [COL_START_DATE, COL_END_DATE, COL_MMWR_WEEK, COL_STATE];

/// Columns forward-filled during cleaning.
pub const FILL_COLUMNS: [&str; 5] = [
    "COVID-19",
    "Total",
    "Pneumonia",
    "Pneumonia & COVID-19",
    "Influenza",
];

/// Aggregate row label used by the CDC export for national data.
pub const NATIONAL: &str = "United States";

// ── Metric ────────────────────────────────────────────────────────────────────

/// A weekly death-count category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Covid19,
    Pneumonia,
    Influenza,
    PneumoniaAndCovid19,
    PneumoniaInfluenzaOrCovid19,
    Total,
    /// Total minus the pneumonia/influenza/COVID-19 union, never negative.
    Undiagnosed,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Covid19,
        Metric::Pneumonia,
        Metric::Influenza,
        Metric::PneumoniaAndCovid19,
        Metric::PneumoniaInfluenzaOrCovid19,
        Metric::Total,
        Metric::Undiagnosed,
    ];

    /// The metrics offered by the dashboard selectors.
    pub const DASHBOARD: [Metric; 5] = [
        Metric::Covid19,
        Metric::Pneumonia,
        Metric::Influenza,
        Metric::PneumoniaAndCovid19,
        Metric::Undiagnosed,
    ];

    /// The three categories compared across states.
    pub const COMPARED: [Metric; 3] = [Metric::Covid19, Metric::Pneumonia, Metric::Influenza];

    /// Display label (the renamed column header).
    pub fn label(self) -> &'static str {
        match self {
            Metric::Covid19 => "COVID-19",
            Metric::Pneumonia => "Pneumonia",
            Metric::Influenza => "Influenza",
            Metric::PneumoniaAndCovid19 => "Pneumonia & COVID-19",
            Metric::PneumoniaInfluenzaOrCovid19 => "Pneumonia, Influenza, or COVID-19",
            Metric::Total => "Total",
            Metric::Undiagnosed => "Undiagnosed",
        }
    }

    /// Column header in the raw CDC export, `None` for derived metrics.
    pub fn source_column(self) -> Option<&'static str> {
        match self {
            Metric::Covid19 => Some("COVID-19 Deaths"),
            Metric::Pneumonia => Some("Pneumonia Deaths"),
            Metric::Influenza => Some("Influenza Deaths"),
            Metric::PneumoniaAndCovid19 => Some("Pneumonia and COVID-19 Deaths"),
            Metric::PneumoniaInfluenzaOrCovid19 => Some("Pneumonia, Influenza, or COVID-19 Deaths"),
            Metric::Total => Some("Total Deaths"),
            Metric::Undiagnosed => None,
        }
    }

    /// Resolve a metric from its display label or its raw column name
    /// (case-insensitive).
    pub fn from_label(label: &str) -> Result<Metric> {
        let wanted = label.trim();
        Metric::ALL
            .into_iter()
            .find(|m| {
                m.label().eq_ignore_ascii_case(wanted)
                    || m.source_column()
                        .map(|c| c.eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
            })
            .ok_or_else(|| VislabError::UnknownMetric(label.to_string()))
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── MetricValues ──────────────────────────────────────────────────────────────

/// Per-week values of the stored (non-derived) metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub covid19: Option<f64>,
    pub pneumonia: Option<f64>,
    pub influenza: Option<f64>,
    pub pneumonia_and_covid19: Option<f64>,
    pub pneumonia_influenza_or_covid19: Option<f64>,
    pub total: Option<f64>,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Covid19 => self.covid19,
            Metric::Pneumonia => self.pneumonia,
            Metric::Influenza => self.influenza,
            Metric::PneumoniaAndCovid19 => self.pneumonia_and_covid19,
            Metric::PneumoniaInfluenzaOrCovid19 => self.pneumonia_influenza_or_covid19,
            Metric::Total => self.total,
            Metric::Undiagnosed => {
                let diagnosed = self.pneumonia_influenza_or_covid19?;
                Some((self.total? - diagnosed).max(0.0))
            }
        }
    }

    /// Set a stored metric; setting `Undiagnosed` is a no-op.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Covid19 => self.covid19 = value,
            Metric::Pneumonia => self.pneumonia = value,
            Metric::Influenza => self.influenza = value,
            Metric::PneumoniaAndCovid19 => self.pneumonia_and_covid19 = value,
            Metric::PneumoniaInfluenzaOrCovid19 => self.pneumonia_influenza_or_covid19 = value,
            Metric::Total => self.total = value,
            Metric::Undiagnosed => {}
        }
    }

    /// Element-wise sum where a missing value counts as zero.
    pub fn accumulate(&mut self, other: &MetricValues) {
        for metric in Metric::ALL {
            if metric == Metric::Undiagnosed {
                continue;
            }
            if let Some(v) = other.get(metric) {
                let current = self.get(metric).unwrap_or(0.0);
                self.set(metric, Some(current + v));
            }
        }
    }
}

// ── WeeklyRecord ──────────────────────────────────────────────────────────────

/// One cleaned row of the weekly death-count dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRecord {
    pub state: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub mmwr_week: u32,
    /// Calendar year of `end_date`.
    pub year: i32,
    /// Calendar month (1–12) of `end_date`.
    pub month: u32,
    pub values: MetricValues,
}

impl WeeklyRecord {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.values.get(metric)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
