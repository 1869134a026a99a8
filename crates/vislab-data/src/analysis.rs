//! The load pipeline used by every dashboard and CLI command.
//!
//! Reads the CSV export, renames columns to display labels, cleans it with
//! the required/fill column sets and returns a [`Dataset`] sorted by End
//! Date together with a [`LoadResult`] metadata block.

use std::path::Path;

use chrono::Utc;
use tracing::info;
use vislab_core::error::Result;
use vislab_core::models::{COLUMN_RENAMES, FILL_COLUMNS, REQUIRED_COLUMNS};

use crate::cleaning::{clean_data, CleaningReport};
use crate::dataset::Dataset;
use crate::reader::read_csv;

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the loaded dataset.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    pub source: String,
    /// Rows in the CSV before cleaning.
    pub rows_read: usize,
    /// Typed records after cleaning.
    pub records: usize,
    pub states: usize,
    /// Wall-clock seconds spent reading the CSV.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent cleaning and typing.
    pub transform_time_seconds: f64,
}

/// The complete output of [`load_cleaned_and_sorted`].
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub dataset: Dataset,
    pub cleaning: CleaningReport,
    pub metadata: LoadMetadata,
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run the full load pipeline.
///
/// 1. Read the CSV at `path`.
/// 2. Rename the CDC columns to display labels.
/// 3. Clean with the required and forward-fill column sets.
/// 4. Type the rows and sort them by End Date.
pub fn load_cleaned_and_sorted(path: &Path) -> Result<LoadResult> {
    // ── Step 1: Read ──────────────────────────────────────────────────────────
    let load_start = std::time::Instant::now();
    let mut table = read_csv(path)?;
    let load_time = load_start.elapsed().as_secs_f64();

    // ── Step 2-4: Rename, clean, type, sort ───────────────────────────────────
    let transform_start = std::time::Instant::now();
    table.rename_columns(&COLUMN_RENAMES);
    let (cleaned, cleaning) = clean_data(&table, &REQUIRED_COLUMNS, &FILL_COLUMNS)?;
    let mut dataset = Dataset::from_table(&cleaned)?;
    dataset.sort_by_end_date();
    let transform_time = transform_start.elapsed().as_secs_f64();

    let metadata = LoadMetadata {
        generated_at: Utc::now().to_rfc3339(),
        source: path.display().to_string(),
        rows_read: table.len(),
        records: dataset.len(),
        states: dataset.states().len(),
        load_time_seconds: load_time,
        transform_time_seconds: transform_time,
    };
    info!(
        "Loaded {} records for {} states from {} ({} rows dropped)",
        metadata.records, metadata.states, metadata.source, cleaning.rows_dropped
    );

    Ok(LoadResult {
        dataset,
        cleaning,
        metadata,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vislab_core::models::Metric;

    /// A small export in the CDC layout, deliberately out of date order.
    const EXPORT: &str = "\
Data as of,Start Date,End Date,Group,Year,MMWR Week,State,COVID-19 Deaths,Total Deaths,Pneumonia Deaths,Pneumonia and COVID-19 Deaths,Influenza Deaths,\"Pneumonia, Influenza, or COVID-19 Deaths\"
12/11/2024,01/10/2021,01/16/2021,By Week,2020/2021,2,Texas,,5100,800,400,,1200
12/11/2024,01/03/2021,01/09/2021,By Week,2020/2021,1,Texas,900,5000,700,300,10,1300
12/11/2024,01/03/2021,01/09/2021,By Week,2020/2021,1,Ohio,300,2000,200,100,2,420
12/11/2024,01/01/2021,12/31/2021,By Year,2021,,Texas,50000,250000,40000,20000,100,70000
";

    fn write_export(tmp: &TempDir) -> std::path::PathBuf {
        let path = tmp.path().join("export.csv");
        std::fs::write(&path, EXPORT).unwrap();
        path
    }

    #[test]
    fn test_load_cleaned_and_sorted() {
        let tmp = TempDir::new().unwrap();
        let result = load_cleaned_and_sorted(&write_export(&tmp)).unwrap();

        // The yearly summary row has no MMWR week and is dropped.
        assert_eq!(result.cleaning.rows_dropped, 1);
        assert_eq!(result.metadata.rows_read, 4);
        assert_eq!(result.metadata.records, 3);
        assert_eq!(result.metadata.states, 2);

        let dates: Vec<_> = result
            .dataset
            .records
            .iter()
            .map(|r| r.end_date.to_string())
            .collect();
        assert_eq!(dates, vec!["2021-01-09", "2021-01-09", "2021-01-16"]);
    }

    #[test]
    fn test_load_leading_gaps_stay_missing() {
        let tmp = TempDir::new().unwrap();
        let result = load_cleaned_and_sorted(&write_export(&tmp)).unwrap();
        // The first Texas row (file order) has no COVID-19 value and no
        // earlier row to fill from; it stays missing.
        let last = result.dataset.records.last().unwrap();
        assert_eq!(last.state, "Texas");
        assert_eq!(last.value(Metric::Covid19), None);
        assert_eq!(last.value(Metric::Influenza), None);
        assert_eq!(last.value(Metric::Undiagnosed), Some(3900.0));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_cleaned_and_sorted(&tmp.path().join("missing.csv")).is_err());
    }
}
