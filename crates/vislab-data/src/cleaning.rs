//! Row filtering, forward filling and Year/Month derivation.

use chrono::Datelike;
use serde::Serialize;
use tracing::info;

use vislab_core::error::Result;
use vislab_core::models::{COL_END_DATE, COL_MONTH, COL_YEAR};
use vislab_core::time_utils::parse_date;

use crate::reader::RawTable;

/// Forward-fill statistics of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillStat {
    pub column: String,
    /// Missing cells after row dropping, before filling.
    pub missing_before: usize,
    /// Cells that received a carried-forward value.
    pub filled: usize,
}

/// What [`clean_data`] did to its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_dropped: usize,
    pub fills: Vec<FillStat>,
}

impl CleaningReport {
    pub fn rows_out(&self) -> usize {
        self.rows_in - self.rows_dropped
    }
}

/// Clean `table` without modifying it.
///
/// 1. Drop every row with a missing value in any of `drop_cols`.
/// 2. Forward-fill `fill_cols` in row order; leading gaps stay missing.
/// 3. Normalise `End Date` to `%Y-%m-%d` and (re)derive `Year` and `Month`.
pub fn clean_data(
    table: &RawTable,
    drop_cols: &[&str],
    fill_cols: &[&str],
) -> Result<(RawTable, CleaningReport)> {
    let drop_idx: Vec<usize> = drop_cols
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<_>>()?;
    let fill_idx: Vec<usize> = fill_cols
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<_>>()?;
    let end_idx = table.require_column(COL_END_DATE)?;

    let mut report = CleaningReport {
        rows_in: table.len(),
        ..Default::default()
    };

    // ── Step 1: drop rows ─────────────────────────────────────────────────────
    let mut rows: Vec<Vec<Option<String>>> = table
        .rows
        .iter()
        .filter(|row| drop_idx.iter().all(|&c| row[c].is_some()))
        .cloned()
        .collect();
    report.rows_dropped = table.len() - rows.len();
    if !drop_cols.is_empty() {
        info!(
            "Dropped {} rows due to missing values in {:?}",
            report.rows_dropped, drop_cols
        );
    }

    // ── Step 2: forward fill ──────────────────────────────────────────────────
    for (&col, name) in fill_idx.iter().zip(fill_cols) {
        let mut stat = FillStat {
            column: (*name).to_string(),
            missing_before: 0,
            filled: 0,
        };
        let mut last: Option<String> = None;
        for row in rows.iter_mut() {
            match &row[col] {
                Some(v) => last = Some(v.clone()),
                None => {
                    stat.missing_before += 1;
                    if let Some(v) = &last {
                        row[col] = Some(v.clone());
                        stat.filled += 1;
                    }
                }
            }
        }
        info!(
            "Filled {} of {} missing values in column '{}'",
            stat.filled, stat.missing_before, name
        );
        report.fills.push(stat);
    }

    // ── Step 3: dates ─────────────────────────────────────────────────────────
    let mut years = Vec::with_capacity(rows.len());
    let mut months = Vec::with_capacity(rows.len());
    for row in rows.iter_mut() {
        match row[end_idx].as_deref() {
            Some(raw) => {
                let date = parse_date(raw)?;
                row[end_idx] = Some(date.format("%Y-%m-%d").to_string());
                years.push(Some(date.year().to_string()));
                months.push(Some(date.month().to_string()));
            }
            None => {
                years.push(None);
                months.push(None);
            }
        }
    }

    let mut cleaned = RawTable::new(table.headers.clone(), rows);
    set_column(&mut cleaned, COL_YEAR, years);
    set_column(&mut cleaned, COL_MONTH, months);

    Ok((cleaned, report))
}

/// Overwrite column `name` if present, otherwise append it.
fn set_column(table: &mut RawTable, name: &str, values: Vec<Option<String>>) {
    match table.column_index(name) {
        Some(idx) => {
            for (row, v) in table.rows.iter_mut().zip(values) {
                row[idx] = v;
            }
        }
        None => table.push_column(name, values),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_csv_from;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
Start Date,End Date,MMWR Week,State,COVID-19,Influenza,Year
01/03/2021,01/09/2021,1,Texas,10,,2020/2021
01/10/2021,01/16/2021,,Texas,11,2,2020/2021
01/17/2021,01/23/2021,3,Texas,,3,2020/2021
01/24/2021,01/30/2021,4,,12,4,2020/2021
01/31/2021,02/06/2021,5,Texas,,,2020/2021
";

    fn clean_sample() -> (RawTable, CleaningReport) {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        clean_data(
            &table,
            &["Start Date", "End Date", "MMWR Week", "State"],
            &["COVID-19", "Influenza"],
        )
        .unwrap()
    }

    #[test]
    fn test_clean_data_drops_rows_with_missing_required() {
        let (cleaned, report) = clean_sample();
        assert_eq!(report.rows_in, 5);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn test_clean_data_forward_fills() {
        let (cleaned, report) = clean_sample();
        let covid = cleaned.column_index("COVID-19").unwrap();
        let flu = cleaned.column_index("Influenza").unwrap();
        let col = |c: usize| (0..3).map(|r| cleaned.cell(r, c)).collect::<Vec<_>>();

        assert_eq!(col(covid), vec![Some("10"), Some("10"), Some("10")]);
        // Leading gap stays missing.
        assert_eq!(col(flu), vec![None, Some("3"), Some("3")]);

        assert_eq!(report.fills[0].filled, 2);
        assert_eq!(report.fills[1].missing_before, 2);
        assert_eq!(report.fills[1].filled, 1);
    }

    #[test]
    fn test_clean_data_derives_year_month() {
        let (cleaned, _) = clean_sample();
        let end = cleaned.column_index("End Date").unwrap();
        let year = cleaned.column_index("Year").unwrap();
        let month = cleaned.column_index("Month").unwrap();

        assert_eq!(cleaned.cell(0, end), Some("2021-01-09"));
        assert_eq!(cleaned.cell(0, year), Some("2021"));
        assert_eq!(cleaned.cell(2, month), Some("2"));
        // Existing Year column is overwritten, not duplicated.
        assert_eq!(cleaned.headers.iter().filter(|h| *h == "Year").count(), 1);
    }

    #[test]
    fn test_clean_data_does_not_modify_input() {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        let before = table.clone();
        let _ = clean_data(&table, &["State"], &["COVID-19"]).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_clean_data_missing_column() {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        let err = clean_data(&table, &["Nope"], &[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing column: Nope");
    }

    #[test]
    fn test_clean_data_bad_end_date() {
        let table = read_csv_from("End Date,State\nyesterday,Texas\n".as_bytes()).unwrap();
        assert!(clean_data(&table, &["State"], &[]).is_err());
    }

    // ── Properties ────────────────────────────────────────────────────────────

    fn cell() -> impl Strategy<Value = Option<String>> {
        prop_oneof![Just(None), (0u32..500).prop_map(|v| Some(v.to_string()))]
    }

    proptest! {
        #[test]
        fn prop_clean_drops_exactly_incomplete_rows_and_fills_only_configured(
            rows in prop::collection::vec((cell(), cell(), cell(), 1u32..28), 0..40)
        ) {
            let headers = vec![
                "State".to_string(),
                "COVID-19".to_string(),
                "Other".to_string(),
                "End Date".to_string(),
            ];
            let raw_rows: Vec<Vec<Option<String>>> = rows
                .iter()
                .map(|(s, c, o, day)| vec![
                    s.clone(),
                    c.clone(),
                    o.clone(),
                    Some(format!("2021-03-{day:02}")),
                ])
                .collect();
            let table = RawTable::new(headers, raw_rows.clone());

            let (cleaned, report) = clean_data(&table, &["State"], &["COVID-19"]).unwrap();

            let kept: Vec<&Vec<Option<String>>> =
                raw_rows.iter().filter(|r| r[0].is_some()).collect();
            prop_assert_eq!(cleaned.len(), kept.len());
            prop_assert_eq!(report.rows_dropped, raw_rows.len() - kept.len());

            let mut last: Option<String> = None;
            for (i, original) in kept.iter().enumerate() {
                // Unconfigured column untouched.
                prop_assert_eq!(cleaned.cell(i, 2), original[2].as_deref());
                // Configured column carries the last seen value forward.
                if original[1].is_some() {
                    last = original[1].clone();
                }
                prop_assert_eq!(cleaned.cell(i, 1), last.as_deref());
                // Year/Month derived from End Date.
                prop_assert_eq!(cleaned.cell(i, 4), Some("2021"));
                prop_assert_eq!(cleaned.cell(i, 5), Some("3"));
            }
        }
    }
}
