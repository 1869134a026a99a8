//! Typed weekly records built from a cleaned [`RawTable`].

use chrono::Datelike;
use tracing::warn;

use vislab_core::error::{Result, VislabError};
use vislab_core::models::{
    Metric, MetricValues, WeeklyRecord, COL_END_DATE, COL_MMWR_WEEK, COL_START_DATE, COL_STATE,
};
use vislab_core::time_utils::parse_date;

use crate::reader::{parse_number, RawTable};

fn parse_mmwr_week(s: &str) -> Option<u32> {
    parse_number(s)
        .filter(|w| w.fract() == 0.0 && (1.0..=53.0).contains(w))
        .map(|w| w as u32)
}

/// The weekly death-count table, one [`WeeklyRecord`] per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<WeeklyRecord>,
}

impl Dataset {
    pub fn new(records: Vec<WeeklyRecord>) -> Self {
        Self { records }
    }

    /// Convert a cleaned table. Metric columns are looked up by display
    /// label first and raw CDC column name second; absent metric columns
    /// leave the value missing. Rows whose MMWR week is not a whole number in
    /// 1..=53, or that carry a negative count, are skipped with a warning.
    pub fn from_table(table: &RawTable) -> Result<Self> {
        let state_idx = table.require_column(COL_STATE)?;
        let start_idx = table.require_column(COL_START_DATE)?;
        let end_idx = table.require_column(COL_END_DATE)?;
        let week_idx = table.require_column(COL_MMWR_WEEK)?;

        let metric_idx: Vec<(Metric, usize)> = Metric::ALL
            .into_iter()
            .filter_map(|m| {
                table
                    .column_index(m.label())
                    .or_else(|| m.source_column().and_then(|c| table.column_index(c)))
                    .map(|idx| (m, idx))
            })
            .collect();

        let mut records = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let (Some(state), Some(start), Some(end), Some(week)) = (
                table.cell(row, state_idx),
                table.cell(row, start_idx),
                table.cell(row, end_idx),
                table.cell(row, week_idx),
            ) else {
                warn!("Skipping row {} with missing key fields", row + 1);
                continue;
            };

            let Some(mmwr_week) = parse_mmwr_week(week) else {
                warn!("Skipping row {}: invalid MMWR week '{}'", row + 1, week);
                continue;
            };

            let end_date = parse_date(end)?;
            let mut values = MetricValues::default();
            let mut negative = None;
            for &(metric, idx) in &metric_idx {
                let value = table.cell(row, idx).and_then(parse_number);
                if value.is_some_and(|v| v < 0.0) {
                    negative = Some(metric);
                }
                values.set(metric, value);
            }
            if let Some(metric) = negative {
                warn!("Skipping row {}: negative {} count", row + 1, metric);
                continue;
            }

            records.push(WeeklyRecord {
                state: state.to_string(),
                start_date: parse_date(start)?,
                end_date,
                mmwr_week,
                year: end_date.year(),
                month: end_date.month(),
                values,
            });
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unique state names in order of first appearance.
    pub fn states(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.state.as_str()))
            .map(|r| r.state.clone())
            .collect()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Records of one state, in dataset order.
    pub fn filter_by_state(&self, state: &str) -> Result<Vec<&WeeklyRecord>> {
        let rows: Vec<&WeeklyRecord> = self.records.iter().filter(|r| r.state == state).collect();
        if rows.is_empty() {
            return Err(VislabError::UnknownState(state.to_string()));
        }
        Ok(rows)
    }

    /// Stable sort by End Date.
    pub fn sort_by_end_date(&mut self) {
        self.records.sort_by_key(|r| r.end_date);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_csv_from;
    use chrono::NaiveDate;

    const CLEANED: &str = "\
Start Date,End Date,MMWR Week,State,COVID-19,Total,\"Pneumonia, Influenza, or COVID-19\"
2021-01-10,2021-01-16,2,Ohio,5,100,30
2021-01-03,2021-01-09,1,Texas,\"1,200\",5000,1500
2021-01-03,2021-01-09,1,Ohio,4,90,20
";

    fn dataset() -> Dataset {
        Dataset::from_table(&read_csv_from(CLEANED.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_from_table_typed_values() {
        let ds = dataset();
        assert_eq!(ds.len(), 3);
        let texas = &ds.records[1];
        assert_eq!(texas.state, "Texas");
        assert_eq!(texas.value(Metric::Covid19), Some(1200.0));
        assert_eq!(texas.value(Metric::Undiagnosed), Some(3500.0));
        assert_eq!(texas.value(Metric::Influenza), None);
        assert_eq!(texas.year, 2021);
        assert_eq!(texas.month, 1);
    }

    #[test]
    fn test_from_table_skips_invalid_weeks_and_negative_counts() {
        let csv = "Start Date,End Date,MMWR Week,State,COVID-19,Total\n\
                   2021-01-03,2021-01-09,-1,Texas,4,90\n\
                   2021-01-03,2021-01-09,1.5,Texas,4,90\n\
                   2021-01-03,2021-01-09,54,Texas,4,90\n\
                   2021-01-03,2021-01-09,1,Ohio,-4,90\n\
                   2021-01-03,2021-01-09,1,Texas,4,90\n";
        let ds = Dataset::from_table(&read_csv_from(csv.as_bytes()).unwrap()).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records[0].state, "Texas");
        assert_eq!(ds.records[0].mmwr_week, 1);
        assert!(ds
            .records
            .iter()
            .all(|r| Metric::ALL.iter().all(|&m| r.value(m).map_or(true, |v| v >= 0.0))));
    }

    #[test]
    fn test_parse_mmwr_week() {
        assert_eq!(parse_mmwr_week("53"), Some(53));
        assert_eq!(parse_mmwr_week(" 7 "), Some(7));
        assert_eq!(parse_mmwr_week("0"), None);
        assert_eq!(parse_mmwr_week("2.5"), None);
        assert_eq!(parse_mmwr_week("week"), None);
    }

    #[test]
    fn test_from_table_accepts_raw_column_names() {
        let csv = "Start Date,End Date,MMWR Week,State,Influenza Deaths\n\
                   2021-01-03,2021-01-09,1,Texas,7\n";
        let ds = Dataset::from_table(&read_csv_from(csv.as_bytes()).unwrap()).unwrap();
        assert_eq!(ds.records[0].value(Metric::Influenza), Some(7.0));
    }

    #[test]
    fn test_states_first_appearance_order() {
        assert_eq!(dataset().states(), vec!["Ohio".to_string(), "Texas".to_string()]);
    }

    #[test]
    fn test_filter_by_state_unknown() {
        let ds = dataset();
        let err = ds.filter_by_state("Atlantis").unwrap_err();
        assert_eq!(err.to_string(), "State 'Atlantis' not found in the data!");
    }

    #[test]
    fn test_filter_by_state() {
        let ds = dataset();
        assert_eq!(ds.filter_by_state("Ohio").unwrap().len(), 2);
    }

    #[test]
    fn test_sort_by_end_date_is_stable() {
        let mut ds = dataset();
        ds.sort_by_end_date();
        let order: Vec<(&str, NaiveDate)> = ds
            .records
            .iter()
            .map(|r| (r.state.as_str(), r.end_date))
            .collect();
        let jan9 = NaiveDate::from_ymd_opt(2021, 1, 9).unwrap();
        let jan16 = NaiveDate::from_ymd_opt(2021, 1, 16).unwrap();
        assert_eq!(order, vec![("Texas", jan9), ("Ohio", jan9), ("Ohio", jan16)]);
    }

    #[test]
    fn test_years() {
        assert_eq!(dataset().years(), vec![2021]);
    }
}
