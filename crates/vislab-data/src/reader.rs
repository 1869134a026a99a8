//! CSV ingestion into an untyped [`RawTable`].

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};
use vislab_core::error::{Result, VislabError};

// ── RawTable ──────────────────────────────────────────────────────────────────

/// Header plus rows of optional cells; an empty cell is a missing value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`column_index`](Self::column_index) but fails with `MissingColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| VislabError::MissingColumn(name.to_string()))
    }

    /// Cell at (`row`, `col`); `None` when missing or out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    /// Rename headers found in `renames` (old → new); others are left as is.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        let map: HashMap<&str, &str> = renames.iter().copied().collect();
        for header in self.headers.iter_mut() {
            if let Some(new) = map.get(header.as_str()) {
                debug!("Renaming column '{}' to '{}'", header, new);
                *header = (*new).to_string();
            }
        }
    }

    /// Append a column, padding or truncating `values` to the row count.
    pub fn push_column(&mut self, name: &str, values: Vec<Option<String>>) {
        let mut values = values.into_iter();
        self.headers.push(name.to_string());
        for row in self.rows.iter_mut() {
            row.push(values.next().flatten());
        }
    }

    /// Number of non-missing cells in column `col`.
    pub fn non_missing(&self, col: usize) -> usize {
        (0..self.len()).filter(|&r| self.cell(r, col).is_some()).count()
    }

    /// Parse column `col` as numbers; unparsable cells become `None`.
    pub fn numeric_column(&self, col: usize) -> Vec<Option<f64>> {
        (0..self.len())
            .map(|r| self.cell(r, col).and_then(parse_number))
            .collect()
    }
}

/// Parse a numeric cell, tolerating thousands separators (`"1,234"`).
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).map_err(|source| VislabError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let table = read_csv_from(file)?;
    info!(
        "Read {} rows x {} columns from {}",
        table.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

/// Read CSV from any reader. Rows shorter than the header are padded with
/// missing values.
pub fn read_csv_from<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| VislabError::Csv(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let width = headers.len();
    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| VislabError::Csv(format!("row {}: {e}", i + 1)))?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(width)
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        row.resize(width, None);
        rows.push(row);
    }

    Ok(RawTable::new(headers, rows))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
State,End Date,COVID-19 Deaths
Texas,01/09/2021,120
Ohio,01/09/2021,
Maine,01/16/2021, 3
";

    #[test]
    fn test_read_csv_from_missing_cells() {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["State", "End Date", "COVID-19 Deaths"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(0, 2), Some("120"));
        assert_eq!(table.cell(1, 2), None);
        // Trimmed.
        assert_eq!(table.cell(2, 2), Some("3"));
    }

    #[test]
    fn test_read_csv_from_short_rows_padded() {
        let table = read_csv_from("a,b,c\n1,2\n".as_bytes()).unwrap();
        assert_eq!(table.rows[0], vec![Some("1".into()), Some("2".into()), None]);
    }

    #[test]
    fn test_read_csv_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deaths.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let table = read_csv(&path).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_read_csv_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_csv(&tmp.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, VislabError::FileRead { .. }));
    }

    #[test]
    fn test_rename_columns() {
        let mut table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        table.rename_columns(&[("COVID-19 Deaths", "COVID-19"), ("Unused", "X")]);
        assert_eq!(table.headers, vec!["State", "End Date", "COVID-19"]);
    }

    #[test]
    fn test_require_column_missing() {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            table.require_column("Year"),
            Err(VislabError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_numeric_column_and_non_missing() {
        let table = read_csv_from(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.numeric_column(2), vec![Some(120.0), None, Some(3.0)]);
        assert_eq!(table.non_missing(2), 2);
    }

    #[test]
    fn test_parse_number_thousands() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }
}
