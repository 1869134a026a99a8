use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the vislab data and dashboard layers.
#[derive(Error, Debug)]
pub enum VislabError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be parsed.
    #[error("Failed to parse CSV: {0}")]
    Csv(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A date string did not match any recognised format.
    #[error("Invalid date format: {0}")]
    DateParse(String),

    /// A column the operation depends on is not present in the table.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A state name that does not occur in the dataset.
    #[error("State '{0}' not found in the data!")]
    UnknownState(String),

    /// A metric label that is not one of the known metrics.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// More than one row for the same (State, End Date) pair.
    #[error("Data for state '{state}' contains multiple entries for the same End Date: {date}")]
    DuplicateEndDate { state: String, date: String },

    /// A directory that should contain input files has none.
    #[error("No matching files found in {0}")]
    EmptyDirectory(PathBuf),

    /// A colour string that is neither a known name nor a hex value.
    #[error("Invalid color value: {0}")]
    InvalidColor(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the vislab crates.
pub type Result<T> = std::result::Result<T, VislabError>;
