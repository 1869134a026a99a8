use thiserror::Error;

/// Errors raised while fitting or evaluating time-series models.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("empty input data")]
    EmptyData,

    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("model must be fitted before prediction")]
    FitRequired,

    #[error("input contains non-finite values")]
    NonFinite,

    #[error("computation error: {0}")]
    ComputationError(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Reject empty or non-finite input.
pub(crate) fn validate_series(values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::NonFinite);
    }
    Ok(())
}
