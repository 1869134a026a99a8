use thiserror::Error;
use vislab_core::error::VislabError;
use vislab_core::models::Metric;
use vislab_forecast::ForecastError;
use vislab_volume::VolumeError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Data(#[from] VislabError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("No {} values for {state}", metric.label())]
    EmptySeries { state: String, metric: Metric },

    #[error("Forecast task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
