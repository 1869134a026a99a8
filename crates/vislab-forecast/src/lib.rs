//! Time-series modelling for the weekly death counts.
//!
//! Seasonal ARIMA fitted by conditional sum of squares, automatic order
//! selection, forecasts with confidence intervals, classical seasonal
//! decomposition, the augmented Dickey–Fuller test and residual
//! diagnostics.

pub mod arima;
pub mod auto;
pub mod decompose;
pub mod diff;
pub mod error;
pub mod forecast;
pub mod optimize;
pub mod residuals;
pub mod stationarity;

pub use arima::{Arima, ArimaOrder};
pub use auto::{AutoArima, AutoArimaConfig, Criterion};
pub use decompose::{seasonal_decompose, Decomposition, DecompositionModel};
pub use error::{ForecastError, Result};
pub use forecast::Forecast;
