//! Runtime layer for vislab.
//!
//! Holds the per-session cache of series and fitted models, the
//! background forecast worker the dashboard talks to, and the view-models
//! of the slice viewer and the volume sliders.

pub mod error;
pub mod session_cache;
pub mod viewer;
pub mod worker;

pub use error::{Result, RuntimeError};
pub use session_cache::{CacheStats, SessionCache};
pub use viewer::{DicomViewer, FilterParam, IsosurfaceView, TransferFunctionView};
pub use worker::{lock_cache, ForecastHandle, ForecastRequest, ForecastUpdate, ForecastWorker, SharedCache};
pub use vislab_core as core;
pub use vislab_data as data;
