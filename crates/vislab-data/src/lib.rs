//! Data layer of vislab.
//!
//! Reads the weekly death-count CSV export, cleans it, types it into a
//! [`dataset::Dataset`], and provides the grouped sums and per-state time
//! series the dashboard and forecasting commands consume. Also profiles
//! generic EHR tables.

pub mod aggregator;
pub mod analysis;
pub mod cleaning;
pub mod dataset;
pub mod profile;
pub mod reader;
pub mod timeseries;

pub use vislab_core as core;
