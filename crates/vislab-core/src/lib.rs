//! Shared foundation of vislab.
//!
//! Error type, CLI settings with persisted last-used parameters, the weekly
//! record model and metric catalogue, plus formatting, statistics, date and
//! colour helpers used by every other crate.

pub mod colors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod stats;
pub mod time_utils;

pub use error::{Result, VislabError};
