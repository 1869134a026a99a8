//! Terminal UI layer for vislab.
//!
//! Provides themes, charts, selectors and sliders, the table and slice
//! views, the dashboard event loop and the DICOM viewer, all built on
//! [`ratatui`].

pub mod app;
pub mod components;
pub mod slice_view;
pub mod table_view;
pub mod themes;
pub mod viewer_app;

pub use vislab_core as core;
