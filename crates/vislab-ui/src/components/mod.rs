//! Reusable pieces of the dashboard screens.

pub mod charts;
pub mod header;
pub mod selector;
pub mod slider;

pub use header::Header;
pub use selector::Selector;
pub use slider::Slider;
