//! Scalar volumes and slices: file formats, filters, isosurfaces and
//! offline rendering.
//!
//! Reads VTK `ImageData` files and DICOM series, smooths and resamples
//! slices, extracts isosurface meshes, renders volumes by ray casting and
//! meshes by rasterisation, and keeps the per-configuration artifacts of
//! the volume-rendering report.

pub mod colormap;
pub mod dicom;
pub mod error;
pub mod filters;
pub mod grid;
pub mod image;
pub mod isosurface;
pub mod raster;
pub mod raycast;
pub mod report;
pub mod shading;
pub mod transfer;
pub mod vti;

pub use colormap::Colormap;
pub use error::{Result, VolumeError};
pub use filters::{FilterParams, Interpolation, SliceFilter};
pub use grid::{ScalarVolume, Slice};
pub use image::RgbImage;
pub use isosurface::{extract_isosurface, Mesh};
pub use raycast::{render_volume, Blending, RenderSettings};
pub use report::{RenderConfig, ReportStore};
pub use shading::{Lighting, ViewAxis, LIGHTING_PRESETS};
pub use transfer::OpacityPreset;
