//! View-models behind the slice viewer and the two volume sliders.
//!
//! Each struct owns what its window shows and recomputes it when a
//! control changes; the UI only reads the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use vislab_volume::dicom::load_series;
use vislab_volume::filters::{filter_slices, resample};
use vislab_volume::raster::{render_mesh, MeshRenderSettings};
use vislab_volume::transfer::opacity_table;
use vislab_volume::{
    extract_isosurface, render_volume, FilterParams, Interpolation, Mesh, RenderSettings, RgbImage,
    ScalarVolume, Slice, SliceFilter, VolumeError,
};

use crate::error::Result;

// ── DicomViewer ───────────────────────────────────────────────────────────────

pub const NO_DICOM_FILES: &str = "No DICOM files found in the selected directory";

/// Shrink-and-enlarge factor of the resampling mode.
pub const RESAMPLE_FACTOR: usize = 4;

/// A text input of the filter panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterParam {
    GaussianRadius,
    GaussianStd,
    KernelSize,
}

impl FilterParam {
    pub fn label(self) -> &'static str {
        match self {
            Self::GaussianRadius => "Gaussian radius",
            Self::GaussianStd => "Gaussian std",
            Self::KernelSize => "Kernel size",
        }
    }
}

/// Slice viewer state: the loaded series, its filtered copy and the
/// controls that produced it.
#[derive(Debug, Default)]
pub struct DicomViewer {
    directory: Option<PathBuf>,
    slices: Vec<Slice>,
    displayed: Vec<Slice>,
    filter: SliceFilter,
    params: FilterParams,
    resampling: Option<Interpolation>,
    current: usize,
    status: String,
}

impl DicomViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.dcm` file in `dir`. An empty directory keeps the
    /// previous series and sets the status to [`NO_DICOM_FILES`].
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        let images = match load_series(dir) {
            Ok(images) => images,
            Err(VolumeError::EmptyDirectory(path)) => {
                self.status = NO_DICOM_FILES.to_string();
                return Err(VolumeError::EmptyDirectory(path).into());
            }
            Err(e) => return Err(e.into()),
        };
        self.slices = images.into_iter().map(|img| img.pixels).collect();
        self.directory = Some(dir.to_path_buf());
        self.current = 0;
        self.refresh()?;
        info!("Viewer loaded {} slices from {}", self.slices.len(), dir.display());
        Ok(self.slices.len())
    }

    /// Show `slices` directly, as if loaded from disk.
    pub fn load_slices(&mut self, slices: Vec<Slice>) -> Result<usize> {
        self.slices = slices;
        self.directory = None;
        self.current = 0;
        self.refresh()?;
        Ok(self.slices.len())
    }

    pub fn set_filter(&mut self, filter: SliceFilter) -> Result<()> {
        self.filter = filter;
        self.refresh()
    }

    /// Replace all filter parameters; invalid ones are rejected and the
    /// current ones kept.
    pub fn set_params(&mut self, params: FilterParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.refresh()
    }

    /// Apply one text input. Empty, unparsable or out-of-range text is
    /// ignored; returns whether the parameter changed.
    pub fn update_param(&mut self, param: FilterParam, text: &str) -> Result<bool> {
        let text = text.trim();
        let mut params = self.params;
        let parsed = match param {
            FilterParam::GaussianRadius => text.parse().map(|v| params.gaussian_radius = v).is_ok(),
            FilterParam::GaussianStd => text.parse().map(|v| params.gaussian_std = v).is_ok(),
            FilterParam::KernelSize => text.parse().map(|v| params.kernel_size = v).is_ok(),
        };
        if !parsed || params == self.params || params.validate().is_err() {
            debug!("Ignoring {} input '{}'", param.label(), text);
            return Ok(false);
        }
        self.params = params;
        self.refresh()?;
        Ok(true)
    }

    /// Downsample and re-enlarge every slice with `interpolation`, or
    /// show the filtered slices unchanged with `None`.
    pub fn set_resampling(&mut self, interpolation: Option<Interpolation>) -> Result<()> {
        self.resampling = interpolation;
        self.refresh()
    }

    /// Move to slice `index`, clamped to the loaded range.
    pub fn set_slice(&mut self, index: usize) {
        if self.displayed.is_empty() {
            return;
        }
        self.current = index.min(self.displayed.len() - 1);
        self.status = format!("Slice {}/{}", self.current, self.displayed.len() - 1);
    }

    /// Inputs relevant to the current filter.
    pub fn visible_params(&self) -> &'static [FilterParam] {
        match self.filter {
            SliceFilter::Gaussian => &[FilterParam::GaussianRadius, FilterParam::GaussianStd],
            SliceFilter::Median | SliceFilter::Average => &[FilterParam::KernelSize],
            SliceFilter::Original => &[],
        }
    }

    pub fn current_slice(&self) -> Option<&Slice> {
        self.displayed.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slice_count(&self) -> usize {
        self.displayed.len()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn filter(&self) -> SliceFilter {
        self.filter
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn resampling(&self) -> Option<Interpolation> {
        self.resampling
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Recompute the displayed slices from the loaded ones.
    fn refresh(&mut self) -> Result<()> {
        if self.slices.is_empty() {
            self.displayed.clear();
            return Ok(());
        }
        let mut displayed = filter_slices(&self.slices, self.filter, &self.params)?;
        if let Some(interp) = self.resampling {
            displayed = displayed
                .iter()
                .map(|s| resample(s, RESAMPLE_FACTOR, interp))
                .collect::<vislab_volume::Result<_>>()?;
        }
        self.displayed = displayed;
        self.set_slice(self.current);
        Ok(())
    }
}

// ── IsosurfaceView ────────────────────────────────────────────────────────────

/// Isovalue slider over a volume and the mesh it selects.
#[derive(Debug, Clone)]
pub struct IsosurfaceView {
    volume: Arc<ScalarVolume>,
    range: (f64, f64),
    isovalue: f64,
    mesh: Mesh,
}

impl IsosurfaceView {
    /// The isovalue is clamped to the volume's scalar range.
    pub fn new(volume: Arc<ScalarVolume>, isovalue: f64) -> Self {
        let range = volume.scalar_range();
        let isovalue = isovalue.clamp(range.0, range.1);
        let mesh = extract_isosurface(&volume, isovalue);
        Self {
            volume,
            range,
            isovalue,
            mesh,
        }
    }

    /// Slider callback. Returns whether the mesh was regenerated.
    pub fn set_isovalue(&mut self, value: f64) -> bool {
        let value = value.clamp(self.range.0, self.range.1);
        if value == self.isovalue {
            return false;
        }
        self.isovalue = value;
        self.mesh = extract_isosurface(&self.volume, value);
        debug!(
            "Isovalue {} -> {} vertices, {} triangles",
            value,
            self.mesh.vertices.len(),
            self.mesh.triangles.len()
        );
        true
    }

    pub fn isovalue(&self) -> f64 {
        self.isovalue
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn render(&self, settings: &MeshRenderSettings) -> Result<RgbImage> {
        Ok(render_mesh(&self.mesh, settings)?)
    }
}

// ── TransferFunctionView ──────────────────────────────────────────────────────

pub const DEFAULT_CENTER: f64 = 1900.0;
pub const DEFAULT_SPREAD: f64 = 360.0;
pub const SPREAD_RANGE: (f64, f64) = (1.0, 500.0);

/// Centre and spread sliders driving a triangular opacity table.
#[derive(Debug, Clone)]
pub struct TransferFunctionView {
    volume: Arc<ScalarVolume>,
    range: (f64, f64),
    center: f64,
    spread: f64,
    table: Vec<f64>,
}

impl TransferFunctionView {
    pub fn new(volume: Arc<ScalarVolume>) -> Self {
        Self::with_values(volume, DEFAULT_CENTER, DEFAULT_SPREAD)
    }

    /// Centre is clamped to the scalar range, spread to [`SPREAD_RANGE`].
    pub fn with_values(volume: Arc<ScalarVolume>, center: f64, spread: f64) -> Self {
        let range = volume.scalar_range();
        let mut view = Self {
            volume,
            range,
            center: center.clamp(range.0, range.1),
            spread: spread.clamp(SPREAD_RANGE.0, SPREAD_RANGE.1),
            table: Vec::new(),
        };
        view.rebuild();
        view
    }

    pub fn set_center(&mut self, value: f64) -> bool {
        let value = value.clamp(self.range.0, self.range.1);
        if value == self.center {
            return false;
        }
        self.center = value;
        self.rebuild();
        true
    }

    pub fn set_spread(&mut self, value: f64) -> bool {
        let value = value.clamp(SPREAD_RANGE.0, SPREAD_RANGE.1);
        if value == self.spread {
            return false;
        }
        self.spread = value;
        self.rebuild();
        true
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// Opacity table (0..=255) over the scalar range.
    pub fn table(&self) -> &[f64] {
        &self.table
    }

    /// Shaded composite settings using the current table.
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            opacity: self.table.clone(),
            shade: true,
            scalar_range: Some(self.range),
            ..Default::default()
        }
    }

    pub fn render(&self) -> Result<RgbImage> {
        Ok(render_volume(&self.volume, &self.settings())?)
    }

    fn rebuild(&mut self) {
        self.table = opacity_table(self.range, self.center, self.spread);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
