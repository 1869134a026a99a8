//! Smoothing filters and resampling for 2-D slices.
//!
//! Borders use reflect extension (`d c b a | a b c d | d c b a`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VolumeError};
use crate::grid::Slice;

// ── Filters ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceFilter {
    #[default]
    Original,
    Gaussian,
    Median,
    Average,
}

impl SliceFilter {
    pub const ALL: [SliceFilter; 4] = [Self::Original, Self::Gaussian, Self::Median, Self::Average];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Gaussian => "gaussian",
            Self::Median => "median",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for SliceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SliceFilter {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VolumeError::UnknownName {
                kind: "filter",
                name: s.to_string(),
            })
    }
}

/// Filter parameters; the Gaussian uses `gaussian_*`, median and average
/// use `kernel_size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub gaussian_radius: usize,
    pub gaussian_std: f64,
    pub kernel_size: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            gaussian_radius: 3,
            gaussian_std: 1.0,
            kernel_size: 3,
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.gaussian_std.is_finite() && self.gaussian_std > 0.0) {
            return Err(VolumeError::InvalidParameter(format!(
                "gaussian_std must be positive, got {}",
                self.gaussian_std
            )));
        }
        if self.kernel_size == 0 {
            return Err(VolumeError::InvalidParameter("kernel_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Map an out-of-range index back into `0..n` by reflection.
fn reflect(idx: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = idx.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}

/// Offsets covered by a window of `size` centred on a pixel.
fn window(size: usize) -> std::ops::RangeInclusive<isize> {
    let size = size as isize;
    -(size / 2)..=(size - 1) / 2
}

fn gaussian_kernel(std: f64, radius: usize) -> Vec<f64> {
    let r = radius as isize;
    let weights: Vec<f64> = (-r..=r)
        .map(|x| (-0.5 * (x as f64 / std).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Correlate rows, then columns, with a 1-D kernel centred at `kernel.len() / 2`.
fn separable(slice: &Slice, kernel: &[f64], offsets: std::ops::RangeInclusive<isize>) -> Slice {
    let (w, h) = (slice.width, slice.height);
    let mut rows = Slice::filled(w, h, 0.0);
    for y in 0..h {
        for x in 0..w {
            let v = offsets
                .clone()
                .zip(kernel)
                .map(|(d, k)| k * slice.get(reflect(x as isize + d, w), y))
                .sum();
            rows.set(x, y, v);
        }
    }
    let mut out = Slice::filled(w, h, 0.0);
    for y in 0..h {
        for x in 0..w {
            let v = offsets
                .clone()
                .zip(kernel)
                .map(|(d, k)| k * rows.get(x, reflect(y as isize + d, h)))
                .sum();
            out.set(x, y, v);
        }
    }
    out
}

fn median(slice: &Slice, size: usize) -> Slice {
    let (w, h) = (slice.width, slice.height);
    let mut out = Slice::filled(w, h, 0.0);
    let mut buf = Vec::with_capacity(size * size);
    for y in 0..h {
        for x in 0..w {
            buf.clear();
            for dy in window(size) {
                for dx in window(size) {
                    buf.push(slice.get(reflect(x as isize + dx, w), reflect(y as isize + dy, h)));
                }
            }
            buf.sort_by(f64::total_cmp);
            out.set(x, y, buf[buf.len() / 2]);
        }
    }
    out
}

/// Apply `filter` to one slice.
pub fn filter_slice(slice: &Slice, filter: SliceFilter, params: &FilterParams) -> Result<Slice> {
    if slice.values.is_empty() {
        return Ok(slice.clone());
    }
    params.validate()?;
    Ok(match filter {
        SliceFilter::Original => slice.clone(),
        SliceFilter::Gaussian => {
            let r = params.gaussian_radius as isize;
            separable(slice, &gaussian_kernel(params.gaussian_std, params.gaussian_radius), -r..=r)
        }
        SliceFilter::Median => median(slice, params.kernel_size),
        SliceFilter::Average => {
            let k = params.kernel_size;
            separable(slice, &vec![1.0 / k as f64; k], window(k))
        }
    })
}

/// Apply `filter` to every slice of a series.
pub fn filter_slices(slices: &[Slice], filter: SliceFilter, params: &FilterParams) -> Result<Vec<Slice>> {
    debug!("Applying {} filter to {} slices ({:?})", filter, slices.len(), params);
    slices.iter().map(|s| filter_slice(s, filter, params)).collect()
}

// ── Resampling ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
}

impl Interpolation {
    pub const ALL: [Interpolation; 3] = [Self::Nearest, Self::Bilinear, Self::Bicubic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VolumeError::UnknownName {
                kind: "interpolation",
                name: s.to_string(),
            })
    }
}

/// Keys cubic convolution weight (a = -0.5).
fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        1.5 * t.powi(3) - 2.5 * t.powi(2) + 1.0
    } else if t < 2.0 {
        -0.5 * t.powi(3) + 2.5 * t.powi(2) - 4.0 * t + 2.0
    } else {
        0.0
    }
}

/// Sample `line` at fractional position `pos`.
fn sample_1d(line: &[f64], pos: f64, interp: Interpolation) -> f64 {
    let n = line.len();
    let at = |i: isize| line[reflect(i, n)];
    match interp {
        Interpolation::Nearest => at((pos + 0.5).floor() as isize),
        Interpolation::Bilinear => {
            let i = pos.floor();
            let t = pos - i;
            let i = i as isize;
            at(i) * (1.0 - t) + at(i + 1) * t
        }
        Interpolation::Bicubic => {
            let i = pos.floor() as isize;
            (i - 1..=i + 2)
                .map(|j| at(j) * cubic_weight(pos - j as f64))
                .sum()
        }
    }
}

/// Output length for zooming `n` samples by `factor`.
fn zoomed_len(n: usize, factor: f64) -> usize {
    ((n as f64 * factor).round() as usize).max(1)
}

/// Input coordinate of output sample `i` when the end points stay aligned.
fn source_position(i: usize, n_in: usize, n_out: usize) -> f64 {
    if n_out <= 1 {
        0.0
    } else {
        i as f64 * (n_in - 1) as f64 / (n_out - 1) as f64
    }
}

/// Zoom a slice by `factor` on both axes.
pub fn zoom(slice: &Slice, factor: f64, interp: Interpolation) -> Result<Slice> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(VolumeError::InvalidParameter(format!("zoom factor must be positive, got {factor}")));
    }
    if slice.values.is_empty() {
        return Ok(slice.clone());
    }
    let (w, h) = (slice.width, slice.height);
    let (nw, nh) = (zoomed_len(w, factor), zoomed_len(h, factor));

    // Along x first, then along y.
    let mut wide = Slice::filled(nw, h, 0.0);
    for y in 0..h {
        let row = &slice.values[y * w..(y + 1) * w];
        for x in 0..nw {
            wide.set(x, y, sample_1d(row, source_position(x, w, nw), interp));
        }
    }
    let mut out = Slice::filled(nw, nh, 0.0);
    let mut column = vec![0.0; h];
    for x in 0..nw {
        for (y, c) in column.iter_mut().enumerate() {
            *c = wide.get(x, y);
        }
        for y in 0..nh {
            out.set(x, y, sample_1d(&column, source_position(y, h, nh), interp));
        }
    }
    Ok(out)
}

/// Downsample by `factor` and upsample back, showing the detail lost by
/// the chosen interpolation.
pub fn resample(slice: &Slice, factor: usize, interp: Interpolation) -> Result<Slice> {
    if factor == 0 {
        return Err(VolumeError::InvalidParameter("resampling factor must be at least 1".into()));
    }
    let down = zoom(slice, 1.0 / factor as f64, interp)?;
    zoom(&down, factor as f64, interp)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
