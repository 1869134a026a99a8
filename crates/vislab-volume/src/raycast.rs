//! Orthographic ray-cast volume renderer.
//!
//! One ray per grid column along the view axis, sampled at the grid
//! points. Scalars are normalised over the volume range (or an explicit
//! one) before the colormap and opacity lookups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vislab_core::colors::Rgb;

use crate::colormap::Colormap;
use crate::error::{Result, VolumeError};
use crate::grid::ScalarVolume;
use crate::image::RgbImage;
use crate::shading::{Lighting, ViewAxis};
use crate::transfer::{lookup, OpacityPreset, TABLE_SIZE};

/// Neutral grey behind every render.
pub const BACKGROUND: Rgb = Rgb::new(76, 76, 76);

/// Accumulated opacity at which compositing stops.
const OPAQUE: f64 = 0.99;

/// How samples along a ray are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blending {
    #[default]
    Composite,
    Maximum,
    Minimum,
    Average,
}

impl Blending {
    pub const ALL: [Blending; 4] = [Self::Composite, Self::Maximum, Self::Minimum, Self::Average];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composite => "composite",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for Blending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blending {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VolumeError::UnknownName {
                kind: "blending mode",
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub cmap: Colormap,
    /// Opacity lookup table over the normalised range, entries in 0..=255.
    pub opacity: Vec<f64>,
    pub shade: bool,
    pub blending: Blending,
    /// World distance over which a sample's opacity applies in full.
    pub opacity_unit_distance: f64,
    pub axis: ViewAxis,
    pub lighting: Lighting,
    /// Scalar range mapped to 0..=1; the volume's own range when `None`.
    pub scalar_range: Option<(f64, f64)>,
    pub background: Rgb,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            cmap: Colormap::default(),
            opacity: OpacityPreset::Linear.table(TABLE_SIZE),
            shade: false,
            blending: Blending::Composite,
            opacity_unit_distance: 20.0,
            axis: ViewAxis::default(),
            lighting: Lighting::volume(),
            scalar_range: None,
            background: BACKGROUND,
        }
    }
}

impl RenderSettings {
    pub fn with_preset(mut self, preset: OpacityPreset) -> Self {
        self.opacity = preset.table(TABLE_SIZE);
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.opacity_unit_distance.is_finite() && self.opacity_unit_distance > 0.0) {
            return Err(VolumeError::InvalidParameter(format!(
                "opacity_unit_distance must be positive, got {}",
                self.opacity_unit_distance
            )));
        }
        if self.opacity.is_empty() {
            return Err(VolumeError::InvalidParameter("empty opacity table".into()));
        }
        Ok(())
    }
}

/// Blend a colour with opacity `alpha` over `background`.
fn over(color: [f64; 3], alpha: f64, background: Rgb) -> Rgb {
    let bg = background.to_unit();
    Rgb::from_unit([
        color[0] + (1.0 - alpha) * bg[0],
        color[1] + (1.0 - alpha) * bg[1],
        color[2] + (1.0 - alpha) * bg[2],
    ])
}

/// Render `volume` with `settings`. The image has one pixel per grid
/// column; the vertical world axis points up.
pub fn render_volume(volume: &ScalarVolume, settings: &RenderSettings) -> Result<RgbImage> {
    settings.validate()?;
    let axis = settings.axis.index();
    let (hu, hv) = settings.axis.plane();
    let (width, height, depth) = (volume.dims[hu], volume.dims[hv], volume.dims[axis]);
    let mut image = RgbImage::new(width, height, settings.background);
    if volume.is_empty() {
        return Ok(image);
    }

    let (lo, hi) = settings.scalar_range.unwrap_or_else(|| volume.scalar_range());
    let span = if hi > lo { hi - lo } else { 1.0 };
    let normalise = |v: f64| ((v - lo) / span).clamp(0.0, 1.0);
    // Opacity correction for the sample spacing.
    let exponent = volume.spacing[axis].abs() / settings.opacity_unit_distance;
    let to_eye = settings.axis.to_eye();

    for py in 0..height {
        for px in 0..width {
            let mut ijk = [0usize; 3];
            ijk[hu] = px;
            ijk[hv] = height - 1 - py;
            let mut samples = (0..depth).map(|s| {
                ijk[axis] = s;
                (ijk, volume.value(ijk[0], ijk[1], ijk[2]))
            });

            let pixel = match settings.blending {
                Blending::Composite => {
                    let mut color = [0.0; 3];
                    let mut alpha = 0.0;
                    for (at, v) in samples {
                        let t = normalise(v);
                        let a = lookup(&settings.opacity, t);
                        if a <= 0.0 {
                            continue;
                        }
                        let a = 1.0 - (1.0 - a.min(1.0)).powf(exponent);
                        let mut c = settings.cmap.sample(t).to_unit();
                        if settings.shade {
                            let g = volume.gradient(at[0], at[1], at[2]);
                            if g.iter().any(|x| *x != 0.0) {
                                c = settings.lighting.shade_unit(c, [-g[0], -g[1], -g[2]], to_eye);
                            }
                        }
                        let w = (1.0 - alpha) * a;
                        for ch in 0..3 {
                            color[ch] += w * c[ch];
                        }
                        alpha += w;
                        if alpha >= OPAQUE {
                            break;
                        }
                    }
                    over(color, alpha, settings.background)
                }
                Blending::Maximum | Blending::Minimum => {
                    let pick: fn(f64, f64) -> f64 = if settings.blending == Blending::Maximum {
                        f64::max
                    } else {
                        f64::min
                    };
                    let first = samples.next().map(|(_, v)| v);
                    match first.map(|f| samples.fold(f, |acc, (_, v)| pick(acc, v))) {
                        Some(v) => project(normalise(v), settings),
                        None => settings.background,
                    }
                }
                Blending::Average => {
                    // Samples with zero opacity do not take part.
                    let (sum, n) = samples
                        .map(|(_, v)| normalise(v))
                        .filter(|&t| lookup(&settings.opacity, t) > 0.0)
                        .fold((0.0, 0usize), |(s, n), t| (s + t, n + 1));
                    if n == 0 {
                        settings.background
                    } else {
                        project(sum / n as f64, settings)
                    }
                }
            };
            image.set(px, py, pixel);
        }
    }
    debug!(
        "Rendered {}x{} volume image ({} blending, {} colormap)",
        width, height, settings.blending, settings.cmap
    );
    Ok(image)
}

/// Colour of a single projected value.
fn project(t: f64, settings: &RenderSettings) -> Rgb {
    let a = lookup(&settings.opacity, t).min(1.0);
    let c = settings.cmap.sample(t).to_unit();
    over(c.map(|x| x * a), a, settings.background)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
