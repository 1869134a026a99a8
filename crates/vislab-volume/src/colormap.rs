//! Colormaps used by the volume renderer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vislab_core::colors::Rgb;

use crate::error::{Result, VolumeError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    #[default]
    Viridis,
    Plasma,
    Gray,
    Coolwarm,
    Bone,
}

// Anchor points (position, colour); colours between anchors are linear.
const VIRIDIS: &[(f64, Rgb)] = &[
    (0.0, Rgb::new(68, 1, 84)),
    (0.25, Rgb::new(59, 82, 139)),
    (0.5, Rgb::new(33, 145, 140)),
    (0.75, Rgb::new(94, 201, 98)),
    (1.0, Rgb::new(253, 231, 37)),
];
const PLASMA: &[(f64, Rgb)] = &[
    (0.0, Rgb::new(13, 8, 135)),
    (0.25, Rgb::new(126, 3, 168)),
    (0.5, Rgb::new(204, 71, 120)),
    (0.75, Rgb::new(248, 149, 64)),
    (1.0, Rgb::new(240, 249, 33)),
];
const GRAY: &[(f64, Rgb)] = &[(0.0, Rgb::new(0, 0, 0)), (1.0, Rgb::new(255, 255, 255))];
const COOLWARM: &[(f64, Rgb)] = &[
    (0.0, Rgb::new(59, 76, 192)),
    (0.25, Rgb::new(124, 159, 249)),
    (0.5, Rgb::new(221, 221, 221)),
    (0.75, Rgb::new(246, 154, 123)),
    (1.0, Rgb::new(180, 4, 38)),
];
const BONE: &[(f64, Rgb)] = &[
    (0.0, Rgb::new(0, 0, 0)),
    (0.365, Rgb::new(81, 81, 113)),
    (0.746, Rgb::new(166, 198, 198)),
    (1.0, Rgb::new(255, 255, 255)),
];

impl Colormap {
    pub const ALL: [Colormap; 5] = [Self::Viridis, Self::Plasma, Self::Gray, Self::Coolwarm, Self::Bone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Plasma => "plasma",
            Self::Gray => "gray",
            Self::Coolwarm => "coolwarm",
            Self::Bone => "bone",
        }
    }

    fn anchors(&self) -> &'static [(f64, Rgb)] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::Plasma => PLASMA,
            Self::Gray => GRAY,
            Self::Coolwarm => COOLWARM,
            Self::Bone => BONE,
        }
    }

    /// Colour at normalised position `t` (clamped to 0..=1).
    pub fn sample(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let anchors = self.anchors();
        for pair in anchors.windows(2) {
            let ((t0, c0), (t1, c1)) = (pair[0], pair[1]);
            if t <= t1 {
                let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                let (a, b) = (c0.to_unit(), c1.to_unit());
                return Rgb::from_unit([
                    a[0] + (b[0] - a[0]) * f,
                    a[1] + (b[1] - a[1]) * f,
                    a[2] + (b[2] - a[2]) * f,
                ]);
            }
        }
        anchors[anchors.len() - 1].1
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colormap {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        // matplotlib spells both.
        let name = if name == "grey" { "gray".to_string() } else { name };
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| VolumeError::UnknownName {
                kind: "colormap",
                name: s.to_string(),
            })
    }
}
