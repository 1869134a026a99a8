//! Orthographic view axes and Phong lighting shared by both renderers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vislab_core::colors::Rgb;

use crate::error::{Result, VolumeError};
use crate::isosurface::{dot, normalize};

/// Axis the camera looks along (towards increasing coordinates).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewAxis {
    X,
    #[default]
    Y,
    Z,
}

impl ViewAxis {
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// World axes shown horizontally and vertically in the image.
    pub fn plane(self) -> (usize, usize) {
        match self {
            Self::X => (1, 2),
            Self::Y => (0, 2),
            Self::Z => (0, 1),
        }
    }

    /// Unit vector pointing from the scene back to the camera.
    pub fn to_eye(self) -> [f64; 3] {
        let mut v = [0.0; 3];
        v[self.index()] = -1.0;
        v
    }
}

impl fmt::Display for ViewAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

impl FromStr for ViewAxis {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            _ => Err(VolumeError::UnknownName {
                kind: "view axis",
                name: s.to_string(),
            }),
        }
    }
}

/// Phong reflection coefficients with a white headlight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    pub ambient: f64,
    pub diffuse: f64,
    pub specular: f64,
    pub specular_power: f64,
}

impl Default for Lighting {
    /// Diffuse-only, the usual surface default.
    fn default() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }
}

impl Lighting {
    pub const fn new(ambient: f64, diffuse: f64, specular: f64) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            specular_power: 100.0,
        }
    }

    /// Coefficients used when shading volume samples.
    pub const fn volume() -> Self {
        Self {
            ambient: 0.1,
            diffuse: 0.7,
            specular: 0.2,
            specular_power: 10.0,
        }
    }

    /// Shade `base` at a surface with `normal`, seen and lit from `to_eye`.
    /// Surfaces are lit from both sides.
    pub fn shade(&self, base: Rgb, normal: [f64; 3], to_eye: [f64; 3]) -> Rgb {
        let [r, g, b] = self.shade_unit(base.to_unit(), normal, to_eye);
        Rgb::from_unit([r, g, b])
    }

    pub(crate) fn shade_unit(&self, base: [f64; 3], normal: [f64; 3], to_eye: [f64; 3]) -> [f64; 3] {
        let mut n = normalize(normal);
        let v = normalize(to_eye);
        if dot(n, v) < 0.0 {
            n = [-n[0], -n[1], -n[2]];
        }
        let n_dot_l = dot(n, v).max(0.0);
        // The light sits at the eye, so the reflection of `v` about `n`
        // compared with `v` reduces to 2(n.v)^2 - 1.
        let r_dot_v = (2.0 * n_dot_l * n_dot_l - 1.0).max(0.0);
        let spec = self.specular * r_dot_v.powf(self.specular_power);
        let k = self.ambient + self.diffuse * n_dot_l;
        base.map(|c| (c * k + spec).clamp(0.0, 1.0))
    }
}

/// A named lighting configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingPreset {
    pub description: &'static str,
    pub lighting: Lighting,
}

/// The four single-term comparisons plus a balanced configuration.
pub const LIGHTING_PRESETS: [LightingPreset; 5] = [
    LightingPreset {
        description: "Ambient 1, Diffuse 0, Specular 0",
        lighting: Lighting::new(1.0, 0.0, 0.0),
    },
    LightingPreset {
        description: "Ambient 0, Diffuse 1, Specular 0",
        lighting: Lighting::new(0.0, 1.0, 0.0),
    },
    LightingPreset {
        description: "Ambient 0, Diffuse 0, Specular 1",
        lighting: Lighting::new(0.0, 0.0, 1.0),
    },
    LightingPreset {
        description: "Ambient 1, Diffuse 1, Specular 0",
        lighting: Lighting::new(1.0, 1.0, 0.0),
    },
    LightingPreset {
        description: "Ambient 0.5, Diffuse 0.8, Specular 0.2",
        lighting: Lighting::new(0.5, 0.8, 0.2),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const WHITE: [f64; 3] = [1.0, 1.0, 1.0];

    #[test]
    fn test_ambient_ignores_orientation() {
        let l = Lighting::new(1.0, 0.0, 0.0);
        let eye = ViewAxis::Z.to_eye();
        assert_eq!(l.shade_unit([0.5, 0.2, 0.1], [1.0, 0.0, 0.0], eye), [0.5, 0.2, 0.1]);
        assert_eq!(l.shade_unit([0.5, 0.2, 0.1], [0.0, 0.0, -1.0], eye), [0.5, 0.2, 0.1]);
    }

    #[test]
    fn test_diffuse_follows_angle() {
        let l = Lighting::new(0.0, 1.0, 0.0);
        let eye = ViewAxis::Z.to_eye();
        assert_relative_eq!(l.shade_unit(WHITE, [0.0, 0.0, -1.0], eye)[0], 1.0);
        assert_relative_eq!(l.shade_unit(WHITE, [1.0, 0.0, 0.0], eye)[0], 0.0);
        // Two-sided: a back face is lit like its front.
        assert_relative_eq!(l.shade_unit(WHITE, [0.0, 0.0, 1.0], eye)[0], 1.0);
        let oblique = l.shade_unit(WHITE, [1.0, 0.0, -1.0], eye)[0];
        assert_relative_eq!(oblique, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_specular_highlight_is_white() {
        let l = Lighting::new(0.0, 0.0, 1.0);
        let eye = ViewAxis::X.to_eye();
        let head_on = l.shade_unit([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], eye);
        assert_eq!(head_on, [1.0, 1.0, 1.0]);
        let grazing = l.shade_unit([1.0, 0.0, 0.0], [-1.0, 1.0, 0.0], eye);
        assert!(grazing[1] < 1e-6);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LIGHTING_PRESETS.len(), 5);
        assert_eq!(LIGHTING_PRESETS[2].description, "Ambient 0, Diffuse 0, Specular 1");
        assert_eq!(LIGHTING_PRESETS[4].lighting.diffuse, 0.8);
        assert_eq!(Lighting::default(), LIGHTING_PRESETS[1].lighting);
    }

    #[test]
    fn test_view_axis() {
        assert_eq!("Z".parse::<ViewAxis>().unwrap(), ViewAxis::Z);
        assert_eq!(ViewAxis::Y.plane(), (0, 2));
        assert_eq!(ViewAxis::X.to_eye(), [-1.0, 0.0, 0.0]);
        assert!("w".parse::<ViewAxis>().is_err());
    }
}
