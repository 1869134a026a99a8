//! Opacity transfer functions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};

/// Entries in an opacity lookup table.
pub const TABLE_SIZE: usize = 256;

/// Opacity (0 transparent, 255 opaque) of `density`: 255 at `center`,
/// falling linearly to 0 at `center ± spread`.
pub fn opacity_transfer(density: f64, center: f64, spread: f64) -> f64 {
    if spread <= 0.0 {
        return if density == center { 255.0 } else { 0.0 };
    }
    (255.0 * (1.0 - (density - center).abs() / spread)).max(0.0)
}

/// [`opacity_transfer`] sampled at 256 densities spread evenly over `range`.
pub fn opacity_table(range: (f64, f64), center: f64, spread: f64) -> Vec<f64> {
    let (lo, hi) = range;
    (0..TABLE_SIZE)
        .map(|i| {
            let density = lo + (hi - lo) * i as f64 / (TABLE_SIZE - 1) as f64;
            opacity_transfer(density, center, spread)
        })
        .collect()
}

/// Look up a 0..=255 opacity table at normalised position `t` (0..=1),
/// returning an opacity in 0..=1.
pub fn lookup(table: &[f64], t: f64) -> f64 {
    if table.is_empty() {
        return 0.0;
    }
    let pos = t.clamp(0.0, 1.0) * (table.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = (i + 1).min(table.len() - 1);
    let f = pos - i as f64;
    (table[i] * (1.0 - f) + table[j] * f) / 255.0
}

/// Named opacity ramps over the normalised scalar range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpacityPreset {
    #[default]
    Linear,
    LinearR,
    Sigmoid,
    Geom,
    GeomR,
}

impl OpacityPreset {
    pub const ALL: [OpacityPreset; 5] = [
        Self::Linear,
        Self::LinearR,
        Self::Sigmoid,
        Self::Geom,
        Self::GeomR,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::LinearR => "linear_r",
            Self::Sigmoid => "sigmoid",
            Self::Geom => "geom",
            Self::GeomR => "geom_r",
        }
    }

    /// Opacity in 0..=1 at normalised position `t`.
    pub fn at(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        // Geometric ramp from 1e-6 to 1.
        let geom = |t: f64| 10f64.powf(-6.0 * (1.0 - t));
        match self {
            Self::Linear => t,
            Self::LinearR => 1.0 - t,
            Self::Sigmoid => 1.0 / (1.0 + (-(20.0 * t - 10.0)).exp()),
            Self::Geom => geom(t),
            Self::GeomR => geom(1.0 - t),
        }
    }

    /// `n`-entry lookup table scaled to 0..=255.
    pub fn table(&self, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![255.0 * self.at(0.0)],
            _ => (0..n)
                .map(|i| 255.0 * self.at(i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

impl fmt::Display for OpacityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpacityPreset {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| VolumeError::UnknownName {
                kind: "opacity preset",
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_opacity_transfer_shape() {
        assert_eq!(opacity_transfer(1900.0, 1900.0, 360.0), 255.0);
        assert_relative_eq!(opacity_transfer(2080.0, 1900.0, 360.0), 127.5);
        assert_relative_eq!(opacity_transfer(1720.0, 1900.0, 360.0), 127.5);
        assert_eq!(opacity_transfer(2260.0, 1900.0, 360.0), 0.0);
        assert_eq!(opacity_transfer(0.0, 1900.0, 360.0), 0.0);
        assert_eq!(opacity_transfer(5.0, 5.0, 0.0), 255.0);
    }

    #[test]
    fn test_opacity_table() {
        let table = opacity_table((0.0, 255.0), 100.0, 50.0);
        assert_eq!(table.len(), TABLE_SIZE);
        assert_eq!(table[100], 255.0);
        assert_eq!(table[0], 0.0);
        assert_relative_eq!(table[125], 127.5);
        assert!(table.iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn test_lookup_interpolates() {
        let table = vec![0.0, 255.0];
        assert_relative_eq!(lookup(&table, 0.5), 0.5);
        assert_relative_eq!(lookup(&table, 2.0), 1.0);
        assert_eq!(lookup(&[], 0.5), 0.0);
    }

    #[test]
    fn test_presets() {
        assert_eq!(OpacityPreset::Linear.table(3), vec![0.0, 127.5, 255.0]);
        assert_eq!(OpacityPreset::LinearR.table(2), vec![255.0, 0.0]);
        assert_relative_eq!(OpacityPreset::Sigmoid.at(0.5), 0.5);
        assert_relative_eq!(OpacityPreset::Geom.at(0.0), 1e-6, epsilon = 1e-12);
        assert_relative_eq!(OpacityPreset::GeomR.at(0.0), 1.0);
        assert!(OpacityPreset::Sigmoid.at(0.1) < 0.01);
    }

    #[test]
    fn test_preset_names() {
        assert_eq!("linear_r".parse::<OpacityPreset>().unwrap(), OpacityPreset::LinearR);
        assert_eq!(serde_json::to_string(&OpacityPreset::GeomR).unwrap(), "\"geom_r\"");
        assert!("cubic".parse::<OpacityPreset>().is_err());
    }
}
