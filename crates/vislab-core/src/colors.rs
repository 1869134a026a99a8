use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, VislabError};
use crate::models::Metric;

/// Named colours understood by [`parse_color`] in addition to hex strings.
const NAMED: [(&str, Rgb); 12] = [
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("orange", Rgb::new(255, 165, 0)),
    ("teal", Rgb::new(0, 128, 128)),
    ("gray", Rgb::new(128, 128, 128)),
    ("grey", Rgb::new(128, 128, 128)),
    ("salmon", Rgb::new(250, 128, 114)),
    ("green", Rgb::new(0, 128, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("ivory", Rgb::new(255, 255, 240)),
];

/// An 8-bit sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to `0.0..=1.0`.
    pub fn to_unit(self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Build from unit channels, clamping and rounding to the nearest byte.
    pub fn from_unit(c: [f64; 3]) -> Self {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(to_byte(c[0]), to_byte(c[1]), to_byte(c[2]))
    }
}

// ── Parsing / formatting ──────────────────────────────────────────────────────

/// Parse `#rrggbb` or `#rgb` (leading `#` optional).
pub fn parse_hex(s: &str) -> Result<Rgb> {
    let invalid = || VislabError::InvalidColor(s.to_string());
    let hex = s.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |h: &str| u8::from_str_radix(h, 16).map_err(|_| invalid());
    match hex.len() {
        6 => Ok(Rgb::new(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |h: &str| channel(&h.repeat(2));
            Ok(Rgb::new(
                expand(&hex[0..1])?,
                expand(&hex[1..2])?,
                expand(&hex[2..3])?,
            ))
        }
        _ => Err(invalid()),
    }
}

/// Parse a colour name (see [`NAMED`]) or a hex string.
pub fn parse_color(s: &str) -> Result<Rgb> {
    let lower = s.trim().to_ascii_lowercase();
    if let Some((_, rgb)) = NAMED.iter().find(|(name, _)| *name == lower) {
        return Ok(*rgb);
    }
    parse_hex(s)
}

/// Lowercase `#rrggbb`.
pub fn to_hex(c: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
}

// ── Colour arithmetic ─────────────────────────────────────────────────────────

/// Mix `color` with white: `0.0` keeps the colour, `1.0` gives white.
pub fn lighten_color(color: &str, amount: f64) -> Result<Rgb> {
    let base = parse_color(color)?;
    Ok(lighten(base, amount))
}

pub fn lighten(base: Rgb, amount: f64) -> Rgb {
    let c = base.to_unit();
    Rgb::from_unit([
        (1.0 - amount) * c[0] + amount,
        (1.0 - amount) * c[1] + amount,
        (1.0 - amount) * c[2] + amount,
    ])
}

/// `n − 1` colours running from the 70 %-lightened primary to the primary,
/// followed by the primary itself, leaving a visible gap before the last
/// entry. `n` of 0 or 1 yields just the primary.
pub fn gradient_with_gaps(primary: &str, n: usize) -> Result<Vec<String>> {
    let base = parse_color(primary)?;
    let light = lighten(base, 0.7).to_unit();
    let dark = base.to_unit();

    let steps = n.saturating_sub(1);
    let denom = n.saturating_sub(2);
    let mut out: Vec<String> = (0..steps)
        .map(|i| {
            let t = if denom == 0 { 0.0 } else { i as f64 / denom as f64 };
            let mix = |k: usize| (1.0 - t) * light[k] + t * dark[k];
            to_hex(Rgb::from_unit([mix(0), mix(1), mix(2)]))
        })
        .collect();
    out.push(to_hex(base));
    Ok(out)
}

// ── MetricColors ──────────────────────────────────────────────────────────────

/// Global colour map for consistent chart styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColors {
    pub primary_color: String,
    pub accent_color_1: String,
    pub metric_colors: BTreeMap<Metric, String>,
}

impl Default for MetricColors {
    fn default() -> Self {
        let metric_colors = BTreeMap::from([
            (Metric::Covid19, "#d62728".to_string()),
            (Metric::Pneumonia, "#1f77b4".to_string()),
            (Metric::Influenza, "#2ca02c".to_string()),
            (Metric::PneumoniaAndCovid19, "#9467bd".to_string()),
            (Metric::PneumoniaInfluenzaOrCovid19, "#8c564b".to_string()),
            (Metric::Total, "#7f7f7f".to_string()),
            (Metric::Undiagnosed, "#ff7f0e".to_string()),
        ]);
        Self {
            primary_color: "#1f77b4".to_string(),
            accent_color_1: "#ff7f0e".to_string(),
            metric_colors,
        }
    }
}

impl MetricColors {
    /// Colour of `metric`, falling back to the primary colour.
    pub fn color_for(&self, metric: Metric) -> &str {
        self.metric_colors
            .get(&metric)
            .map(String::as_str)
            .unwrap_or(&self.primary_color)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
