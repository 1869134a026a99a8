//! Number formatting for tables, axis ticks and the terminal summaries.

/// `value` rounded half away from zero to `decimals` places, with a comma
/// every three integer digits.
///
/// ```
/// use vislab_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let factor = 10_f64.powi(decimals as i32);
    let rounded = (value.abs() * factor).round() / factor;
    let text = format!("{:.*}", decimals as usize, rounded);
    let (digits, fraction) = match text.split_once('.') {
        Some((d, f)) => (d, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + digits.len() / 3 + 1);
    if value < 0.0 && rounded > 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

/// Y-axis scaling used by the trend charts: counts above 1000 are shown in
/// thousands with a `k` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountScale {
    Units,
    Thousands,
}

impl CountScale {
    /// Pick the scale for a series whose largest value is `max_value`.
    pub fn for_max(max_value: f64) -> Self {
        if max_value > 1000.0 {
            CountScale::Thousands
        } else {
            CountScale::Units
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            CountScale::Units => 1.0,
            CountScale::Thousands => 1000.0,
        }
    }

    /// Axis title matching the scale.
    pub fn axis_label(self) -> &'static str {
        match self {
            CountScale::Units => "Weekly Death Count",
            CountScale::Thousands => "Weekly Death Count (in thousands)",
        }
    }
}

/// Format a death count for an axis tick or table cell under `scale`.
///
/// ```
/// use vislab_core::formatting::{format_count, CountScale};
///
/// assert_eq!(format_count(24_800.0, CountScale::Thousands), "25k");
/// assert_eq!(format_count(2500.0, CountScale::Units), "2,500");
/// ```
pub fn format_count(value: f64, scale: CountScale) -> String {
    match scale {
        CountScale::Units => format_number(value, 0),
        CountScale::Thousands => format!("{}k", format_number(value / 1000.0, 0)),
    }
}

/// Share of `part` in `whole` in percent, rounded to `decimals`; a zero
/// `whole` gives 0.
pub fn percentage(part: f64, whole: f64, decimals: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let factor = 10_f64.powi(decimals as i32);
    (part / whole * 100.0 * factor).round() / factor
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ── format_number ────────────────────────────────────────────────────────

    #[test]
    fn test_format_number_groups_integer_digits() {
        assert_eq!(format_number(5.0, 0), "5");
        assert_eq!(format_number(999.0, 0), "999");
        assert_eq!(format_number(1_000.0, 0), "1,000");
        assert_eq!(format_number(123_456.0, 0), "123,456");
        assert_eq!(format_number(1_234_567.0, 0), "1,234,567");
    }

    #[test]
    fn test_format_number_decimals() {
        assert_eq!(format_number(0.0, 2), "0.00");
        assert_eq!(format_number(123.456, 2), "123.46");
        assert_eq!(format_number(52_000.25, 1), "52,000.3");
    }

    #[test]
    fn test_format_number_rounds_half_away_from_zero() {
        assert_eq!(format_number(2.5, 0), "3");
        assert_eq!(format_number(-2.5, 0), "-3");
    }

    #[test]
    fn test_format_number_no_negative_zero() {
        assert_eq!(format_number(-0.004, 2), "0.00");
        assert_eq!(format_number(-1_500.0, 0), "-1,500");
    }

    // ── format_count ─────────────────────────────────────────────────────────

    #[test]
    fn test_count_scale_threshold() {
        assert_eq!(CountScale::for_max(1000.0), CountScale::Units);
        assert_eq!(CountScale::for_max(1000.5), CountScale::Thousands);
        assert_eq!(
            CountScale::Thousands.axis_label(),
            "Weekly Death Count (in thousands)"
        );
        assert_relative_eq!(CountScale::Thousands.factor(), 1000.0);
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(987.0, CountScale::Units), "987");
        assert_eq!(format_count(12_345.0, CountScale::Units), "12,345");
        assert_eq!(format_count(25_400.0, CountScale::Thousands), "25k");
        assert_eq!(format_count(1_234_000.0, CountScale::Thousands), "1,234k");
    }

    // ── percentage ───────────────────────────────────────────────────────────

    #[test]
    fn test_percentage() {
        assert_relative_eq!(percentage(50.0, 200.0, 1), 25.0);
        assert_relative_eq!(percentage(1.0, 3.0, 2), 33.33);
        assert_relative_eq!(percentage(120.0, 4_800.0, 1), 2.5);
    }

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(percentage(10.0, 0.0, 2), 0.0);
        assert_eq!(percentage(0.0, 0.0, 2), 0.0);
    }
}
