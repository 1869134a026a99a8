use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::error::{Result, VislabError};

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a date as written by the CDC export.
///
/// Accepts `%m/%d/%Y`, `%Y-%m-%d`, and ISO datetimes (the time part is
/// dropped).
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return Err(VislabError::DateParse(s.to_string()));
    }

    const DATE_FMTS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    const DATETIME_FMTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    Err(VislabError::DateParse(s.to_string()))
}

// ── Weekly calendar ───────────────────────────────────────────────────────────

/// The first Saturday strictly after `date`.
pub fn next_saturday(date: NaiveDate) -> NaiveDate {
    let days_from_sat = ((date.weekday().num_days_from_sunday() + 1) % 7) as i64;
    date + Duration::days(7 - days_from_sat)
}

/// The `n` week-ending Saturdays that follow `last`.
///
/// A Saturday `last` is the week ending of the final observation, so the
/// first forecast week ends seven days later.
pub fn next_week_endings(last: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let first = next_saturday(last);
    (0..n as i64).map(|i| first + Duration::weeks(i)).collect()
}

/// Three-letter English month abbreviation; `"?"` outside 1–12.
pub fn month_abbr(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_ABBR[(month - 1) as usize],
        _ => "?",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
