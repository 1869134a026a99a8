use ratatui::style::{Color, Modifier, Style};
use vislab_core::colors::{parse_hex, MetricColors};
use vislab_core::models::Metric;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundType {
    Dark,
    Light,
}

/// Background reported by `COLORFGBG` (`"fg;bg"`, ANSI 0–6 dark, 7–15
/// light). Missing or unparsable values count as dark.
pub fn detect_background() -> BackgroundType {
    background_from(std::env::var("COLORFGBG").ok().as_deref())
}

fn background_from(colorfgbg: Option<&str>) -> BackgroundType {
    match colorfgbg
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok())
    {
        Some(0..=6) | None => BackgroundType::Dark,
        Some(_) => BackgroundType::Light,
    }
}

/// Convert a `#rrggbb` colour to a terminal colour; invalid input maps to
/// the terminal's default foreground.
pub fn hex_color(hex: &str) -> Color {
    parse_hex(hex)
        .map(|c| Color::Rgb(c.r, c.g, c.b))
        .unwrap_or(Color::Reset)
}

/// Every style used by the dashboard and the viewers.
#[derive(Debug, Clone)]
pub struct Theme {
    // ── Header ───────────────────────────────────────────────────────────────
    pub header: Style,
    pub header_accent: Style,
    pub separator: Style,

    // ── Text ─────────────────────────────────────────────────────────────────
    pub text: Style,
    pub dim: Style,
    pub bold: Style,
    pub label: Style,
    pub value: Style,

    // ── Status ───────────────────────────────────────────────────────────────
    pub info: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,

    // ── Controls ─────────────────────────────────────────────────────────────
    pub focused: Style,
    pub selected: Style,
    pub tab: Style,
    pub tab_active: Style,
    pub slider_filled: Style,
    pub slider_empty: Style,

    // ── Charts ───────────────────────────────────────────────────────────────
    pub axis: Style,
    pub actual: Style,
    pub forecast: Style,
    pub interval: Style,
    pub location: Style,
    pub scale: Style,

    // ── Table ────────────────────────────────────────────────────────────────
    pub table_header: Style,
    pub table_border: Style,
    pub table_row: Style,
    pub table_row_alt: Style,
    pub table_total: Style,

    /// Metric line colours; `None` uses the ANSI palette of
    /// [`Theme::metric_style`].
    pub metric_colors: Option<MetricColors>,
}

/// Role colours a theme is built from.
#[derive(Debug, Clone, Copy)]
struct Palette {
    primary: Color,
    accent: Color,
    text: Color,
    muted: Color,
    faint: Color,
    /// Text on a `primary` background.
    on_primary: Color,
    forecast: Color,
    interval: Color,
}

impl Theme {
    fn from_palette(p: Palette, bold: bool, metric_colors: Option<MetricColors>) -> Self {
        let fg = |c: Color| Style::default().fg(c);
        let strong = |c: Color| {
            if bold {
                fg(c).add_modifier(Modifier::BOLD)
            } else {
                fg(c)
            }
        };
        Self {
            header: strong(p.primary),
            header_accent: fg(p.accent),
            separator: fg(p.faint),

            text: fg(p.text),
            dim: fg(p.faint),
            bold: strong(p.text),
            label: fg(p.muted),
            value: strong(p.text),

            info: fg(p.primary),
            success: fg(Color::Green),
            warning: fg(Color::Yellow),
            error: fg(Color::Red),

            focused: strong(p.accent),
            selected: fg(p.primary),
            tab: fg(p.muted),
            tab_active: strong(p.on_primary).bg(p.primary),
            slider_filled: fg(p.primary),
            slider_empty: fg(p.faint),

            axis: fg(p.muted),
            actual: fg(Color::Blue),
            forecast: fg(p.forecast),
            interval: fg(p.interval),
            location: fg(Color::Red),
            scale: fg(p.muted),

            table_header: strong(p.primary),
            table_border: fg(p.faint),
            table_row: fg(p.text),
            table_row_alt: fg(p.muted),
            table_total: strong(p.accent),

            metric_colors,
        }
    }

    // ── Constructors ─────────────────────────────────────────────────────────

    /// Dark-background terminal theme (default).
    pub fn dark() -> Self {
        let palette = Palette {
            primary: Color::Cyan,
            accent: Color::Yellow,
            text: Color::White,
            muted: Color::Gray,
            faint: Color::DarkGray,
            on_primary: Color::Black,
            forecast: Color::Rgb(255, 165, 0),
            interval: Color::Rgb(255, 210, 128),
        };
        Self::from_palette(palette, true, Some(MetricColors::default()))
    }

    /// Light-background terminal theme.
    pub fn light() -> Self {
        let palette = Palette {
            primary: Color::Blue,
            accent: Color::Magenta,
            text: Color::Black,
            muted: Color::DarkGray,
            faint: Color::Gray,
            on_primary: Color::White,
            forecast: Color::Rgb(230, 120, 0),
            interval: Color::Rgb(240, 180, 90),
        };
        Self::from_palette(palette, true, Some(MetricColors::default()))
    }

    /// Basic 8-colour ANSI palette without bold text; metric lines use
    /// named colours instead of the `#rrggbb` map.
    pub fn classic() -> Self {
        let palette = Palette {
            primary: Color::Cyan,
            accent: Color::Yellow,
            text: Color::White,
            muted: Color::Gray,
            faint: Color::DarkGray,
            on_primary: Color::Black,
            forecast: Color::Yellow,
            interval: Color::DarkGray,
        };
        Self::from_palette(palette, false, None)
    }

    pub fn auto_detect() -> Self {
        if detect_background() == BackgroundType::Light {
            Self::light()
        } else {
            Self::dark()
        }
    }

    /// `light`, `dark` or `classic`; anything else is auto-detected.
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "dark" => Self::dark(),
            "classic" => Self::classic(),
            _ => Self::auto_detect(),
        }
    }

    // ── Style helpers ────────────────────────────────────────────────────────

    /// Line style of a metric in the trend charts.
    pub fn metric_style(&self, metric: Metric) -> Style {
        let color = match &self.metric_colors {
            Some(colors) => hex_color(colors.color_for(metric)),
            None => match metric {
                Metric::Covid19 => Color::Red,
                Metric::Pneumonia => Color::Blue,
                Metric::Influenza => Color::Green,
                Metric::PneumoniaAndCovid19 => Color::Magenta,
                Metric::PneumoniaInfluenzaOrCovid19 => Color::Cyan,
                Metric::Total => Color::Gray,
                Metric::Undiagnosed => Color::Yellow,
            },
        };
        Style::default().fg(color)
    }

    /// Line style for a `#rrggbb` series colour (the by-year palette).
    /// The classic theme ignores the colour and alternates the ANSI
    /// palette by `index`.
    pub fn series_style(&self, hex: &str, index: usize) -> Style {
        const ANSI: [Color; 6] = [
            Color::Blue,
            Color::Cyan,
            Color::Green,
            Color::Magenta,
            Color::White,
            Color::Yellow,
        ];
        match self.metric_colors {
            Some(_) => Style::default().fg(hex_color(hex)),
            None => Style::default().fg(ANSI[index % ANSI.len()]),
        }
    }

    /// Filled portion of a slider; the focused slider is highlighted.
    pub fn slider_style(&self, focused: bool) -> Style {
        if focused {
            self.focused
        } else {
            self.slider_filled
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
