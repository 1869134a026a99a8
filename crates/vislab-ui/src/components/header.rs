use crate::themes::Theme;
use ratatui::text::{Line, Span};

pub const TITLE: &str = "VISUAL ANALYSIS OF COVID-19, PNEUMONIA AND INFLUENZA DEATHS";

/// Dashboard header rendering four lines:
///
/// 1. Application title (ALL CAPS).
/// 2. A 60-column `=` separator.
/// 3. The current selection in `[ state | metric ]` format.
/// 4. An empty line.
pub struct Header<'a> {
    /// Selected state (or "United States").
    pub state: &'a str,
    /// Display label of the selected metric.
    pub metric: &'a str,
    /// Theme providing colour styles for each part of the header.
    pub theme: &'a Theme,
}

impl<'a> Header<'a> {
    pub fn new(state: &'a str, metric: &'a str, theme: &'a Theme) -> Self {
        Self {
            state,
            metric,
            theme,
        }
    }

    /// Render the header as exactly four lines.
    pub fn to_lines(&self) -> Vec<Line<'a>> {
        let separator = "=".repeat(60);

        vec![
            Line::from(Span::styled(TITLE, self.theme.header)),
            Line::from(Span::styled(separator, self.theme.separator)),
            Line::from(vec![
                Span::styled("[ ", self.theme.label),
                Span::styled(self.state, self.theme.header_accent),
                Span::styled(" | ", self.theme.label),
                Span::styled(self.metric, self.theme.value),
                Span::styled(" ]", self.theme.label),
            ]),
            Line::from(""),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
