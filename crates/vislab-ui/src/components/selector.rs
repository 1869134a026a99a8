use crate::themes::Theme;
use ratatui::text::{Line, Span};

/// Drop-down style list: collapsed it shows `Label: ▼ value`, expanded it
/// lists every option with the selected one marked. With `checked` set it
/// behaves as a multiselect, each option carrying a `[x]` box.
pub struct Selector<'a> {
    pub label: &'a str,
    pub options: &'a [String],
    pub selected: usize,
    pub focused: bool,
    /// Per-option check marks for multiselects.
    pub checked: Option<&'a [bool]>,
    pub theme: &'a Theme,
}

impl<'a> Selector<'a> {
    pub fn new(label: &'a str, options: &'a [String], selected: usize, theme: &'a Theme) -> Self {
        Self {
            label,
            options,
            selected,
            focused: false,
            checked: None,
            theme,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn multiselect(mut self, checked: &'a [bool]) -> Self {
        self.checked = Some(checked);
        self
    }

    /// The option under the cursor, if any.
    pub fn current(&self) -> Option<&'a str> {
        self.options.get(self.selected).map(String::as_str)
    }

    fn label_style(&self) -> ratatui::style::Style {
        if self.focused {
            self.theme.focused
        } else {
            self.theme.label
        }
    }

    /// Collapsed one-line form. Multiselects list the checked options.
    pub fn to_line(&self) -> Line<'a> {
        let value = match self.checked {
            Some(checked) => {
                let picked: Vec<&str> = self
                    .options
                    .iter()
                    .zip(checked)
                    .filter(|(_, c)| **c)
                    .map(|(o, _)| o.as_str())
                    .collect();
                if picked.is_empty() {
                    "(none)".to_string()
                } else {
                    picked.join(", ")
                }
            }
            None => self.current().unwrap_or("(none)").to_string(),
        };
        Line::from(vec![
            Span::styled(format!("{}: ", self.label), self.label_style()),
            Span::styled("▼ ", self.theme.dim),
            Span::styled(value, self.theme.value),
        ])
    }

    /// Expanded form: the label line followed by at most `max_rows`
    /// options in a window that keeps the cursor visible.
    pub fn to_lines(&self, max_rows: usize) -> Vec<Line<'a>> {
        let mut lines = vec![Line::from(Span::styled(
            format!("{}:", self.label),
            self.label_style(),
        ))];
        let rows = max_rows.max(1);
        let start = if self.selected >= rows {
            self.selected + 1 - rows
        } else {
            0
        };

        for (i, option) in self.options.iter().enumerate().skip(start).take(rows) {
            let cursor = if i == self.selected { "› " } else { "  " };
            let mut spans = vec![Span::styled(cursor, self.theme.focused)];
            if let Some(checked) = self.checked {
                let mark = if checked.get(i).copied().unwrap_or(false) {
                    "[x] "
                } else {
                    "[ ] "
                };
                spans.push(Span::styled(mark, self.theme.dim));
            }
            let style = if i == self.selected {
                self.theme.selected
            } else {
                self.theme.text
            };
            spans.push(Span::styled(option.clone(), style));
            lines.push(Line::from(spans));
        }
        lines
    }
}

/// Move a selection index by `delta`, wrapping around `len`.
pub fn cycle(index: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (index as isize + delta).rem_euclid(len as isize) as usize
}

// ── Tests ─────────────────────────────────────────────────────────────────────
