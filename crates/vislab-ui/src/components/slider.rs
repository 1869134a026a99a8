use crate::themes::Theme;
use ratatui::text::{Line, Span};

/// Integer slider rendered as `Label  ████░░░░ value`.
pub struct Slider<'a> {
    pub label: &'a str,
    pub value: i64,
    pub min: i64,
    pub max: i64,
    /// Width in terminal columns of the track.
    pub width: u16,
    pub focused: bool,
    pub theme: &'a Theme,
}

impl<'a> Slider<'a> {
    pub fn new(label: &'a str, value: i64, min: i64, max: i64, theme: &'a Theme) -> Self {
        Self {
            label,
            value,
            min,
            max,
            width: 30,
            focused: false,
            theme,
        }
    }

    pub fn width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Position of the value along the track, `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.max <= self.min {
            return 1.0;
        }
        let clamped = self.value.clamp(self.min, self.max);
        (clamped - self.min) as f64 / (self.max - self.min) as f64
    }

    pub fn to_line(&self) -> Line<'a> {
        let filled = (self.fraction() * self.width as f64).round() as usize;
        let empty = (self.width as usize).saturating_sub(filled);

        let label_style = if self.focused {
            self.theme.focused
        } else {
            self.theme.label
        };

        Line::from(vec![
            Span::styled(format!("{}  ", self.label), label_style),
            Span::styled(
                "\u{2588}".repeat(filled), // █  FULL BLOCK
                self.theme.slider_style(self.focused),
            ),
            Span::styled("\u{2591}".repeat(empty), self.theme.slider_empty), // ░  LIGHT SHADE
            Span::styled(format!(" {}", self.value), self.theme.value),
        ])
    }
}

/// Step `value` by `delta`, clamped to `min..=max`.
pub fn step(value: i64, delta: i64, min: i64, max: i64) -> i64 {
    (value + delta).clamp(min, max)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_slider_fraction() {
        let theme = Theme::dark();
        assert_relative_eq!(Slider::new("Weeks", 1, 1, 52, &theme).fraction(), 0.0);
        assert_relative_eq!(Slider::new("Weeks", 52, 1, 52, &theme).fraction(), 1.0);
        assert_relative_eq!(Slider::new("Weeks", 99, 1, 52, &theme).fraction(), 1.0);
        assert_relative_eq!(Slider::new("Degenerate", 3, 3, 3, &theme).fraction(), 1.0);
    }

    #[test]
    fn test_slider_line_layout() {
        let theme = Theme::dark();
        let line = Slider::new("Weeks", 6, 1, 11, &theme).width(10).to_line();
        assert_eq!(text(&line), "Weeks  █████░░░░░ 6");
        assert_eq!(line.spans.len(), 4);
    }

    #[test]
    fn test_slider_focus_highlights_track() {
        let theme = Theme::dark();
        let line = Slider::new("Weeks", 6, 1, 11, &theme).focused(true).to_line();
        assert_eq!(line.spans[0].style, theme.focused);
        assert_eq!(line.spans[1].style, theme.focused);
    }

    #[test]
    fn test_step_clamps() {
        assert_eq!(step(10, 1, 1, 52), 11);
        assert_eq!(step(52, 1, 1, 52), 52);
        assert_eq!(step(1, -1, 1, 52), 1);
    }
}
