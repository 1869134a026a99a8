//! Interactive DICOM slice viewer.
//!
//! Arrow keys move through the series, `f` cycles the smoothing filter,
//! `r` cycles the resampling mode and `Tab` opens the next filter input
//! for typing; `Enter` applies the typed value.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use vislab_runtime::viewer::{DicomViewer, FilterParam};
use vislab_volume::{Interpolation, SliceFilter};

use crate::app::{restore_terminal, setup_terminal};
use crate::components::selector::cycle;
use crate::slice_view;
use crate::themes::Theme;

/// Slices skipped by `PageUp` / `PageDown`.
const PAGE: usize = 10;

pub struct ViewerApp {
    pub viewer: DicomViewer,
    pub theme: Theme,
    /// Index into the viewer's visible parameters and the typed text.
    editing: Option<(usize, String)>,
    /// Last rejected change, shown under the image.
    error: Option<String>,
    pub should_quit: bool,
}

impl ViewerApp {
    pub fn new(viewer: DicomViewer, theme: Theme) -> Self {
        Self {
            viewer,
            theme,
            editing: None,
            error: None,
            should_quit: false,
        }
    }

    pub fn editing(&self) -> Option<(FilterParam, &str)> {
        let (i, text) = self.editing.as_ref()?;
        let param = *self.viewer.visible_params().get(*i)?;
        Some((param, text.as_str()))
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }
        if self.editing.is_some() {
            self.handle_edit_key(key.code);
            return;
        }

        let index = self.viewer.current_index();
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Left => self.viewer.set_slice(index.saturating_sub(1)),
            KeyCode::Right => self.viewer.set_slice(index + 1),
            KeyCode::PageDown => self.viewer.set_slice(index + PAGE),
            KeyCode::PageUp => self.viewer.set_slice(index.saturating_sub(PAGE)),
            KeyCode::Home => self.viewer.set_slice(0),
            KeyCode::End => self.viewer.set_slice(usize::MAX),
            KeyCode::Char('f') => {
                let current = SliceFilter::ALL
                    .iter()
                    .position(|&f| f == self.viewer.filter())
                    .unwrap_or(0);
                let next = SliceFilter::ALL[cycle(current, 1, SliceFilter::ALL.len())];
                let result = self.viewer.set_filter(next);
                self.record(result);
            }
            KeyCode::Char('r') => {
                let next = next_resampling(self.viewer.resampling());
                let result = self.viewer.set_resampling(next);
                self.record(result);
            }
            KeyCode::Tab if !self.viewer.visible_params().is_empty() => {
                self.editing = Some((0, String::new()));
            }
            _ => {}
        }
    }

    fn handle_edit_key(&mut self, code: KeyCode) {
        let count = self.viewer.visible_params().len();
        let Some((index, text)) = self.editing.as_mut() else {
            return;
        };
        match code {
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => text.push(c),
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Tab => {
                *index = cycle(*index, 1, count);
                text.clear();
            }
            KeyCode::Esc => self.editing = None,
            KeyCode::Enter => {
                let (index, text) = (*index, std::mem::take(text));
                self.editing = None;
                if let Some(&param) = self.viewer.visible_params().get(index) {
                    let result = self.viewer.update_param(param, &text).map(|_| ());
                    self.record(result);
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, result: vislab_runtime::Result<()>) {
        self.error = result.err().map(|e| {
            tracing::warn!(error = %e, "viewer update failed");
            e.to_string()
        });
    }

    pub fn render(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(1)])
            .split(frame.area());

        slice_view::render_slice_view(frame, rows[0], &self.viewer, self.editing(), &self.theme);
        if let Some(error) = &self.error {
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(error.clone(), self.theme.error))),
                rows[1],
            );
        }
    }

    /// Run the viewer until `q`, `Esc` or `Ctrl+C`.
    pub fn run(mut self) -> io::Result<()> {
        let mut terminal = setup_terminal()?;
        let tick_rate = Duration::from_millis(250);

        let result = loop {
            terminal.draw(|frame| self.render(frame))?;
            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key);
                }
            }
            if self.should_quit {
                break Ok(());
            }
        };

        restore_terminal(&mut terminal)?;
        result
    }
}

/// Off, then each interpolation in turn, then off again.
pub fn next_resampling(current: Option<Interpolation>) -> Option<Interpolation> {
    match current {
        None => Some(Interpolation::ALL[0]),
        Some(interp) => {
            let i = Interpolation::ALL.iter().position(|&m| m == interp).unwrap_or(0);
            Interpolation::ALL.get(i + 1).copied()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use vislab_volume::Slice;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn viewer_app(count: usize) -> ViewerApp {
        let mut viewer = DicomViewer::new();
        let slices = (0..count)
            .map(|k| {
                let values = (0..64).map(|i| (i * (k + 1)) as f64).collect();
                Slice::new(8, 8, values).unwrap()
            })
            .collect();
        viewer.load_slices(slices).unwrap();
        ViewerApp::new(viewer, Theme::dark())
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    #[test]
    fn test_arrow_keys_move_and_clamp() {
        let mut app = viewer_app(3);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.viewer.current_index(), 1);
        app.handle_key(key(KeyCode::End));
        assert_eq!(app.viewer.current_index(), 2);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.viewer.current_index(), 2);
        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.viewer.current_index(), 0);
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.viewer.current_index(), 0);
        assert_eq!(app.viewer.status(), "Slice 0/2");
    }

    #[test]
    fn test_filter_and_resampling_cycle() {
        let mut app = viewer_app(1);
        app.handle_key(key(KeyCode::Char('f')));
        assert_eq!(app.viewer.filter(), SliceFilter::Gaussian);

        app.handle_key(key(KeyCode::Char('r')));
        assert_eq!(app.viewer.resampling(), Some(Interpolation::Nearest));
        assert!(app.error().is_none());
    }

    #[test]
    fn test_next_resampling_wraps_to_off() {
        assert_eq!(next_resampling(None), Some(Interpolation::Nearest));
        assert_eq!(next_resampling(Some(Interpolation::Nearest)), Some(Interpolation::Bilinear));
        assert_eq!(next_resampling(Some(Interpolation::Bicubic)), None);
    }

    // ── Parameter input ─────────────────────────────────────────────────────

    #[test]
    fn test_typed_kernel_size_applied() {
        let mut app = viewer_app(1);
        app.viewer.set_filter(SliceFilter::Median).unwrap();

        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('5')));
        assert_eq!(app.editing(), Some((FilterParam::KernelSize, "5")));
        // Letters are not accepted by numeric inputs.
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Enter));

        assert!(app.editing().is_none());
        assert_eq!(app.viewer.params().kernel_size, 5);
    }

    #[test]
    fn test_unparsable_input_ignored() {
        let mut app = viewer_app(1);
        app.viewer.set_filter(SliceFilter::Gaussian).unwrap();
        let before = app.viewer.params();

        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('.')));
        app.handle_key(key(KeyCode::Char('.')));
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.viewer.params(), before);
        assert!(app.error().is_none());
    }

    #[test]
    fn test_tab_without_inputs_does_nothing() {
        let mut app = viewer_app(1);
        app.handle_key(key(KeyCode::Tab));
        assert!(app.editing().is_none());
    }

    #[test]
    fn test_quit_only_outside_edit() {
        let mut app = viewer_app(1);
        app.viewer.set_filter(SliceFilter::Average).unwrap();
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        app.handle_key(key(KeyCode::Esc));
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    // ── Render ──────────────────────────────────────────────────────────────

    #[test]
    fn test_render_viewer_app() {
        let app = viewer_app(2);
        let mut terminal = Terminal::new(TestBackend::new(90, 20)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
    }
}
