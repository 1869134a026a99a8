//! Grayscale rendering of DICOM slices with the half-block technique: each
//! terminal cell shows two pixel rows, the upper one as foreground of `▀`
//! and the lower one as background.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use vislab_runtime::viewer::{DicomViewer, FilterParam};
use vislab_volume::{FilterParams, Slice};

use crate::themes::Theme;

const UPPER_HALF: &str = "\u{2580}"; // ▀  UPPER HALF BLOCK

/// Map `value` to an 8-bit gray level with `lo..=hi` as the window.
pub fn gray_level(value: f64, lo: f64, hi: f64) -> u8 {
    if hi <= lo {
        return 0;
    }
    (((value - lo) / (hi - lo)).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Output size in pixels when `width × height` is shrunk to fit
/// `cols × 2·rows` with nearest-neighbour sampling, aspect kept.
pub fn fit_size(width: usize, height: usize, cols: usize, rows: usize) -> (usize, usize, f64) {
    if width == 0 || height == 0 || cols == 0 || rows == 0 {
        return (0, 0, 1.0);
    }
    let factor = (width as f64 / cols as f64)
        .max(height as f64 / (2 * rows) as f64)
        .max(1.0);
    let w = ((width as f64 / factor).floor() as usize).max(1);
    let h = ((height as f64 / factor).floor() as usize).max(1);
    (w, h, factor)
}

/// Lines of half-block cells showing `slice` within `cols × rows` cells.
pub fn slice_lines(slice: &Slice, cols: usize, rows: usize) -> Vec<Line<'static>> {
    let (w, h, factor) = fit_size(slice.width, slice.height, cols, rows);
    let (lo, hi) = slice.range();
    let sample = |x: usize, y: usize| {
        let sx = ((x as f64 * factor) as usize).min(slice.width - 1);
        let sy = ((y as f64 * factor) as usize).min(slice.height - 1);
        let g = gray_level(slice.get(sx, sy), lo, hi);
        Color::Rgb(g, g, g)
    };

    (0..h)
        .step_by(2)
        .map(|y| {
            let spans: Vec<Span<'static>> = (0..w)
                .map(|x| {
                    let bottom = if y + 1 < h { sample(x, y + 1) } else { Color::Reset };
                    Span::styled(UPPER_HALF, Style::default().fg(sample(x, y)).bg(bottom))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn param_value(params: &FilterParams, param: FilterParam) -> String {
    match param {
        FilterParam::GaussianRadius => params.gaussian_radius.to_string(),
        FilterParam::GaussianStd => params.gaussian_std.to_string(),
        FilterParam::KernelSize => params.kernel_size.to_string(),
    }
}

/// Text of the control panel next to the image. `editing` is the
/// parameter receiving keyboard input together with the typed text.
pub fn control_lines<'a>(
    viewer: &DicomViewer,
    editing: Option<(FilterParam, &str)>,
    theme: &Theme,
) -> Vec<Line<'a>> {
    let directory = viewer
        .directory()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    let resampling = viewer
        .resampling()
        .map(|i| i.as_str().to_string())
        .unwrap_or_else(|| "off".to_string());

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label:<16}"), theme.label),
            Span::styled(value, theme.value),
        ])
    };

    let mut lines = vec![
        field("Directory", directory),
        field("Filter", viewer.filter().to_string()),
        field("Resampling", resampling),
        Line::from(""),
    ];

    let params = viewer.params();
    for &param in viewer.visible_params() {
        let line = match editing {
            Some((p, text)) if p == param => Line::from(vec![
                Span::styled(format!("{:<16}", param.label()), theme.focused),
                Span::styled(format!("{text}_"), theme.focused),
            ]),
            _ => field(param.label(), param_value(&params, param)),
        };
        lines.push(line);
    }

    let status_style = if viewer.slice_count() == 0 {
        theme.warning
    } else {
        theme.info
    };
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(viewer.status().to_string(), status_style)));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "←/→ slice  f filter  r resample  Tab edit  Enter apply  q quit",
        theme.dim,
    )));
    lines
}

/// Draw the current slice and the control panel.
pub fn render_slice_view(
    frame: &mut Frame,
    area: Rect,
    viewer: &DicomViewer,
    editing: Option<(FilterParam, &str)>,
    theme: &Theme,
) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(44)])
        .split(area);

    let title = if viewer.slice_count() == 0 {
        " DICOM Viewer ".to_string()
    } else {
        format!(" Slice {}/{} ", viewer.current_index(), viewer.slice_count() - 1)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.table_border)
        .title(Span::styled(title, theme.header));
    let inner = block.inner(chunks[0]);

    let image = match viewer.current_slice() {
        Some(slice) => Text::from(slice_lines(slice, inner.width as usize, inner.height as usize)),
        None => Text::from(Line::from(Span::styled(viewer.status().to_string(), theme.warning))),
    };
    frame.render_widget(Paragraph::new(image).block(block), chunks[0]);

    frame.render_widget(
        Paragraph::new(Text::from(control_lines(viewer, editing, theme))).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(" Controls "),
        ),
        chunks[1],
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
