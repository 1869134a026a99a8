//! Tabular views of the aggregated death counts and forecasts.
//!
//! Each builder returns a [`TableData`] that can be drawn as a bordered
//! [`ratatui::widgets::Table`] or printed as aligned plain text by the CLI.
//! Tables with a totals row show it highlighted at the bottom.

use ratatui::{
    layout::{Constraint, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use vislab_core::formatting::{format_number, percentage};
use vislab_core::models::Metric;
use vislab_core::time_utils::month_abbr;
use vislab_data::aggregator::{CategorySum, RelativeCount, TrendPoint};
use vislab_forecast::Forecast;

use crate::components::charts::group_by_state;
use crate::themes::Theme;

/// Headers, body rows and an optional totals row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub totals: Option<Vec<String>>,
}

impl TableData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Display width of each column over headers, rows and totals.
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in self.rows.iter().chain(self.totals.iter()) {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.width());
                }
            }
        }
        widths
    }

    /// Title line followed by space-aligned columns; the first column is
    /// left-aligned, numbers right-aligned.
    pub fn to_plain_text(&self) -> String {
        let widths = self.column_widths();
        let fmt_row = |row: &[String]| -> String {
            row.iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (cell, &w))| {
                    let pad = " ".repeat(w.saturating_sub(cell.width()));
                    if i == 0 {
                        format!("{cell}{pad}")
                    } else {
                        format!("{pad}{cell}")
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let rule = "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1));
        let mut out = vec![self.title.clone(), fmt_row(&self.headers), rule.clone()];
        out.extend(self.rows.iter().map(|r| fmt_row(r)));
        if let Some(totals) = &self.totals {
            out.push(rule);
            out.push(fmt_row(totals));
        }
        out.join("\n")
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// Monthly COVID-19 / Pneumonia / Influenza sums with a totals row.
pub fn trend_table(points: &[TrendPoint], state: &str, year: i32) -> TableData {
    let rows = points
        .iter()
        .map(|p| {
            vec![
                month_abbr(p.month).to_string(),
                format_number(p.covid19, 0),
                format_number(p.pneumonia, 0),
                format_number(p.influenza, 0),
            ]
        })
        .collect();
    let sum = |f: fn(&TrendPoint) -> f64| format_number(points.iter().map(f).sum(), 0);

    TableData {
        title: format!("Monthly Deaths in {state} ({year})"),
        headers: strings(&["Month", "COVID-19", "Pneumonia", "Influenza"]),
        rows,
        totals: Some(vec![
            "TOTAL".to_string(),
            sum(|p| p.covid19),
            sum(|p| p.pneumonia),
            sum(|p| p.influenza),
        ]),
    }
}

/// One row per state with its COVID-19, Pneumonia and Influenza sums.
pub fn compare_table(sums: &[CategorySum], year: i32, month: Option<u32>) -> TableData {
    let groups = group_by_state(sums.iter().map(|s| (s.state.as_str(), s.category, s.deaths)));
    let value = |bars: &[(Metric, f64)], metric: Metric| {
        bars.iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| format_number(*v, 0))
            .unwrap_or_default()
    };
    let rows = groups
        .iter()
        .map(|(state, bars)| {
            let mut row = vec![state.clone()];
            row.extend(Metric::COMPARED.iter().map(|&m| value(bars, m)));
            row
        })
        .collect();
    let period = match month {
        Some(m) => format!("{} {year}", month_abbr(m)),
        None => year.to_string(),
    };

    let mut headers = vec!["State".to_string()];
    headers.extend(Metric::COMPARED.iter().map(|m| m.label().to_string()));
    TableData {
        title: format!("Deaths by State ({period})"),
        headers,
        rows,
        totals: None,
    }
}

/// Deaths, total and share of total per (state, metric).
pub fn relative_table(counts: &[RelativeCount], year: i32, month: u32) -> TableData {
    let rows = counts
        .iter()
        .map(|c| {
            vec![
                c.state.clone(),
                c.metric.label().to_string(),
                format_number(c.deaths, 0),
                format_number(c.total, 0),
                format!("{:.1}%", percentage(c.deaths, c.total, 1)),
            ]
        })
        .collect();
    TableData {
        title: format!("Relative Death Counts by Metric ({month}/{year})"),
        headers: strings(&["State", "Metric", "Deaths", "Total", "% of Total Deaths"]),
        rows,
        totals: None,
    }
}

/// Week-ending date, point forecast and interval bounds.
pub fn forecast_table(forecast: &Forecast, metric: Metric, state: &str) -> TableData {
    let level = format_number((1.0 - forecast.alpha) * 100.0, 0);
    let rows = forecast
        .dates
        .iter()
        .zip(&forecast.values)
        .zip(forecast.lower.iter().zip(&forecast.upper))
        .map(|((date, value), (lower, upper))| {
            vec![
                date.format("%Y-%m-%d").to_string(),
                format_number(*value, 1),
                format_number(*lower, 1),
                format_number(*upper, 1),
            ]
        })
        .collect();
    TableData {
        title: format!("Forecast for {} in {state}", metric.label()),
        headers: vec![
            "Week Ending".to_string(),
            "Forecast".to_string(),
            format!("Lower {level}%"),
            format!("Upper {level}%"),
        ],
        rows,
        totals: None,
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render `data` into `area`; body rows alternate styles and the totals
/// row is highlighted.
pub fn render_table_view(frame: &mut Frame, area: Rect, data: &TableData, theme: &Theme) {
    let header = Row::new(
        data.headers
            .iter()
            .map(|h| Cell::from(h.clone()).style(theme.table_header)),
    )
    .height(1);

    let mut rows: Vec<Row> = data
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let style = if i % 2 == 0 {
                theme.table_row
            } else {
                theme.table_row_alt
            };
            Row::new(row.iter().map(|c| Cell::from(c.clone()))).style(style)
        })
        .collect();

    if let Some(totals) = &data.totals {
        rows.push(Row::new(totals.iter().map(|c| Cell::from(c.clone()))).style(theme.table_total));
    }

    let widths: Vec<Constraint> = data
        .column_widths()
        .into_iter()
        .map(|w| Constraint::Length(w as u16 + 2))
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(format!(" {} ", data.title)),
        )
        .style(theme.text);

    frame.render_widget(table, area);
}

/// Placeholder shown instead of a table or chart, e.g. for an unknown
/// state or an empty selection.
pub fn render_no_data(frame: &mut Frame, area: Rect, message: &str, theme: &Theme) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(message.to_string(), theme.warning)),
        Line::from(""),
        Line::from(Span::styled("Change the selection or press 'q' to exit", theme.dim)),
    ];
    frame.render_widget(
        Paragraph::new(ratatui::text::Text::from(text))
            .block(Block::default().borders(Borders::ALL).title(" No data ")),
        area,
    );
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn points() -> Vec<TrendPoint> {
        vec![
            TrendPoint { month: 1, covid19: 1200.0, pneumonia: 300.0, influenza: 5.0 },
            TrendPoint { month: 2, covid19: 800.0, pneumonia: 250.0, influenza: 0.0 },
        ]
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    // ── Builders ─────────────────────────────────────────────────────────────

    #[test]
    fn test_trend_table_rows_and_totals() {
        let table = trend_table(&points(), "Texas", 2021);
        assert_eq!(table.title, "Monthly Deaths in Texas (2021)");
        assert_eq!(table.rows[0], vec!["Jan", "1,200", "300", "5"]);
        assert_eq!(table.totals.as_ref().unwrap(), &vec!["TOTAL", "2,000", "550", "5"]);
    }

    #[test]
    fn test_compare_table_pivots_by_state() {
        let sums: Vec<CategorySum> = Metric::COMPARED
            .iter()
            .flat_map(|&m| {
                ["Texas", "Ohio"].map(|s| CategorySum {
                    state: s.to_string(),
                    category: m,
                    deaths: if s == "Texas" { 10.0 } else { 20.0 },
                })
            })
            .collect();
        let table = compare_table(&sums, 2021, Some(2));
        assert_eq!(table.title, "Deaths by State (Feb 2021)");
        assert_eq!(table.headers, vec!["State", "COVID-19", "Pneumonia", "Influenza"]);
        assert_eq!(table.rows, vec![
            vec!["Texas", "10", "10", "10"],
            vec!["Ohio", "20", "20", "20"],
        ]);
    }

    #[test]
    fn test_relative_table_percentages() {
        let counts = vec![RelativeCount {
            state: "Ohio".into(),
            metric: Metric::Pneumonia,
            deaths: 50.0,
            total: 400.0,
            relative: 0.125,
        }];
        let table = relative_table(&counts, 2022, 3);
        assert_eq!(table.rows[0][4], "12.5%");
    }

    #[test]
    fn test_forecast_table_level_in_headers() {
        let forecast = Forecast {
            dates: vec![NaiveDate::from_ymd_opt(2021, 1, 9).unwrap()],
            values: vec![12.345],
            lower: vec![2.0],
            upper: vec![20.0],
            alpha: 0.05,
        };
        let table = forecast_table(&forecast, Metric::Covid19, "Texas");
        assert_eq!(table.headers[2], "Lower 95%");
        assert_eq!(table.rows[0], vec!["2021-01-09", "12.3", "2.0", "20.0"]);
    }

    // ── Plain text ───────────────────────────────────────────────────────────

    #[test]
    fn test_plain_text_alignment() {
        let text = trend_table(&points(), "Texas", 2021).to_plain_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Monthly Deaths in Texas (2021)");
        assert_eq!(lines[1], "Month  COVID-19  Pneumonia  Influenza");
        assert_eq!(lines[3], "Jan       1,200        300          5");
        assert_eq!(lines.last().copied(), Some("TOTAL     2,000        550          5"));
    }

    // ── Render ───────────────────────────────────────────────────────────────

    #[test]
    fn test_render_table_view() {
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        let theme = Theme::dark();
        let table = trend_table(&points(), "Texas", 2021);
        terminal
            .draw(|frame| render_table_view(frame, frame.area(), &table, &theme))
            .unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("Monthly Deaths in Texas"));
        assert!(text.contains("TOTAL"));
    }

    #[test]
    fn test_render_empty_table_does_not_panic() {
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        let theme = Theme::light();
        let table = relative_table(&[], 2021, 1);
        assert!(table.is_empty());
        terminal
            .draw(|frame| render_table_view(frame, frame.area(), &table, &theme))
            .unwrap();
    }

    #[test]
    fn test_render_no_data_shows_message() {
        let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();
        let theme = Theme::dark();
        terminal
            .draw(|frame| {
                render_no_data(frame, frame.area(), "State 'Atlantis' not found in the data!", &theme)
            })
            .unwrap();
        assert!(buffer_text(&terminal).contains("Atlantis"));
    }
}
