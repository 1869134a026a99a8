//! Line, scatter and bar charts for the dashboard and the plotting helpers.
//!
//! Line charts are built as a [`ChartModel`] first (owned points, bounds
//! and labels) and drawn with [`ChartModel::render`], since a ratatui
//! [`Chart`] only borrows its data. Bar charts are drawn directly.

use chrono::{Datelike, NaiveDate};
use ratatui::{
    layout::Rect,
    style::Style,
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset as ChartData, GraphType,
        LegendPosition,
    },
    Frame,
};

use vislab_core::formatting::{format_count, format_number, CountScale};
use vislab_core::models::Metric;
use vislab_core::time_utils::month_abbr;
use vislab_data::aggregator::{CategorySum, RelativeCount, YearSeries};
use vislab_data::timeseries::{MultiTimeSeries, Univariate};
use vislab_forecast::{Decomposition, Forecast};

use crate::themes::{hex_color, Theme};

// ── ChartModel ────────────────────────────────────────────────────────────────

/// One plotted series.
#[derive(Debug, Clone)]
pub struct Series {
    /// Legend entry; unnamed series stay out of the legend.
    pub name: Option<String>,
    pub style: Style,
    pub graph: GraphType,
    pub marker: Marker,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn line(name: Option<String>, style: Style, points: Vec<(f64, f64)>) -> Self {
        Self {
            name,
            style,
            graph: GraphType::Line,
            marker: Marker::Braille,
            points,
        }
    }

    pub fn scatter(name: Option<String>, style: Style, points: Vec<(f64, f64)>) -> Self {
        Self {
            name,
            style,
            graph: GraphType::Scatter,
            marker: Marker::Dot,
            points,
        }
    }
}

/// Everything needed to draw a line chart.
#[derive(Debug, Clone)]
pub struct ChartModel {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub series: Vec<Series>,
}

impl ChartModel {
    /// Number of series that show up in the legend.
    pub fn legend_len(&self) -> usize {
        self.series.iter().filter(|s| s.name.is_some()).count()
    }

    pub fn series_named(&self, name: &str) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let datasets: Vec<ChartData> = self
            .series
            .iter()
            .map(|s| {
                let data = ChartData::default()
                    .marker(s.marker)
                    .graph_type(s.graph)
                    .style(s.style)
                    .data(&s.points);
                match &s.name {
                    Some(name) => data.name(name.clone()),
                    None => data,
                }
            })
            .collect();

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.table_border)
                    .title(Span::styled(format!(" {} ", self.title), theme.header)),
            )
            .x_axis(
                Axis::default()
                    .title(Span::styled(self.x_title.clone(), theme.label))
                    .style(theme.axis)
                    .bounds(self.x_bounds)
                    .labels(self.x_labels.clone()),
            )
            .y_axis(
                Axis::default()
                    .title(Span::styled(self.y_title.clone(), theme.label))
                    .style(theme.axis)
                    .bounds(self.y_bounds)
                    .labels(self.y_labels.clone()),
            )
            .legend_position(Some(LegendPosition::TopLeft));

        frame.render_widget(chart, area);
    }
}

// ── Axis helpers ──────────────────────────────────────────────────────────────

/// Chart x coordinate of a date (days since the common era).
pub fn date_to_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

/// Min/max of `values` widened by 5 %; `[0, 1]` when empty and `±1`
/// around a constant.
pub fn axis_bounds(values: impl IntoIterator<Item = f64>) -> [f64; 2] {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return [0.0, 1.0];
    }
    if lo == hi {
        return [lo - 1.0, hi + 1.0];
    }
    let pad = (hi - lo) * 0.05;
    [lo - pad, hi + pad]
}

/// Death-count bounds: always start at zero.
fn count_bounds(values: impl IntoIterator<Item = f64>) -> [f64; 2] {
    [0.0, axis_bounds(values)[1].max(1.0)]
}

/// Low, middle and high tick labels of a count axis.
pub fn count_labels(bounds: [f64; 2], scale: CountScale) -> Vec<String> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|&v| format_count(v, scale))
        .collect()
}

fn numeric_labels(bounds: [f64; 2]) -> Vec<String> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|&v| format_number(v, 2))
        .collect()
}

/// First, middle and last date as `YYYY-MM`.
fn date_labels(dates: &[NaiveDate]) -> Vec<String> {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => {
            let middle = dates[dates.len() / 2];
            [*first, middle, *last]
                .iter()
                .map(|d| d.format("%Y-%m").to_string())
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Python-style capitalisation: first letter upper, the rest lower.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ── Plotting helpers ──────────────────────────────────────────────────────────

/// Line plot with every data point marked: a teal line under grey dots.
pub fn line_with_marks(
    points: &[(f64, f64)],
    label: Option<&str>,
    x_title: &str,
    y_title: &str,
    theme: &Theme,
) -> ChartModel {
    let x_bounds = axis_bounds(points.iter().map(|p| p.0));
    let y_bounds = axis_bounds(points.iter().map(|p| p.1));
    ChartModel {
        title: label.unwrap_or(y_title).to_string(),
        x_title: x_title.to_string(),
        y_title: y_title.to_string(),
        x_bounds,
        y_bounds,
        x_labels: numeric_labels(x_bounds),
        y_labels: numeric_labels(y_bounds),
        series: vec![
            Series::line(
                label.map(str::to_string),
                Style::default().fg(hex_color("#008080")),
                points.to_vec(),
            ),
            Series::scatter(None, theme.scale, points.to_vec()),
        ],
    }
}

/// Scatter plot with a horizontal line at the location parameter and
/// dashed-style lines one scale unit above and below it.
pub fn scatter_with_statistics(
    points: &[(f64, f64)],
    x_title: &str,
    y_title: &str,
    location: (&str, f64),
    scale: (&str, f64),
    theme: &Theme,
) -> ChartModel {
    let x_bounds = axis_bounds(points.iter().map(|p| p.0));
    let (loc, spread) = (location.1, scale.1.abs());
    let y_bounds = axis_bounds(
        points
            .iter()
            .map(|p| p.1)
            .chain([loc - spread, loc + spread]),
    );
    let hline = |y: f64| vec![(x_bounds[0], y), (x_bounds[1], y)];

    ChartModel {
        title: y_title.to_string(),
        x_title: x_title.to_string(),
        y_title: y_title.to_string(),
        x_bounds,
        y_bounds,
        x_labels: numeric_labels(x_bounds),
        y_labels: numeric_labels(y_bounds),
        series: vec![
            Series::scatter(None, theme.text, points.to_vec()),
            Series::line(
                Some(format!("±1 {}", capitalize(scale.0))),
                theme.scale,
                hline(loc + spread),
            ),
            Series::line(None, theme.scale, hline(loc - spread)),
            Series::line(Some(capitalize(location.0)), theme.location, hline(loc)),
        ],
    }
}

// ── Dashboard charts ──────────────────────────────────────────────────────────

/// Weekly death trends of every metric in `series`.
pub fn trend_chart(series: &MultiTimeSeries, theme: &Theme) -> ChartModel {
    let scale = CountScale::for_max(series.max_value());
    let x_values: Vec<f64> = series.dates.iter().map(|&d| date_to_x(d)).collect();
    let x_bounds = axis_bounds(x_values.iter().copied());
    let y_bounds = count_bounds(series.columns.iter().flatten().flatten().copied());

    let lines = series
        .metrics
        .iter()
        .zip(&series.columns)
        .map(|(&metric, column)| {
            let points = x_values
                .iter()
                .zip(column)
                .filter_map(|(&x, v)| v.map(|v| (x, v)))
                .collect();
            Series::line(Some(metric.label().to_string()), theme.metric_style(metric), points)
        })
        .collect();

    ChartModel {
        title: format!("Weekly Death Trends for All Metrics in {}", series.state),
        x_title: "Date".to_string(),
        y_title: scale.axis_label().to_string(),
        x_bounds,
        y_bounds,
        x_labels: date_labels(&series.dates),
        y_labels: count_labels(y_bounds, scale),
        series: lines,
    }
}

/// Forecast line and interval bounds as chart points.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastLines {
    /// Starts at the last actual observation.
    pub forecast: Vec<(f64, f64)>,
    pub upper: Vec<(f64, f64)>,
    pub lower: Vec<(f64, f64)>,
}

/// Join the forecast to the last actual point; with `clamp_zero` forecast
/// values and lower bounds below zero are drawn at zero.
pub fn forecast_lines(
    last_actual: Option<(NaiveDate, f64)>,
    forecast: &Forecast,
    clamp_zero: bool,
) -> ForecastLines {
    let clamp = |v: f64| if clamp_zero { v.max(0.0) } else { v };
    let xs: Vec<f64> = forecast.dates.iter().map(|&d| date_to_x(d)).collect();

    let mut line: Vec<(f64, f64)> = last_actual
        .map(|(d, v)| (date_to_x(d), v))
        .into_iter()
        .collect();
    line.extend(xs.iter().zip(&forecast.values).map(|(&x, &v)| (x, clamp(v))));

    ForecastLines {
        forecast: line,
        upper: xs.iter().zip(&forecast.upper).map(|(&x, &v)| (x, v)).collect(),
        lower: xs
            .iter()
            .zip(&forecast.lower)
            .map(|(&x, &v)| (x, clamp(v)))
            .collect(),
    }
}

/// Actual data in blue, the forecast in orange and the interval envelope
/// as its upper and lower bounds. Death counts cannot be negative, so the
/// y axis starts at zero and values below it are clamped.
pub fn forecast_chart(
    history: &Univariate,
    forecast: &Forecast,
    metric: Metric,
    state: &str,
    theme: &Theme,
) -> ChartModel {
    let last_actual = history.dates.last().copied().zip(history.values.last().copied());
    let lines = forecast_lines(last_actual, forecast, true);

    let actual: Vec<(f64, f64)> = history
        .dates
        .iter()
        .zip(&history.values)
        .map(|(&d, &v)| (date_to_x(d), v))
        .collect();

    let all_dates: Vec<NaiveDate> = history
        .dates
        .iter()
        .chain(&forecast.dates)
        .copied()
        .collect();
    let x_bounds = axis_bounds(all_dates.iter().map(|&d| date_to_x(d)));
    let y_values: Vec<f64> = actual
        .iter()
        .chain(&lines.forecast)
        .chain(&lines.upper)
        .map(|p| p.1)
        .collect();
    let scale = CountScale::for_max(y_values.iter().copied().fold(0.0, f64::max));
    let y_bounds = count_bounds(y_values.iter().copied());

    ChartModel {
        title: format!("Forecast for {} in {}", metric.label(), state),
        x_title: "Date".to_string(),
        y_title: scale.axis_label().to_string(),
        x_bounds,
        y_bounds,
        x_labels: date_labels(&all_dates),
        y_labels: count_labels(y_bounds, scale),
        series: vec![
            Series::line(Some("Actual Data".to_string()), theme.actual, actual),
            Series::line(Some("Forecast".to_string()), theme.forecast, lines.forecast),
            Series::line(
                Some(format!("Confidence Interval α={}", forecast.alpha)),
                theme.interval,
                lines.upper,
            ),
            Series::line(None, theme.interval, lines.lower),
        ],
    }
}

/// One line per year over the months of the year; the newest year is
/// listed first in the legend.
pub fn by_year_chart(years: &[YearSeries], metric: Metric, state: &str, theme: &Theme) -> ChartModel {
    let max = years
        .iter()
        .flat_map(|y| y.points.iter().map(|p| p.1))
        .fold(0.0, f64::max);
    let scale = CountScale::for_max(max);
    let y_bounds = count_bounds(years.iter().flat_map(|y| y.points.iter().map(|p| p.1)));

    let series = years
        .iter()
        .enumerate()
        .rev()
        .map(|(i, year)| {
            let points = year.points.iter().map(|&(m, v)| (m as f64, v)).collect();
            Series::line(Some(year.year.to_string()), theme.series_style(&year.color, i), points)
        })
        .collect();

    ChartModel {
        title: format!("Weekly Deaths for {} in {}", metric.label(), state),
        x_title: "Month".to_string(),
        y_title: scale.axis_label().to_string(),
        x_bounds: [1.0, 12.0],
        y_bounds,
        x_labels: (1..=12).map(|m| month_abbr(m).to_string()).collect(),
        y_labels: count_labels(y_bounds, scale),
        series,
    }
}

/// Observed series with the decomposition's trend drawn over it.
pub fn decomposition_chart(
    dates: &[NaiveDate],
    decomposition: &Decomposition,
    metric: Metric,
    state: &str,
    theme: &Theme,
) -> ChartModel {
    let xs: Vec<f64> = dates.iter().map(|&d| date_to_x(d)).collect();
    let observed: Vec<(f64, f64)> = xs
        .iter()
        .zip(&decomposition.observed)
        .map(|(&x, &v)| (x, v))
        .collect();
    let trend: Vec<(f64, f64)> = xs
        .iter()
        .zip(&decomposition.trend)
        .filter_map(|(&x, t)| t.map(|t| (x, t)))
        .collect();

    let scale = CountScale::for_max(decomposition.observed.iter().copied().fold(0.0, f64::max));
    let x_bounds = axis_bounds(xs.iter().copied());
    let y_bounds = count_bounds(decomposition.observed.iter().copied());

    ChartModel {
        title: format!(
            "Seasonal Decomposition of {} in {} (period {})",
            metric.label(),
            state,
            decomposition.period
        ),
        x_title: "Date".to_string(),
        y_title: scale.axis_label().to_string(),
        x_bounds,
        y_bounds,
        x_labels: date_labels(dates),
        y_labels: count_labels(y_bounds, scale),
        series: vec![
            Series::line(Some("Observed".to_string()), theme.metric_style(metric), observed),
            Series::line(Some("Trend".to_string()), theme.forecast, trend),
        ],
    }
}

// ── Bar charts ────────────────────────────────────────────────────────────────

/// Group `(state, metric, value)` triples by state, keeping the order in
/// which states first appear.
pub fn group_by_state<'a>(
    items: impl IntoIterator<Item = (&'a str, Metric, f64)>,
) -> Vec<(String, Vec<(Metric, f64)>)> {
    let mut groups: Vec<(String, Vec<(Metric, f64)>)> = Vec::new();
    for (state, metric, value) in items {
        match groups.iter_mut().find(|(s, _)| s == state) {
            Some((_, bars)) => bars.push((metric, value)),
            None => groups.push((state.to_string(), vec![(metric, value)])),
        }
    }
    groups
}

fn render_grouped_bars(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    groups: &[(String, Vec<(Metric, f64)>)],
    bar_value: impl Fn(f64) -> (u64, String),
    theme: &Theme,
) {
    let mut chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(Span::styled(format!(" {} ", title), theme.header)),
        )
        .bar_width(7)
        .bar_gap(1)
        .group_gap(3)
        .value_style(theme.bold)
        .label_style(theme.label);

    for (state, values) in groups {
        let bars: Vec<Bar> = values
            .iter()
            .map(|&(metric, v)| {
                let (value, text) = bar_value(v);
                Bar::default()
                    .value(value)
                    .text_value(text)
                    .label(Line::from(short_label(metric)))
                    .style(theme.metric_style(metric))
            })
            .collect();
        chart = chart.data(BarGroup::default().label(Line::from(state.clone())).bars(&bars));
    }

    frame.render_widget(chart, area);
}

fn short_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Covid19 => "COVID",
        Metric::Pneumonia => "Pneu",
        Metric::Influenza => "Flu",
        Metric::PneumoniaAndCovid19 => "P+C",
        Metric::PneumoniaInfluenzaOrCovid19 => "PIC",
        Metric::Total => "Total",
        Metric::Undiagnosed => "Undiag",
    }
}

/// Share of total deaths per metric, one group of bars per state.
pub fn relative_bar_chart(
    frame: &mut Frame,
    area: Rect,
    counts: &[RelativeCount],
    year: i32,
    month: u32,
    theme: &Theme,
) {
    let groups = group_by_state(counts.iter().map(|c| (c.state.as_str(), c.metric, c.relative)));
    render_grouped_bars(
        frame,
        area,
        &format!("Relative Death Counts by Metric ({month}/{year})"),
        &groups,
        |share| ((share * 1000.0).round() as u64, format!("{:.1}%", share * 100.0)),
        theme,
    );
}

/// Absolute deaths per category, one group of bars per state.
pub fn comparison_bar_chart(
    frame: &mut Frame,
    area: Rect,
    sums: &[CategorySum],
    year: i32,
    month: Option<u32>,
    theme: &Theme,
) {
    let groups = group_by_state(sums.iter().map(|s| (s.state.as_str(), s.category, s.deaths)));
    let period = match month {
        Some(m) => format!("{} {}", month_abbr(m), year),
        None => year.to_string(),
    };
    render_grouped_bars(
        frame,
        area,
        &format!("Deaths by State ({period})"),
        &groups,
        |deaths| (deaths.max(0.0).round() as u64, format_number(deaths, 0)),
        theme,
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
