//! Dashboard state and TUI event loop.
//!
//! [`App`] owns the theme, the selections of every control and the state
//! of the forecast panel. Key presses that change the forecast selection
//! produce a [`ForecastRequest`] for the background worker; its
//! [`ForecastUpdate`]s arrive on a channel drained once per tick.

use std::io;
use std::sync::{Arc, TryLockError};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use vislab_core::colors::MetricColors;
use vislab_core::models::{Metric, NATIONAL};
use vislab_core::time_utils::month_abbr;
use vislab_data::aggregator::{filter_sum, relative_death_counts, weekly_deaths_by_year};
use vislab_data::dataset::Dataset;
use vislab_data::timeseries::{create_multi_time_series, univariate, Univariate};
use vislab_forecast::stationarity::adf_test;
use vislab_forecast::{seasonal_decompose, ArimaOrder, DecompositionModel, Forecast};
use vislab_runtime::{lock_cache, ForecastRequest, ForecastUpdate, RuntimeError, SharedCache};

use crate::components::charts;
use crate::components::selector::cycle;
use crate::components::slider::step;
use crate::components::{Header, Selector, Slider};
use crate::table_view;
use crate::themes::Theme;

pub const MIN_WEEKS: usize = 1;
pub const MAX_WEEKS: usize = 52;
pub const DEFAULT_WEEKS: usize = 10;
pub const CI_ALPHA: f64 = 0.05;
/// Weekly data: one seasonal cycle per year.
pub const DECOMPOSITION_PERIOD: usize = 52;

// ── Tab / Control ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Trends,
    Forecast,
    ByYear,
    Compare,
    Decomposition,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::Trends,
        Tab::Forecast,
        Tab::ByYear,
        Tab::Compare,
        Tab::Decomposition,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Trends => "Trends",
            Tab::Forecast => "Forecast",
            Tab::ByYear => "By Year",
            Tab::Compare => "Compare",
            Tab::Decomposition => "Decomposition",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[cycle(self.index(), 1, Self::ALL.len())]
    }

    pub fn prev(self) -> Self {
        Self::ALL[cycle(self.index(), -1, Self::ALL.len())]
    }

    /// Controls shown on this tab, in focus order.
    pub fn controls(self) -> &'static [Control] {
        match self {
            Tab::Trends => &[Control::State],
            Tab::Forecast => &[Control::State, Control::Metric, Control::Weeks],
            Tab::ByYear | Tab::Decomposition => &[Control::State, Control::Metric],
            Tab::Compare => &[Control::Year, Control::Month, Control::States],
        }
    }
}

/// A focusable dashboard control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    State,
    Metric,
    Weeks,
    Year,
    Month,
    States,
}

// ── ForecastPanel ─────────────────────────────────────────────────────────────

/// What the forecast tab shows.
#[derive(Debug, Clone)]
pub enum ForecastPanel {
    Idle,
    Pending(ForecastRequest),
    Ready {
        request: ForecastRequest,
        forecast: Arc<Forecast>,
        order: Option<ArimaOrder>,
        seconds: f64,
    },
    Failed {
        request: ForecastRequest,
        message: String,
    },
}

impl ForecastPanel {
    fn request(&self) -> Option<&ForecastRequest> {
        match self {
            Self::Idle => None,
            Self::Pending(request)
            | Self::Ready { request, .. }
            | Self::Failed { request, .. } => Some(request),
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// Root state of the dashboard.
pub struct App {
    pub theme: Theme,
    pub tab: Tab,
    /// Index into the active tab's [`Tab::controls`].
    focus: usize,
    dataset: Arc<Dataset>,
    cache: SharedCache,
    colors: MetricColors,
    states: Vec<String>,
    years: Vec<i32>,
    state: usize,
    metric: usize,
    weeks: usize,
    alpha: f64,
    year: usize,
    /// `None` compares whole years.
    month: Option<u32>,
    compare_cursor: usize,
    compare_checked: Vec<bool>,
    forecast: ForecastPanel,
    pub should_quit: bool,
}

impl App {
    /// Dashboard over the dataset held by `cache`. Starts on the national
    /// figures, COVID-19, a ten week forecast and the most recent year.
    pub fn new(theme_name: &str, cache: SharedCache) -> Self {
        let dataset = Arc::clone(lock_cache(&cache).dataset());
        let states = dataset.states();
        let years = dataset.years();
        let state = states.iter().position(|s| s == NATIONAL).unwrap_or(0);
        let mut compare_checked = vec![false; states.len()];
        for checked in compare_checked.iter_mut().take(2) {
            *checked = true;
        }

        Self {
            theme: Theme::from_name(theme_name),
            tab: Tab::Trends,
            focus: 0,
            colors: MetricColors::default(),
            year: years.len().saturating_sub(1),
            states,
            years,
            dataset,
            cache,
            state,
            metric: 0,
            weeks: DEFAULT_WEEKS,
            alpha: CI_ALPHA,
            month: None,
            compare_cursor: 0,
            compare_checked,
            forecast: ForecastPanel::Idle,
            should_quit: false,
        }
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    /// Select `state` by name.
    pub fn select_state(&mut self, state: &str) -> Result<(), RuntimeError> {
        match self.states.iter().position(|s| s == state) {
            Some(i) => {
                self.state = i;
                Ok(())
            }
            None => Err(vislab_core::error::VislabError::UnknownState(state.to_string()).into()),
        }
    }

    /// Select one of [`Metric::DASHBOARD`]; other metrics are ignored.
    pub fn select_metric(&mut self, metric: Metric) -> bool {
        match Metric::DASHBOARD.iter().position(|&m| m == metric) {
            Some(i) => {
                self.metric = i;
                true
            }
            None => false,
        }
    }

    /// Forecast horizon, clamped to 1..=52 weeks.
    pub fn set_weeks(&mut self, weeks: usize) {
        self.weeks = weeks.clamp(MIN_WEEKS, MAX_WEEKS);
    }

    pub fn set_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.focus = 0;
    }

    pub fn state(&self) -> Option<&str> {
        self.states.get(self.state).map(String::as_str)
    }

    pub fn metric(&self) -> Metric {
        Metric::DASHBOARD[self.metric]
    }

    pub fn weeks(&self) -> usize {
        self.weeks
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn year(&self) -> Option<i32> {
        self.years.get(self.year).copied()
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn focused_control(&self) -> Control {
        let controls = self.tab.controls();
        controls[self.focus.min(controls.len() - 1)]
    }

    pub fn forecast_panel(&self) -> &ForecastPanel {
        &self.forecast
    }

    /// States ticked in the comparison multiselect, in data order.
    pub fn compared_states(&self) -> Vec<String> {
        self.states
            .iter()
            .zip(&self.compare_checked)
            .filter(|(_, c)| **c)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Forecast request for the current selection.
    pub fn current_request(&self) -> Option<ForecastRequest> {
        self.state()
            .map(|state| ForecastRequest::new(state, self.metric(), self.weeks, self.alpha))
    }

    /// On the forecast tab, a request for the current selection unless the
    /// panel already shows (or awaits) it. The panel turns pending.
    pub fn pending_request(&mut self) -> Option<ForecastRequest> {
        if self.tab != Tab::Forecast {
            return None;
        }
        let request = self.current_request()?;
        if self.forecast.request() == Some(&request) {
            return None;
        }
        self.forecast = ForecastPanel::Pending(request.clone());
        Some(request)
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Apply one key press. Returns a request when the forecast selection
    /// changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ForecastRequest> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.set_tab(self.tab.next()),
            KeyCode::BackTab => self.set_tab(self.tab.prev()),
            KeyCode::Up => {
                self.focus = cycle(self.focus, -1, self.tab.controls().len());
            }
            KeyCode::Down => {
                self.focus = cycle(self.focus, 1, self.tab.controls().len());
            }
            KeyCode::Left => self.change(-1),
            KeyCode::Right => self.change(1),
            KeyCode::Char('+') => self.step_weeks(1),
            KeyCode::Char('-') => self.step_weeks(-1),
            KeyCode::Char(' ') | KeyCode::Enter => {
                if self.focused_control() == Control::States {
                    if let Some(checked) = self.compare_checked.get_mut(self.compare_cursor) {
                        *checked = !*checked;
                    }
                }
            }
            _ => {}
        }
        self.pending_request()
    }

    fn step_weeks(&mut self, delta: i64) {
        self.weeks = step(self.weeks as i64, delta, MIN_WEEKS as i64, MAX_WEEKS as i64) as usize;
    }

    fn change(&mut self, delta: isize) {
        match self.focused_control() {
            Control::State => self.state = cycle(self.state, delta, self.states.len()),
            Control::Metric => self.metric = cycle(self.metric, delta, Metric::DASHBOARD.len()),
            Control::Weeks => self.step_weeks(delta as i64),
            Control::Year => self.year = cycle(self.year, delta, self.years.len()),
            Control::Month => {
                // 0 stands for the whole year.
                let current = self.month.unwrap_or(0) as usize;
                let next = cycle(current, delta, 13) as u32;
                self.month = (next > 0).then_some(next);
            }
            Control::States => {
                self.compare_cursor = cycle(self.compare_cursor, delta, self.states.len());
            }
        }
    }

    /// Fold a worker update into the forecast panel. Updates for anything
    /// but the current selection are stale and dropped; returns whether
    /// the update was applied.
    pub fn apply_update(&mut self, update: ForecastUpdate) -> bool {
        if Some(update.request()) != self.current_request().as_ref() {
            tracing::debug!(state = %update.request().state, "stale forecast update dropped");
            return false;
        }
        self.forecast = match update {
            ForecastUpdate::Started(request) => ForecastPanel::Pending(request),
            ForecastUpdate::Ready {
                request,
                forecast,
                order,
                seconds,
            } => ForecastPanel::Ready {
                request,
                forecast,
                order,
                seconds,
            },
            ForecastUpdate::Failed { request, message } => ForecastPanel::Failed { request, message },
        };
        true
    }

    /// Weekly series from the session cache. While the worker holds the
    /// cache for a fit the series is computed directly instead.
    fn timeseries(&self, state: &str, metric: Metric) -> Result<Arc<Univariate>, RuntimeError> {
        match self.cache.try_lock() {
            Ok(mut cache) => cache.timeseries(state, metric),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().timeseries(state, metric),
            Err(TryLockError::WouldBlock) => {
                let series = univariate(&self.dataset, state, metric)?;
                if series.is_empty() {
                    return Err(RuntimeError::EmptySeries {
                        state: state.to_string(),
                        metric,
                    });
                }
                Ok(Arc::new(series))
            }
        }
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    /// Run the dashboard until `q`, `Esc` or `Ctrl+C`.
    ///
    /// Uses `crossterm::event::poll` with a 250 ms timeout so the terminal
    /// loop stays on the current thread while forecast updates arrive on
    /// `updates` via `try_recv`.
    pub async fn run(
        mut self,
        requests: mpsc::Sender<ForecastRequest>,
        mut updates: mpsc::Receiver<ForecastUpdate>,
    ) -> io::Result<()> {
        let mut terminal = setup_terminal()?;
        let tick_rate = Duration::from_millis(250);

        let result = loop {
            terminal.draw(|frame| self.render(frame))?;

            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if let Some(request) = self.handle_key(key) {
                        if requests.send(request.clone()).await.is_err() {
                            self.forecast = ForecastPanel::Failed {
                                request,
                                message: "Forecast worker stopped".to_string(),
                            };
                        }
                    }
                }
            }

            // Drain pending forecast updates (non-blocking).
            loop {
                match updates.try_recv() {
                    Ok(update) => {
                        self.apply_update(update);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.should_quit = true;
                        break;
                    }
                }
            }

            if self.should_quit {
                break Ok(());
            }
        };

        restore_terminal(&mut terminal)?;
        result
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Length(1),
            ])
            .split(area);

        let state = self.state().unwrap_or("(no data)");
        let header = Header::new(state, self.metric().label(), &self.theme);
        frame.render_widget(Paragraph::new(Text::from(header.to_lines())), rows[0]);

        let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.title()))
            .select(self.tab.index())
            .style(self.theme.tab)
            .highlight_style(self.theme.tab_active);
        frame.render_widget(tabs, rows[1]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(34), Constraint::Min(20)])
            .split(rows[2]);
        self.render_controls(frame, body[0]);

        match self.tab {
            Tab::Trends => self.render_trends(frame, body[1], state),
            Tab::Forecast => self.render_forecast(frame, body[1]),
            Tab::ByYear => self.render_by_year(frame, body[1], state),
            Tab::Compare => self.render_compare(frame, body[1]),
            Tab::Decomposition => self.render_decomposition(frame, body[1], state),
        }

        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "Tab view  ↑/↓ focus  ←/→ change  +/- weeks  Space toggle  q quit",
                self.theme.dim,
            ))),
            rows[3],
        );
    }

    fn render_controls(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focused_control();
        let metric_labels: Vec<String> = Metric::DASHBOARD.iter().map(|m| m.label().to_string()).collect();
        let year_labels: Vec<String> = self.years.iter().map(|y| y.to_string()).collect();
        let month_labels: Vec<String> = std::iter::once("All months".to_string())
            .chain((1..=12).map(|m| month_abbr(m).to_string()))
            .collect();

        let mut lines: Vec<Line> = Vec::new();
        for &control in self.tab.controls() {
            let is_focused = control == focused;
            match control {
                Control::State => lines.push(
                    Selector::new("State", &self.states, self.state, &self.theme)
                        .focused(is_focused)
                        .to_line(),
                ),
                Control::Metric => lines.push(
                    Selector::new("Metric", &metric_labels, self.metric, &self.theme)
                        .focused(is_focused)
                        .to_line(),
                ),
                Control::Weeks => lines.push(
                    Slider::new("Weeks", self.weeks as i64, MIN_WEEKS as i64, MAX_WEEKS as i64, &self.theme)
                        .width(16)
                        .focused(is_focused)
                        .to_line(),
                ),
                Control::Year => lines.push(
                    Selector::new("Year", &year_labels, self.year, &self.theme)
                        .focused(is_focused)
                        .to_line(),
                ),
                Control::Month => lines.push(
                    Selector::new("Month", &month_labels, self.month.unwrap_or(0) as usize, &self.theme)
                        .focused(is_focused)
                        .to_line(),
                ),
                Control::States => {
                    let rows = (area.height as usize).saturating_sub(lines.len() + 4);
                    lines.extend(
                        Selector::new("States", &self.states, self.compare_cursor, &self.theme)
                            .focused(is_focused)
                            .multiselect(&self.compare_checked)
                            .to_lines(rows),
                    );
                }
            }
            lines.push(Line::from(""));
        }
        if self.tab == Tab::Forecast {
            lines.push(Line::from(vec![
                Span::styled("α ", self.theme.label),
                Span::styled(self.alpha.to_string(), self.theme.value),
            ]));
        }

        frame.render_widget(
            Paragraph::new(Text::from(lines)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(self.theme.table_border)
                    .title(" Settings "),
            ),
            area,
        );
    }

    fn render_trends(&self, frame: &mut Frame, area: Rect, state: &str) {
        match create_multi_time_series(&self.dataset, &Metric::DASHBOARD, state) {
            Ok(series) if !series.is_empty() => charts::trend_chart(&series, &self.theme).render(frame, area, &self.theme),
            Ok(_) => table_view::render_no_data(frame, area, &format!("No data for {state}"), &self.theme),
            Err(e) => table_view::render_no_data(frame, area, &e.to_string(), &self.theme),
        }
    }

    fn render_forecast(&self, frame: &mut Frame, area: Rect) {
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(1)])
            .split(area);

        let (status, style) = match &self.forecast {
            ForecastPanel::Idle => ("Select a metric to compute a forecast".to_string(), self.theme.dim),
            ForecastPanel::Pending(request) => (
                format!("Fitting ARIMA model for {} in {}...", request.metric.label(), request.state),
                self.theme.info,
            ),
            ForecastPanel::Ready { order, seconds, .. } => (
                format!(
                    "Best model: {} (fitted in {:.1}s)",
                    order.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
                    seconds
                ),
                self.theme.success,
            ),
            ForecastPanel::Failed { message, .. } => (message.clone(), self.theme.error),
        };

        match &self.forecast {
            ForecastPanel::Ready { request, forecast, .. } => {
                match self.timeseries(&request.state, request.metric) {
                    Ok(history) => charts::forecast_chart(&history, forecast, request.metric, &request.state, &self.theme)
                        .render(frame, parts[0], &self.theme),
                    Err(e) => table_view::render_no_data(frame, parts[0], &e.to_string(), &self.theme),
                }
            }
            ForecastPanel::Failed { message, .. } => {
                table_view::render_no_data(frame, parts[0], message, &self.theme)
            }
            _ => frame.render_widget(
                Paragraph::new(Text::from(vec![Line::from(""), Line::from(Span::styled(status.clone(), style))]))
                    .block(Block::default().borders(Borders::ALL).title(" Forecast ")),
                parts[0],
            ),
        }
        frame.render_widget(Paragraph::new(Line::from(Span::styled(status, style))), parts[1]);
    }

    fn render_by_year(&self, frame: &mut Frame, area: Rect, state: &str) {
        let metric = self.metric();
        match weekly_deaths_by_year(&self.dataset, state, metric, &self.colors) {
            Ok(years) if !years.is_empty() => {
                charts::by_year_chart(&years, metric, state, &self.theme).render(frame, area, &self.theme)
            }
            Ok(_) => table_view::render_no_data(frame, area, &format!("No data for {state}"), &self.theme),
            Err(e) => table_view::render_no_data(frame, area, &e.to_string(), &self.theme),
        }
    }

    fn render_compare(&self, frame: &mut Frame, area: Rect) {
        let states = self.compared_states();
        let Some(year) = self.year() else {
            table_view::render_no_data(frame, area, "No data loaded", &self.theme);
            return;
        };
        if states.is_empty() {
            table_view::render_no_data(frame, area, "Select at least one state", &self.theme);
            return;
        }

        let halves = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        let sums = filter_sum(&self.dataset, year, self.month, &states);
        charts::comparison_bar_chart(frame, halves[0], &sums, year, self.month, &self.theme);

        match self.month {
            Some(month) => {
                let counts = relative_death_counts(&self.dataset, year, month, &states, &Metric::COMPARED);
                if counts.is_empty() {
                    table_view::render_no_data(
                        frame,
                        halves[1],
                        &format!("No data for {}/{}", month, year),
                        &self.theme,
                    );
                } else {
                    charts::relative_bar_chart(frame, halves[1], &counts, year, month, &self.theme);
                }
            }
            None => {
                let table = table_view::compare_table(&sums, year, None);
                table_view::render_table_view(frame, halves[1], &table, &self.theme);
            }
        }
    }

    fn render_decomposition(&self, frame: &mut Frame, area: Rect, state: &str) {
        let metric = self.metric();
        let series = match self.timeseries(state, metric) {
            Ok(series) => series,
            Err(e) => return table_view::render_no_data(frame, area, &e.to_string(), &self.theme),
        };
        let decomposition =
            match seasonal_decompose(&series.values, DECOMPOSITION_PERIOD, DecompositionModel::Additive) {
                Ok(d) => d,
                Err(e) => return table_view::render_no_data(frame, area, &e.to_string(), &self.theme),
            };

        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(3)])
            .split(area);
        charts::decomposition_chart(&series.dates, &decomposition, metric, state, &self.theme)
            .render(frame, parts[0], &self.theme);

        let mut lines = vec![Line::from(vec![
            Span::styled("Seasonal strength  ", self.theme.label),
            Span::styled(format!("{:.3}", decomposition.seasonal_strength()), self.theme.value),
        ])];
        lines.push(match adf_test(&series.values, None) {
            Ok(adf) => Line::from(vec![
                Span::styled("ADF statistic      ", self.theme.label),
                Span::styled(format!("{:.3}", adf.statistic), self.theme.value),
                Span::styled("  p-value ", self.theme.label),
                Span::styled(format!("{:.4}", adf.p_value), self.theme.value),
                if adf.is_stationary() {
                    Span::styled("  stationary", self.theme.success)
                } else {
                    Span::styled("  not stationary", self.theme.warning)
                },
            ]),
            Err(e) => Line::from(Span::styled(e.to_string(), self.theme.error)),
        });
        frame.render_widget(Paragraph::new(Text::from(lines)), parts[1]);
    }
}

// ── Terminal ──────────────────────────────────────────────────────────────────

pub(crate) type Term = Terminal<CrosstermBackend<io::Stdout>>;

pub(crate) fn setup_terminal() -> io::Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Restore terminal state unconditionally.
pub(crate) fn restore_terminal(terminal: &mut Term) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration as Days, NaiveDate};
    use ratatui::backend::TestBackend;
    use std::sync::Mutex;
    use vislab_core::models::{MetricValues, WeeklyRecord};
    use vislab_forecast::AutoArimaConfig;
    use vislab_runtime::SessionCache;

    /// 120 weeks for the United States and Texas, 3 for Ohio.
    fn dataset() -> Dataset {
        let first = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let record = |state: &str, week: i64, scale: f64| {
            let end_date = first + Days::weeks(week);
            let w = week as f64;
            let wave = (w * std::f64::consts::TAU / 52.0).sin();
            WeeklyRecord {
                state: state.to_string(),
                start_date: end_date - Days::days(6),
                end_date,
                mmwr_week: end_date.iso_week().week(),
                year: end_date.year(),
                month: end_date.month(),
                values: MetricValues {
                    covid19: Some(scale * (200.0 + w + 50.0 * wave)),
                    pneumonia: Some(scale * (150.0 + 30.0 * wave)),
                    influenza: Some(scale * (20.0 + 10.0 * wave).max(0.0)),
                    pneumonia_and_covid19: Some(scale * 80.0),
                    pneumonia_influenza_or_covid19: Some(scale * 300.0),
                    total: Some(scale * 3000.0),
                },
            }
        };
        let mut records: Vec<WeeklyRecord> = Vec::new();
        records.extend((0..120).map(|w| record(NATIONAL, w, 10.0)));
        records.extend((0..120).map(|w| record("Texas", w, 1.0)));
        records.extend((0..3).map(|w| record("Ohio", w, 0.5)));
        Dataset::new(records)
    }

    fn shared_cache() -> SharedCache {
        Arc::new(Mutex::new(SessionCache::new(
            Arc::new(dataset()),
            AutoArimaConfig::default().non_seasonal(),
        )))
    }

    fn app() -> App {
        App::new("dark", shared_cache())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn draw(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 36)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_defaults() {
        let app = app();
        assert_eq!(app.tab, Tab::Trends);
        assert_eq!(app.state(), Some(NATIONAL));
        assert_eq!(app.metric(), Metric::Covid19);
        assert_eq!(app.weeks(), 10);
        assert_eq!(app.alpha(), 0.05);
        assert_eq!(app.year(), Some(2022));
        assert_eq!(app.month(), None);
        assert_eq!(app.compared_states(), vec![NATIONAL.to_string(), "Texas".to_string()]);
        assert!(matches!(app.forecast_panel(), ForecastPanel::Idle));
        assert!(!app.should_quit);
    }

    #[test]
    fn test_select_state_unknown() {
        let mut app = app();
        let err = app.select_state("Atlantis").unwrap_err();
        assert_eq!(err.to_string(), "State 'Atlantis' not found in the data!");
        app.select_state("Ohio").unwrap();
        assert_eq!(app.state(), Some("Ohio"));
    }

    #[test]
    fn test_select_metric_only_dashboard_metrics() {
        let mut app = app();
        assert!(app.select_metric(Metric::Undiagnosed));
        assert_eq!(app.metric(), Metric::Undiagnosed);
        assert!(!app.select_metric(Metric::Total));
        assert_eq!(app.metric(), Metric::Undiagnosed);
    }

    // ── Tabs and focus ────────────────────────────────────────────────────────

    #[test]
    fn test_tab_cycle() {
        assert_eq!(Tab::Trends.next(), Tab::Forecast);
        assert_eq!(Tab::Decomposition.next(), Tab::Trends);
        assert_eq!(Tab::Trends.prev(), Tab::Decomposition);
    }

    #[test]
    fn test_entering_forecast_tab_requests_forecast() {
        let mut app = app();
        let request = app.handle_key(key(KeyCode::Tab)).unwrap();
        assert_eq!(app.tab, Tab::Forecast);
        assert_eq!(request, ForecastRequest::new(NATIONAL, Metric::Covid19, 10, 0.05));
        assert!(matches!(app.forecast_panel(), ForecastPanel::Pending(_)));

        // Same selection, no new request.
        assert!(app.handle_key(key(KeyCode::Down)).is_none());
    }

    #[test]
    fn test_weeks_keys_clamp() {
        let mut app = app();
        app.set_tab(Tab::Forecast);
        let request = app.handle_key(key(KeyCode::Char('+'))).unwrap();
        assert_eq!(request.steps, 11);

        app.set_weeks(60);
        assert_eq!(app.weeks(), 52);
        app.handle_key(key(KeyCode::Char('+')));
        assert_eq!(app.weeks(), 52);

        app.set_weeks(1);
        app.handle_key(key(KeyCode::Char('-')));
        assert_eq!(app.weeks(), 1);
    }

    #[test]
    fn test_arrows_change_focused_control() {
        let mut app = app();
        app.set_tab(Tab::Forecast);
        assert_eq!(app.focused_control(), Control::State);
        let request = app.handle_key(key(KeyCode::Right)).unwrap();
        assert_eq!(request.state, "Texas");

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.focused_control(), Control::Metric);
        let request = app.handle_key(key(KeyCode::Left)).unwrap();
        assert_eq!(request.metric, Metric::Undiagnosed);

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.focused_control(), Control::Weeks);
        assert_eq!(app.handle_key(key(KeyCode::Right)).unwrap().steps, 11);
    }

    #[test]
    fn test_compare_controls() {
        let mut app = app();
        app.set_tab(Tab::Compare);
        assert_eq!(app.focused_control(), Control::Year);
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.year(), Some(2021));

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.month(), Some(1));
        app.handle_key(key(KeyCode::Left));
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.month(), Some(12));

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.focused_control(), Control::States);
        app.handle_key(key(KeyCode::Char(' ')));
        app.handle_key(key(KeyCode::Right));
        app.handle_key(key(KeyCode::Right));
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.compared_states(), vec!["Texas".to_string(), "Ohio".to_string()]);
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);

        let mut other = App::new("light", shared_cache());
        other.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(other.should_quit);
    }

    // ── Worker updates ────────────────────────────────────────────────────────

    #[test]
    fn test_apply_update_drops_stale() {
        let mut app = app();
        app.set_tab(Tab::Forecast);
        let stale = ForecastRequest::new("Texas", Metric::Covid19, 10, 0.05);
        assert!(!app.apply_update(ForecastUpdate::Failed {
            request: stale,
            message: "boom".into(),
        }));
        assert!(matches!(app.forecast_panel(), ForecastPanel::Idle));

        let current = app.current_request().unwrap();
        assert!(app.apply_update(ForecastUpdate::Failed {
            request: current,
            message: "boom".into(),
        }));
        assert!(matches!(app.forecast_panel(), ForecastPanel::Failed { .. }));
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_render_trends() {
        let text = draw(&app());
        assert!(text.contains("VISUAL ANALYSIS OF COVID-19"));
        assert!(text.contains("Weekly Death Trends for All Metrics in United States"));
        assert!(text.contains("Settings"));
    }

    #[test]
    fn test_render_forecast_ready() {
        let cache = shared_cache();
        let mut app = App::new("dark", Arc::clone(&cache));
        app.select_state("Texas").unwrap();
        app.set_tab(Tab::Forecast);
        let request = app.pending_request().unwrap();

        let forecast = lock_cache(&cache).forecast("Texas", Metric::Covid19, 10).unwrap();
        assert!(app.apply_update(ForecastUpdate::Ready {
            request,
            forecast,
            order: None,
            seconds: 0.5,
        }));
        let text = draw(&app);
        assert!(text.contains("Forecast for COVID-19 in Texas"));
        assert!(text.contains("fitted in 0.5s"));
    }

    #[test]
    fn test_render_forecast_pending() {
        let mut app = app();
        app.set_tab(Tab::Forecast);
        app.pending_request();
        assert!(draw(&app).contains("Fitting ARIMA model"));
    }

    #[test]
    fn test_render_by_year() {
        let mut app = app();
        app.set_tab(Tab::ByYear);
        assert!(draw(&app).contains("Weekly Deaths for COVID-19 in United States"));
    }

    #[test]
    fn test_render_compare_whole_year_and_month() {
        let mut app = app();
        app.set_tab(Tab::Compare);
        assert!(draw(&app).contains("Deaths by State (2022)"));

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Right));
        let text = draw(&app);
        assert!(text.contains("Relative Death Counts by Metric (1/2022)"));
    }

    #[test]
    fn test_render_decomposition() {
        let mut app = app();
        app.set_tab(Tab::Decomposition);
        let text = draw(&app);
        assert!(text.contains("Seasonal Decomposition"));
        assert!(text.contains("Seasonal strength"));
        assert!(text.contains("ADF statistic"));
    }

    #[test]
    fn test_render_decomposition_short_series_inline_error() {
        let mut app = app();
        app.select_state("Ohio").unwrap();
        app.set_tab(Tab::Decomposition);
        let text = draw(&app);
        assert!(text.contains("No data"));
        assert!(!text.contains("Seasonal strength"));
    }
}
