use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Weekly death-count export loaded when `--data` is not given.
pub const DEFAULT_DATA_PATH: &str =
    "Provisional_COVID-19_Death_Counts_by_Week_Ending_Date_and_State_20241211.csv";
pub const DEFAULT_STATE: &str = "United States";
pub const DEFAULT_METRIC: &str = "COVID-19";
pub const DEFAULT_FORECAST_WEEKS: u32 = 10;
pub const DEFAULT_ALPHA: f64 = 0.05;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Visual analytics lab: weekly death-count dashboard, forecasting and volume rendering
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vislab",
    about = "Visual analytics lab: weekly death-count dashboard, forecasting and volume rendering",
    version
)]
pub struct Settings {
    /// Weekly death-count CSV export
    #[arg(long, global = true, default_value = DEFAULT_DATA_PATH)]
    pub data: PathBuf,

    /// Display theme
    #[arg(long, global = true, default_value = "auto", value_parser = ["light", "dark", "classic", "auto"])]
    pub theme: String,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands; running without one opens the dashboard.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Interactive terminal dashboard
    Dashboard(DashboardArgs),
    /// Monthly COVID-19 / Pneumonia / Influenza totals for one state and year
    Trends(TrendsArgs),
    /// Compare death counts across states
    Compare(CompareArgs),
    /// Auto-ARIMA forecast of a weekly series
    Forecast(ForecastArgs),
    /// Classical seasonal decomposition and stationarity test
    Decompose(DecomposeArgs),
    /// Volume rendering configurations and Markdown report
    Volume(VolumeArgs),
    /// Marching-cubes isosurface extraction
    Isosurface(IsosurfaceArgs),
    /// Volume rendering with a centre/spread opacity transfer function
    Transfer(TransferArgs),
    /// DICOM slice viewer with smoothing filters
    Dicom(DicomArgs),
    /// Profile an EHR table: sparse columns and k-means elbow
    Profile(ProfileArgs),
}

/// State and metric selection shared by the time-series commands.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SelectionArgs {
    /// State name ("United States" for national data)
    #[arg(long)]
    pub state: Option<String>,

    /// Metric label, e.g. "COVID-19" or "Undiagnosed"
    #[arg(long)]
    pub metric: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Weeks to forecast (1-52)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=52))]
    pub weeks: Option<u32>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct TrendsArgs {
    #[arg(long)]
    pub state: Option<String>,

    /// Year to summarise (latest year in the data when omitted)
    #[arg(long)]
    pub year: Option<i32>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct CompareArgs {
    /// Year to compare (latest year in the data when omitted)
    #[arg(long)]
    pub year: Option<i32>,

    /// Restrict to one month (1-12)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,

    /// Comma-separated state names
    #[arg(long, value_delimiter = ',', required = true)]
    pub states: Vec<String>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Weeks to forecast (1-52)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=52))]
    pub weeks: Option<u32>,

    /// Significance level of the confidence interval
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    pub alpha: f64,

    /// Also search seasonal orders with this period in weeks (e.g. 52)
    #[arg(long, value_parser = clap::value_parser!(u32).range(2..))]
    pub seasonal_period: Option<u32>,

    /// Information criterion used to rank candidate models
    #[arg(long, default_value = "aic", value_parser = ["aic", "bic"])]
    pub ic: String,

    /// Print the forecast as JSON
    #[arg(long)]
    pub json: bool,

    /// Print residual diagnostics of the selected model
    #[arg(long)]
    pub diagnostics: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct DecomposeArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Seasonal period in weeks
    #[arg(long, default_value_t = 52)]
    pub period: usize,

    /// Multiplicative instead of additive model
    #[arg(long)]
    pub multiplicative: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct VolumeArgs {
    /// VTK ImageData file
    #[arg(long, default_value = "shoulder.vti")]
    pub input: PathBuf,

    /// Render configurations by index (1-based); no index renders all
    #[arg(long, num_args = 0.., conflicts_with = "markdown")]
    pub render: Option<Vec<usize>>,

    /// Generate the Markdown report
    #[arg(long)]
    pub markdown: bool,

    /// Directory for images, configuration dumps and descriptions
    #[arg(long, default_value = "rendered_images")]
    pub output_dir: PathBuf,

    /// Markdown report path
    #[arg(long, default_value = "volume_task2_report.md")]
    pub report: PathBuf,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct IsosurfaceArgs {
    #[arg(long, default_value = "shoulder.vti")]
    pub input: PathBuf,

    /// Scalar value of the extracted surface
    #[arg(long, default_value_t = 1200.0)]
    pub isovalue: f64,

    /// Write the mesh as Wavefront OBJ
    #[arg(long)]
    pub obj: Option<PathBuf>,

    /// Render the mesh to a PNG
    #[arg(long)]
    pub png: Option<PathBuf>,

    /// Render every lighting preset next to `--png`
    #[arg(long)]
    pub presets: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct TransferArgs {
    #[arg(long, default_value = "shoulder.vti")]
    pub input: PathBuf,

    /// Density with full opacity
    #[arg(long, default_value_t = 1900.0)]
    pub center: f64,

    /// Half-width of the opaque neighbourhood (1-500)
    #[arg(long, default_value_t = 360.0)]
    pub spread: f64,

    #[arg(long, default_value = "transfer.png")]
    pub png: PathBuf,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct DicomArgs {
    /// Directory containing the `.dcm` series
    #[arg(long)]
    pub dir: PathBuf,

    #[arg(long, default_value = "original", value_parser = ["original", "gaussian", "median", "average"])]
    pub filter: String,

    /// Downsample and re-enlarge each slice with this interpolation
    #[arg(long, value_parser = ["nearest", "bilinear", "bicubic"])]
    pub resample: Option<String>,

    /// Slice index (0-based)
    #[arg(long)]
    pub slice: Option<usize>,

    /// Write the selected slice as a grayscale PNG
    #[arg(long)]
    pub png: Option<PathBuf>,

    /// Open the interactive slice viewer
    #[arg(long)]
    pub view: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ProfileArgs {
    /// EHR CSV file
    #[arg(long, default_value = "UE5-data/data_ehr.csv")]
    pub input: PathBuf,

    /// Minimum fraction of non-missing values a column needs to be kept
    #[arg(long, default_value_t = 0.3)]
    pub threshold: f64,

    /// Largest k of the elbow curve
    #[arg(long)]
    pub elbow: Option<usize>,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.vislab/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weeks: Option<u32>,
}

impl LastUsedParams {
    /// `~/.vislab/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn config_path_in(home: &Path) -> PathBuf {
        home.join(".vislab").join("last_used.json")
    }

    /// Persisted params at `path`; a missing or unreadable file yields the
    /// defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring corrupt {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write through a sibling temp file and rename, so readers never see
    /// a partial file.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&staged, path)
    }

    pub fn clear_at(path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments, fill unset values from the persisted
    /// params and save the merged result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// [`Settings::load_with_last_used`] over explicit `args` and config path.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &Path,
    ) -> Self {
        let matches = <Settings as CommandFactory>::command().get_matches_from(args);
        let mut settings = match Settings::from_arg_matches(&matches) {
            Ok(s) => s,
            Err(e) => e.exit(),
        };

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                warn!("Failed to clear {}: {}", config_path.display(), e);
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        if !is_arg_explicitly_set(&matches, "theme") {
            if let Some(v) = last.theme.clone() {
                settings.theme = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "data") {
            if let Some(v) = last.data.clone() {
                settings.data = v;
            }
        }
        if let Some(selection) = settings.selection_mut() {
            if selection.state.is_none() {
                selection.state = last.state.clone();
            }
            if selection.metric.is_none() {
                selection.metric = last.metric.clone();
            }
        }
        if let Some(weeks) = settings.weeks_mut() {
            if weeks.is_none() {
                *weeks = last.weeks;
            }
        }

        settings = Self::apply_debug(settings);

        let params = LastUsedParams::from(&settings).merged_over(last);
        match params.save_to(config_path) {
            Ok(()) => debug!("Saved last-used params to {}", config_path.display()),
            Err(e) => warn!("Failed to save {}: {}", config_path.display(), e),
        }

        settings
    }

    /// The subcommand to run; no subcommand means the dashboard.
    pub fn resolved_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Dashboard(DashboardArgs::default()))
    }

    fn selection(&self) -> Option<&SelectionArgs> {
        match &self.command {
            Some(Command::Dashboard(a)) => Some(&a.selection),
            Some(Command::Forecast(a)) => Some(&a.selection),
            Some(Command::Decompose(a)) => Some(&a.selection),
            _ => None,
        }
    }

    fn selection_mut(&mut self) -> Option<&mut SelectionArgs> {
        if self.command.is_none() {
            self.command = Some(Command::Dashboard(DashboardArgs::default()));
        }
        match &mut self.command {
            Some(Command::Dashboard(a)) => Some(&mut a.selection),
            Some(Command::Forecast(a)) => Some(&mut a.selection),
            Some(Command::Decompose(a)) => Some(&mut a.selection),
            _ => None,
        }
    }

    fn weeks_mut(&mut self) -> Option<&mut Option<u32>> {
        match &mut self.command {
            Some(Command::Dashboard(a)) => Some(&mut a.weeks),
            Some(Command::Forecast(a)) => Some(&mut a.weeks),
            _ => None,
        }
    }

    fn weeks(&self) -> Option<u32> {
        match &self.command {
            Some(Command::Dashboard(a)) => a.weeks,
            Some(Command::Forecast(a)) => a.weeks,
            _ => None,
        }
    }

    fn apply_debug(mut settings: Settings) -> Settings {
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

impl SelectionArgs {
    pub fn state_or_default(&self) -> &str {
        self.state.as_deref().unwrap_or(DEFAULT_STATE)
    }

    pub fn metric_or_default(&self) -> &str {
        self.metric.as_deref().unwrap_or(DEFAULT_METRIC)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        let selection = s.selection();
        LastUsedParams {
            theme: Some(s.theme.clone()),
            data: Some(s.data.clone()),
            state: selection.and_then(|sel| sel.state.clone()),
            metric: selection.and_then(|sel| sel.metric.clone()),
            weeks: s.weeks(),
        }
    }
}

impl LastUsedParams {
    /// Keep `older` values for every field this run left unset.
    fn merged_over(self, older: LastUsedParams) -> LastUsedParams {
        LastUsedParams {
            theme: self.theme.or(older.theme),
            data: self.data.or(older.data),
            state: self.state.or(older.state),
            metric: self.metric.or(older.metric),
            weeks: self.weeks.or(older.weeks),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line,
/// either before or after the subcommand.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    let on_command_line =
        |m: &clap::ArgMatches| m.value_source(name) == Some(clap::parser::ValueSource::CommandLine);
    if on_command_line(matches) {
        return true;
    }
    matches
        .subcommand()
        .map(|(_, sub)| on_command_line(sub))
        .unwrap_or(false)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn load(args: &[&str], config_path: &Path) -> Settings {
        Settings::load_with_last_used_impl(args.iter().map(|a| (*a).into()).collect(), config_path)
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            theme: Some("dark".to_string()),
            data: Some(PathBuf::from("deaths.csv")),
            state: Some("Texas".to_string()),
            metric: Some("Influenza".to_string()),
            weeks: Some(12),
        };
        params.save_to(&path).expect("save");

        assert_eq!(LastUsedParams::load_from(&path), params);
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);

        let params = LastUsedParams {
            theme: Some("light".to_string()),
            ..Default::default()
        };
        params.save_to(&path).expect("save");
        assert!(path.exists(), "file must exist after save");

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists(), "file must be gone after clear");
    }

    #[test]
    fn test_last_used_params_default_when_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert_eq!(loaded, LastUsedParams::default());
    }

    #[test]
    fn test_last_used_params_default_when_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    // ── CLI parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["vislab"]);

        assert_eq!(settings.data, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(settings.theme, "auto");
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
        assert!(!settings.clear);
        assert!(settings.command.is_none());
        assert!(matches!(settings.resolved_command(), Command::Dashboard(_)));
    }

    #[test]
    fn test_settings_global_flag_after_subcommand() {
        let settings = Settings::parse_from(["vislab", "trends", "--theme", "dark"]);
        assert_eq!(settings.theme, "dark");
    }

    #[test]
    fn test_settings_forecast_args() {
        let settings = Settings::parse_from([
            "vislab",
            "forecast",
            "--state",
            "Texas",
            "--metric",
            "Influenza",
            "--weeks",
            "20",
            "--ic",
            "bic",
            "--json",
        ]);
        let Command::Forecast(args) = settings.resolved_command() else {
            panic!("expected forecast");
        };
        assert_eq!(args.selection.state.as_deref(), Some("Texas"));
        assert_eq!(args.selection.metric.as_deref(), Some("Influenza"));
        assert_eq!(args.weeks, Some(20));
        assert_eq!(args.ic, "bic");
        assert!((args.alpha - 0.05).abs() < f64::EPSILON);
        assert!(args.json);
        assert!(!args.diagnostics);
        assert_eq!(args.seasonal_period, None);
    }

    #[test]
    fn test_settings_forecast_seasonal_period() {
        let settings = Settings::parse_from(["vislab", "forecast", "--seasonal-period", "52"]);
        let Command::Forecast(args) = settings.resolved_command() else {
            panic!("expected forecast");
        };
        assert_eq!(args.seasonal_period, Some(52));
        assert!(Settings::try_parse_from(["vislab", "forecast", "--seasonal-period", "1"]).is_err());
    }

    #[test]
    fn test_settings_weeks_out_of_range() {
        let result = Settings::try_parse_from(["vislab", "dashboard", "--weeks", "53"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_compare_states_comma_separated() {
        let settings =
            Settings::parse_from(["vislab", "compare", "--year", "2021", "--states", "Texas,Ohio"]);
        let Command::Compare(args) = settings.resolved_command() else {
            panic!("expected compare");
        };
        assert_eq!(args.states, vec!["Texas".to_string(), "Ohio".to_string()]);
        assert_eq!(args.year, Some(2021));
        assert!(args.month.is_none());
    }

    #[test]
    fn test_settings_volume_render_without_indices() {
        let settings = Settings::parse_from(["vislab", "volume", "--render"]);
        let Command::Volume(args) = settings.resolved_command() else {
            panic!("expected volume");
        };
        assert_eq!(args.render, Some(vec![]));
        assert_eq!(args.output_dir, PathBuf::from("rendered_images"));
        assert_eq!(args.report, PathBuf::from("volume_task2_report.md"));
    }

    #[test]
    fn test_settings_volume_render_indices() {
        let settings = Settings::parse_from(["vislab", "volume", "--render", "1", "3"]);
        let Command::Volume(args) = settings.resolved_command() else {
            panic!("expected volume");
        };
        assert_eq!(args.render, Some(vec![1, 3]));
        assert!(!args.markdown);
    }

    #[test]
    fn test_settings_volume_render_conflicts_with_markdown() {
        let result = Settings::try_parse_from(["vislab", "volume", "--render", "1", "--markdown"]);
        assert!(result.is_err());
    }

    // ── load_with_last_used ───────────────────────────────────────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            theme: Some("dark".to_string()),
            state: Some("Ohio".to_string()),
            weeks: Some(30),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = load(&["vislab"], &config_path);
        assert_eq!(settings.theme, "dark");
        let Command::Dashboard(args) = settings.resolved_command() else {
            panic!("expected dashboard");
        };
        assert_eq!(args.selection.state.as_deref(), Some("Ohio"));
        assert_eq!(args.weeks, Some(30));
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            theme: Some("dark".to_string()),
            state: Some("Ohio".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = load(
            &["vislab", "--theme", "light", "forecast", "--state", "Texas"],
            &config_path,
        );
        assert_eq!(settings.theme, "light");
        let Command::Forecast(args) = settings.resolved_command() else {
            panic!("expected forecast");
        };
        assert_eq!(args.selection.state_or_default(), "Texas");
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            theme: Some("classic".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        load(&["vislab", "--clear"], &config_path);

        assert!(!config_path.exists(), "file must be gone after --clear");
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = load(&["vislab", "--debug"], &tmp_config_path(&tmp));
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_keeps_selection_from_other_commands() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        load(&["vislab", "forecast", "--state", "Maine"], &config_path);
        // `trends` has no selection; the persisted state must survive it.
        load(&["vislab", "trends"], &config_path);

        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.state.as_deref(), Some("Maine"));
    }

    #[test]
    fn test_selection_defaults() {
        let selection = SelectionArgs::default();
        assert_eq!(selection.state_or_default(), DEFAULT_STATE);
        assert_eq!(selection.metric_or_default(), DEFAULT_METRIC);
    }
}
