mod bootstrap;
mod commands;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use vislab_core::models::Metric;
use vislab_core::settings::{Command, DashboardArgs, Settings};
use vislab_data::analysis::load_cleaned_and_sorted;
use vislab_data::dataset::Dataset;
use vislab_forecast::AutoArimaConfig;
use vislab_runtime::{ForecastWorker, SessionCache};
use vislab_ui::app::App;
use vislab_ui::themes::Theme;
use vislab_ui::viewer_app::ViewerApp;

fn load_dataset(settings: &Settings) -> Result<Dataset> {
    bootstrap::ensure_data_file(&settings.data)?;
    Ok(load_cleaned_and_sorted(&settings.data)?.dataset)
}

async fn run_dashboard(settings: &Settings, args: DashboardArgs) -> Result<()> {
    let dataset = Arc::new(load_dataset(settings)?);
    let cache = Arc::new(Mutex::new(SessionCache::new(
        dataset,
        AutoArimaConfig::default(),
    )));

    let mut app = App::new(&settings.theme, cache.clone());
    if let Some(state) = &args.selection.state {
        app.select_state(state)?;
    }
    if let Some(label) = &args.selection.metric {
        let metric = Metric::from_label(label)?;
        if !app.select_metric(metric) {
            tracing::warn!("{} is not offered by the dashboard; keeping {}", metric, app.metric());
        }
    }
    if let Some(weeks) = args.weeks {
        app.set_weeks(weeks as usize);
    }

    let (requests, updates, handle) = ForecastWorker::new(cache).start();

    // The TUI loop exits on 'q' / Ctrl+C; the OS-level Ctrl+C covers signals
    // that arrive while the terminal is being set up or torn down.
    tokio::select! {
        result = app.run(requests, updates) => {
            handle.abort();
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; stopping the forecast worker");
            handle.abort();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();
    let command = settings.resolved_command();

    bootstrap::ensure_directories()?;
    let interactive = match &command {
        Command::Dashboard(_) => true,
        Command::Dicom(args) => args.view,
        _ => false,
    };
    let log_file: Option<PathBuf> = match &settings.log_file {
        Some(path) => Some(path.clone()),
        None if interactive => Some(bootstrap::default_log_file()),
        None => None,
    };
    bootstrap::setup_logging(&settings.log_level, log_file.as_deref())?;

    tracing::info!("vislab v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data: {}, Theme: {}", settings.data.display(), settings.theme);

    let mut stdout = io::stdout();
    match command {
        Command::Dashboard(args) => run_dashboard(&settings, args).await?,
        Command::Trends(args) => commands::trends(&load_dataset(&settings)?, &args, &mut stdout)?,
        Command::Compare(args) => commands::compare(&load_dataset(&settings)?, &args, &mut stdout)?,
        Command::Forecast(args) => {
            commands::forecast(&load_dataset(&settings)?, &args, &mut stdout)?
        }
        Command::Decompose(args) => {
            commands::decompose(&load_dataset(&settings)?, &args, &mut stdout)?
        }
        Command::Volume(args) => commands::volume(&args, &mut io::stdin().lock(), &mut stdout)?,
        Command::Isosurface(args) => commands::isosurface(&args, &mut stdout)?,
        Command::Transfer(args) => commands::transfer(&args, &mut stdout)?,
        Command::Dicom(args) => {
            let viewer = commands::dicom_viewer(&args)?;
            if args.view {
                ViewerApp::new(viewer, Theme::from_name(&settings.theme)).run()?;
            } else {
                commands::dicom(&viewer, &args, &mut stdout)?;
            }
        }
        Command::Profile(args) => commands::profile(&args, &mut stdout)?,
    }

    Ok(())
}
