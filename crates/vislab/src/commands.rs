//! Non-interactive subcommands. Each writes its report to `out` so the
//! output can be checked without a terminal.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::CommandFactory;
use serde_json::json;
use tracing::{info, warn};

use vislab_core::formatting::format_number;
use vislab_core::models::{Metric, NATIONAL};
use vislab_core::settings::{
    CompareArgs, DecomposeArgs, DicomArgs, ForecastArgs, IsosurfaceArgs, ProfileArgs, Settings,
    TransferArgs, TrendsArgs, VolumeArgs, DEFAULT_FORECAST_WEEKS,
};
use vislab_data::aggregator::{filter_sum, monthly_trend, relative_death_counts};
use vislab_data::dataset::Dataset;
use vislab_data::profile::{drop_sparse_columns, elbow_method, numerical_features};
use vislab_data::reader::read_csv;
use vislab_data::timeseries::{univariate, Univariate};
use vislab_forecast::residuals::residual_report;
use vislab_forecast::stationarity::adf_test;
use vislab_forecast::{seasonal_decompose, AutoArima, AutoArimaConfig, Criterion, DecompositionModel};
use vislab_runtime::viewer::{DicomViewer, IsosurfaceView, TransferFunctionView};
use vislab_ui::table_view::{compare_table, forecast_table, relative_table, trend_table};
use vislab_volume::raster::MeshRenderSettings;
use vislab_volume::report::{default_configurations, select_configurations};
use vislab_volume::vti::read_vti;
use vislab_volume::{Interpolation, ReportStore, RgbImage, SliceFilter, LIGHTING_PRESETS};

/// Lags reported by `forecast --diagnostics`.
const ACF_LAGS: usize = 10;

fn latest_year(dataset: &Dataset) -> Result<i32> {
    dataset
        .years()
        .last()
        .copied()
        .ok_or_else(|| anyhow!("The data contains no records"))
}

fn series(dataset: &Dataset, state: &str, metric: Metric) -> Result<Univariate> {
    let series = univariate(dataset, state, metric)?;
    if series.is_empty() {
        bail!("No {} values for {}", metric.label(), state);
    }
    Ok(series)
}

// ── Trends ────────────────────────────────────────────────────────────────────

pub fn trends(dataset: &Dataset, args: &TrendsArgs, out: &mut impl Write) -> Result<()> {
    let state = args.state.as_deref().unwrap_or(NATIONAL);
    let year = match args.year {
        Some(year) => year,
        None => latest_year(dataset)?,
    };
    let points = monthly_trend(dataset, year, state)?;
    writeln!(out, "{}", trend_table(&points, state, year).to_plain_text())?;
    Ok(())
}

// ── Compare ───────────────────────────────────────────────────────────────────

pub fn compare(dataset: &Dataset, args: &CompareArgs, out: &mut impl Write) -> Result<()> {
    for state in &args.states {
        dataset.filter_by_state(state)?;
    }
    let year = match args.year {
        Some(year) => year,
        None => latest_year(dataset)?,
    };

    let sums = filter_sum(dataset, year, args.month, &args.states);
    writeln!(out, "{}", compare_table(&sums, year, args.month).to_plain_text())?;

    if let Some(month) = args.month {
        let counts = relative_death_counts(dataset, year, month, &args.states, &Metric::COMPARED);
        writeln!(out)?;
        writeln!(out, "{}", relative_table(&counts, year, month).to_plain_text())?;
    }
    Ok(())
}

// ── Forecast ──────────────────────────────────────────────────────────────────

pub fn forecast(dataset: &Dataset, args: &ForecastArgs, out: &mut impl Write) -> Result<()> {
    if !(args.alpha > 0.0 && args.alpha < 1.0) {
        bail!("--alpha must lie strictly between 0 and 1, got {}", args.alpha);
    }
    let state = args.selection.state_or_default();
    let metric = Metric::from_label(args.selection.metric_or_default())?;
    let weeks = args.weeks.unwrap_or(DEFAULT_FORECAST_WEEKS) as usize;
    let criterion: Criterion = args.ic.parse()?;

    let series = series(dataset, state, metric)?;
    let last = series
        .last_date()
        .ok_or_else(|| anyhow!("No {} values for {}", metric.label(), state))?;

    let mut config = AutoArimaConfig::default().with_criterion(criterion);
    if let Some(period) = args.seasonal_period {
        config = config.with_seasonal_period(period as usize);
    }
    let mut auto = AutoArima::new(config);
    auto.fit(&series.values, last)
        .with_context(|| format!("Fitting {} in {}", metric.label(), state))?;
    let prediction = auto.predict(weeks, args.alpha)?.clamped_at_zero();
    let order = auto
        .order()
        .ok_or_else(|| anyhow!("No model could be fitted"))?;
    info!("Forecast {} weeks of {} in {} with {}", weeks, metric, state, order);

    if args.json {
        let value = json!({
            "state": state,
            "metric": metric.label(),
            "order": order.to_string(),
            "forecast": prediction,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "{}", auto.summary())?;
        writeln!(out)?;
        writeln!(out, "{}", forecast_table(&prediction, metric, state).to_plain_text())?;
    }

    if args.diagnostics {
        let model = auto
            .model()
            .ok_or_else(|| anyhow!("No model could be fitted"))?;
        let residuals = model.residuals().unwrap_or_default();
        let report = residual_report(residuals, ACF_LAGS, model.num_params());
        let d = &report.describe;

        writeln!(out)?;
        writeln!(out, "Residual diagnostics")?;
        writeln!(
            out,
            "count {}  mean {:.3}  std {:.3}  min {:.3}  25% {:.3}  50% {:.3}  75% {:.3}  max {:.3}",
            d.count, d.mean, d.std, d.min, d.q25, d.median, d.q75, d.max
        )?;
        let acf: Vec<String> = report.acf.iter().map(|v| format!("{v:.3}")).collect();
        writeln!(out, "ACF: {}", acf.join(" "))?;
        writeln!(
            out,
            "Ljung-Box Q={:.3} (lags {}, df {}) p={:.4}: {}",
            report.ljung_box.statistic,
            report.ljung_box.lags,
            report.ljung_box.df,
            report.ljung_box.p_value,
            if report.ljung_box.is_white_noise(0.05) {
                "no significant autocorrelation"
            } else {
                "autocorrelation remains"
            }
        )?;
        writeln!(
            out,
            "Jarque-Bera JB={:.3} p={:.4}: {}",
            report.normality.statistic,
            report.normality.p_value,
            if report.normality.is_normal() {
                "residuals are normally distributed"
            } else {
                "residuals are not normally distributed"
            }
        )?;
    }
    Ok(())
}

// ── Decompose ─────────────────────────────────────────────────────────────────

pub fn decompose(dataset: &Dataset, args: &DecomposeArgs, out: &mut impl Write) -> Result<()> {
    let state = args.selection.state_or_default();
    let metric = Metric::from_label(args.selection.metric_or_default())?;
    let series = series(dataset, state, metric)?;
    let model = if args.multiplicative {
        DecompositionModel::Multiplicative
    } else {
        DecompositionModel::Additive
    };

    let decomposition = seasonal_decompose(&series.values, args.period, model)?;
    let pattern = decomposition.seasonal_pattern();
    let peak = argmax(pattern, |a, b| a > b);
    let trough = argmax(pattern, |a, b| a < b);

    writeln!(
        out,
        "Seasonal decomposition of {} in {} ({:?}, period {})",
        metric.label(),
        state,
        model,
        args.period
    )?;
    writeln!(out, "Observations:       {}", series.len())?;
    writeln!(
        out,
        "Seasonal strength:  {}",
        format_number(decomposition.seasonal_strength(), 3)
    )?;
    if let (Some((pi, pv)), Some((ti, tv))) = (peak, trough) {
        writeln!(out, "Seasonal peak:      phase {} ({})", pi, format_number(pv, 2))?;
        writeln!(out, "Seasonal trough:    phase {} ({})", ti, format_number(tv, 2))?;
    }

    match adf_test(&series.values, None) {
        Ok(adf) => {
            writeln!(out)?;
            writeln!(out, "ADF statistic:      {:.4}", adf.statistic)?;
            writeln!(out, "p-value:            {:.4}", adf.p_value)?;
            writeln!(out, "Lags used:          {}", adf.used_lag)?;
            writeln!(
                out,
                "Critical values:    1% {:.2}  5% {:.2}  10% {:.2}",
                adf.critical_values.one_pct, adf.critical_values.five_pct, adf.critical_values.ten_pct
            )?;
            writeln!(
                out,
                "The series is {}",
                if adf.is_stationary() { "stationary" } else { "non-stationary" }
            )?;
        }
        Err(e) => warn!("ADF test skipped: {}", e),
    }
    Ok(())
}

fn argmax(values: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<(usize, f64)> {
    values.iter().copied().enumerate().fold(None, |best, (i, v)| match best {
        Some((_, b)) if !better(v, b) => best,
        _ => Some((i, v)),
    })
}

// ── Volume report ─────────────────────────────────────────────────────────────

/// Render configurations or write the Markdown report. Each rendered
/// configuration shows its saved description and reads a replacement line
/// from `input`; an empty line keeps the saved one.
pub fn volume(args: &VolumeArgs, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
    if args.render.is_none() && !args.markdown {
        let mut command = Settings::command();
        match command.find_subcommand_mut("volume") {
            Some(sub) => writeln!(out, "{}", sub.render_help())?,
            None => writeln!(out, "Use --render [indices...] or --markdown")?,
        }
        return Ok(());
    }

    let configs = default_configurations();
    let store = ReportStore::new(&args.output_dir);
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Creating {}", args.output_dir.display()))?;

    if let Some(indices) = &args.render {
        let selected = select_configurations(&configs, indices)?;
        let volume = read_vti(&args.input)?;
        for config in selected {
            let path = store.render_configuration(&volume, config)?;
            writeln!(out, "Saved {}", path.display())?;
            let current = store.load_description(&config.name)?;
            if current.is_empty() {
                writeln!(out, "Current description for {}: (none)", config.name)?;
            } else {
                writeln!(out, "Current description for {}: {current}", config.name)?;
            }
            write!(out, "New description (blank keeps the current one): ")?;
            out.flush()?;

            let mut line = String::new();
            input.read_line(&mut line)?;
            let description = line.trim();
            if !description.is_empty() {
                store.save_description(&config.name, description)?;
            }
        }
    } else if args.markdown {
        let report = store.generate_markdown(&configs, &args.report)?;
        writeln!(
            out,
            "Wrote {} with {} configuration(s)",
            args.report.display(),
            report.included.len()
        )?;
        if !report.missing.is_empty() {
            writeln!(out, "Not rendered yet: {}", report.missing.join(", "))?;
        }
    }
    Ok(())
}

// ── Isosurface ────────────────────────────────────────────────────────────────

/// `out.png` → `out_<n>.png` for the n-th lighting preset.
fn preset_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "isosurface".to_string());
    path.with_file_name(format!("{stem}_{n}.png"))
}

pub fn isosurface(args: &IsosurfaceArgs, out: &mut impl Write) -> Result<()> {
    let volume = Arc::new(read_vti(&args.input)?);
    let view = IsosurfaceView::new(volume, args.isovalue);
    let mesh = view.mesh();

    writeln!(
        out,
        "Isovalue {}: {} vertices, {} triangles, area {}",
        format_number(view.isovalue(), 1),
        mesh.vertices.len(),
        mesh.triangles.len(),
        format_number(mesh.area(), 1)
    )?;

    if let Some(path) = &args.obj {
        mesh.write_obj(path)?;
        writeln!(out, "Saved {}", path.display())?;
    }

    if let Some(path) = &args.png {
        view.render(&MeshRenderSettings::default())?.save_png(path)?;
        writeln!(out, "Saved {}", path.display())?;

        if args.presets {
            for (i, preset) in LIGHTING_PRESETS.iter().enumerate() {
                let settings = MeshRenderSettings {
                    lighting: preset.lighting,
                    ..Default::default()
                };
                let preset_png = preset_path(path, i + 1);
                view.render(&settings)?.save_png(&preset_png)?;
                writeln!(out, "Saved {} ({})", preset_png.display(), preset.description)?;
            }
        }
    } else if args.presets {
        warn!("--presets needs --png; nothing rendered");
    }
    Ok(())
}

// ── Transfer function ─────────────────────────────────────────────────────────

pub fn transfer(args: &TransferArgs, out: &mut impl Write) -> Result<()> {
    let volume = Arc::new(read_vti(&args.input)?);
    let view = TransferFunctionView::with_values(volume, args.center, args.spread);
    view.render()?.save_png(&args.png)?;
    writeln!(
        out,
        "Center {}, spread {}: saved {}",
        format_number(view.center(), 1),
        format_number(view.spread(), 1),
        args.png.display()
    )?;
    Ok(())
}

// ── DICOM ─────────────────────────────────────────────────────────────────────

/// Build the slice viewer for `args`. With `--view` a directory without
/// DICOM files still yields a viewer, which shows the status message.
pub fn dicom_viewer(args: &DicomArgs) -> Result<DicomViewer> {
    let mut viewer = DicomViewer::new();
    match viewer.load_directory(&args.dir) {
        Ok(_) => {}
        Err(e) if args.view => warn!("{}", e),
        Err(e) => return Err(e.into()),
    }
    viewer.set_filter(args.filter.parse::<SliceFilter>()?)?;
    let resampling = args
        .resample
        .as_deref()
        .map(str::parse::<Interpolation>)
        .transpose()?;
    viewer.set_resampling(resampling)?;
    if let Some(index) = args.slice {
        viewer.set_slice(index);
    }
    Ok(viewer)
}

/// Print the viewer status and optionally save the current slice.
pub fn dicom(viewer: &DicomViewer, args: &DicomArgs, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{} slices, filter {}, {}",
        viewer.slice_count(),
        viewer.filter(),
        viewer.status()
    )?;
    if let Some(path) = &args.png {
        let slice = viewer
            .current_slice()
            .ok_or_else(|| anyhow!("No slice to save"))?;
        RgbImage::from_slice(slice, None).save_png(path)?;
        writeln!(out, "Saved {}", path.display())?;
    }
    Ok(())
}

// ── EHR profile ───────────────────────────────────────────────────────────────

pub fn profile(args: &ProfileArgs, out: &mut impl Write) -> Result<()> {
    if !(0.0..=1.0).contains(&args.threshold) {
        bail!("--threshold must lie in 0..=1, got {}", args.threshold);
    }
    let table = read_csv(&args.input)?;
    let (reduced, profile) = drop_sparse_columns(&table, args.threshold);
    writeln!(
        out,
        "Rows: {}  columns: {} -> {}",
        profile.rows, profile.columns_before, profile.columns_after
    )?;
    if !profile.dropped.is_empty() {
        writeln!(out, "Dropped: {}", profile.dropped.join(", "))?;
    }

    let features = numerical_features(&reduced);
    writeln!(out, "Numerical features: {}", features.names.join(", "))?;

    if let Some(k_max) = args.elbow {
        writeln!(out)?;
        writeln!(out, "{:>3}  {:>14}", "k", "inertia")?;
        for (k, inertia) in elbow_method(&features, k_max).iter().enumerate() {
            writeln!(out, "{:>3}  {:>14.3}", k + 1, inertia)?;
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
