use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::bail;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Root of the per-user state directory, `~/.vislab/`.
pub fn vislab_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vislab")
}

/// Ensure `~/.vislab/` and `~/.vislab/logs/` exist.
pub fn ensure_directories() -> anyhow::Result<()> {
    let root = vislab_dir();
    std::fs::create_dir_all(&root)?;
    std::fs::create_dir_all(root.join("logs"))?;
    Ok(())
}

/// Log file used by the terminal views when `--log-file` is not given, so
/// log lines do not draw over the alternate screen.
pub fn default_log_file() -> PathBuf {
    vislab_dir().join("logs").join("vislab.log")
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` value to an [`EnvFilter`] directive.
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber, writing to `log_file` when
/// given and to stderr otherwise.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

// ── Data file ──────────────────────────────────────────────────────────────────

/// Check that the death-count export exists before any command loads it.
pub fn ensure_data_file(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!(
            "Data file '{}' not found; pass the weekly death-count CSV with --data",
            path.display()
        );
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── test_ensure_directories ───────────────────────────────────────────────

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");

        // Override HOME so that dirs::home_dir() resolves to our temp dir.
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", tmp.path());

        let result = ensure_directories();
        let log_file = default_log_file();

        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        result.expect("ensure_directories should succeed");

        let root = tmp.path().join(".vislab");
        assert!(root.is_dir(), ".vislab dir must exist");
        assert!(root.join("logs").is_dir(), "logs subdir must exist");
        assert_eq!(log_file, root.join("logs").join("vislab.log"));
    }

    // ── test_filter_directive ─────────────────────────────────────────────────

    #[test]
    fn test_filter_directive_maps_level_names() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("verbose"), "info");
    }

    // ── test_ensure_data_file ─────────────────────────────────────────────────

    #[test]
    fn test_ensure_data_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("deaths.csv");

        let err = ensure_data_file(&path).unwrap_err();
        assert!(err.to_string().contains("--data"));

        std::fs::write(&path, "State\n").unwrap();
        assert!(ensure_data_file(&path).is_ok());
        // A directory is not a data file.
        assert!(ensure_data_file(tmp.path()).is_err());
    }
}
