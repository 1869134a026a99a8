//! Volume-rendering configurations, their stored artifacts and the
//! Markdown report built from them.
//!
//! Every configuration owns three files in the output directory, named
//! after the configuration with spaces replaced by underscores:
//! `<stem>.png`, `<stem>_config.json` and `<stem>.txt` (free-text
//! description).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::colormap::Colormap;
use crate::error::{io_err, Result, VolumeError};
use crate::grid::ScalarVolume;
use crate::raycast::{render_volume, Blending, RenderSettings};
use crate::transfer::{OpacityPreset, TABLE_SIZE};

pub const DEFAULT_OUTPUT_DIR: &str = "rendered_images";
pub const DEFAULT_REPORT: &str = "volume_task2_report.md";

/// Saved images are enlarged to at least this many pixels on their long side.
const MIN_IMAGE_SIZE: usize = 512;

/// One rendering configuration. Field order is the JSON key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub cmap: Colormap,
    pub opacity: OpacityPreset,
    pub shade: bool,
    pub blending: Blending,
    pub name: String,
}

impl RenderConfig {
    pub fn new(cmap: Colormap, opacity: OpacityPreset, shade: bool, blending: Blending, name: &str) -> Self {
        Self {
            cmap,
            opacity,
            shade,
            blending,
            name: name.to_string(),
        }
    }

    /// Renderer settings for this configuration.
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            cmap: self.cmap,
            opacity: self.opacity.table(TABLE_SIZE),
            shade: self.shade,
            blending: self.blending,
            opacity_unit_distance: 20.0,
            ..Default::default()
        }
    }

    pub fn title(&self) -> String {
        format!(
            "{} - cmap: {}, opacity: {}, shade: {}, blending: {}",
            self.name,
            self.cmap,
            self.opacity,
            if self.shade { "True" } else { "False" },
            self.blending
        )
    }
}

pub fn default_configurations() -> Vec<RenderConfig> {
    use Blending::*;
    use Colormap::*;
    vec![
        RenderConfig::new(Viridis, OpacityPreset::Linear, true, Composite, "Config 1"),
        RenderConfig::new(Plasma, OpacityPreset::Sigmoid, false, Maximum, "Config 2"),
        RenderConfig::new(Gray, OpacityPreset::LinearR, true, Average, "Config 3"),
        RenderConfig::new(Coolwarm, OpacityPreset::Geom, false, Composite, "Config 4"),
        RenderConfig::new(Bone, OpacityPreset::Geom, true, Composite, "Config 5"),
    ]
}

/// File-name stem of a configuration.
pub fn file_stem(name: &str) -> String {
    name.replace(' ', "_")
}

/// Pick configurations by 1-based index; no indices selects all of them.
pub fn select_configurations<'a>(configs: &'a [RenderConfig], indices: &[usize]) -> Result<Vec<&'a RenderConfig>> {
    if indices.is_empty() {
        return Ok(configs.iter().collect());
    }
    indices
        .iter()
        .map(|&i| {
            i.checked_sub(1)
                .and_then(|i| configs.get(i))
                .ok_or(VolumeError::IndexOutOfRange {
                    index: i,
                    len: configs.len(),
                })
        })
        .collect()
}

/// Artifacts of rendered configurations under one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStore {
    pub output_dir: PathBuf,
}

impl ReportStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.png", file_stem(name)))
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_config.json", file_stem(name)))
    }

    pub fn description_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.txt", file_stem(name)))
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(io_err(&self.output_dir))
    }

    /// Write `config` as JSON indented by four spaces.
    pub fn save_configuration(&self, config: &RenderConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.config_path(&config.name);
        std::fs::write(&path, to_json(config)?).map_err(io_err(&path))
    }

    /// The stored configuration of `name`, `None` when never saved.
    pub fn load_configuration(&self, name: &str) -> Result<Option<RenderConfig>> {
        let path = self.config_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn save_description(&self, name: &str, description: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.description_path(name);
        std::fs::write(&path, description).map_err(io_err(&path))
    }

    /// The stored description of `name`, trimmed; empty when missing.
    pub fn load_description(&self, name: &str) -> Result<String> {
        let path = self.description_path(name);
        if !path.exists() {
            return Ok(String::new());
        }
        let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        Ok(text.trim().to_string())
    }

    /// Render `config`, save the image and the configuration dump, and
    /// return the image path.
    pub fn render_configuration(&self, volume: &ScalarVolume, config: &RenderConfig) -> Result<PathBuf> {
        info!("Rendering {}", config.title());
        let image = render_volume(volume, &config.settings())?;
        let long_side = image.width.max(image.height).max(1);
        let image = image.upscale(MIN_IMAGE_SIZE.div_ceil(long_side));
        let path = self.image_path(&config.name);
        image.save_png(&path)?;
        self.save_configuration(config)?;
        Ok(path)
    }

    /// Markdown report of every configuration with a saved image.
    pub fn markdown(&self, configs: &[RenderConfig]) -> Result<MarkdownReport> {
        let mut report = MarkdownReport {
            text: String::from("# Volume Rendering Report\n\n"),
            included: Vec::new(),
            missing: Vec::new(),
        };
        for config in configs {
            let name = &config.name;
            let image = self.image_path(name);
            if !image.exists() {
                warn!("No screenshot found for {}", name);
                report.missing.push(name.clone());
                continue;
            }
            let description = self.load_description(name)?;
            let text = &mut report.text;
            let _ = write!(text, "## {name}\n\n");
            if let Some(details) = self.load_configuration(name)? {
                let _ = write!(text, "**Configuration Used:**\n```json\n{}\n```\n\n", to_json(&details)?);
            }
            let _ = write!(text, "![{name}]({})\n\n", image.display());
            let _ = write!(text, "**Description**: {description}\n\n");
            report.included.push(name.clone());
        }
        Ok(report)
    }

    /// Write the report to `path`.
    pub fn generate_markdown(&self, configs: &[RenderConfig], path: &Path) -> Result<MarkdownReport> {
        let report = self.markdown(configs)?;
        std::fs::write(path, &report.text).map_err(io_err(path))?;
        info!("Markdown report saved as {}", path.display());
        Ok(report)
    }
}

/// The report text and which configurations it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownReport {
    pub text: String,
    pub included: Vec<String>,
    pub missing: Vec<String>,
}

fn to_json(config: &RenderConfig) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config.serialize(&mut ser)?;
    // serde_json only ever writes UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn volume() -> ScalarVolume {
        ScalarVolume::new([4, 4, 4], [1.0; 3], [0.0; 3], (0..64).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn test_default_configurations() {
        let configs = default_configurations();
        assert_eq!(configs.len(), 5);
        assert_eq!(configs[2].name, "Config 3");
        assert_eq!(configs[2].opacity, OpacityPreset::LinearR);
        assert_eq!(configs[1].blending, Blending::Maximum);
        assert_eq!(file_stem("Config 1"), "Config_1");
        assert_eq!(
            configs[0].title(),
            "Config 1 - cmap: viridis, opacity: linear, shade: True, blending: composite"
        );
    }

    #[test]
    fn test_json_layout() {
        let json = to_json(&default_configurations()[1]).unwrap();
        assert_eq!(
            json,
            "{\n    \"cmap\": \"plasma\",\n    \"opacity\": \"sigmoid\",\n    \"shade\": false,\n    \"blending\": \"maximum\",\n    \"name\": \"Config 2\"\n}"
        );
    }

    #[test]
    fn test_select_configurations() {
        let configs = default_configurations();
        assert_eq!(select_configurations(&configs, &[]).unwrap().len(), 5);
        let picked = select_configurations(&configs, &[3, 1]).unwrap();
        assert_eq!(picked[0].name, "Config 3");
        assert_eq!(picked[1].name, "Config 1");
        assert!(matches!(
            select_configurations(&configs, &[0]),
            Err(VolumeError::IndexOutOfRange { index: 0, len: 5 })
        ));
        assert!(select_configurations(&configs, &[6]).is_err());
    }

    #[test]
    fn test_configuration_and_description_files() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().join("out"));
        let config = &default_configurations()[0];

        assert_eq!(store.load_configuration(&config.name).unwrap(), None);
        assert_eq!(store.load_description(&config.name).unwrap(), "");

        store.save_configuration(config).unwrap();
        store.save_description(&config.name, "  Soft tissue glows.\n").unwrap();
        assert!(tmp.path().join("out/Config_1_config.json").exists());
        assert_eq!(store.load_configuration("Config 1").unwrap().as_ref(), Some(config));
        assert_eq!(store.load_description("Config 1").unwrap(), "Soft tissue glows.");
    }

    #[test]
    fn test_render_configuration_writes_png_and_config() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let config = &default_configurations()[4];
        let path = store.render_configuration(&volume(), config).unwrap();
        assert_eq!(path, tmp.path().join("Config_5.png"));
        let png = std::fs::read(&path).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        // 4x4 image enlarged to 512x512.
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 512);
        assert!(store.config_path("Config 5").exists());
    }

    #[test]
    fn test_markdown_skips_missing_images() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let configs = default_configurations();
        store.render_configuration(&volume(), &configs[1]).unwrap();
        store.save_description("Config 2", "MIP view").unwrap();

        let report_path = tmp.path().join("report.md");
        let report = store.generate_markdown(&configs, &report_path).unwrap();
        assert_eq!(report.included, vec!["Config 2".to_string()]);
        assert_eq!(report.missing.len(), 4);

        let text = std::fs::read_to_string(&report_path).unwrap();
        assert!(text.starts_with("# Volume Rendering Report\n\n## Config 2\n\n**Configuration Used:**\n```json\n{\n    \"cmap\": \"plasma\""));
        let image = store.image_path("Config 2");
        assert!(text.contains(&format!("![Config 2]({})\n\n**Description**: MIP view\n\n", image.display())));
        assert!(!text.contains("Config 1"));
    }

    #[test]
    fn test_markdown_without_config_dump() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        crate::image::RgbImage::new(1, 1, vislab_core::colors::Rgb::new(0, 0, 0))
            .save_png(&store.image_path("Config 4"))
            .unwrap();
        let report = store.markdown(&default_configurations()).unwrap();
        assert!(!report.text.contains("**Configuration Used:**"));
        assert!(report.text.contains("**Description**: \n\n"));
    }
}
