use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::map::WeightScheme;

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Write the default configuration template to config.toml
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }

    /// Load config.toml, falling back to defaults when it does not exist.
    pub fn load_config(&self) -> Result<AppConfig> {
        let config_path = self.config_path("config.toml");
        if !config_path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Invalid config file {}: {}", config_path.display(), e))?;
        Ok(config)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub map: MapConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the precomputed warehouse tables (Parquet).
    pub warehouse_dir: Option<PathBuf>,
    /// GeoJSON boundary file for the beat map.
    pub boundary_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub normal_weight: f64,
    pub emphasized_weight: f64,
    pub dimmed_weight: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        let scheme = WeightScheme::default();
        Self {
            normal_weight: scheme.normal,
            emphasized_weight: scheme.emphasized,
            dimmed_weight: scheme.dimmed,
        }
    }
}

impl MapConfig {
    pub fn weights(&self) -> WeightScheme {
        WeightScheme {
            normal: self.normal_weight,
            emphasized: self.emphasized_weight,
            dimmed: self.dimmed_weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory CSV exports are written to; defaults to the working directory.
    pub export_dir: Option<PathBuf>,
}

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# beatscope configuration
# Values here are overridden by command line flags.

[data]
# warehouse_dir = "/path/to/warehouse"
# boundary_file = "/path/to/police_beats.geojson"

[map]
# Visual weight applied to mapped beats. "dimmed" is used for unselected
# beats while a grid row is selected and must stay below "normal".
normal_weight = 0.5
emphasized_weight = 0.5
dimmed_weight = 0.1

[export]
# export_dir = "/path/to/exports"
"#;
