//! Site configuration file (`site.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use stencil_content::DEFAULT_STANDALONE_LAYOUTS;
use stencil_static::BuildConfig;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub content: PathBuf,
    pub templates: PathBuf,
    /// Stylesheets copied into the output; `None` disables copying
    pub styles: Option<PathBuf>,
    pub schemas: PathBuf,
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: PathBuf::from("content"),
            templates: PathBuf::from("templates"),
            styles: Some(PathBuf::from("css")),
            schemas: PathBuf::from("content/schemas"),
            output: PathBuf::from("dist"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub styles_subdir: String,
    pub standalone_layouts: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            styles_subdir: "css".to_string(),
            standalone_layouts: DEFAULT_STANDALONE_LAYOUTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
        }
    }
}

impl ConfigFile {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Build settings, with an optional output directory override.
    pub fn build_config(&self, output: Option<PathBuf>) -> BuildConfig {
        BuildConfig {
            content_dir: self.paths.content.clone(),
            templates_dir: self.paths.templates.clone(),
            output_dir: output.unwrap_or_else(|| self.paths.output.clone()),
            styles_dir: self.paths.styles.clone(),
            styles_subdir: self.build.styles_subdir.clone(),
            standalone_layouts: self.build.standalone_layouts.clone(),
        }
    }
}
