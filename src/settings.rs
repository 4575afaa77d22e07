use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::catalog::ModelCatalog;
use crate::error::ConfigurationError;

const SETTINGS_ENV: &str = "NUCDETECT_SETTINGS";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// User preferences that persist between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the `*.pb` model files
    #[serde(default)]
    pub model_location: Option<PathBuf>,
}

impl Settings {
    /// Settings file location: `$NUCDETECT_SETTINGS`, else
    /// `~/.config/nucdetect/settings.json`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            return Ok(PathBuf::from(path));
        }
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Cannot locate the home directory for the settings file")?;
        Ok(Path::new(&home_dir)
            .join(".config/nucdetect")
            .join(SETTINGS_FILE_NAME))
    }

    /// Load settings; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {:?}", path))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings {:?}", path))?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings {:?}", path))?;
        Ok(())
    }

    pub fn with_model_location<P: Into<PathBuf>>(mut self, location: P) -> Self {
        self.model_location = Some(location.into());
        self
    }

    /// Catalog over the configured model directory.
    /// There is no built-in fallback location.
    pub fn catalog(&self) -> Result<ModelCatalog, ConfigurationError> {
        match &self.model_location {
            Some(dir) if !dir.as_os_str().is_empty() => {
                info!("Model location: {}", dir.display());
                Ok(ModelCatalog::new(dir.clone()))
            }
            _ => Err(ConfigurationError::NoModelDirectory),
        }
    }
}
