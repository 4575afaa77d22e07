use std::path::{Path, PathBuf};

use log::debug;

use crate::error::ConfigurationError;
use crate::models::ModelDescriptor;

/// File extension that marks a model artifact
pub const MODEL_EXTENSION: &str = "pb";

/// Model artifacts available in one directory.
///
/// Nothing is cached: every [`ModelCatalog::scan`] re-reads the directory, so
/// models dropped in while the tool is open show up on the next form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    directory: PathBuf,
}

impl ModelCatalog {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List model files sorted by name.
    ///
    /// Fails if the directory is missing or unreadable, or holds no models.
    pub fn scan(&self) -> Result<Vec<ModelDescriptor>, ConfigurationError> {
        debug!("Scanning model location {}", self.directory.display());

        if !self.directory.exists() {
            return Err(ConfigurationError::MissingDirectory(self.directory.clone()));
        }
        if !self.directory.is_dir() {
            return Err(ConfigurationError::NotADirectory(self.directory.clone()));
        }

        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            ConfigurationError::UnreadableDirectory {
                path: self.directory.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut models = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigurationError::UnreadableDirectory {
                path: self.directory.clone(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if !is_model_file(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                models.push(ModelDescriptor {
                    name: name.to_string(),
                    path: path.clone(),
                });
            }
        }

        if models.is_empty() {
            return Err(ConfigurationError::NoModels {
                path: self.directory.clone(),
                extension: MODEL_EXTENSION,
            });
        }

        models.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Found {} model(s)", models.len());
        Ok(models)
    }

    /// Look up a model by file name with a fresh scan
    pub fn resolve(&self, name: &str) -> Result<ModelDescriptor, ConfigurationError> {
        self.scan()?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ConfigurationError::UnknownModel(name.to_string()))
    }

    /// The model preselected in the parameter form
    pub fn default_model(&self) -> Result<ModelDescriptor, ConfigurationError> {
        self.scan()?
            .into_iter()
            .next()
            .ok_or_else(|| ConfigurationError::NoModels {
                path: self.directory.clone(),
                extension: MODEL_EXTENSION,
            })
    }
}

fn is_model_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION)
}
