use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Problems with the model directory or the model selection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no model directory configured; run `nucdetect configure --models <DIR>` first")]
    NoModelDirectory,
    #[error("model directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("model location is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("model directory is not readable: {}: {reason}", .path.display())]
    UnreadableDirectory { path: PathBuf, reason: String },
    #[error("no *.{extension} model files found in {}", .path.display())]
    NoModels { path: PathBuf, extension: &'static str },
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Parameter values that cannot produce a meaningful detection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "pixel size is unknown; check the image properties, detection needs a calibrated image"
    )]
    UnknownPixelSize,
    #[error("normalization percentiles must satisfy 0 <= low < high <= 100 (got low={low}, high={high})")]
    NormalizationBounds { low: f64, high: f64 },
    #[error("probability threshold must lie in [0, 1] (got {0})")]
    Threshold(f64),
    #[error("pixel size must be a positive number of microns (got {0})")]
    PixelSize(f64),
}

/// Errors that stop a detection run before any task is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type DetectionResult<T> = Result<T, DetectionError>;

/// A single region whose detection did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("detection failed for region {index} ({region_name}): {cause}")]
pub struct DetectionFailure {
    /// 1-based position of the task in its batch.
    pub index: usize,
    pub region_id: Uuid,
    pub region_name: String,
    pub cause: String,
}
