use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::ModelCatalog;
use crate::error::{DetectionResult, ValidationError};
use crate::hierarchy::ImageData;

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_NORMALIZE_LOW: f64 = 1.0;
pub const DEFAULT_NORMALIZE_HIGH: f64 = 99.0;
/// Sentinel for "not requested" in the cell expansion fields
pub const NOT_SET: f64 = -1.0;

/// Parameter form values exactly as the user entered them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawParams {
    /// File name of the selected model
    pub path_model: String,
    /// Probability (detection) threshold
    pub threshold: f64,
    /// Percentile normalization, lower bound
    pub normalize_percentiles_low: f64,
    /// Percentile normalization, upper bound
    pub normalize_percentiles_high: f64,
    /// Resolution for detection, microns per pixel
    pub pixel_size: f64,
    /// Detection channel (e.g. DAPI); empty means none
    #[serde(default)]
    pub channel: String,
    /// Approximate cells by expanding nuclei this many microns; <= 0 disables
    #[serde(default = "not_set")]
    pub cell_expansion: f64,
    /// Constrain cell expansion using nucleus size; <= 0 disables
    #[serde(default = "not_set")]
    pub cell_constrain_scale: f64,
    #[serde(default)]
    pub measure_shape: bool,
    #[serde(default)]
    pub measure_intensity: bool,
    /// Add probability as a measurement (enables later filtering)
    #[serde(default)]
    pub include_probability: bool,
}

fn not_set() -> f64 {
    NOT_SET
}

impl RawParams {
    /// Form defaults for a model and an image resolution
    pub fn with_defaults(path_model: impl Into<String>, pixel_size: f64) -> Self {
        Self {
            path_model: path_model.into(),
            threshold: DEFAULT_THRESHOLD,
            normalize_percentiles_low: DEFAULT_NORMALIZE_LOW,
            normalize_percentiles_high: DEFAULT_NORMALIZE_HIGH,
            pixel_size,
            channel: String::new(),
            cell_expansion: NOT_SET,
            cell_constrain_scale: NOT_SET,
            measure_shape: false,
            measure_intensity: false,
            include_probability: false,
        }
    }
}

/// Validated, immutable settings for one detection run.
///
/// Only [`DetectionConfigBuilder::build`] creates one, so every instance has
/// passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionConfig {
    pub(crate) model_path: PathBuf,
    pub(crate) threshold: f64,
    pub(crate) normalize_low: f64,
    pub(crate) normalize_high: f64,
    pub(crate) pixel_size_microns: f64,
    pub(crate) channel: Option<String>,
    pub(crate) cell_expansion_microns: Option<f64>,
    pub(crate) cell_constrain_scale: Option<f64>,
    pub(crate) measure_shape: bool,
    pub(crate) measure_intensity: bool,
    pub(crate) include_probability: bool,
}

impl DetectionConfig {
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Normalization percentiles, `0 <= low < high <= 100`
    pub fn normalize_percentiles(&self) -> (f64, f64) {
        (self.normalize_low, self.normalize_high)
    }

    pub fn pixel_size_microns(&self) -> f64 {
        self.pixel_size_microns
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn cell_expansion_microns(&self) -> Option<f64> {
        self.cell_expansion_microns
    }

    pub fn cell_constrain_scale(&self) -> Option<f64> {
        self.cell_constrain_scale
    }

    pub fn measure_shape(&self) -> bool {
        self.measure_shape
    }

    pub fn measure_intensity(&self) -> bool {
        self.measure_intensity
    }

    pub fn include_probability(&self) -> bool {
        self.include_probability
    }

    pub fn expands_cells(&self) -> bool {
        self.cell_expansion_microns.is_some()
    }
}

/// Fail unless the image carries a physical pixel size
pub fn require_calibration(image: &ImageData) -> Result<f64, ValidationError> {
    image
        .calibration
        .averaged_pixel_size_microns()
        .ok_or(ValidationError::UnknownPixelSize)
}

/// Initial values of the parameter form for `image`.
///
/// Uncalibrated images and an empty model directory are rejected here, so no
/// form can be shown for them.
pub fn default_parameters(image: &ImageData, catalog: &ModelCatalog) -> DetectionResult<RawParams> {
    let pixel_size = require_calibration(image)?;
    let model = catalog.default_model()?;
    Ok(RawParams::with_defaults(model.name, pixel_size))
}

/// Turns [`RawParams`] into a [`DetectionConfig`]
pub struct DetectionConfigBuilder<'a> {
    catalog: &'a ModelCatalog,
}

impl<'a> DetectionConfigBuilder<'a> {
    pub fn new(catalog: &'a ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn build(&self, raw: &RawParams) -> DetectionResult<DetectionConfig> {
        let model = self.catalog.resolve(&raw.path_model)?;

        let (low, high) = (raw.normalize_percentiles_low, raw.normalize_percentiles_high);
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !(in_range(low) && in_range(high) && low < high) {
            return Err(ValidationError::NormalizationBounds { low, high }.into());
        }

        if !(0.0..=1.0).contains(&raw.threshold) {
            return Err(ValidationError::Threshold(raw.threshold).into());
        }

        if !(raw.pixel_size.is_finite() && raw.pixel_size > 0.0) {
            return Err(ValidationError::PixelSize(raw.pixel_size).into());
        }

        let cell_expansion_microns = positive(raw.cell_expansion);
        let cell_constrain_scale = positive(raw.cell_constrain_scale);
        if cell_constrain_scale.is_some() && cell_expansion_microns.is_none() {
            warn!("Cell constrain scale is set but cell expansion is not; it has no effect");
        }

        let channel = Some(raw.channel.trim())
            .filter(|c| !c.is_empty())
            .map(|_| raw.channel.clone());

        let config = DetectionConfig {
            model_path: model.path,
            threshold: raw.threshold,
            normalize_low: low,
            normalize_high: high,
            pixel_size_microns: raw.pixel_size,
            channel,
            cell_expansion_microns,
            cell_constrain_scale,
            measure_shape: raw.measure_shape,
            measure_intensity: raw.measure_intensity,
            include_probability: raw.include_probability,
        };
        debug!("Detection config: {:?}", config);
        Ok(config)
    }
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}
