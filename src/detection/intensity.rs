use std::fs::File;
use std::path::Path;

use anyhow::Context;
use log::debug;

use super::NucleusDetector;
use super::components::label_nuclei;
use super::expansion::expand_labels;
use super::measurements::{LabelStats, keys, label_stats};
use super::preprocessing::{
    MAX_DETECTION_PIXELS, crop_region, normalize_percentiles, rescale, select_channel, threshold_mask,
};
use crate::config::DetectionConfig;
use crate::hierarchy::ImageData;
use crate::models::{BoundingBox, DetectedObject, Region};

/// Classical nucleus detector: percentile normalization, threshold, connected
/// components.
///
/// Treats bright pixels as nuclei (fluorescence). The model artifact is opened
/// on every call so an unreadable model fails the task, but its weights are
/// not evaluated.
///
/// There is no probability map. With `include_probability`, each object gets
/// [`keys::INTENSITY_SCORE`] instead: the mean normalized intensity under the
/// nucleus, clamped to [0, 1].
pub struct IntensityDetector {
    /// Smallest nucleus kept, in detection-resolution pixels
    pub min_nucleus_area: u32,
    /// Largest detection-resolution plane per region; larger regions fail
    pub max_detection_pixels: u64,
}

impl IntensityDetector {
    pub fn new() -> Self {
        Self {
            min_nucleus_area: 4,
            max_detection_pixels: MAX_DETECTION_PIXELS,
        }
    }

    pub fn with_min_nucleus_area(mut self, min_nucleus_area: u32) -> Self {
        self.min_nucleus_area = min_nucleus_area;
        self
    }

    pub fn with_max_detection_pixels(mut self, max_detection_pixels: u64) -> Self {
        self.max_detection_pixels = max_detection_pixels;
        self
    }
}

impl Default for IntensityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl NucleusDetector for IntensityDetector {
    fn name(&self) -> &str {
        "Intensity threshold"
    }

    fn detect(
        &self,
        image: &ImageData,
        region: &Region,
        config: &DetectionConfig,
    ) -> anyhow::Result<Vec<DetectedObject>> {
        check_model(&config.model_path)?;

        let image_pixel_size = image
            .calibration
            .averaged_pixel_size_microns()
            .ok_or_else(|| anyhow::anyhow!("image {} has no pixel size", image.name))?;

        let crop = crop_region(&image.pixels, &region.bounds)?;
        let plane = select_channel(&crop, config.channel.as_deref())?;

        // detection pixels per image pixel
        let scale = image_pixel_size / config.pixel_size_microns;
        let plane = rescale(&plane, scale, self.max_detection_pixels)?;
        debug!(
            "Region {}: {}x{} px at {:.3} µm/px",
            region.display_name(),
            plane.width(),
            plane.height(),
            config.pixel_size_microns
        );

        let normalized = normalize_percentiles(&plane, config.normalize_low, config.normalize_high);
        let mask = threshold_mask(&normalized, config.threshold);
        let (nuclei, blobs) = label_nuclei(&mask, self.min_nucleus_area);

        let cells = config.cell_expansion_microns.map(|microns| {
            let distance = (microns / config.pixel_size_microns) as f32;
            expand_labels(
                &nuclei,
                &blobs,
                distance,
                config.cell_constrain_scale.map(|s| s as f32),
            )
        });

        let nucleus_stats = label_stats(&nuclei, &plane);
        let probability_stats = config
            .include_probability
            .then(|| label_stats(&nuclei, &normalized));
        let cell_stats = cells.as_ref().map(|cells| label_stats(cells, &plane));

        let px = config.pixel_size_microns;
        let to_image = |s: &LabelStats| to_image_bounds(s, scale, &region.bounds);

        let mut objects = Vec::with_capacity(blobs.len());
        for blob in &blobs {
            let Some(nucleus) = nucleus_stats.get(&blob.label) else {
                continue;
            };
            let mut object = DetectedObject::nucleus(to_image(nucleus));

            if config.measure_shape {
                object = add_shape(object, nucleus, px, keys::NUCLEUS_AREA, keys::NUCLEUS_PERIMETER, keys::NUCLEUS_CIRCULARITY);
            }
            if config.measure_intensity {
                object = object
                    .with_measurement(keys::NUCLEUS_MEAN, nucleus.mean())
                    .with_measurement(keys::NUCLEUS_STD_DEV, nucleus.std_dev())
                    .with_measurement(keys::NUCLEUS_MIN, nucleus.min as f64)
                    .with_measurement(keys::NUCLEUS_MAX, nucleus.max as f64);
            }
            if let Some(score) = probability_stats.as_ref().and_then(|p| p.get(&blob.label)) {
                object = object.with_measurement(keys::INTENSITY_SCORE, score.mean().clamp(0.0, 1.0));
            }

            if let Some(cell) = cell_stats.as_ref().and_then(|c| c.get(&blob.label)) {
                object = object.with_cell(to_image(cell));
                if config.measure_shape {
                    object = add_shape(object, cell, px, keys::CELL_AREA, keys::CELL_PERIMETER, keys::CELL_CIRCULARITY)
                        .with_measurement(
                            keys::NUCLEUS_CELL_AREA_RATIO,
                            nucleus.area as f64 / cell.area.max(1) as f64,
                        );
                }
                if config.measure_intensity {
                    object = object
                        .with_measurement(keys::CELL_MEAN, cell.mean())
                        .with_measurement(keys::CELL_STD_DEV, cell.std_dev());
                }
            }

            objects.push(object);
        }

        debug!("Region {}: {} nuclei", region.display_name(), objects.len());
        Ok(objects)
    }
}

/// Open the model artifact and make sure it is not empty
fn check_model(path: &Path) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open model {:?}", path))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to read model {:?}", path))?
        .len();
    if len == 0 {
        anyhow::bail!("model file {:?} is empty", path);
    }
    Ok(())
}

fn add_shape(
    object: DetectedObject,
    stats: &LabelStats,
    pixel_size: f64,
    area_key: &str,
    perimeter_key: &str,
    circularity_key: &str,
) -> DetectedObject {
    object
        .with_measurement(area_key, stats.area as f64 * pixel_size * pixel_size)
        .with_measurement(perimeter_key, stats.perimeter as f64 * pixel_size)
        .with_measurement(circularity_key, stats.circularity())
}

/// Map a detection-resolution extent back to full-resolution image pixels
fn to_image_bounds(stats: &LabelStats, scale: f64, region: &BoundingBox) -> BoundingBox {
    let x0 = ((stats.min_x as f64 / scale).floor() as u32).min(region.width.saturating_sub(1));
    let y0 = ((stats.min_y as f64 / scale).floor() as u32).min(region.height.saturating_sub(1));
    let x1 = (((stats.max_x + 1) as f64 / scale).ceil() as u32).clamp(x0 + 1, region.width);
    let y1 = (((stats.max_y + 1) as f64 / scale).ceil() as u32).clamp(y0 + 1, region.height);
    BoundingBox::new(region.x + x0, region.y + y0, x1 - x0, y1 - y0)
}

