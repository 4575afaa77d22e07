pub mod preprocessing;
pub mod components;
pub mod expansion;
pub mod measurements;
pub mod intensity;

pub use intensity::IntensityDetector;

use crate::config::DetectionConfig;
use crate::hierarchy::ImageData;
use crate::models::{DetectedObject, Region};

/// Something that finds nuclei inside one region of an image.
///
/// Implementations must not touch the object hierarchy; the dispatcher owns
/// attaching the returned objects to `region`.
pub trait NucleusDetector: Send + Sync {
    /// Human-readable name (used in logs and reports)
    fn name(&self) -> &str;

    /// Run detection once for `region` with `config`
    fn detect(
        &self,
        image: &ImageData,
        region: &Region,
        config: &DetectionConfig,
    ) -> anyhow::Result<Vec<DetectedObject>>;
}
