#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from nucdetect for tests
pub use nucdetect::{
    BatchReport, BoundingBox, ConfigurationError, DetectedObject, DetectionConfig,
    DetectionConfigBuilder, DetectionError, DetectionPlugin, ImageData, IntensityDetector,
    ModelCatalog, ObjectKind, PixelCalibration, RawParams, Region, Settings, SlideImage,
    ValidationError,
};
