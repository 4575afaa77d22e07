pub mod catalog;
pub mod config;
pub mod detection;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod hierarchy;
pub mod logging;
pub mod models;
pub mod plugin;
pub mod settings;

pub use catalog::{ModelCatalog, MODEL_EXTENSION};
pub use config::{DetectionConfig, DetectionConfigBuilder, RawParams, default_parameters};
pub use detection::{IntensityDetector, NucleusDetector};
pub use dispatch::{BatchReport, DetectionTask, Dispatcher, execute, plan_tasks};
pub use error::{ConfigurationError, DetectionError, DetectionFailure, ValidationError};
pub use hierarchy::{ImageData, ObjectHierarchy, PixelCalibration, SlideImage};
pub use models::{BoundingBox, DetectedObject, ModelDescriptor, ObjectKind, Region};
pub use plugin::DetectionPlugin;
pub use settings::Settings;
