use std::sync::Arc;

use log::info;

use crate::catalog::ModelCatalog;
use crate::config::{DetectionConfigBuilder, RawParams, default_parameters, require_calibration};
use crate::detection::NucleusDetector;
use crate::dispatch::{BatchReport, Dispatcher, plan_tasks};
use crate::error::DetectionResult;
use crate::hierarchy::{ImageData, SlideImage};

pub const PLUGIN_NAME: &str = "StarDist-based Nucleus Detection";
pub const PLUGIN_DESCRIPTION: &str =
    "Detect cell nuclei inside the selected annotations with a pretrained model";

/// The nucleus detection command: parameter form, then one task per selected annotation.
pub struct DetectionPlugin {
    catalog: ModelCatalog,
    detector: Arc<dyn NucleusDetector>,
    workers: usize,
    last_results: Option<String>,
}

impl DetectionPlugin {
    pub fn new(catalog: ModelCatalog, detector: Arc<dyn NucleusDetector>) -> Self {
        Self {
            catalog,
            detector,
            workers: 1,
            last_results: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn name(&self) -> &str {
        PLUGIN_NAME
    }

    pub fn description(&self) -> &str {
        PLUGIN_DESCRIPTION
    }

    /// Summary of the previous run, `None` before the first run
    pub fn last_results_description(&self) -> Option<&str> {
        self.last_results.as_deref()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Initial parameter form values for `image`
    pub fn default_parameters(&self, image: &ImageData) -> DetectionResult<RawParams> {
        default_parameters(image, &self.catalog)
    }

    /// Validate `params` and run detection on every selected annotation.
    ///
    /// Configuration problems are returned before any task is created;
    /// per-region failures are reported in the [`BatchReport`].
    pub fn run(&mut self, image: &mut SlideImage, params: &RawParams) -> DetectionResult<BatchReport> {
        let report = run_detection(
            &self.catalog,
            self.detector.as_ref(),
            self.workers,
            image,
            params,
        )?;
        self.last_results = Some(report.summary());
        Ok(report)
    }

    /// Like [`DetectionPlugin::run`], but on a blocking worker thread so the
    /// caller's runtime stays responsive. The image is handed back with its
    /// updated hierarchy.
    pub async fn run_in_background(
        &mut self,
        mut image: SlideImage,
        params: RawParams,
    ) -> anyhow::Result<(SlideImage, BatchReport)> {
        let catalog = self.catalog.clone();
        let detector = Arc::clone(&self.detector);
        let workers = self.workers;

        let (image, report) = tokio::task::spawn_blocking(move || {
            let report = run_detection(&catalog, detector.as_ref(), workers, &mut image, &params);
            (image, report)
        })
        .await?;

        let report = report?;
        self.last_results = Some(report.summary());
        Ok((image, report))
    }
}

fn run_detection(
    catalog: &ModelCatalog,
    detector: &dyn NucleusDetector,
    workers: usize,
    image: &mut SlideImage,
    params: &RawParams,
) -> DetectionResult<BatchReport> {
    require_calibration(&image.data)?;
    let config = Arc::new(DetectionConfigBuilder::new(catalog).build(params)?);
    info!("Using model {}", config.model_path.display());

    let regions = image.hierarchy.selected_annotations();
    let tasks = plan_tasks(regions, config);

    Ok(Dispatcher::new(detector)
        .with_workers(workers)
        .run_batch(tasks, image))
}
