use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::detection::NucleusDetector;
use crate::error::DetectionFailure;
use crate::hierarchy::{ImageData, ObjectHierarchy, SlideImage};
use crate::models::{DetectedObject, Region};

/// One region paired with the run's configuration. Consumed by [`execute`].
#[derive(Debug, Clone)]
pub struct DetectionTask {
    /// 1-based position in the batch
    pub index: usize,
    pub region: Region,
    pub config: Arc<DetectionConfig>,
}

/// Objects found for one task, not yet attached to the hierarchy
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub index: usize,
    pub region: Region,
    pub objects: Vec<DetectedObject>,
}

/// Result of a task whose detections were attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionResult {
    pub index: usize,
    pub region_id: Uuid,
    pub region_name: String,
    pub detections: usize,
}

/// Create one task per region, in order. No regions means no tasks.
pub fn plan_tasks(regions: Vec<Region>, config: Arc<DetectionConfig>) -> Vec<DetectionTask> {
    regions
        .into_iter()
        .enumerate()
        .map(|(i, region)| DetectionTask {
            index: i + 1,
            region,
            config: Arc::clone(&config),
        })
        .collect()
}

/// Run the detector once for `task`.
///
/// Errors and panics from the detector become a [`DetectionFailure`] for the
/// task's region.
pub fn execute(
    task: DetectionTask,
    detector: &dyn NucleusDetector,
    image: &ImageData,
) -> Result<DetectionOutcome, DetectionFailure> {
    let DetectionTask { index, region, config } = task;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        detector.detect(image, &region, &config)
    }));

    let cause = match result {
        Ok(Ok(objects)) => {
            return Ok(DetectionOutcome {
                index,
                region,
                objects,
            });
        }
        Ok(Err(e)) => format!("{:#}", e),
        Err(payload) => format!("detector panicked: {}", panic_message(payload.as_ref())),
    };

    Err(failure(index, &region, cause))
}

/// Attach an outcome's objects under its region, replacing earlier detections
pub fn attach(
    outcome: DetectionOutcome,
    hierarchy: &mut ObjectHierarchy,
) -> Result<RegionResult, DetectionFailure> {
    let DetectionOutcome { index, region, objects } = outcome;
    match hierarchy.set_children(region.id, objects) {
        Ok(detections) => Ok(RegionResult {
            index,
            region_id: region.id,
            region_name: region.display_name(),
            detections,
        }),
        Err(e) => Err(failure(index, &region, format!("{:#}", e))),
    }
}

fn failure(index: usize, region: &Region, cause: String) -> DetectionFailure {
    DetectionFailure {
        index,
        region_id: region.id,
        region_name: region.display_name(),
        cause,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What happened to every task of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub detector: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// Successful regions, by task index
    pub results: Vec<RegionResult>,
    /// Failed regions, by task index
    pub failures: Vec<DetectionFailure>,
}

impl BatchReport {
    pub fn task_count(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn total_detections(&self) -> usize {
        self.results.iter().map(|r| r.detections).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary, one line per failed region
    pub fn summary(&self) -> String {
        if self.task_count() == 0 {
            return "No regions selected; nothing to detect".to_string();
        }
        let mut text = format!(
            "{} detection(s) in {} of {} region(s)",
            self.total_detections(),
            self.results.len(),
            self.task_count()
        );
        if !self.failures.is_empty() {
            text.push_str(&format!(", {} failed:", self.failures.len()));
            for f in &self.failures {
                text.push_str(&format!("\n  Region {} ({}): {}", f.index, f.region_name, f.cause));
            }
        }
        text
    }
}

/// Runs a batch of tasks against one detector.
///
/// Only the thread calling [`Dispatcher::run_batch`] writes to the hierarchy.
/// With more than one worker, detection itself runs on scoped threads and the
/// outcomes are handed back over a channel.
pub struct Dispatcher<'a> {
    detector: &'a dyn NucleusDetector,
    workers: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(detector: &'a dyn NucleusDetector) -> Self {
        Self {
            detector,
            workers: 1,
        }
    }

    /// Number of threads running detection; 0 is treated as 1
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn run_batch(&self, tasks: Vec<DetectionTask>, image: &mut SlideImage) -> BatchReport {
        let started_at = now();
        let total = tasks.len();
        info!(
            "Running {} on {} region(s) with {} worker(s)",
            self.detector.name(),
            total,
            self.workers.min(total.max(1))
        );

        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut record = |outcome: Result<DetectionOutcome, DetectionFailure>,
                          hierarchy: &mut ObjectHierarchy| {
            match outcome.and_then(|o| attach(o, hierarchy)) {
                Ok(result) => {
                    info!(
                        "Region {} of {} ({}): {} detection(s)",
                        result.index, total, result.region_name, result.detections
                    );
                    results.push(result);
                }
                Err(failure) => {
                    error!("{}", failure);
                    failures.push(failure);
                }
            }
        };

        let SlideImage { data, hierarchy } = image;
        if self.workers <= 1 || total <= 1 {
            for task in tasks {
                record(execute(task, self.detector, data), &mut *hierarchy);
            }
        } else {
            let queue = Mutex::new(VecDeque::from(tasks));
            let (sender, receiver) = mpsc::channel();
            let data: &ImageData = data;

            std::thread::scope(|scope| {
                for _ in 0..self.workers.min(total) {
                    let sender = sender.clone();
                    let queue = &queue;
                    scope.spawn(move || {
                        loop {
                            let next = match queue.lock() {
                                Ok(mut q) => q.pop_front(),
                                Err(_) => None,
                            };
                            let Some(task) = next else { break };
                            if sender.send(execute(task, self.detector, data)).is_err() {
                                break;
                            }
                        }
                    });
                }
                drop(sender);

                for outcome in receiver {
                    record(outcome, &mut *hierarchy);
                }
            });

            // a worker that died leaves its queue entries behind
            let leftover = match queue.into_inner() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            for task in leftover {
                warn!("Task {} was not picked up by a worker; running it here", task.index);
                record(execute(task, self.detector, data), &mut *hierarchy);
            }
        }

        results.sort_by_key(|r| r.index);
        failures.sort_by_key(|f| f.index);

        let report = BatchReport {
            detector: self.detector.name().to_string(),
            started_at,
            finished_at: now(),
            results,
            failures,
        };
        info!("{}", report.summary());
        report
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
