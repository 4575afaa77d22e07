use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DetectedObject, Region};

/// Physical pixel size of an image, if known
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelCalibration {
    pub pixel_width_microns: Option<f64>,
    pub pixel_height_microns: Option<f64>,
}

impl PixelCalibration {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Square pixels of the given size
    pub fn microns(size: f64) -> Self {
        Self {
            pixel_width_microns: Some(size),
            pixel_height_microns: Some(size),
        }
    }

    pub fn has_pixel_size_microns(&self) -> bool {
        matches!(
            (self.pixel_width_microns, self.pixel_height_microns),
            (Some(w), Some(h)) if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0
        )
    }

    /// Mean of width and height; `None` unless both are known
    pub fn averaged_pixel_size_microns(&self) -> Option<f64> {
        if !self.has_pixel_size_microns() {
            return None;
        }
        match (self.pixel_width_microns, self.pixel_height_microns) {
            (Some(w), Some(h)) => Some((w + h) / 2.0),
            _ => None,
        }
    }
}

/// Read-only pixels and calibration of an opened slide
#[derive(Debug, Clone)]
pub struct ImageData {
    pub name: String,
    pub pixels: DynamicImage,
    pub calibration: PixelCalibration,
}

impl ImageData {
    pub fn new(name: impl Into<String>, pixels: DynamicImage, calibration: PixelCalibration) -> Self {
        Self {
            name: name.into(),
            pixels,
            calibration,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, calibration: PixelCalibration) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let pixels = image::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, pixels, calibration))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Annotations, the detections attached under them, and the current selection.
#[derive(Debug, Clone, Default)]
pub struct ObjectHierarchy {
    annotations: Vec<Region>,
    children: HashMap<Uuid, Vec<DetectedObject>>,
    selection: BTreeSet<Uuid>,
}

impl ObjectHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_annotation(&mut self, region: Region) -> Uuid {
        let id = region.id;
        self.annotations.push(region);
        id
    }

    pub fn annotations(&self) -> &[Region] {
        &self.annotations
    }

    pub fn annotation(&self, id: Uuid) -> Option<&Region> {
        self.annotations.iter().find(|r| r.id == id)
    }

    /// Select any object by id, annotation or detection
    pub fn select(&mut self, id: Uuid) {
        self.selection.insert(id);
    }

    pub fn select_all_annotations(&mut self) {
        self.selection.extend(self.annotations.iter().map(|r| r.id));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected objects that can parent a detection, in annotation order.
    /// Selected detections are ignored.
    pub fn selected_annotations(&self) -> Vec<Region> {
        self.annotations
            .iter()
            .filter(|r| self.selection.contains(&r.id))
            .cloned()
            .collect()
    }

    /// Replace the children of `parent` with `objects`.
    /// Returns the number of objects attached.
    pub fn set_children(
        &mut self,
        parent: Uuid,
        objects: Vec<DetectedObject>,
    ) -> anyhow::Result<usize> {
        if self.annotation(parent).is_none() {
            anyhow::bail!("annotation {} is not part of the hierarchy", parent);
        }
        let count = objects.len();
        self.children.insert(parent, objects);
        Ok(count)
    }

    pub fn children(&self, parent: Uuid) -> &[DetectedObject] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn detection_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }
}

/// An opened image together with its object hierarchy
#[derive(Debug, Clone)]
pub struct SlideImage {
    pub data: ImageData,
    pub hierarchy: ObjectHierarchy,
}

impl SlideImage {
    pub fn new(data: ImageData) -> Self {
        Self {
            data,
            hierarchy: ObjectHierarchy::new(),
        }
    }
}
