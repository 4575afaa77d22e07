use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned box in full-resolution image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// True if the box lies entirely inside an image of the given size
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }
}

/// A user-drawn annotation that detection can run inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub bounds: BoundingBox,
}

impl Region {
    pub fn new(name: impl Into<String>, bounds: BoundingBox) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bounds,
        }
    }

    /// Name for messages; falls back to the id for unnamed regions
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// One model artifact found in the model directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// File name, e.g. `dsb2018_heavy_augment.pb`
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Nucleus only
    Detection,
    /// Nucleus plus an approximated cell boundary
    Cell,
}

/// An object created by a detector, owned by its parent region in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: Uuid,
    pub kind: ObjectKind,
    /// Nucleus extent
    pub nucleus: BoundingBox,
    /// Cell extent, present for [`ObjectKind::Cell`]
    pub cell: Option<BoundingBox>,
    pub measurements: BTreeMap<String, f64>,
}

impl DetectedObject {
    pub fn nucleus(nucleus: BoundingBox) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ObjectKind::Detection,
            nucleus,
            cell: None,
            measurements: BTreeMap::new(),
        }
    }

    pub fn with_cell(mut self, cell: BoundingBox) -> Self {
        self.kind = ObjectKind::Cell;
        self.cell = Some(cell);
        self
    }

    pub fn with_measurement(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measurements.insert(key.into(), value);
        self
    }

    pub fn measurement(&self, key: &str) -> Option<f64> {
        self.measurements.get(key).copied()
    }
}

/// Connected foreground blob found in a thresholded region, in detection-resolution pixels
#[derive(Debug, Clone)]
pub struct Blob {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Blob {
    /// Radius of the disc with the same area
    pub fn equivalent_radius(&self) -> f32 {
        (self.pixel_count as f32 / std::f32::consts::PI).sqrt()
    }
}
