use std::collections::BTreeMap;

use super::components::Labels;
use super::preprocessing::Plane;

/// Per-label pixel statistics gathered in one pass
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub area: u32,
    /// Pixels on the object's edge (4-neighbour touches another label or the border)
    pub perimeter: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f32,
    pub max: f32,
}

impl LabelStats {
    fn new(x: u32, y: u32, value: f32) -> Self {
        Self {
            area: 0,
            perimeter: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum: 0.0,
            sum_sq: 0.0,
            min: value,
            max: value,
        }
    }

    fn add(&mut self, x: u32, y: u32, value: f32, on_edge: bool) {
        self.area += 1;
        if on_edge {
            self.perimeter += 1;
        }
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum += value as f64;
        self.sum_sq += (value as f64) * (value as f64);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.area == 0 {
            return 0.0;
        }
        self.sum / self.area as f64
    }

    pub fn std_dev(&self) -> f64 {
        if self.area == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_sq / self.area as f64 - mean * mean).max(0.0).sqrt()
    }

    /// 4πA/P², capped at 1
    pub fn circularity(&self) -> f64 {
        if self.perimeter == 0 {
            return 0.0;
        }
        let p = self.perimeter as f64;
        (4.0 * std::f64::consts::PI * self.area as f64 / (p * p)).min(1.0)
    }
}

/// Statistics of `values` under every non-zero label
pub fn label_stats(labels: &Labels, values: &Plane) -> BTreeMap<u32, LabelStats> {
    let (width, height) = labels.dimensions();
    let mut stats: BTreeMap<u32, LabelStats> = BTreeMap::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let value = values.get_pixel(x, y)[0];

        let on_edge = x == 0
            || y == 0
            || x + 1 == width
            || y + 1 == height
            || labels.get_pixel(x - 1, y)[0] != label
            || labels.get_pixel(x + 1, y)[0] != label
            || labels.get_pixel(x, y - 1)[0] != label
            || labels.get_pixel(x, y + 1)[0] != label;

        stats
            .entry(label)
            .or_insert_with(|| LabelStats::new(x, y, value))
            .add(x, y, value, on_edge);
    }

    stats
}

/// Measurement names attached to detections
pub mod keys {
    pub const NUCLEUS_AREA: &str = "Nucleus: Area µm^2";
    pub const NUCLEUS_PERIMETER: &str = "Nucleus: Perimeter µm";
    pub const NUCLEUS_CIRCULARITY: &str = "Nucleus: Circularity";
    pub const NUCLEUS_MEAN: &str = "Nucleus: Mean";
    pub const NUCLEUS_STD_DEV: &str = "Nucleus: Std.Dev.";
    pub const NUCLEUS_MIN: &str = "Nucleus: Min";
    pub const NUCLEUS_MAX: &str = "Nucleus: Max";
    pub const CELL_AREA: &str = "Cell: Area µm^2";
    pub const CELL_PERIMETER: &str = "Cell: Perimeter µm";
    pub const CELL_CIRCULARITY: &str = "Cell: Circularity";
    pub const CELL_MEAN: &str = "Cell: Mean";
    pub const CELL_STD_DEV: &str = "Cell: Std.Dev.";
    pub const NUCLEUS_CELL_AREA_RATIO: &str = "Nucleus/Cell area ratio";
    /// Clamped mean normalized intensity; stands in for a detection probability
    pub const INTENSITY_SCORE: &str = "Normalized intensity score";
}
