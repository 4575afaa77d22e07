use std::sync::Mutex;

use image::{DynamicImage, ImageBuffer, Rgb};
use nucdetect::{
    BoundingBox, DetectedObject, DetectionConfig, ImageData, ModelCatalog, NucleusDetector,
    PixelCalibration, RawParams, Region, SlideImage,
};
use tempfile::TempDir;

/// Default test model name
pub const TEST_MODEL: &str = "dsb2018_heavy_augment.pb";

/// Microns per pixel of the test images
pub const TEST_PIXEL_SIZE: f64 = 0.5;

/// Creates a temp directory holding non-empty files with the given names.
/// The directory is removed when the returned TempDir is dropped.
pub fn create_model_dir(names: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    for name in names {
        std::fs::write(dir.path().join(name), b"model weights")
            .expect("Failed to write test model");
    }
    dir
}

/// Model directory with the default test model, plus its catalog
pub fn create_test_catalog() -> (ModelCatalog, TempDir) {
    let dir = create_model_dir(&[TEST_MODEL]);
    (ModelCatalog::new(dir.path()), dir)
}

/// Dark RGB image with bright blue discs (radius `r`) at the given centers
pub fn create_nuclei_image(width: u32, height: u32, centers: &[(u32, u32)], r: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let inside = centers.iter().any(|&(cx, cy)| {
            let dx = x as i64 - cx as i64;
            let dy = y as i64 - cy as i64;
            dx * dx + dy * dy <= (r * r) as i64
        });
        if inside {
            Rgb([40u8, 40u8, 230u8])
        } else {
            Rgb([10u8, 10u8, 20u8])
        }
    });
    DynamicImage::ImageRgb8(img)
}

pub fn calibrated(pixels: DynamicImage) -> ImageData {
    ImageData::new("test.png", pixels, PixelCalibration::microns(TEST_PIXEL_SIZE))
}

pub fn uncalibrated(pixels: DynamicImage) -> ImageData {
    ImageData::new("test.png", pixels, PixelCalibration::unknown())
}

/// A calibrated 100x100 slide with one selected annotation per bounds entry
pub fn create_test_slide(regions: &[(&str, BoundingBox)]) -> SlideImage {
    let pixels = create_nuclei_image(100, 100, &[(20, 20), (70, 70)], 5);
    let mut slide = SlideImage::new(calibrated(pixels));
    for (name, bounds) in regions {
        let id = slide.hierarchy.add_annotation(Region::new(*name, *bounds));
        slide.hierarchy.select(id);
    }
    slide
}

pub fn make_raw_params(model: &str) -> RawParams {
    RawParams::with_defaults(model, TEST_PIXEL_SIZE)
}

pub fn full_bounds() -> BoundingBox {
    BoundingBox::new(0, 0, 100, 100)
}

/// Detector returning one object per call, failing for regions named
/// "fail" and panicking for regions named "panic". Records every call.
#[derive(Default)]
pub struct StubDetector {
    pub calls: Mutex<Vec<String>>,
    pub configs: Mutex<Vec<DetectionConfig>>,
}

impl StubDetector {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl NucleusDetector for StubDetector {
    fn name(&self) -> &str {
        "Stub"
    }

    fn detect(
        &self,
        _image: &ImageData,
        region: &Region,
        config: &DetectionConfig,
    ) -> anyhow::Result<Vec<DetectedObject>> {
        self.calls.lock().expect("calls lock").push(region.name.clone());
        self.configs.lock().expect("configs lock").push(config.clone());
        match region.name.as_str() {
            "fail" => anyhow::bail!("inference error"),
            "panic" => panic!("tensor shape mismatch"),
            _ => Ok(vec![DetectedObject::nucleus(region.bounds)]),
        }
    }
}
