use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::models::BoundingBox;

/// Single-channel float image, intensities in [0, 1] before normalization
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Crop a region, failing if it is empty or leaves the image
pub fn crop_region(img: &DynamicImage, bounds: &BoundingBox) -> anyhow::Result<DynamicImage> {
    if bounds.is_empty() {
        anyhow::bail!("region has zero size ({}x{})", bounds.width, bounds.height);
    }
    if !bounds.fits_within(img.width(), img.height()) {
        anyhow::bail!(
            "region {}x{} at ({}, {}) lies outside the {}x{} image",
            bounds.width,
            bounds.height,
            bounds.x,
            bounds.y,
            img.width(),
            img.height()
        );
    }
    Ok(img.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height))
}

/// Pick the detection channel.
///
/// `None` uses luminance. Otherwise accepts `red`/`green`/`blue`, `gray`, a
/// 0-based index, or `Channel N` (1-based). Anything else is an error.
pub fn select_channel(img: &DynamicImage, channel: Option<&str>) -> anyhow::Result<Plane> {
    let Some(name) = channel else {
        return Ok(img.to_luma32f());
    };

    let color_channels = {
        let color = img.color();
        let count = color.channel_count() as usize;
        if color.has_alpha() { count - 1 } else { count }
    };

    let key = name.trim().to_lowercase();
    let index = match key.as_str() {
        "gray" | "grey" | "luminance" | "brightness" => return Ok(img.to_luma32f()),
        "red" | "r" => 0,
        "green" | "g" => 1,
        "blue" | "b" => 2,
        other => parse_channel_index(other)
            .ok_or_else(|| anyhow::anyhow!("unknown channel '{}'", name))?,
    };

    if index >= color_channels {
        anyhow::bail!(
            "channel '{}' not available, image has {} channel(s)",
            name,
            color_channels
        );
    }
    if color_channels == 1 {
        return Ok(img.to_luma32f());
    }

    let rgb = img.to_rgb32f();
    Ok(ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([rgb.get_pixel(x, y)[index]])
    }))
}

fn parse_channel_index(key: &str) -> Option<usize> {
    if let Ok(index) = key.parse::<usize>() {
        return Some(index);
    }
    key.strip_prefix("channel")
        .map(str::trim)
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .map(|n| n - 1)
}

/// Largest plane (in pixels) a region may be resampled to
pub const MAX_DETECTION_PIXELS: u64 = 1 << 26;

/// Resample by `factor` (output pixels per input pixel).
///
/// Fails before allocating if the target would exceed `max_pixels`.
pub fn rescale(plane: &Plane, factor: f64, max_pixels: u64) -> anyhow::Result<Plane> {
    if !(factor.is_finite() && factor > 0.0) {
        anyhow::bail!("invalid rescale factor {}", factor);
    }
    if (factor - 1.0).abs() < 1e-6 {
        return Ok(plane.clone());
    }

    let width = (plane.width() as f64 * factor).round().max(1.0);
    let height = (plane.height() as f64 * factor).round().max(1.0);
    if width > u32::MAX as f64 || height > u32::MAX as f64 || width * height > max_pixels as f64 {
        anyhow::bail!(
            "region would be resampled to {:.0}x{:.0} px, more than the {} px limit; check the pixel size",
            width,
            height,
            max_pixels
        );
    }

    Ok(image::imageops::resize(
        plane,
        width as u32,
        height as u32,
        FilterType::Triangle,
    ))
}

/// Value at percentile `p` (0..=100), linearly interpolated
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Map the `low` percentile to 0 and the `high` percentile to 1.
/// Values outside the range are not clipped. A flat plane maps to all zeros.
pub fn normalize_percentiles(plane: &Plane, low: f64, high: f64) -> Plane {
    let values = plane.as_raw();
    let lo = percentile(values, low);
    let hi = percentile(values, high);
    let span = hi - lo;

    if span <= f32::EPSILON {
        return Plane::new(plane.width(), plane.height());
    }
    Plane::from_fn(plane.width(), plane.height(), |x, y| {
        Luma([(plane.get_pixel(x, y)[0] - lo) / span])
    })
}

/// Foreground where the normalized value reaches `threshold`
pub fn threshold_mask(normalized: &Plane, threshold: f64) -> GrayImage {
    let threshold = threshold as f32;
    GrayImage::from_fn(normalized.width(), normalized.height(), |x, y| {
        if normalized.get_pixel(x, y)[0] >= threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
