use std::collections::BTreeMap;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::models::Blob;

/// Label image: 0 is background, every other value one object
pub type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label connected foreground pixels and drop blobs smaller than `min_area`.
///
/// Dropped blobs are cleared from the returned label image. Blobs come back
/// ordered by label.
pub fn label_nuclei(mask: &GrayImage, min_area: u32) -> (Labels, Vec<Blob>) {
    let mut labels = connected_components(mask, Connectivity::Four, Luma([0u8]));

    let mut regions: BTreeMap<u32, (u32, u32, u32, u32, u32)> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue;
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let blobs: Vec<Blob> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Blob {
            label,
            min_x,
            min_y,
            max_x,
            max_y,
            pixel_count: count,
        })
        .collect();

    let (kept, dropped): (Vec<Blob>, Vec<Blob>) =
        blobs.into_iter().partition(|b| b.pixel_count >= min_area);

    if !dropped.is_empty() {
        let dropped: Vec<u32> = dropped.iter().map(|b| b.label).collect();
        for pixel in labels.pixels_mut() {
            if pixel[0] != 0 && dropped.binary_search(&pixel[0]).is_ok() {
                pixel[0] = 0;
            }
        }
    }

    (labels, kept)
}
