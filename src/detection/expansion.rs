use std::collections::{HashMap, VecDeque};

use image::Luma;

use super::components::Labels;
use crate::models::Blob;

/// Grow every nucleus outward into unlabelled pixels to approximate its cell.
///
/// A pixel joins the nucleus it is reached from first, and only while it lies
/// within `distance` pixels of that nucleus. With `constrain_scale`, the reach
/// of each nucleus is further capped at `constrain_scale` times its
/// equivalent radius. Nucleus pixels keep their label.
pub fn expand_labels(
    nuclei: &Labels,
    blobs: &[Blob],
    distance: f32,
    constrain_scale: Option<f32>,
) -> Labels {
    let limits: HashMap<u32, f32> = blobs
        .iter()
        .map(|b| {
            let limit = match constrain_scale {
                Some(scale) => distance.min(scale * b.equivalent_radius()),
                None => distance,
            };
            (b.label, limit.max(0.0))
        })
        .collect();

    let (width, height) = nuclei.dimensions();
    let index = |x: u32, y: u32| (y as usize) * (width as usize) + x as usize;

    let mut cells = nuclei.clone();
    let mut origin: Vec<(u32, u32)> = vec![(0, 0); (width as usize) * (height as usize)];
    let mut queue = VecDeque::new();

    for (x, y, label) in nuclei.enumerate_pixels() {
        if label[0] != 0 {
            origin[index(x, y)] = (x, y);
            queue.push_back((x, y));
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        let label = cells.get_pixel(x, y)[0];
        let limit = limits.get(&label).copied().unwrap_or(0.0);
        let (ox, oy) = origin[index(x, y)];

        for (nx, ny) in neighbours(x, y, width, height) {
            if cells.get_pixel(nx, ny)[0] != 0 {
                continue;
            }
            let dx = nx as f32 - ox as f32;
            let dy = ny as f32 - oy as f32;
            if (dx * dx + dy * dy).sqrt() > limit {
                continue;
            }
            cells.put_pixel(nx, ny, Luma([label]));
            origin[index(nx, ny)] = (ox, oy);
            queue.push_back((nx, ny));
        }
    }

    cells
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let candidates = [
        (x.checked_sub(1), Some(y)),
        (x.checked_add(1).filter(|&nx| nx < width), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), y.checked_add(1).filter(|&ny| ny < height)),
    ];
    candidates.into_iter().filter_map(|(nx, ny)| Some((nx?, ny?)))
}
