use std::borrow::Cow;

use frame_cull_common::config::MotionConfig;
use image::imageops::FilterType;
use image::GrayImage;
use tracing::warn;

use super::{MotionField, MotionGridSampler};

/// Exhaustive block-matching motion estimator.
///
/// Both frames are shrunk by `downscale`, the previous frame is cut into
/// `block_size` squares, and each square is searched for in the current frame
/// within `search_radius` pixels by sum of absolute differences. The winning
/// offset is refined to sub-pixel precision by fitting a V through the SAD of
/// its horizontal and vertical neighbours, then scaled back up to source
/// pixels. Ties keep the earliest candidate, and the zero offset is tried
/// first, so flat regions report no motion. An exact match (SAD 0) is not
/// refined. Output is fully deterministic.
#[derive(Debug, Clone)]
pub struct BlockMatchingSampler {
    block_size: u32,
    search_radius: u32,
    downscale: u32,
}

impl BlockMatchingSampler {
    pub fn new(block_size: u32, search_radius: u32, downscale: u32) -> Self {
        Self {
            block_size: block_size.max(1),
            search_radius,
            downscale: downscale.max(1),
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(config.block_size, config.search_radius, config.downscale)
    }

    fn shrink<'a>(&self, img: &'a GrayImage) -> Cow<'a, GrayImage> {
        if self.downscale == 1 {
            return Cow::Borrowed(img);
        }
        let width = (img.width() / self.downscale).max(1);
        let height = (img.height() / self.downscale).max(1);
        Cow::Owned(image::imageops::resize(img, width, height, FilterType::Triangle))
    }

    fn best_offset(&self, prev: &GrayImage, cur: &GrayImage, x0: i64, y0: i64) -> (f32, f32) {
        let width = prev.width() as i64;
        let height = prev.height() as i64;
        let block = self.block_size as i64;
        let radius = self.search_radius as i64;

        let sad_at = |dx: i64, dy: i64| -> Option<u64> {
            let (x1, y1) = (x0 + dx, y0 + dy);
            if x1 < 0 || y1 < 0 || x1 + block > width || y1 + block > height {
                return None;
            }
            Some(sad(prev, cur, x0, y0, x1, y1, block))
        };

        let mut best = (0, 0);
        let mut best_sad = sad(prev, cur, x0, y0, x0, y0, block);

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if let Some(candidate) = sad_at(dx, dy) {
                    if candidate < best_sad {
                        best_sad = candidate;
                        best = (dx, dy);
                    }
                }
            }
        }

        let (dx, dy) = best;
        if best_sad == 0 {
            return (dx as f32, dy as f32);
        }
        let fx = subpixel(sad_at(dx - 1, dy), best_sad, sad_at(dx + 1, dy));
        let fy = subpixel(sad_at(dx, dy - 1), best_sad, sad_at(dx, dy + 1));
        (dx as f32 + fx, dy as f32 + fy)
    }
}

impl MotionGridSampler for BlockMatchingSampler {
    fn compute_field(&self, prev: &GrayImage, cur: &GrayImage) -> MotionField {
        if prev.dimensions() != cur.dimensions() {
            warn!(
                prev = ?prev.dimensions(),
                cur = ?cur.dimensions(),
                "frame dimensions changed mid-stream, reporting no motion"
            );
            return MotionField::empty();
        }

        let prev = self.shrink(prev);
        let cur = self.shrink(cur);
        let cols = (prev.width() / self.block_size) as usize;
        let rows = (prev.height() / self.block_size) as usize;
        let scale = self.downscale as f32;
        let block = self.block_size as i64;

        let mut vectors = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                let (dx, dy) = self.best_offset(&prev, &cur, col as i64 * block, row as i64 * block);
                vectors.push((dx * scale, dy * scale));
            }
        }
        MotionField::new(cols, rows, vectors)
    }
}

/// Offset in `[-0.5, 0.5]` of the true minimum from the sampled one, from an
/// equiangular line fit through the SAD on either side. SAD grows linearly
/// with displacement on textured content, so a V fits better than a parabola.
fn subpixel(left: Option<u64>, centre: u64, right: Option<u64>) -> f32 {
    let (Some(left), Some(right)) = (left, right) else {
        return 0.0;
    };
    let (left, centre, right) = (left as f64, centre as f64, right as f64);
    let rise = left.max(right) - centre;
    if rise <= 0.0 {
        return 0.0;
    }
    (0.5 * (left - right) / rise).clamp(-0.5, 0.5) as f32
}

/// Sum of absolute differences between the `block`-sized square of `prev` at
/// `(x0, y0)` and that of `cur` at `(x1, y1)`. Both squares must be in bounds.
fn sad(prev: &GrayImage, cur: &GrayImage, x0: i64, y0: i64, x1: i64, y1: i64, block: i64) -> u64 {
    let stride = prev.width() as usize;
    let a = prev.as_raw();
    let b = cur.as_raw();
    let block = block as usize;
    let mut total = 0u64;
    for r in 0..block {
        let ra = (y0 as usize + r) * stride + x0 as usize;
        let rb = (y1 as usize + r) * stride + x1 as usize;
        total += a[ra..ra + block]
            .iter()
            .zip(&b[rb..rb + block])
            .map(|(&p, &q)| p.abs_diff(q) as u64)
            .sum::<u64>();
    }
    total
}
