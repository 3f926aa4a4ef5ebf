//! Motion estimation between consecutive grayscale frames.
//!
//! A [`MotionGridSampler`] produces a dense vector field for a frame pair;
//! [`MotionGrid`] reduces that field to one magnitude per grid cell, and the
//! median over all cells is the global-motion estimate the motion filters
//! threshold on. The median ignores small moving subjects that would drag a
//! mean upwards, so only camera-wide movement registers.

pub mod block_match;

use image::GrayImage;

pub use block_match::BlockMatchingSampler;

/// Dense motion vectors laid out row-major over a regular lattice.
///
/// Vectors are `(dx, dy)` displacements in source-frame pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    cols: usize,
    rows: usize,
    vectors: Vec<(f32, f32)>,
}

impl MotionField {
    pub fn new(cols: usize, rows: usize, vectors: Vec<(f32, f32)>) -> Self {
        debug_assert_eq!(vectors.len(), cols * rows);
        Self { cols, rows, vectors }
    }

    /// Every lattice point carries the same displacement.
    #[cfg(test)]
    pub fn uniform(cols: usize, rows: usize, dx: f32, dy: f32) -> Self {
        Self::new(cols, rows, vec![(dx, dy); cols * rows])
    }

    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, col: usize, row: usize) -> (f32, f32) {
        self.vectors[row * self.cols + col]
    }
}

/// Computes the motion field between two consecutive grayscale frames.
pub trait MotionGridSampler: Send + Sync {
    fn compute_field(&self, prev: &GrayImage, cur: &GrayImage) -> MotionField;
}

/// Per-cell motion magnitudes over a square grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionGrid {
    magnitudes: Vec<f64>,
}

impl MotionGrid {
    /// Split the field into `grid_size x grid_size` cells, average the vectors
    /// in each cell, and keep the length of that average.
    ///
    /// Cells partition the lattice proportionally; a field smaller than the
    /// grid maps several cells onto the same lattice point.
    pub fn from_field(field: &MotionField, grid_size: usize) -> Self {
        let size = grid_size.max(1);
        let mut magnitudes = Vec::with_capacity(size * size);

        for i in 0..size {
            let (row_start, row_end) = cell_span(i, size, field.rows());
            for j in 0..size {
                let (col_start, col_end) = cell_span(j, size, field.cols());
                let mut sum_x = 0.0f64;
                let mut sum_y = 0.0f64;
                let mut count = 0usize;
                for row in row_start..row_end {
                    for col in col_start..col_end {
                        let (dx, dy) = field.get(col, row);
                        sum_x += dx as f64;
                        sum_y += dy as f64;
                        count += 1;
                    }
                }
                let magnitude = if count == 0 {
                    0.0
                } else {
                    let n = count as f64;
                    (sum_x / n).hypot(sum_y / n)
                };
                magnitudes.push(magnitude);
            }
        }

        Self { magnitudes }
    }

    #[cfg(test)]
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Median cell magnitude; the mean of the two middle values for an even count.
    pub fn median(&self) -> f64 {
        median(&self.magnitudes)
    }

    /// Global motion in `[0, 1]`: the median magnitude divided by `scale`, capped at 1.
    pub fn normalized_motion(&self, scale: f64) -> f64 {
        (self.median() / scale).min(1.0)
    }
}

/// Global motion estimate for one frame transition.
pub fn normalized_motion(
    sampler: &dyn MotionGridSampler,
    prev: &GrayImage,
    cur: &GrayImage,
    grid_size: usize,
    scale: f64,
) -> f64 {
    let field = sampler.compute_field(prev, cur);
    MotionGrid::from_field(&field, grid_size).normalized_motion(scale)
}

fn cell_span(index: usize, cells: usize, len: usize) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    let start = (index * len / cells).min(len - 1);
    let end = ((index + 1) * len / cells).clamp(start + 1, len);
    (start, end)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
