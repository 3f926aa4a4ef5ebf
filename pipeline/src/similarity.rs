use image::RgbImage;
use tracing::warn;

const WINDOW: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// Scores how alike two frames are, 1.0 meaning identical.
pub trait SimilarityEstimator: Send + Sync {
    fn score(&self, prev: &RgbImage, cur: &RgbImage) -> f64;
}

/// Mean structural similarity (SSIM) over the three colour channels.
///
/// Uses a 7x7 uniform window with sample covariance and the usual
/// `K1 = 0.01`, `K2 = 0.03` constants over an 8-bit data range. Only windows
/// lying fully inside the frame contribute. Window sums come from integer
/// integral images, so the score does not depend on summation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssim;

impl SimilarityEstimator for Ssim {
    fn score(&self, prev: &RgbImage, cur: &RgbImage) -> f64 {
        if prev.dimensions() != cur.dimensions() {
            warn!(
                prev = ?prev.dimensions(),
                cur = ?cur.dimensions(),
                "frame dimensions differ, treating frames as dissimilar"
            );
            return 0.0;
        }
        let (width, height) = prev.dimensions();
        if width == 0 || height == 0 {
            return 1.0;
        }

        let total: f64 = (0..3)
            .map(|channel| channel_ssim(prev, cur, channel, width as usize, height as usize))
            .sum();
        (total / 3.0).clamp(0.0, 1.0)
    }
}

/// Summed-area tables for one channel pair: x, y, x^2, y^2 and xy.
struct IntegralImages {
    stride: usize,
    x: Vec<u64>,
    y: Vec<u64>,
    xx: Vec<u64>,
    yy: Vec<u64>,
    xy: Vec<u64>,
}

impl IntegralImages {
    fn build(prev: &RgbImage, cur: &RgbImage, channel: usize, width: usize, height: usize) -> Self {
        let stride = width + 1;
        let len = stride * (height + 1);
        let mut tables = Self {
            stride,
            x: vec![0; len],
            y: vec![0; len],
            xx: vec![0; len],
            yy: vec![0; len],
            xy: vec![0; len],
        };

        let a = prev.as_raw();
        let b = cur.as_raw();
        for row in 0..height {
            let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0u64, 0u64, 0u64, 0u64, 0u64);
            for col in 0..width {
                let offset = (row * width + col) * 3 + channel;
                let p = a[offset] as u64;
                let q = b[offset] as u64;
                sx += p;
                sy += q;
                sxx += p * p;
                syy += q * q;
                sxy += p * q;

                let above = row * stride + col + 1;
                let here = above + stride;
                tables.x[here] = tables.x[above] + sx;
                tables.y[here] = tables.y[above] + sy;
                tables.xx[here] = tables.xx[above] + sxx;
                tables.yy[here] = tables.yy[above] + syy;
                tables.xy[here] = tables.xy[above] + sxy;
            }
        }
        tables
    }

    fn window_sum(&self, table: &[u64], x: usize, y: usize, w: usize) -> f64 {
        let top_left = y * self.stride + x;
        let top_right = top_left + w;
        let bottom_left = top_left + w * self.stride;
        let bottom_right = bottom_left + w;
        (table[bottom_right] + table[top_left] - table[top_right] - table[bottom_left]) as f64
    }
}

fn channel_ssim(prev: &RgbImage, cur: &RgbImage, channel: usize, width: usize, height: usize) -> f64 {
    let tables = IntegralImages::build(prev, cur, channel, width, height);
    let win = WINDOW.min(width).min(height);
    let n = (win * win) as f64;
    let cov_norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let mut sum = 0.0;
    let mut windows = 0usize;
    for y in 0..=(height - win) {
        for x in 0..=(width - win) {
            let ux = tables.window_sum(&tables.x, x, y, win) / n;
            let uy = tables.window_sum(&tables.y, x, y, win) / n;
            let uxx = tables.window_sum(&tables.xx, x, y, win) / n;
            let uyy = tables.window_sum(&tables.yy, x, y, win) / n;
            let uxy = tables.window_sum(&tables.xy, x, y, win) / n;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            sum += numerator / denominator;
            windows += 1;
        }
    }
    sum / windows as f64
}
