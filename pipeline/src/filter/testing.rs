//! Deterministic stand-ins for the motion and similarity estimators.

use std::collections::VecDeque;
use std::sync::Mutex;

use frame_cull_common::frame::Frame;
use image::{GrayImage, RgbImage};

use crate::motion::{MotionField, MotionGridSampler};
use crate::similarity::SimilarityEstimator;

/// Replays one uniform motion magnitude per call, then reports no motion.
pub struct ScriptedSampler {
    magnitudes: Mutex<VecDeque<f32>>,
}

impl ScriptedSampler {
    pub fn new(magnitudes: Vec<f32>) -> Self {
        Self {
            magnitudes: Mutex::new(magnitudes.into()),
        }
    }
}

impl MotionGridSampler for ScriptedSampler {
    fn compute_field(&self, _prev: &GrayImage, _cur: &GrayImage) -> MotionField {
        let magnitude = self.magnitudes.lock().unwrap().pop_front().unwrap_or(0.0);
        MotionField::uniform(16, 16, magnitude, 0.0)
    }
}

/// Replays one similarity score per call, then reports identical frames.
pub struct ScriptedEstimator {
    scores: Mutex<VecDeque<f64>>,
}

impl ScriptedEstimator {
    pub fn new(scores: Vec<f64>) -> Self {
        Self {
            scores: Mutex::new(scores.into()),
        }
    }
}

impl SimilarityEstimator for ScriptedEstimator {
    fn score(&self, _prev: &RgbImage, _cur: &RgbImage) -> f64 {
        self.scores.lock().unwrap().pop_front().unwrap_or(1.0)
    }
}

pub fn blank_frames(count: usize) -> Vec<Frame> {
    (0..count as u64)
        .map(|index| Frame::new(index, RgbImage::new(4, 4)))
        .collect()
}
