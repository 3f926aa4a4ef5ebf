use std::sync::Arc;

use frame_cull_common::config::IdleSegmentConfig;
use frame_cull_common::frame::{Frame, FrameDecision};
use image::GrayImage;
use tracing::{debug, info};

use super::traits::FrameFilter;
use crate::motion::{normalized_motion, MotionGridSampler};

/// Run-length state for [`IdleSegmentCompressor`].
///
/// A stream enters an idle segment after `frames_threshold` consecutive
/// transitions below `motion_threshold`. Inside the segment the first
/// `keep_frames_threshold` frames are kept as a lead-in, then one frame every
/// `keep_every_n_frames`. A single transition at or above the threshold ends
/// the segment immediately.
#[derive(Debug, Clone)]
pub struct IdleSegmentState {
    motion_threshold: f64,
    frames_threshold: u32,
    keep_frames_threshold: u32,
    keep_every_n_frames: u32,
    no_motion_count: u32,
    idle: bool,
}

impl IdleSegmentState {
    pub fn new(
        motion_threshold: f64,
        frames_threshold: u32,
        keep_frames_threshold: u32,
        keep_every_n_frames: u32,
    ) -> Self {
        Self {
            motion_threshold,
            frames_threshold,
            keep_frames_threshold,
            keep_every_n_frames: keep_every_n_frames.max(1),
            no_motion_count: 0,
            idle: false,
        }
    }

    /// Feed one transition's normalized motion; returns whether its frame is kept.
    pub fn step(&mut self, normalized_motion: f64) -> bool {
        if normalized_motion < self.motion_threshold {
            self.no_motion_count += 1;
        } else {
            self.no_motion_count = 0;
            self.idle = false;
        }

        if self.no_motion_count < self.frames_threshold {
            return true;
        }

        self.idle = true;
        let since_start = self.no_motion_count - self.frames_threshold;
        since_start < self.keep_frames_threshold || since_start % self.keep_every_n_frames == 0
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn no_motion_count(&self) -> u32 {
        self.no_motion_count
    }
}

/// Thins out long stretches with no motion, keeping a lead-in and a sparse sample.
pub struct IdleSegmentCompressor {
    sampler: Arc<dyn MotionGridSampler>,
    grid_size: usize,
    motion_scale: f64,
    state: IdleSegmentState,
    prev_gray: Option<GrayImage>,
}

impl IdleSegmentCompressor {
    pub fn new(
        config: &IdleSegmentConfig,
        fps: f64,
        motion_scale: f64,
        sampler: Arc<dyn MotionGridSampler>,
    ) -> Self {
        let frames_threshold = config.frames_threshold(fps);
        let keep_frames_threshold = config.keep_frames_threshold(fps);
        debug!(
            fps,
            frames_threshold,
            keep_frames_threshold,
            keep_every_n_frames = config.keep_every_n_frames,
            motion_threshold = config.motion_threshold,
            "idle segment compressor configured"
        );
        Self {
            sampler,
            grid_size: config.grid_size as usize,
            motion_scale,
            state: IdleSegmentState::new(
                config.motion_threshold,
                frames_threshold,
                keep_frames_threshold,
                config.keep_every_n_frames,
            ),
            prev_gray: None,
        }
    }

    /// Decide the transition `prev -> cur`; returns whether `cur` is kept.
    pub fn decide(&mut self, prev: &GrayImage, cur: &GrayImage) -> bool {
        let motion = normalized_motion(
            self.sampler.as_ref(),
            prev,
            cur,
            self.grid_size,
            self.motion_scale,
        );
        let was_idle = self.state.is_idle();
        let keep = self.state.step(motion);
        match (was_idle, self.state.is_idle()) {
            (false, true) => info!(
                no_motion_count = self.state.no_motion_count(),
                "idle segment started"
            ),
            (true, false) => info!(motion = format!("{:.3}", motion), "idle segment ended"),
            _ => {}
        }
        debug!(
            motion = format!("{:.3}", motion),
            no_motion_count = self.state.no_motion_count(),
            idle = self.state.is_idle(),
            keep,
            "idle segment check"
        );
        keep
    }

    #[cfg(test)]
    pub fn state(&self) -> &IdleSegmentState {
        &self.state
    }
}

impl FrameFilter for IdleSegmentCompressor {
    fn observe(&mut self, frame: &Frame) -> FrameDecision {
        let gray = frame.to_gray();
        let keep = match self.prev_gray.take() {
            None => {
                debug!(frame = frame.index, "first frame, accepting unconditionally");
                true
            }
            Some(prev) => self.decide(&prev, &gray),
        };
        self.prev_gray = Some(gray);
        FrameDecision::new(frame.index, keep)
    }

    fn name(&self) -> &str {
        "idle-segment"
    }
}
