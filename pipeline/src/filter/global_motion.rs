use std::sync::Arc;

use frame_cull_common::config::GlobalMotionConfig;
use frame_cull_common::frame::{Frame, FrameDecision};
use image::GrayImage;
use tracing::debug;

use super::traits::FrameFilter;
use crate::motion::{normalized_motion, MotionGridSampler};

/// Run-length state for [`GlobalMotionFilter`].
///
/// Counts consecutive transitions above `motion_threshold`. Once the run
/// reaches `frames_threshold` the filter drops frames until the motion settles.
/// Recovery is soft: the first calm transition after a dropping run only
/// clears the counter, and keeping resumes on the next calm transition.
#[derive(Debug, Clone)]
pub struct GlobalMotionState {
    motion_threshold: f64,
    frames_threshold: u32,
    motion_count: u32,
    keep_frame: bool,
}

impl GlobalMotionState {
    pub fn new(motion_threshold: f64, frames_threshold: u32) -> Self {
        Self {
            motion_threshold,
            frames_threshold,
            motion_count: 0,
            keep_frame: true,
        }
    }

    /// Feed one transition's normalized motion; returns whether its frame is kept.
    pub fn step(&mut self, normalized_motion: f64) -> bool {
        if normalized_motion > self.motion_threshold {
            self.motion_count += 1;
        } else {
            if self.motion_count < self.frames_threshold {
                self.keep_frame = true;
            }
            self.motion_count = 0;
        }

        if self.motion_count >= self.frames_threshold {
            self.keep_frame = false;
        }
        self.keep_frame
    }

    pub fn motion_count(&self) -> u32 {
        self.motion_count
    }

    #[cfg(test)]
    pub fn is_dropping(&self) -> bool {
        !self.keep_frame
    }
}

/// Drops frames captured during sustained camera-wide motion (panning, shake).
pub struct GlobalMotionFilter {
    sampler: Arc<dyn MotionGridSampler>,
    grid_size: usize,
    motion_scale: f64,
    state: GlobalMotionState,
    prev_gray: Option<GrayImage>,
}

impl GlobalMotionFilter {
    pub fn new(
        config: &GlobalMotionConfig,
        fps: f64,
        motion_scale: f64,
        sampler: Arc<dyn MotionGridSampler>,
    ) -> Self {
        let frames_threshold = config.frames_threshold(fps);
        debug!(
            fps,
            frames_threshold,
            motion_threshold = config.motion_threshold,
            grid_size = config.grid_size,
            "global motion filter configured"
        );
        Self {
            sampler,
            grid_size: config.grid_size as usize,
            motion_scale,
            state: GlobalMotionState::new(config.motion_threshold, frames_threshold),
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
        let keep = self.state.step(motion);
        debug!(
            motion = format!("{:.3}", motion),
            motion_count = self.state.motion_count(),
            keep,
            "global motion check"
        );
        keep
    }

    #[cfg(test)]
    pub fn state(&self) -> &GlobalMotionState {
        &self.state
    }
}

impl FrameFilter for GlobalMotionFilter {
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
        "global-motion"
    }
}
