pub mod global_motion;
pub mod idle_segment;
pub mod near_duplicate;
pub mod passthrough;
pub mod traits;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::sync::Arc;

use frame_cull_common::config::Config;

use crate::motion::MotionGridSampler;
use crate::similarity::SimilarityEstimator;

pub use global_motion::GlobalMotionFilter;
pub use idle_segment::IdleSegmentCompressor;
pub use near_duplicate::NearDuplicateCollapser;
pub use passthrough::PassThrough;
pub use traits::FrameFilter;

/// The frame filters this tool knows about, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    GlobalMotion,
    IdleSegment,
    NearDuplicate,
    /// Learned (detector-based) motion classification. Reserved; building it fails.
    LearnedMotion,
    /// Copies the source unchanged, e.g. to capture a device for a fixed time.
    Record,
}

impl FilterKind {
    /// The stages the full pipeline runs, in order.
    pub const PIPELINE: [FilterKind; 3] = [
        FilterKind::GlobalMotion,
        FilterKind::IdleSegment,
        FilterKind::NearDuplicate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::GlobalMotion => "global-motion",
            FilterKind::IdleSegment => "idle-segment",
            FilterKind::NearDuplicate => "near-duplicate",
            FilterKind::LearnedMotion => "learned-motion",
            FilterKind::Record => "record",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("filter {0} is not implemented")]
    NotImplemented(FilterKind),
}

/// Builds fresh filters for a stream once its frame rate is known.
///
/// Frame-count thresholds are derived from the stream's fps, so a filter can
/// only be constructed after its source has been opened.
#[derive(Clone)]
pub struct FilterFactory {
    config: Arc<Config>,
    sampler: Arc<dyn MotionGridSampler>,
    estimator: Arc<dyn SimilarityEstimator>,
}

impl FilterFactory {
    pub fn new(
        config: Arc<Config>,
        sampler: Arc<dyn MotionGridSampler>,
        estimator: Arc<dyn SimilarityEstimator>,
    ) -> Self {
        Self {
            config,
            sampler,
            estimator,
        }
    }

    pub fn build(&self, kind: FilterKind, fps: f64) -> Result<Box<dyn FrameFilter>, FilterError> {
        let motion_scale = self.config.motion.motion_scale;
        match kind {
            FilterKind::GlobalMotion => Ok(Box::new(GlobalMotionFilter::new(
                &self.config.global_motion,
                fps,
                motion_scale,
                Arc::clone(&self.sampler),
            ))),
            FilterKind::IdleSegment => Ok(Box::new(IdleSegmentCompressor::new(
                &self.config.idle_segment,
                fps,
                motion_scale,
                Arc::clone(&self.sampler),
            ))),
            FilterKind::NearDuplicate => Ok(Box::new(NearDuplicateCollapser::new(
                &self.config.near_duplicate,
                Arc::clone(&self.estimator),
            ))),
            FilterKind::Record => Ok(Box::new(PassThrough)),
            FilterKind::LearnedMotion => Err(FilterError::NotImplemented(kind)),
        }
    }
}
