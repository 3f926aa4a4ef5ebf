use std::sync::Arc;

use frame_cull_common::config::NearDuplicateConfig;
use frame_cull_common::frame::{Frame, FrameDecision};
use image::RgbImage;
use tracing::debug;

use super::traits::FrameFilter;
use crate::similarity::SimilarityEstimator;

/// Run tracking for [`NearDuplicateCollapser`].
#[derive(Debug, Clone)]
pub struct NearDuplicateState {
    similarity_threshold: f64,
    frame_threshold: u32,
    in_sequence: bool,
    sequence_length: u32,
}

impl NearDuplicateState {
    pub fn new(similarity_threshold: f64, frame_threshold: u32) -> Self {
        Self {
            similarity_threshold,
            frame_threshold,
            in_sequence: false,
            sequence_length: 0,
        }
    }

    /// Feed one transition's similarity; returns whether its frame is kept.
    pub fn step(&mut self, similarity: f64) -> bool {
        if similarity > self.similarity_threshold {
            if !self.in_sequence {
                self.in_sequence = true;
                self.sequence_length = 1;
                true
            } else {
                self.sequence_length += 1;
                self.sequence_length <= self.frame_threshold
            }
        } else {
            self.in_sequence = false;
            self.sequence_length = 0;
            true
        }
    }

    #[cfg(test)]
    pub fn in_sequence(&self) -> bool {
        self.in_sequence
    }

    pub fn sequence_length(&self) -> u32 {
        self.sequence_length
    }
}

/// Keeps at most `frame_threshold` frames from each run of near-identical frames.
///
/// Similarity is always measured against the immediately preceding input
/// frame, whether or not that frame was kept.
pub struct NearDuplicateCollapser {
    estimator: Arc<dyn SimilarityEstimator>,
    state: NearDuplicateState,
    prev: Option<RgbImage>,
}

impl NearDuplicateCollapser {
    pub fn new(config: &NearDuplicateConfig, estimator: Arc<dyn SimilarityEstimator>) -> Self {
        Self {
            estimator,
            state: NearDuplicateState::new(config.similarity_threshold, config.frame_threshold),
            prev: None,
        }
    }

    /// Decide the transition `prev -> cur`; returns whether `cur` is kept.
    pub fn decide(&mut self, prev: &RgbImage, cur: &RgbImage) -> bool {
        let similarity = self.estimator.score(prev, cur);
        let keep = self.state.step(similarity);
        debug!(
            similarity = format!("{:.3}", similarity),
            sequence_length = self.state.sequence_length(),
            keep,
            "similarity check"
        );
        keep
    }

    #[cfg(test)]
    pub fn state(&self) -> &NearDuplicateState {
        &self.state
    }
}

impl FrameFilter for NearDuplicateCollapser {
    fn observe(&mut self, frame: &Frame) -> FrameDecision {
        let cur = frame.image().clone();
        let keep = match self.prev.take() {
            None => {
                debug!(frame = frame.index, "first frame, accepting unconditionally");
                true
            }
            Some(prev) => self.decide(&prev, &cur),
        };
        self.prev = Some(cur);
        FrameDecision::new(frame.index, keep)
    }

    fn name(&self) -> &str {
        "near-duplicate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::testing::{blank_frames, ScriptedEstimator};

    fn collapser(script: Vec<f64>, threshold: f64, frame_threshold: u32) -> NearDuplicateCollapser {
        let config = NearDuplicateConfig {
            similarity_threshold: threshold,
            frame_threshold,
        };
        NearDuplicateCollapser::new(&config, Arc::new(ScriptedEstimator::new(script)))
    }

    #[test]
    fn identical_frames_collapse_after_threshold() {
        let frames = blank_frames(90);
        let mut filter = collapser(vec![1.0; 89], 0.9, 3);
        let kept: Vec<u64> = frames
            .iter()
            .map(|f| filter.observe(f))
            .filter(|d| d.keep)
            .map(|d| d.frame_index)
            .collect();
        assert_eq!(kept, vec![0, 1, 2, 3]);
        assert!(filter.state().in_sequence());
        assert_eq!(filter.state().sequence_length(), 89);
    }

    #[test]
    fn identical_frames_through_real_ssim() {
        let frames = blank_frames(10);
        let config = NearDuplicateConfig {
            similarity_threshold: 0.9,
            frame_threshold: 3,
        };
        let mut filter = NearDuplicateCollapser::new(&config, Arc::new(crate::similarity::Ssim));
        let kept = frames.iter().filter(|f| filter.observe(f).keep).count();
        assert_eq!(kept, 4);
    }

    #[test]
    fn dissimilar_frame_resets_the_run() {
        let mut state = NearDuplicateState::new(0.95, 2);
        assert!(state.step(0.99));
        assert!(state.step(0.99));
        assert!(!state.step(0.99));
        assert!(state.step(0.95)); // at threshold counts as different
        assert!(!state.in_sequence());
        assert_eq!(state.sequence_length(), 0);
        assert!(state.step(0.99));
        assert_eq!(state.sequence_length(), 1);
    }

    #[test]
    fn never_more_than_threshold_consecutive_similar_frames() {
        let script: Vec<f64> = (0..200)
            .map(|i| if i % 37 == 0 { 0.2 } else { 0.99 })
            .collect();
        let mut state = NearDuplicateState::new(0.95, 5);
        let mut similar_kept_in_run = 0;
        for similarity in script {
            let keep = state.step(similarity);
            if similarity > 0.95 {
                if keep {
                    similar_kept_in_run += 1;
                }
                assert!(similar_kept_in_run <= 5);
            } else {
                similar_kept_in_run = 0;
                assert!(keep);
            }
        }
    }

    #[test]
    fn zero_threshold_keeps_only_the_run_opener() {
        let mut state = NearDuplicateState::new(0.5, 0);
        assert!(state.step(0.9));
        assert!(!state.step(0.9));
        assert!(!state.step(0.9));
    }
}
