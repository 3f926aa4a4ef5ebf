use frame_cull_common::frame::{Frame, FrameDecision};

use super::traits::FrameFilter;

/// Keeps every frame. Used to record a source to a file unchanged.
#[derive(Debug, Default)]
pub struct PassThrough;

impl FrameFilter for PassThrough {
    fn observe(&mut self, frame: &Frame) -> FrameDecision {
        FrameDecision::new(frame.index, true)
    }

    fn name(&self) -> &str {
        "record"
    }
}
