use frame_cull_common::frame::{Frame, FrameDecision};

/// A single-pass, causal frame selector.
///
/// Implementations see every frame of a stream exactly once, in order, and
/// decide from the frame itself, at most the frame before it, and their own
/// state whether it survives.
pub trait FrameFilter: Send {
    /// Decide whether `frame` is kept. The first frame of a stream is always kept.
    fn observe(&mut self, frame: &Frame) -> FrameDecision;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
