use image::{GrayImage, RgbImage};
use std::fmt;
use std::time::Duration;

/// Width and height of every frame in a stream, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one packed RGB24 frame of this size.
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded video frame.
///
/// `index` is the 0-based position in the stream that produced it; the
/// timestamp is implicit (`index / fps`). Pixels are packed RGB24 and are
/// never modified once the frame exists.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from a packed RGB24 buffer as read off a decoder pipe.
    pub fn from_rgb(index: u64, size: FrameSize, data: Vec<u8>) -> Result<Self, FrameError> {
        let got = data.len();
        let image = RgbImage::from_raw(size.width, size.height, data).ok_or(
            FrameError::BufferSize {
                got,
                expected: size.rgb_len(),
            },
        )?;
        Ok(Self { index, image })
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Luma-only copy of the frame, as consumed by motion estimation.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    pub fn timestamp(&self, fps: f64) -> Duration {
        if fps > 0.0 {
            Duration::from_secs_f64(self.index as f64 / fps)
        } else {
            Duration::ZERO
        }
    }
}

/// The verdict a filter reaches about one input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecision {
    pub frame_index: u64,
    pub keep: bool,
}

impl FrameDecision {
    pub fn new(frame_index: u64, keep: bool) -> Self {
        Self { frame_index, keep }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer has {got} bytes, expected {expected}")]
    BufferSize { got: usize, expected: usize },
}
