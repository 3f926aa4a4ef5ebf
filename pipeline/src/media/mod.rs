//! Frame sources and sinks.
//!
//! Sources are pull-based and single-pass: `next_frame` yields frames in
//! order and `Ok(None)` once the stream has cleanly ended. A decoder that
//! fails or stops mid-frame surfaces as an error instead, so end of stream
//! and read failure are never confused.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use frame_cull_common::frame::{Frame, FrameError, FrameSize};

pub use ffmpeg::FfmpegBackend;

#[allow(async_fn_in_trait)]
pub trait FrameSource {
    fn fps(&self) -> f64;

    fn frame_size(&self) -> FrameSize;

    /// The next frame, or `Ok(None)` at a clean end of stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError>;
}

#[allow(async_fn_in_trait)]
pub trait FrameSink {
    async fn write(&mut self, frame: &Frame) -> Result<(), MediaError>;

    /// Flush and finalize the output. Must be called exactly once, also after
    /// a failed write.
    async fn close(self) -> Result<u64, MediaError>;
}

/// Opens sources and sinks for one kind of storage.
#[allow(async_fn_in_trait)]
pub trait MediaBackend {
    type Source: FrameSource;
    type Sink: FrameSink;

    async fn open_source(&self, identifier: &Path) -> Result<Self::Source, MediaError>;

    /// Create the output, including missing parent directories.
    async fn open_sink(
        &self,
        path: &Path,
        codec: &str,
        fps: f64,
        size: FrameSize,
    ) -> Result<Self::Sink, MediaError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("input not found: {0}")]
    NotFound(PathBuf),
    #[error("ffprobe failed: {0}")]
    Probe(String),
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("stream has no frames")]
    EmptyStream,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },
    #[error("decoder failed: {0}")]
    Decode(String),
    #[error("frame {index} truncated: got {got} of {expected} bytes")]
    TruncatedFrame {
        index: u64,
        got: usize,
        expected: usize,
    },
    #[error("no encoder available for codec {0}")]
    UnsupportedCodec(String),
    #[error("cannot write {path}: {source}")]
    Unwritable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encoder failed: {0}")]
    Encode(String),
    #[error("frame is {got}, stream is {expected}")]
    FrameSizeMismatch { got: FrameSize, expected: FrameSize },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
