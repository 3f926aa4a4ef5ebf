//! Runs filters over whole streams.
//!
//! A run applies every stage in [`FilterKind::PIPELINE`] order. Each stage
//! drains its source completely into a sink before the next stage opens it,
//! so intermediate streams are materialized in a scratch directory private
//! to the run. That directory is removed before `run` returns, on success
//! and on failure alike.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_cull_common::config::{Config, ObservabilityConfig, PipelineConfig};
use frame_cull_common::frame::{Frame, FrameDecision};
use tracing::{debug, info, warn};

use crate::filter::{FilterError, FilterFactory, FilterKind, FrameFilter};
use crate::media::{FrameSink, FrameSource, MediaBackend, MediaError};

/// Cooperative cancellation, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one stage did to its stream.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: FilterKind,
    pub frames_read: u64,
    pub frames_kept: u64,
    /// Every decision in stream order, when decision recording is enabled.
    pub decisions: Option<Vec<FrameDecision>>,
}

impl StageReport {
    fn new(kind: FilterKind, record_decisions: bool) -> Self {
        Self {
            kind,
            frames_read: 0,
            frames_kept: 0,
            decisions: record_decisions.then(Vec::new),
        }
    }

    fn record(&mut self, decision: FrameDecision) {
        self.frames_read += 1;
        if decision.keep {
            self.frames_kept += 1;
        }
        if let Some(decisions) = &mut self.decisions {
            decisions.push(decision);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SizeReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub stages: Vec<StageReport>,
}

impl SizeReport {
    /// Output size as a fraction of input size; 0 when the input size is unknown.
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            0.0
        } else {
            self.output_bytes as f64 / self.input_bytes as f64
        }
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: f64 = 1024.0 * 1024.0;
        writeln!(f, "Input size:  {:.2} MB", self.input_bytes as f64 / MB)?;
        writeln!(f, "Output size: {:.2} MB", self.output_bytes as f64 / MB)?;
        write!(f, "Size ratio:  {:.3}", self.ratio())?;
        for stage in &self.stages {
            write!(
                f,
                "\n  {:<15} {} -> {} frames",
                stage.kind, stage.frames_read, stage.frames_kept
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot read input {path}: {source}")]
    InvalidInput { path: PathBuf, source: MediaError },
    #[error("cannot create output {path}: {source}")]
    InvalidOutput { path: PathBuf, source: MediaError },
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("run cancelled")]
    Cancelled,
}

/// Chains filters over streams opened through a [`MediaBackend`].
pub struct Pipeline<B: MediaBackend> {
    backend: B,
    filters: FilterFactory,
    config: PipelineConfig,
    observability: ObservabilityConfig,
    cancel: CancelFlag,
}

impl<B: MediaBackend> Pipeline<B> {
    pub fn new(backend: B, filters: FilterFactory, config: &Config, cancel: CancelFlag) -> Self {
        Self {
            backend,
            filters,
            config: config.pipeline.clone(),
            observability: config.observability.clone(),
            cancel,
        }
    }

    /// Run every pipeline stage from `input` to `output`.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<SizeReport, PipelineError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.config.work_dir)?;
        debug!(work_dir = %work.path().display(), "created run scratch directory");

        let result = self.run_stages(input, output, work.path()).await;

        let work_path = work.path().to_path_buf();
        if let Err(e) = work.close() {
            warn!(
                work_dir = %work_path.display(),
                error = %e,
                "failed to remove run scratch directory"
            );
        }

        let stages = result?;
        self.size_report(input, output, stages).await
    }

    /// Run a single filter from `input` to `output`.
    pub async fn run_single(
        &self,
        kind: FilterKind,
        input: &Path,
        output: &Path,
    ) -> Result<SizeReport, PipelineError> {
        let stage = self.run_stage(kind, input, output, &self.config.codec).await?;
        self.size_report(input, output, vec![stage]).await
    }

    async fn run_stages(
        &self,
        input: &Path,
        output: &Path,
        work_dir: &Path,
    ) -> Result<Vec<StageReport>, PipelineError> {
        let stage_count = FilterKind::PIPELINE.len();
        let mut stages = Vec::with_capacity(stage_count);
        let mut current = input.to_path_buf();
        let mut consumed: Option<PathBuf> = None;

        for (i, kind) in FilterKind::PIPELINE.into_iter().enumerate() {
            let last = i + 1 == stage_count;
            let (target, codec) = if last {
                (output.to_path_buf(), &self.config.codec)
            } else {
                (
                    work_dir.join(format!("stage-{}-{}.avi", i + 1, kind)),
                    &self.config.intermediate_codec,
                )
            };

            let result = self.run_stage(kind, &current, &target, codec).await;
            if let Some(path) = consumed.take() {
                remove_intermediate(&path).await;
            }
            stages.push(result?);

            if !last {
                consumed = Some(target.clone());
                current = target;
            }
        }
        Ok(stages)
    }

    /// Drain `input` through a fresh `kind` filter into `output`.
    ///
    /// The first frame is read before the sink is created, so an empty or
    /// unreadable input never leaves an output file behind.
    async fn run_stage(
        &self,
        kind: FilterKind,
        input: &Path,
        output: &Path,
        codec: &str,
    ) -> Result<StageReport, PipelineError> {
        let invalid_input = |source| PipelineError::InvalidInput {
            path: input.to_path_buf(),
            source,
        };

        let mut source = self.backend.open_source(input).await.map_err(invalid_input)?;
        let first = match source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(invalid_input(MediaError::EmptyStream)),
            Err(e) => return Err(invalid_input(e)),
        };

        let fps = source.fps();
        let mut filter = self.filters.build(kind, fps)?;
        let mut sink = self
            .backend
            .open_sink(output, codec, fps, first.size())
            .await
            .map_err(|source| PipelineError::InvalidOutput {
                path: output.to_path_buf(),
                source,
            })?;

        info!(
            stage = %kind,
            input = %input.display(),
            output = %output.display(),
            fps,
            size = %first.size(),
            "stage started"
        );

        let drained = self.drain(kind, &mut source, filter.as_mut(), &mut sink, first).await;
        let closed = sink.close().await;
        let report = drained?;
        closed?;

        info!(
            stage = %kind,
            frames_read = report.frames_read,
            frames_kept = report.frames_kept,
            "stage finished"
        );
        Ok(report)
    }

    async fn drain(
        &self,
        kind: FilterKind,
        source: &mut B::Source,
        filter: &mut dyn FrameFilter,
        sink: &mut B::Sink,
        first: Frame,
    ) -> Result<StageReport, PipelineError> {
        let mut report = StageReport::new(kind, self.observability.record_decisions);
        let progress_interval = self.observability.progress_interval;
        let fps = source.fps();
        let mut next = Some(first);

        while let Some(frame) = next {
            if self.cancel.is_cancelled() {
                info!(stage = %kind, frames_read = report.frames_read, "cancellation requested");
                return Err(PipelineError::Cancelled);
            }

            let decision = filter.observe(&frame);
            if self.observability.log_decisions {
                debug!(
                    stage = filter.name(),
                    frame = decision.frame_index,
                    at = ?frame.timestamp(fps),
                    keep = decision.keep,
                    "frame decision"
                );
            }
            if decision.keep {
                sink.write(&frame).await?;
            }
            report.record(decision);

            if progress_interval > 0 && report.frames_read % progress_interval == 0 {
                info!(
                    stage = %kind,
                    frames_read = report.frames_read,
                    frames_kept = report.frames_kept,
                    "progress"
                );
            }

            next = source.next_frame().await?;
        }
        Ok(report)
    }

    async fn size_report(
        &self,
        input: &Path,
        output: &Path,
        stages: Vec<StageReport>,
    ) -> Result<SizeReport, PipelineError> {
        // Devices have no meaningful size.
        let input_bytes = match tokio::fs::metadata(input).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };
        let output_bytes = tokio::fs::metadata(output).await?.len();
        Ok(SizeReport {
            input_bytes,
            output_bytes,
            stages,
        })
    }
}

async fn remove_intermediate(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed intermediate stream"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove intermediate stream"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::BlockMatchingSampler;
    use crate::similarity::Ssim;
    use frame_cull_common::frame::FrameSize;
    use image::{Rgb, RgbImage};
    use tokio::io::AsyncWriteExt;

    const HEADER_LEN: usize = 16;

    /// Uncompressed frames behind a 16-byte header: width, height (u32 LE), fps (f64 LE).
    struct RawFileBackend;

    struct RawFileSource {
        data: Vec<u8>,
        pos: usize,
        size: FrameSize,
        fps: f64,
        next_index: u64,
    }

    struct RawFileSink {
        file: tokio::fs::File,
        size: FrameSize,
        written: u64,
    }

    impl FrameSource for RawFileSource {
        fn fps(&self) -> f64 {
            self.fps
        }

        fn frame_size(&self) -> FrameSize {
            self.size
        }

        async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
            let remaining = self.data.len() - self.pos;
            if remaining == 0 {
                return Ok(None);
            }
            let expected = self.size.rgb_len();
            if remaining < expected {
                return Err(MediaError::TruncatedFrame {
                    index: self.next_index,
                    got: remaining,
                    expected,
                });
            }
            let bytes = self.data[self.pos..self.pos + expected].to_vec();
            self.pos += expected;
            let frame = Frame::from_rgb(self.next_index, self.size, bytes)?;
            self.next_index += 1;
            Ok(Some(frame))
        }
    }

    impl FrameSink for RawFileSink {
        async fn write(&mut self, frame: &Frame) -> Result<(), MediaError> {
            if frame.size() != self.size {
                return Err(MediaError::FrameSizeMismatch {
                    got: frame.size(),
                    expected: self.size,
                });
            }
            self.file.write_all(frame.as_bytes()).await?;
            self.written += 1;
            Ok(())
        }

        async fn close(mut self) -> Result<u64, MediaError> {
            self.file.flush().await?;
            Ok(self.written)
        }
    }

    impl MediaBackend for RawFileBackend {
        type Source = RawFileSource;
        type Sink = RawFileSink;

        async fn open_source(&self, identifier: &Path) -> Result<RawFileSource, MediaError> {
            let data = match tokio::fs::read(identifier).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(MediaError::NotFound(identifier.to_path_buf()))
                }
                Err(e) => return Err(e.into()),
            };
            if data.len() < HEADER_LEN {
                return Err(MediaError::Probe("missing header".into()));
            }
            let width = u32::from_le_bytes(data[0..4].try_into().unwrap());
            let height = u32::from_le_bytes(data[4..8].try_into().unwrap());
            let fps = f64::from_le_bytes(data[8..16].try_into().unwrap());
            Ok(RawFileSource {
                data,
                pos: HEADER_LEN,
                size: FrameSize::new(width, height),
                fps,
                next_index: 0,
            })
        }

        async fn open_sink(
            &self,
            path: &Path,
            codec: &str,
            fps: f64,
            size: FrameSize,
        ) -> Result<RawFileSink, MediaError> {
            if codec != "raw" {
                return Err(MediaError::UnsupportedCodec(codec.to_string()));
            }
            let unwritable = |e| MediaError::Unwritable {
                path: path.to_path_buf(),
                source: e,
            };
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(unwritable)?;
            }
            let mut file = tokio::fs::File::create(path).await.map_err(unwritable)?;
            file.write_all(&header(size, fps)).await?;
            Ok(RawFileSink {
                file,
                size,
                written: 0,
            })
        }
    }

    fn header(size: FrameSize, fps: f64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&size.width.to_le_bytes());
        bytes.extend_from_slice(&size.height.to_le_bytes());
        bytes.extend_from_slice(&fps.to_le_bytes());
        bytes
    }

    fn textured(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
        })
    }

    fn write_input(path: &Path, frames: usize, fps: f64) {
        let image = textured(64, 64);
        let mut bytes = header(FrameSize::new(64, 64), fps);
        for _ in 0..frames {
            bytes.extend_from_slice(image.as_raw());
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn write_frames(path: &Path, frames: &[RgbImage], fps: f64) {
        let (width, height) = frames[0].dimensions();
        let mut bytes = header(FrameSize::new(width, height), fps);
        for image in frames {
            bytes.extend_from_slice(image.as_raw());
        }
        std::fs::write(path, bytes).unwrap();
    }

    /// Smooth 2-D texture sampled with a horizontal offset, for panning scenes.
    fn panned(width: u32, height: u32, offset: f64) -> RgbImage {
        use std::f64::consts::TAU;
        RgbImage::from_fn(width, height, |x, y| {
            let x = x as f64 - offset;
            let v = 128.0 + 60.0 * (TAU * x / 37.0).sin() + 50.0 * (TAU * y as f64 / 29.0).sin();
            let v = v.round() as u8;
            Rgb([v, v, v])
        })
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.pipeline.work_dir = root.join("work");
        config.pipeline.codec = "raw".into();
        config.pipeline.intermediate_codec = "raw".into();
        config.idle_segment.period_threshold_secs = 1.0;
        config.idle_segment.keep_segment_length_secs = 0.5;
        config.idle_segment.keep_every_n_frames = 4;
        config.observability.record_decisions = true;
        config
    }

    fn pipeline(config: &Config, cancel: CancelFlag) -> Pipeline<RawFileBackend> {
        let filters = FilterFactory::new(
            Arc::new(config.clone()),
            Arc::new(BlockMatchingSampler::from_config(&config.motion)),
            Arc::new(Ssim),
        );
        Pipeline::new(RawFileBackend, filters, config, cancel)
    }

    fn work_dir_entries(config: &Config) -> usize {
        std::fs::read_dir(&config.pipeline.work_dir).unwrap().count()
    }

    #[tokio::test]
    async fn static_scene_through_all_stages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        let output = dir.path().join("out").join("final.raw");
        write_input(&input, 40, 10.0);
        let config = test_config(dir.path());

        let report = pipeline(&config, CancelFlag::new())
            .run(&input, &output)
            .await
            .unwrap();

        let counts: Vec<(u64, u64)> = report
            .stages
            .iter()
            .map(|s| (s.frames_read, s.frames_kept))
            .collect();
        // No motion survives global filtering intact; the idle stage keeps
        // 10 pre-idle frames, a 5-frame lead-in and every 4th frame after it.
        assert_eq!(counts, vec![(40, 40), (40, 21), (21, 4)]);

        let frame_bytes = 64 * 64 * 3;
        assert_eq!(report.input_bytes, (HEADER_LEN + 40 * frame_bytes) as u64);
        assert_eq!(report.output_bytes, (HEADER_LEN + 4 * frame_bytes) as u64);
        assert!((report.ratio() - 0.1).abs() < 0.01);
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn runs_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        write_input(&input, 40, 10.0);
        let config = test_config(dir.path());
        let pipeline = pipeline(&config, CancelFlag::new());

        let first_out = dir.path().join("a.raw");
        let second_out = dir.path().join("b.raw");
        let first = pipeline.run(&input, &first_out).await.unwrap();
        let second = pipeline.run(&input, &second_out).await.unwrap();

        for (a, b) in first.stages.iter().zip(&second.stages) {
            assert_eq!(a.decisions, b.decisions);
        }
        assert_eq!(
            std::fs::read(&first_out).unwrap(),
            std::fs::read(&second_out).unwrap()
        );
    }

    #[tokio::test]
    async fn unsupported_codec_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        write_input(&input, 20, 10.0);
        let mut config = test_config(dir.path());
        config.pipeline.codec = "bogus".into();

        let err = pipeline(&config, CancelFlag::new())
            .run(&input, &dir.path().join("final.raw"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InvalidOutput {
                source: MediaError::UnsupportedCodec(_),
                ..
            }
        ));
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn unwritable_output_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        write_input(&input, 20, 10.0);
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = test_config(dir.path());

        let err = pipeline(&config, CancelFlag::new())
            .run(&input, &blocker.join("final.raw"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InvalidOutput {
                source: MediaError::Unwritable { .. },
                ..
            }
        ));
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.raw");
        write_input(&input, 0, 10.0);
        let output = dir.path().join("final.raw");
        let config = test_config(dir.path());

        let err = pipeline(&config, CancelFlag::new())
            .run(&input, &output)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InvalidInput {
                source: MediaError::EmptyStream,
                ..
            }
        ));
        assert!(!output.exists());
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn missing_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let err = pipeline(&config, CancelFlag::new())
            .run_single(
                FilterKind::NearDuplicate,
                &dir.path().join("missing.raw"),
                &dir.path().join("out.raw"),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InvalidInput {
                source: MediaError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error_not_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        write_input(&input, 3, 10.0);
        let mut bytes = std::fs::read(&input).unwrap();
        bytes.extend_from_slice(&[0u8; 100]);
        std::fs::write(&input, bytes).unwrap();
        let config = test_config(dir.path());

        let err = pipeline(&config, CancelFlag::new())
            .run_single(FilterKind::GlobalMotion, &input, &dir.path().join("out.raw"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Media(MediaError::TruncatedFrame { index: 3, got: 100, .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_run_stops_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        write_input(&input, 20, 10.0);
        let config = test_config(dir.path());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = pipeline(&config, cancel)
            .run(&input, &dir.path().join("final.raw"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(work_dir_entries(&config), 0);
    }

    #[tokio::test]
    async fn single_stage_reports_its_own_counts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        let output = dir.path().join("near_duplicate_output.raw");
        write_input(&input, 12, 10.0);
        let config = test_config(dir.path());

        let report = pipeline(&config, CancelFlag::new())
            .run_single(FilterKind::NearDuplicate, &input, &output)
            .await
            .unwrap();

        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].frames_read, 12);
        assert_eq!(report.stages[0].frames_kept, 4);
        let kept: Vec<u64> = report.stages[0]
            .decisions
            .as_ref()
            .unwrap()
            .iter()
            .filter(|d| d.keep)
            .map(|d| d.frame_index)
            .collect();
        assert_eq!(kept, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn sustained_pan_is_dropped_after_the_period() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        let output = dir.path().join("global_motion_output.raw");
        let frames: Vec<RgbImage> = (0..30).map(|i| panned(256, 256, 8.0 * i as f64)).collect();
        write_frames(&input, &frames, 10.0);
        let config = test_config(dir.path());

        let report = pipeline(&config, CancelFlag::new())
            .run_single(FilterKind::GlobalMotion, &input, &output)
            .await
            .unwrap();

        let stage = &report.stages[0];
        assert_eq!(stage.frames_read, 30);
        assert!(stage.frames_kept < stage.frames_read);
        // 0.5 s at 10 fps: the fifth moving transition starts the drop.
        let kept: Vec<u64> = stage
            .decisions
            .as_ref()
            .unwrap()
            .iter()
            .filter(|d| d.keep)
            .map(|d| d.frame_index)
            .collect();
        assert_eq!(kept, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn record_copies_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.raw");
        let output = dir.path().join("record_output.raw");
        let frames: Vec<RgbImage> = (0..12).map(|i| panned(64, 64, 8.0 * i as f64)).collect();
        write_frames(&input, &frames, 10.0);
        let config = test_config(dir.path());

        let report = pipeline(&config, CancelFlag::new())
            .run_single(FilterKind::Record, &input, &output)
            .await
            .unwrap();

        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].frames_read, 12);
        assert_eq!(report.stages[0].frames_kept, 12);
        assert_eq!(report.input_bytes, report.output_bytes);
        assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
    }

    #[test]
    fn size_report_display() {
        let report = SizeReport {
            input_bytes: 2 * 1024 * 1024,
            output_bytes: 512 * 1024,
            stages: vec![StageReport {
                kind: FilterKind::IdleSegment,
                frames_read: 300,
                frames_kept: 68,
                decisions: None,
            }],
        };
        let text = report.to_string();
        assert!(text.contains("Input size:  2.00 MB"));
        assert!(text.contains("Output size: 0.50 MB"));
        assert!(text.contains("Size ratio:  0.250"));
        assert!(text.contains("idle-segment"));
        assert!(text.contains("300 -> 68 frames"));
    }

    #[test]
    fn unknown_input_size_gives_zero_ratio() {
        let report = SizeReport {
            input_bytes: 0,
            output_bytes: 10,
            stages: Vec::new(),
        };
        assert_eq!(report.ratio(), 0.0);
    }
}
