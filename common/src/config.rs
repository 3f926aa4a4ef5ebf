use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub global_motion: GlobalMotionConfig,
    #[serde(default)]
    pub idle_segment: IdleSegmentConfig,
    #[serde(default)]
    pub near_duplicate: NearDuplicateConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Parent of the per-run scratch directories holding intermediate streams.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Where standalone runs write when no output path is given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_codec")]
    pub intermediate_codec: String,
    /// Codec the CLI retries with when `codec` has no encoder.
    #[serde(default = "default_fallback_codec")]
    pub fallback_codec: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// ffmpeg demuxer to force, e.g. `v4l2` for a camera device.
    #[serde(default)]
    pub input_format: Option<String>,
    /// Stop reading after this many seconds of input.
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
    /// Used when the probed frame rate is missing or zero.
    #[serde(default = "default_fps")]
    pub default_fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Block edge, in pixels of the downscaled frame.
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    #[serde(default = "default_search_radius")]
    pub search_radius: u32,
    #[serde(default = "default_downscale")]
    pub downscale: u32,
    /// Median cell magnitude (source pixels) that maps to full motion.
    #[serde(default = "default_motion_scale")]
    pub motion_scale: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalMotionConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_global_motion_threshold")]
    pub motion_threshold: f64,
    #[serde(default = "default_global_period_secs")]
    pub period_threshold_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdleSegmentConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_idle_motion_threshold")]
    pub motion_threshold: f64,
    #[serde(default = "default_idle_period_secs")]
    pub period_threshold_secs: f64,
    #[serde(default = "default_keep_segment_secs")]
    pub keep_segment_length_secs: f64,
    #[serde(default = "default_keep_every_n_frames")]
    pub keep_every_n_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearDuplicateConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Maximum frames kept from one run of similar frames.
    #[serde(default = "default_frame_threshold")]
    pub frame_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit one debug event per frame with the score and decision.
    #[serde(default)]
    pub log_decisions: bool,
    /// Keep every decision in the stage report.
    #[serde(default)]
    pub record_decisions: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            codec: default_codec(),
            intermediate_codec: default_codec(),
            fallback_codec: default_fallback_codec(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input_format: None,
            max_duration_secs: None,
            default_fps: default_fps(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            search_radius: default_search_radius(),
            downscale: default_downscale(),
            motion_scale: default_motion_scale(),
        }
    }
}

impl Default for GlobalMotionConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            motion_threshold: default_global_motion_threshold(),
            period_threshold_secs: default_global_period_secs(),
        }
    }
}

impl Default for IdleSegmentConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            motion_threshold: default_idle_motion_threshold(),
            period_threshold_secs: default_idle_period_secs(),
            keep_segment_length_secs: default_keep_segment_secs(),
            keep_every_n_frames: default_keep_every_n_frames(),
        }
    }
}

impl Default for NearDuplicateConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            frame_threshold: default_frame_threshold(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_decisions: false,
            record_decisions: false,
            progress_interval: default_progress_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GlobalMotionConfig {
    pub fn frames_threshold(&self, fps: f64) -> u32 {
        seconds_to_frames(fps, self.period_threshold_secs).max(1)
    }
}

impl IdleSegmentConfig {
    pub fn frames_threshold(&self, fps: f64) -> u32 {
        seconds_to_frames(fps, self.period_threshold_secs).max(1)
    }

    pub fn keep_frames_threshold(&self, fps: f64) -> u32 {
        seconds_to_frames(fps, self.keep_segment_length_secs)
    }
}

/// Converts a duration to a frame count at the stream's rate, rounding to nearest.
pub fn seconds_to_frames(fps: f64, secs: f64) -> u32 {
    let frames = (fps * secs).round();
    if frames.is_finite() && frames > 0.0 {
        frames as u32
    } else {
        0
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("global_motion.motion_threshold", self.global_motion.motion_threshold)?;
        check_unit_interval("idle_segment.motion_threshold", self.idle_segment.motion_threshold)?;

        let similarity = self.near_duplicate.similarity_threshold;
        if !(similarity > 0.0 && similarity < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "near_duplicate.similarity_threshold must be in (0, 1), got {similarity}"
            )));
        }

        check_positive("global_motion.period_threshold_secs", self.global_motion.period_threshold_secs)?;
        check_positive("idle_segment.period_threshold_secs", self.idle_segment.period_threshold_secs)?;
        check_positive("motion.motion_scale", self.motion.motion_scale)?;
        check_positive("source.default_fps", self.source.default_fps)?;

        let lead_in = self.idle_segment.keep_segment_length_secs;
        if !(lead_in.is_finite() && lead_in >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "idle_segment.keep_segment_length_secs must be >= 0, got {lead_in}"
            )));
        }

        for (name, value) in [
            ("idle_segment.keep_every_n_frames", self.idle_segment.keep_every_n_frames),
            ("global_motion.grid_size", self.global_motion.grid_size),
            ("idle_segment.grid_size", self.idle_segment.grid_size),
            ("motion.block_size", self.motion.block_size),
            ("motion.downscale", self.motion.downscale),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }

        if let Some(secs) = self.source.max_duration_secs {
            check_positive("source.max_duration_secs", secs)?;
        }
        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be in (0, 1], got {value}")))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be > 0, got {value}")))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_work_dir() -> PathBuf {
    PathBuf::from("VideoData/.work")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("VideoData")
}
fn default_codec() -> String {
    "mpeg4".into()
}
fn default_fallback_codec() -> Option<String> {
    Some("mjpeg".into())
}
fn default_fps() -> f64 {
    30.0
}
fn default_block_size() -> u32 {
    8
}
fn default_search_radius() -> u32 {
    4
}
fn default_downscale() -> u32 {
    4
}
fn default_motion_scale() -> f64 {
    10.0
}
fn default_grid_size() -> u32 {
    16
}
fn default_global_motion_threshold() -> f64 {
    0.15
}
fn default_global_period_secs() -> f64 {
    0.5
}
fn default_idle_motion_threshold() -> f64 {
    0.05
}
fn default_idle_period_secs() -> f64 {
    3.0
}
fn default_keep_segment_secs() -> f64 {
    1.0
}
fn default_keep_every_n_frames() -> u32 {
    30
}
fn default_similarity_threshold() -> f64 {
    0.95
}
fn default_frame_threshold() -> u32 {
    3
}
fn default_progress_interval() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".into()
}
