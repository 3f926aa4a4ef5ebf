use std::path::{Path, PathBuf};
use std::process::Stdio;

use frame_cull_common::config::SourceConfig;
use frame_cull_common::frame::{Frame, FrameSize};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{FrameSink, FrameSource, MediaBackend, MediaError};

/// How much of a child's stderr is kept for error messages.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Decodes and encodes through ffmpeg/ffprobe subprocesses, exchanging
/// packed RGB24 frames over pipes.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    source: SourceConfig,
    encoders: OnceCell<Vec<String>>,
}

impl FfmpegBackend {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            encoders: OnceCell::new(),
        }
    }

    /// Encoder names reported by `ffmpeg -encoders`, queried once.
    async fn encoders(&self) -> Result<&[String], MediaError> {
        let encoders = self
            .encoders
            .get_or_try_init(|| async {
                let output = Command::new("ffmpeg")
                    .args(["-hide_banner", "-encoders"])
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| MediaError::Spawn {
                        program: "ffmpeg",
                        source: e,
                    })?;
                Ok::<_, MediaError>(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
            })
            .await?;
        Ok(encoders.as_slice())
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = FfmpegSource;
    type Sink = FfmpegSink;

    async fn open_source(&self, identifier: &Path) -> Result<FfmpegSource, MediaError> {
        FfmpegSource::open(identifier, &self.source).await
    }

    async fn open_sink(
        &self,
        path: &Path,
        codec: &str,
        fps: f64,
        size: FrameSize,
    ) -> Result<FfmpegSink, MediaError> {
        if !self.encoders().await?.iter().any(|name| name == codec) {
            return Err(MediaError::UnsupportedCodec(codec.to_string()));
        }
        FfmpegSink::start(path, codec, fps, size).await
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    /// Display rotation in degrees, from the display matrix side data or the
    /// legacy `rotate` tag.
    fn rotation(&self) -> Option<i32> {
        self.side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .map(|degrees| degrees.round() as i32)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
    }
}

/// Frame size and rate of the first video stream.
async fn probe(identifier: &Path, config: &SourceConfig) -> Result<(FrameSize, f64), MediaError> {
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "error", "-select_streams", "v:0", "-print_format", "json", "-show_streams"]);
    if let Some(format) = &config.input_format {
        cmd.args(["-f", format]);
    }
    let output = cmd
        .arg(identifier)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| MediaError::Spawn {
            program: "ffprobe",
            source: e,
        })?;

    if !output.status.success() {
        return Err(MediaError::Probe(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| MediaError::NoVideoStream(identifier.to_path_buf()))?;

    // Decoding runs with -noautorotate, so frames keep the stored orientation.
    let size = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => FrameSize::new(w, h),
        _ => return Err(MediaError::NoVideoStream(identifier.to_path_buf())),
    };
    if let Some(rotation) = stream.rotation().filter(|r| r % 360 != 0) {
        info!(
            input = %identifier.display(),
            rotation,
            "ignoring rotation metadata, frames are decoded as stored"
        );
    }

    let fps = match stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
    {
        Some(fps) => fps,
        None => {
            warn!(
                input = %identifier.display(),
                default_fps = config.default_fps,
                "frame rate unavailable, using default"
            );
            config.default_fps
        }
    };

    Ok((size, fps))
}

/// Parse ffprobe's `num/den` rate; zero or malformed rates yield `None`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Encoder names from the table printed by `ffmpeg -encoders`.
fn parse_encoder_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Drain a child's stderr in the background so a chatty process never blocks
/// on a full pipe. Resolves to the last [`STDERR_TAIL_BYTES`] written.
fn drain_stderr(stderr: Option<ChildStderr>) -> Option<JoinHandle<String>> {
    let mut pipe = stderr?;
    Some(tokio::spawn(async move {
        let mut tail = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > 2 * STDERR_TAIL_BYTES {
                        tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                    }
                }
            }
        }
        if tail.len() > STDERR_TAIL_BYTES {
            tail.drain(..tail.len() - STDERR_TAIL_BYTES);
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    }))
}

async fn stderr_tail(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn decode_command(identifier: &Path, config: &SourceConfig) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate"]);
    if let Some(format) = &config.input_format {
        cmd.args(["-f", format]);
    }
    cmd.arg("-i").arg(identifier);
    if let Some(secs) = config.max_duration_secs {
        cmd.args(["-t", &format!("{secs:.3}")]);
    }
    cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "passthrough", "pipe:1"]);
    cmd
}

fn encode_command(path: &Path, codec: &str, fps: f64, size: FrameSize) -> Command {
    let size_arg = format!("{}x{}", size.width, size.height);
    let fps_arg = fps.to_string();

    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner",
        "-loglevel", "error",
        "-f", "rawvideo",
        "-pix_fmt", "rgb24",
        "-s", &size_arg,
        "-r", &fps_arg,
        "-i", "pipe:0",
        "-c:v", codec,
        "-y",
    ])
    .arg(path);
    cmd
}

/// A video file or device decoded by an ffmpeg child process.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    identifier: PathBuf,
    size: FrameSize,
    fps: f64,
    next_index: u64,
    finished: bool,
}

impl FfmpegSource {
    pub async fn open(identifier: &Path, config: &SourceConfig) -> Result<Self, MediaError> {
        if config.input_format.is_none() && !identifier.exists() {
            return Err(MediaError::NotFound(identifier.to_path_buf()));
        }

        let (size, fps) = probe(identifier, config).await?;
        let source = Self::spawn(decode_command(identifier, config), identifier, size, fps)?;

        info!(
            input = %identifier.display(),
            size = %size,
            fps,
            "opened video source"
        );
        Ok(source)
    }

    /// Start a decoder that writes packed `size` RGB24 frames to stdout.
    fn spawn(mut cmd: Command, identifier: &Path, size: FrameSize, fps: f64) -> Result<Self, MediaError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| MediaError::Spawn {
            program: "ffmpeg",
            source: e,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::Decode("could not get ffmpeg stdout handle".into())
        })?;
        let stderr = drain_stderr(child.stderr.take());

        Ok(Self {
            child,
            stdout,
            stderr,
            identifier: identifier.to_path_buf(),
            size,
            fps,
            next_index: 0,
            finished: false,
        })
    }

    /// Reap the decoder after its output ended; a failing exit is a read error.
    async fn finish(&mut self) -> Result<(), MediaError> {
        self.finished = true;
        let status = self.child.wait().await?;
        let stderr = stderr_tail(self.stderr.take()).await;
        if !status.success() {
            return Err(MediaError::Decode(format!(
                "ffmpeg exited with {status} while decoding {}: {stderr}",
                self.identifier.display(),
            )));
        }
        debug!(
            input = %self.identifier.display(),
            frames = self.next_index,
            "video source exhausted"
        );
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        if self.finished {
            return Ok(None);
        }

        let expected = self.size.rgb_len();
        let mut buf = vec![0u8; expected];
        let mut filled = 0;
        while filled < expected {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finish().await?;
            return Ok(None);
        }
        if filled < expected {
            self.finished = true;
            return Err(MediaError::TruncatedFrame {
                index: self.next_index,
                got: filled,
                expected,
            });
        }

        let frame = Frame::from_rgb(self.next_index, self.size, buf)?;
        self.next_index += 1;
        Ok(Some(frame))
    }
}

/// An ffmpeg child process encoding raw frames from its stdin into a file.
pub struct FfmpegSink {
    child: Child,
    stdin: ChildStdin,
    stderr: Option<JoinHandle<String>>,
    output_path: PathBuf,
    size: FrameSize,
    frame_count: u64,
}

impl FfmpegSink {
    /// Create the output file and spawn the encoder.
    pub async fn start(
        path: &Path,
        codec: &str,
        fps: f64,
        size: FrameSize,
    ) -> Result<Self, MediaError> {
        let unwritable = |e| MediaError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(unwritable)?;
        }
        tokio::fs::File::create(path).await.map_err(unwritable)?;

        let sink = Self::spawn(encode_command(path, codec, fps, size), path, size)?;
        debug!(
            codec,
            fps,
            size = %size,
            output = %path.display(),
            "ffmpeg encoder started"
        );
        Ok(sink)
    }

    /// Start an encoder that reads packed `size` RGB24 frames from stdin.
    fn spawn(mut cmd: Command, path: &Path, size: FrameSize) -> Result<Self, MediaError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| MediaError::Spawn {
            program: "ffmpeg",
            source: e,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::Encode("could not get ffmpeg stdin handle".into()))?;
        let stderr = drain_stderr(child.stderr.take());

        Ok(Self {
            child,
            stdin,
            stderr,
            output_path: path.to_path_buf(),
            size,
            frame_count: 0,
        })
    }
}

impl FrameSink for FfmpegSink {
    async fn write(&mut self, frame: &Frame) -> Result<(), MediaError> {
        if frame.size() != self.size {
            return Err(MediaError::FrameSizeMismatch {
                got: frame.size(),
                expected: self.size,
            });
        }
        self.stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| MediaError::Encode(format!("failed to write frame to ffmpeg stdin: {e}")))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Close stdin so ffmpeg sees end of input, then wait for the file to be finalized.
    async fn close(mut self) -> Result<u64, MediaError> {
        drop(self.stdin);

        let status = self.child.wait().await?;
        let stderr = stderr_tail(self.stderr.take()).await;
        if !status.success() {
            return Err(MediaError::Encode(format!("ffmpeg exited with {status}: {stderr}")));
        }

        info!(
            output = %self.output_path.display(),
            frames = self.frame_count,
            "video sink finalized"
        );
        Ok(self.frame_count)
    }
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub async fn check_ffmpeg_available() {
    for program in ["ffmpeg", "ffprobe"] {
        match Command::new(program).arg("-version").output().await {
            Ok(out) if out.status.success() => {
                debug!(program, "available");
            }
            Ok(_) => {
                warn!(program, "returned non-zero for -version; decoding or encoding may fail");
            }
            Err(e) => {
                warn!(
                    program,
                    error = %e,
                    "not found on PATH; install ffmpeg to read and write video files"
                );
            }
        }
    }
}
