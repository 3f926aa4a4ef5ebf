mod filter;
mod media;
mod motion;
mod pipeline;
mod similarity;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use filter::{FilterFactory, FilterKind};
use frame_cull_common::config::Config;
use media::{FfmpegBackend, MediaError};
use motion::BlockMatchingSampler;
use pipeline::{CancelFlag, Pipeline, PipelineError, SizeReport};
use similarity::Ssim;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "frame-cull")]
#[command(about = "Drop low-information frames from recorded video", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all filters in sequence and report the size reduction
    Pipeline(StageArgs),
    /// Drop frames captured during sustained camera motion
    GlobalMotion(StageArgs),
    /// Thin out long stretches without motion
    IdleSegment(StageArgs),
    /// Collapse runs of near-identical frames
    NearDuplicate(StageArgs),
    /// Detector-based motion classification (not implemented)
    LearnedMotion(StageArgs),
    /// Copy a file or capture device to a video file without filtering
    Record(RecordArgs),
}

#[derive(Args)]
struct StageArgs {
    /// Input video file or capture device
    input: PathBuf,
    /// Output video (defaults to <output_dir>/<command>_output.avi)
    output: Option<PathBuf>,
}

#[derive(Args)]
struct RecordArgs {
    #[command(flatten)]
    stage: StageArgs,
    /// Stop after this many seconds (overrides source.max_duration_secs)
    #[arg(short = 't', long)]
    duration: Option<f64>,
}

impl Commands {
    /// The single stage to run, or `None` for the whole pipeline.
    fn stage(&self) -> Option<FilterKind> {
        match self {
            Commands::Pipeline(_) => None,
            Commands::GlobalMotion(_) => Some(FilterKind::GlobalMotion),
            Commands::IdleSegment(_) => Some(FilterKind::IdleSegment),
            Commands::NearDuplicate(_) => Some(FilterKind::NearDuplicate),
            Commands::LearnedMotion(_) => Some(FilterKind::LearnedMotion),
            Commands::Record(_) => Some(FilterKind::Record),
        }
    }

    fn args(&self) -> &StageArgs {
        match self {
            Commands::Pipeline(args)
            | Commands::GlobalMotion(args)
            | Commands::IdleSegment(args)
            | Commands::NearDuplicate(args)
            | Commands::LearnedMotion(args) => args,
            Commands::Record(args) => &args.stage,
        }
    }

    fn output_name(&self) -> String {
        let name = self.stage().map_or("pipeline", |kind| kind.name());
        format!("{}_output.avi", name.replace('-', "_"))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Commands::Record(RecordArgs {
        duration: Some(secs),
        ..
    }) = &cli.command
    {
        config.source.max_duration_secs = Some(*secs);
        if let Err(e) = config.validate() {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let args = cli.command.args();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.pipeline.output_dir.join(cli.command.output_name()));

    info!(
        input = %args.input.display(),
        output = %output.display(),
        stage = cli.command.stage().map_or("pipeline", |kind| kind.name()),
        codec = config.pipeline.codec,
        work_dir = %config.pipeline.work_dir.display(),
        "starting frame-cull"
    );

    // Decoding and encoding both shell out to ffmpeg.
    media::ffmpeg::check_ffmpeg_available().await;

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current frame");
            ctrl_c_flag.cancel();
        }
    });

    let backend = FfmpegBackend::new(config.source.clone());
    match run_with_fallback(
        &config,
        &backend,
        &cancel,
        cli.command.stage(),
        &args.input,
        &output,
    )
    .await
    {
        Ok(report) => println!("{report}"),
        Err(e) => {
            error!(error = %e, "frame-cull failed");
            std::process::exit(1);
        }
    }
}

/// An explicit path must load; otherwise `config.toml` is used when present.
fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from("config.toml"), false),
    };
    if !required && !path.exists() {
        return Ok(Config::default());
    }
    Config::load(&path).map_err(|e| format!("Failed to load config from {}: {e}", path.display()))
}

async fn execute(
    config: &Config,
    backend: &FfmpegBackend,
    cancel: &CancelFlag,
    stage: Option<FilterKind>,
    input: &Path,
    output: &Path,
) -> Result<SizeReport, PipelineError> {
    let filters = FilterFactory::new(
        Arc::new(config.clone()),
        Arc::new(BlockMatchingSampler::from_config(&config.motion)),
        Arc::new(Ssim),
    );
    let pipeline = Pipeline::new(backend.clone(), filters, config, cancel.clone());
    match stage {
        Some(kind) => pipeline.run_single(kind, input, output).await,
        None => pipeline.run(input, output).await,
    }
}

/// Retry once with `pipeline.fallback_codec` when the configured codec has no encoder.
async fn run_with_fallback(
    config: &Config,
    backend: &FfmpegBackend,
    cancel: &CancelFlag,
    stage: Option<FilterKind>,
    input: &Path,
    output: &Path,
) -> Result<SizeReport, PipelineError> {
    let result = execute(config, backend, cancel, stage, input, output).await;

    let codec = match &result {
        Err(PipelineError::InvalidOutput {
            source: MediaError::UnsupportedCodec(codec),
            ..
        }) => codec.clone(),
        _ => return result,
    };
    let Some(fallback) = config
        .pipeline
        .fallback_codec
        .clone()
        .filter(|fallback| *fallback != codec)
    else {
        return result;
    };

    warn!(codec, fallback, "no encoder for codec, retrying with fallback");
    let mut retry = config.clone();
    if retry.pipeline.codec == codec {
        retry.pipeline.codec = fallback.clone();
    }
    if retry.pipeline.intermediate_codec == codec {
        retry.pipeline.intermediate_codec = fallback;
    }
    execute(&retry, backend, cancel, stage, input, output).await
}
