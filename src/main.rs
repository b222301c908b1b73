use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use balltrack::frame_loop::display::{DirectoryDisplay, FrameDisplay, NullDisplay, StdinQuitKey};
use balltrack::frame_loop::shutdown::SharedSlot;
use balltrack::frame_loop::sink::{LineFormat, LineSink, PublishSink};
use balltrack::frame_loop::source::{CaptureSettings, ImageSequenceSource};
use balltrack::{BallPipeline, BlurKind, FrameLoop, PipelineConfig};

#[derive(Parser)]
#[command(name = "balltrack")]
#[command(about = "Track an orange ball through a stream of camera frames")]
struct Cli {
    /// Directory of frames, replayed in file-name order
    #[arg(value_name = "SOURCE_DIR")]
    source_dir: PathBuf,

    /// Pipeline configuration (.toml or .json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Blur kind: box, gaussian, median or bilateral
    #[arg(long, value_name = "KIND")]
    blur: Option<BlurKind>,

    #[arg(long, value_name = "R")]
    blur_radius: Option<f64>,

    /// Capture width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Capture height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Target framerate (0 replays as fast as possible)
    #[arg(long, default_value_t = 32.0)]
    fps: f64,

    /// Write publications here instead of stdout
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Publish JSON values instead of plain text
    #[arg(long)]
    json: bool,

    /// Save annotated masked frames to this directory
    #[arg(long, value_name = "DIR")]
    display_dir: Option<PathBuf>,

    /// Save every stage's output per frame to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Keep the first extracted line segment
    #[arg(long)]
    keep_all_lines: bool,

    /// Use both endpoints of each segment when locating the target
    #[arg(long)]
    all_endpoints: bool,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(kind) = args.blur {
        config.blur = kind;
    }
    if let Some(radius) = args.blur_radius {
        config.blur_radius = radius;
    }
    if args.keep_all_lines {
        config.quirks.skip_first_segment = false;
    }
    if args.all_endpoints {
        config.quirks.first_endpoint_only = false;
    }

    let mut pipeline = BallPipeline::new(config).context("invalid pipeline configuration")?;
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }
    info!(steps = ?pipeline.step_names(), quirks = ?pipeline.config().quirks, "pipeline ready");

    let settings = CaptureSettings {
        width: args.width,
        height: args.height,
        fps: args.fps,
    };
    let mut source = ImageSequenceSource::open(&args.source_dir, settings)
        .with_context(|| format!("failed to open {}", args.source_dir.display()))?;

    let format = if args.json {
        LineFormat::Json
    } else {
        LineFormat::Plain
    };
    let mut sink: Box<dyn PublishSink> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(LineSink::new(BufWriter::new(file), format))
        }
        None => Box::new(LineSink::new(io::stdout().lock(), format)),
    };

    let shutdown = SharedSlot::new();
    if let Err(err) = ctrlc::set_handler({
        let controller = shutdown.clone();
        move || controller.request_stop()
    }) {
        warn!("failed to install Ctrl+C handler: {err}");
    }

    let mut display: Box<dyn FrameDisplay> = match args.display_dir {
        Some(dir) => Box::new(StdinQuitKey::stdin(DirectoryDisplay::new(dir)?)),
        None => Box::new(StdinQuitKey::stdin(NullDisplay)),
    };

    let mut frame_loop = FrameLoop::new(&pipeline, &mut source, sink.as_mut(), &shutdown)
        .with_display(display.as_mut());
    if let Some(limit) = args.max_frames {
        frame_loop = frame_loop.with_max_frames(limit);
    }
    let report = frame_loop.run()?;

    info!(
        frames = report.frames,
        found = report.found,
        not_found = report.not_found,
        failures = report.failures,
        stop_reason = ?report.stop_reason,
        "done"
    );
    Ok(())
}
