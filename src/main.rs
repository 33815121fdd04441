use anyhow::{Context, Result};
use backdrop::capture::{CaptureSource, FileCapture};
use backdrop::commands::Command;
use backdrop::compositor::CompositorConfig;
use backdrop::output::{FrameDirOutput, NullOutput, OutputSink};
use backdrop::pipeline::{Pipeline, PipelineConfig, SystemClock};
use backdrop::segmentation::{PassthroughModel, SegmentationModel};
use clap::Parser;
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Replay a GIF, image directory or video file instead of the webcam
    #[arg(long)]
    input: Option<PathBuf>,

    /// Restart --input when it runs out
    #[arg(long)]
    loop_input: bool,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output v4l2loopback device path (e.g. /dev/video10)
    #[arg(short, long)]
    output_device: Option<String>,

    /// Write every composited frame as PNG into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Minimum time between ticks in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_interval_ms: u64,

    /// Mask feathering kernel size (odd)
    #[arg(long, default_value_t = 9)]
    feather_kernel: usize,

    /// Live blur kernel size (odd)
    #[arg(long, default_value_t = 55)]
    blur_kernel: usize,

    /// Start with this background image
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// Start with this looping background video
    #[arg(long, conflicts_with = "background_image")]
    background_video: Option<PathBuf>,

    /// Start with the background blurred
    #[arg(long)]
    blur: bool,

    /// Directory for snapshots
    #[arg(long, default_value = ".")]
    snapshot_dir: PathBuf,

    /// Snapshot image format (file extension)
    #[arg(long, default_value = "jpg")]
    snapshot_format: String,

    /// Do not mirror the camera image
    #[arg(long)]
    no_mirror: bool,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");

    let capture = open_capture(&args)?;
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    let output = open_output(&args)?;
    let model = load_model(args.model.as_deref())?;

    let config = PipelineConfig {
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        mirror: !args.no_mirror,
        show_matte: args.show_matte,
        compositor: CompositorConfig {
            feather_kernel: args.feather_kernel,
            blur_kernel: args.blur_kernel,
        },
        snapshot_dir: args.snapshot_dir.clone(),
        snapshot_format: args.snapshot_format.clone(),
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(capture, model, output, config);

    let background = pipeline.background_mut();
    if let Some(path) = &args.background_image {
        if let Err(e) = background.select_image(path) {
            tracing::warn!("{:#}", anyhow::Error::from(e));
        }
    }
    if let Some(path) = &args.background_video {
        if let Err(e) = background.select_video(path) {
            tracing::warn!("{:#}", anyhow::Error::from(e));
        }
    }
    background.set_blur(args.blur);

    let (tx, rx) = crossbeam_channel::unbounded();
    spawn_command_reader(tx);
    tracing::info!("Commands: image <path>, video <path>, blur [on|off], snapshot, quit");

    let summary = pipeline.run(&rx, &mut SystemClock, args.max_ticks);
    tracing::info!(
        "Done: {} ticks ({} rendered, {} skipped)",
        summary.ticks,
        summary.rendered,
        summary.skipped
    );

    Ok(())
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    if let Some(input) = &args.input {
        let capture = FileCapture::open(input, args.loop_input)
            .context("Failed to open input file")?;
        return Ok(Box::new(capture));
    }
    open_webcam(args)
}

#[cfg(feature = "camera")]
fn open_webcam(args: &Args) -> Result<Box<dyn CaptureSource>> {
    let capture = backdrop::capture::WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
    )
    .context("Failed to initialize webcam capture")?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "camera"))]
fn open_webcam(args: &Args) -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!(
        "built without the `camera` feature: cannot open webcam {}, pass --input <file>",
        args.input_device
    )
}

fn open_output(args: &Args) -> Result<Box<dyn OutputSink>> {
    if let Some(dir) = &args.output_dir {
        return Ok(Box::new(FrameDirOutput::new(dir)?));
    }
    if let Some(device) = &args.output_device {
        return open_loopback(device, args.output_width, args.output_height);
    }
    tracing::info!("No output configured; frames are only kept for snapshots");
    Ok(Box::new(NullOutput))
}

#[cfg(feature = "loopback")]
fn open_loopback(device: &str, width: u32, height: u32) -> Result<Box<dyn OutputSink>> {
    let output = backdrop::output::V4L2Output::new(device, width, height)
        .context("Failed to initialize v4l2loopback output")?;
    Ok(Box::new(output))
}

#[cfg(not(feature = "loopback"))]
fn open_loopback(device: &str, _width: u32, _height: u32) -> Result<Box<dyn OutputSink>> {
    anyhow::bail!("built without the `loopback` feature: cannot open {}", device)
}

fn load_model(path: Option<&str>) -> Result<Box<dyn SegmentationModel>> {
    match path {
        Some(path) => load_onnx_model(path),
        None => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            Ok(Box::new(PassthroughModel))
        }
    }
}

#[cfg(feature = "onnx")]
fn load_onnx_model(path: &str) -> Result<Box<dyn SegmentationModel>> {
    tracing::info!("Loading segmentation model from {}", path);
    let model = backdrop::segmentation::create_default_model(path)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");
    Ok(model)
}

#[cfg(not(feature = "onnx"))]
fn load_onnx_model(path: &str) -> Result<Box<dyn SegmentationModel>> {
    anyhow::bail!("built without the `onnx` feature: cannot load {}", path)
}

/// Read commands from stdin on a helper thread. The pipeline drains them
/// between ticks.
fn spawn_command_reader(tx: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    let quit = command == Command::Quit;
                    if tx.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
    });
}
