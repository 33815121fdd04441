use crate::background::{BackgroundMode, BackgroundProvider};
use crate::capture::CaptureSource;
use crate::commands::Command;
use crate::compositor::{Compositor, CompositorConfig};
use crate::output::{OutputSink, SnapshotWriter};
use crate::segmentation::SegmentationModel;
use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};
use image::imageops;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Minimum spacing between tick starts.
    pub tick_interval: Duration,
    /// Flip camera frames horizontally before processing.
    pub mirror: bool,
    /// Output the feathered mask instead of the composite.
    pub show_matte: bool,
    /// Log averaged stage timings every this many rendered frames; 0 disables.
    pub stats_every: u64,
    pub compositor: CompositorConfig,
    pub snapshot_dir: PathBuf,
    pub snapshot_format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            mirror: true,
            show_matte: false,
            stats_every: 30,
            compositor: CompositorConfig::default(),
            snapshot_dir: PathBuf::from("."),
            snapshot_format: "jpg".to_string(),
        }
    }
}

/// Time source for the driver loop, injectable for tests.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The capture source had no frame.
    NoFrame,
    /// The segmentation model failed.
    NoMask,
    /// Compositing rejected its inputs.
    Composite,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoFrame => "no frame",
            SkipReason::NoMask => "no mask",
            SkipReason::Composite => "composite failed",
        };
        f.write_str(reason)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    Skipped(SkipReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// The command failed and state is unchanged.
    Rejected(String),
    SnapshotSaved(PathBuf),
    /// Nothing has been composited yet.
    NoSnapshot,
    Quit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub rendered: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Stats {
    rendered: u64,
    skipped: u64,
    consecutive_skips: u64,
    output_errors: u64,
    capture: Duration,
    segment: Duration,
    background: Duration,
    composite: Duration,
    output: Duration,
}

impl Stats {
    fn log(&self) {
        let n = self.rendered.max(1) as f64;
        let ms = |d: Duration| d.as_secs_f64() * 1000.0 / n;
        let (capture, segment, background, composite, output) = (
            ms(self.capture),
            ms(self.segment),
            ms(self.background),
            ms(self.composite),
            ms(self.output),
        );
        let total = capture + segment + background + composite + output;
        let fps = if total > 0.0 { 1000.0 / total } else { 0.0 };
        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, background={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
            self.rendered,
            capture,
            segment,
            background,
            composite,
            output,
            total,
            fps
        );
    }
}

/// Runs capture -> segmentation -> background -> composite -> output, one
/// tick at a time, and applies user commands between ticks.
pub struct Pipeline<C, M, O> {
    capture: C,
    model: M,
    output: O,
    background: BackgroundProvider,
    compositor: Compositor,
    snapshots: SnapshotWriter,
    config: PipelineConfig,
    stats: Stats,
}

impl<C, M, O> Pipeline<C, M, O>
where
    C: CaptureSource,
    M: SegmentationModel,
    O: OutputSink,
{
    pub fn new(capture: C, model: M, output: O, config: PipelineConfig) -> Self {
        let snapshots = SnapshotWriter::new(&config.snapshot_dir, &config.snapshot_format);
        Self {
            capture,
            model,
            output,
            background: BackgroundProvider::new(),
            compositor: Compositor::new(config.compositor),
            snapshots,
            config,
            stats: Stats::default(),
        }
    }

    pub fn background(&self) -> &BackgroundProvider {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut BackgroundProvider {
        &mut self.background
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// One iteration. Failures skip the tick without touching the output.
    pub fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let mut frame = match self.capture.capture_frame() {
            Ok(frame) => frame,
            Err(e) => return self.skip(SkipReason::NoFrame, &e),
        };
        if self.config.mirror {
            imageops::flip_horizontal_in_place(&mut frame);
        }
        let captured = Instant::now();

        let mask = match self.model.segment(&frame) {
            Ok(mask) => mask,
            Err(e) => return self.skip(SkipReason::NoMask, &e),
        };
        let segmented = Instant::now();

        let mut resolved = segmented;
        let result = if self.config.show_matte {
            self.compositor.matte(&frame, &mask)
        } else {
            // Live blur bypasses the stored resource entirely.
            let (width, height) = frame.dimensions();
            let background = if self.background.blur_enabled() {
                self.compositor.blurred_background(&frame)
            } else {
                self.background.resolve(width, height)
            };
            resolved = Instant::now();
            self.compositor.composite(&frame, &mask, &background)
        };
        let composited = match result {
            Ok(composited) => composited,
            Err(e) => {
                let e = anyhow::Error::from(e);
                return self.skip(SkipReason::Composite, &e);
            }
        };
        let blended = Instant::now();

        if let Err(e) = self.output.write_frame(composited) {
            self.stats.output_errors += 1;
            tracing::warn!("Failed to write frame: {:#}", e);
        }

        let stats = &mut self.stats;
        stats.capture += captured - started;
        stats.segment += segmented - captured;
        stats.background += resolved - segmented;
        stats.composite += blended - resolved;
        stats.output += blended.elapsed();
        stats.rendered += 1;
        if stats.consecutive_skips > 0 {
            tracing::info!("Frames resumed after {} skipped ticks", stats.consecutive_skips);
            stats.consecutive_skips = 0;
        }
        if self.config.stats_every > 0 && stats.rendered % self.config.stats_every == 0 {
            stats.log();
        }

        TickOutcome::Rendered
    }

    fn skip(&mut self, reason: SkipReason, error: &anyhow::Error) -> TickOutcome {
        if self.stats.consecutive_skips == 0 {
            tracing::warn!("Skipping tick ({}): {:#}", reason, error);
        } else {
            tracing::debug!("Skipping tick ({}): {:#}", reason, error);
        }
        self.stats.skipped += 1;
        self.stats.consecutive_skips += 1;
        TickOutcome::Skipped(reason)
    }

    pub fn handle(&mut self, command: Command) -> CommandOutcome {
        tracing::debug!("Command {:?}", command);
        match command {
            Command::SelectImage(path) => match self.background.select_image(&path) {
                Ok(()) => CommandOutcome::Applied,
                Err(e) => self.reject(e.into()),
            },
            Command::SelectVideo(path) => match self.background.select_video(&path) {
                Ok(()) => CommandOutcome::Applied,
                Err(e) => self.reject(e.into()),
            },
            Command::SetBlur(enabled) => {
                self.background.set_blur(enabled);
                CommandOutcome::Applied
            }
            Command::ToggleBlur => {
                self.background.toggle_blur();
                CommandOutcome::Applied
            }
            Command::SaveSnapshot => match self.save_snapshot() {
                Ok(Some(path)) => CommandOutcome::SnapshotSaved(path),
                Ok(None) => CommandOutcome::NoSnapshot,
                Err(e) => self.reject(e),
            },
            Command::Quit => CommandOutcome::Quit,
        }
    }

    fn reject(&self, error: anyhow::Error) -> CommandOutcome {
        tracing::warn!(
            "Command rejected, keeping {} background: {:#}",
            self.background.mode(),
            error
        );
        CommandOutcome::Rejected(format!("{:#}", error))
    }

    /// Save the most recent output. `Ok(None)` before the first frame.
    pub fn save_snapshot(&mut self) -> Result<Option<PathBuf>> {
        match self.compositor.last_composited() {
            Some(frame) => Ok(Some(self.snapshots.save(frame)?)),
            None => {
                tracing::info!("No frame to save yet");
                Ok(None)
            }
        }
    }

    /// Drive ticks until `Quit` arrives or `max_ticks` ticks have run, then
    /// shut down. Commands are drained before each tick.
    pub fn run<K: Clock>(
        &mut self,
        commands: &Receiver<Command>,
        clock: &mut K,
        max_ticks: Option<u64>,
    ) -> RunSummary {
        tracing::info!(
            "Starting pipeline: model={}, background={}, tick interval {:?}",
            self.model.name(),
            self.background.mode(),
            self.config.tick_interval
        );

        let mut summary = RunSummary::default();
        'ticks: loop {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if self.handle(command) == CommandOutcome::Quit {
                            tracing::info!("Quit requested");
                            break 'ticks;
                        }
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            let tick_start = clock.now();
            match self.tick() {
                TickOutcome::Rendered => summary.rendered += 1,
                TickOutcome::Skipped(_) => summary.skipped += 1,
            }
            summary.ticks += 1;

            let elapsed = clock.now().saturating_duration_since(tick_start);
            if elapsed < self.config.tick_interval {
                clock.sleep(self.config.tick_interval - elapsed);
            }
        }

        self.shutdown();
        summary
    }

    /// Release the background resource and the capture device.
    pub fn shutdown(&mut self) {
        self.background.release();
        self.capture.release();
        tracing::info!(
            "Pipeline stopped: {} frames rendered, {} ticks skipped, {} output errors",
            self.stats.rendered,
            self.stats.skipped,
            self.stats.output_errors
        );
    }

    pub fn mode(&self) -> BackgroundMode {
        self.background.mode()
    }
}
