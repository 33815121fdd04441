mod frame_dir;
#[cfg(feature = "loopback")]
mod loopback;
mod snapshot;

pub use frame_dir::{FrameDirOutput, NullOutput};
#[cfg(feature = "loopback")]
pub use loopback::V4L2Output;
pub use snapshot::SnapshotWriter;

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution, `None` when frames are written
    /// at whatever size they arrive.
    fn resolution(&self) -> Option<(u32, u32)>;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        (**self).resolution()
    }
}
