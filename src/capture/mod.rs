mod file_capture;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use file_capture::FileCapture;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame. An `Err` means no frame is available this
    /// tick; the pipeline skips the tick and asks again on the next one.
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Release the underlying device. Further captures fail.
    fn release(&mut self) {}
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        (**self).capture_frame()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
