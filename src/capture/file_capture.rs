use super::CaptureSource;
use crate::background::{open_video, VideoDecoder};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;

/// Replays a recorded clip (GIF, image directory or, with `ffmpeg`, a video
/// file) as if it were a camera.
///
/// When the clip runs out, captures fail until it is rewound, unless
/// `looping` is set.
pub struct FileCapture {
    decoder: Option<Box<dyn VideoDecoder>>,
    looping: bool,
    width: u32,
    height: u32,
}

impl FileCapture {
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        tracing::info!("Replaying {} as camera input", path.display());
        let mut decoder =
            open_video(path).with_context(|| format!("Failed to open {}", path.display()))?;

        // Peek the first frame for the resolution, then start over.
        let first = decoder
            .next_frame()?
            .with_context(|| format!("{} has no frames", path.display()))?;
        decoder.rewind()?;

        Ok(Self::from_decoder(decoder, first.dimensions(), looping))
    }

    pub fn from_decoder(
        decoder: Box<dyn VideoDecoder>,
        (width, height): (u32, u32),
        looping: bool,
    ) -> Self {
        Self {
            decoder: Some(decoder),
            looping,
            width,
            height,
        }
    }
}

impl CaptureSource for FileCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let decoder = self.decoder.as_mut().context("Capture released")?;
        if let Some(frame) = decoder.next_frame()? {
            return Ok(frame);
        }
        if !self.looping {
            return Err(anyhow!("Input exhausted"));
        }
        decoder.rewind()?;
        decoder.next_frame()?.context("Input has no frames")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) {
        self.decoder = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::FrameSequence;
    use image::Rgb;

    fn capture(looping: bool) -> FileCapture {
        let frames = (0..2)
            .map(|i| RgbImage::from_pixel(4, 3, Rgb([i, i, i])))
            .collect();
        FileCapture::from_decoder(Box::new(FrameSequence::new(frames).unwrap()), (4, 3), looping)
    }

    #[test]
    fn test_exhausted_input_fails() {
        let mut cap = capture(false);
        assert!(cap.capture_frame().is_ok());
        assert!(cap.capture_frame().is_ok());
        assert!(cap.capture_frame().is_err());
        assert!(cap.capture_frame().is_err());
    }

    #[test]
    fn test_looping_input_restarts() {
        let mut cap = capture(true);
        let values: Vec<u8> = (0..5)
            .map(|_| cap.capture_frame().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_released_capture_fails() {
        let mut cap = capture(true);
        cap.release();
        assert!(cap.capture_frame().is_err());
        assert_eq!(cap.resolution(), (4, 3));
    }

    #[test]
    fn test_open_reads_resolution() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(6, 5).save(dir.path().join("a.png")).unwrap();
        let mut cap = FileCapture::open(dir.path(), false).unwrap();
        assert_eq!(cap.resolution(), (6, 5));
        assert_eq!(cap.capture_frame().unwrap().dimensions(), (6, 5));
    }
}
