use super::sequence::FrameSequence;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[cfg(feature = "ffmpeg")]
    #[error(transparent)]
    Ffmpeg(#[from] ffmpeg_next::Error),
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("{0} contains no frames")]
    Empty(PathBuf),
    #[error("unsupported video source {0}")]
    Unsupported(PathBuf),
}

/// Sequential frame decoder for a finite video source.
pub trait VideoDecoder {
    /// Decode the next frame. `Ok(None)` marks end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> Result<(), DecodeError>;
}

const FFMPEG_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "m4v"];

/// Open a decoder for `path`, chosen by what the path is:
/// - a directory of still images, played in filename order
/// - an animated GIF
/// - a container handled by ffmpeg (feature `ffmpeg`)
pub fn open_video(path: &Path) -> Result<Box<dyn VideoDecoder>, DecodeError> {
    if path.is_dir() {
        return Ok(Box::new(FrameSequence::from_dir(path)?));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if extension == "gif" {
        return Ok(Box::new(FrameSequence::from_gif(path)?));
    }

    if FFMPEG_EXTENSIONS.contains(&extension.as_str()) {
        #[cfg(feature = "ffmpeg")]
        {
            return Ok(Box::new(super::ffmpeg::FfmpegDecoder::open(path)?));
        }
    }

    Err(DecodeError::Unsupported(path.to_path_buf()))
}

/// A video background that restarts from the first frame when exhausted.
pub struct LoopingVideo {
    decoder: Box<dyn VideoDecoder>,
    position: usize,
}

impl LoopingVideo {
    pub fn new(decoder: Box<dyn VideoDecoder>) -> Self {
        Self {
            decoder,
            position: 0,
        }
    }

    /// Index of the frame the next call will return.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Next frame, wrapping to the start at end of stream. `None` when the
    /// source cannot produce a frame at all.
    pub fn next_frame(&mut self) -> Option<RgbImage> {
        match self.decoder.next_frame() {
            Ok(Some(frame)) => {
                self.position += 1;
                return Some(frame);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Background video frame unreadable: {}", e);
                return None;
            }
        }

        tracing::debug!("Background video ended after {} frames, restarting", self.position);
        self.position = 0;
        if let Err(e) = self.decoder.rewind() {
            tracing::warn!("Failed to restart background video: {}", e);
            return None;
        }

        match self.decoder.next_frame() {
            Ok(Some(frame)) => {
                self.position = 1;
                Some(frame)
            }
            Ok(None) => {
                tracing::warn!("Background video has no frames");
                None
            }
            Err(e) => {
                tracing::warn!("Background video frame unreadable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn colored(count: u8) -> Vec<RgbImage> {
        (0..count)
            .map(|i| RgbImage::from_pixel(2, 2, Rgb([i, 0, 0])))
            .collect()
    }

    /// Decoder that fails on a chosen read.
    struct FlakyDecoder {
        inner: FrameSequence,
        reads: usize,
        fail_on: usize,
    }

    impl VideoDecoder for FlakyDecoder {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
            self.reads += 1;
            if self.reads == self.fail_on {
                return Err(DecodeError::Io(std::io::Error::other("corrupt packet")));
            }
            self.inner.next_frame()
        }

        fn rewind(&mut self) -> Result<(), DecodeError> {
            self.inner.rewind()
        }
    }

    #[test]
    fn test_wraps_to_first_frame() {
        let decoder = FrameSequence::new(colored(3)).unwrap();
        let mut video = LoopingVideo::new(Box::new(decoder));
        let order: Vec<u8> = (0..7)
            .map(|_| video.next_frame().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(video.position(), 1);
    }

    #[test]
    fn test_unreadable_frame_yields_none_then_recovers() {
        let decoder = FlakyDecoder {
            inner: FrameSequence::new(colored(3)).unwrap(),
            reads: 0,
            fail_on: 2,
        };
        let mut video = LoopingVideo::new(Box::new(decoder));
        assert_eq!(video.next_frame().unwrap().get_pixel(0, 0)[0], 0);
        assert!(video.next_frame().is_none());
        assert_eq!(video.next_frame().unwrap().get_pixel(0, 0)[0], 1);
    }

    #[test]
    fn test_open_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.xyz");
        std::fs::write(&path, b"not a video").unwrap();
        assert!(matches!(open_video(&path), Err(DecodeError::Unsupported(_))));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_open_mp4_without_ffmpeg_is_unsupported() {
        assert!(matches!(
            open_video(Path::new("clip.mp4")),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_open_missing_gif_fails() {
        assert!(open_video(Path::new("/nonexistent/loop.gif")).is_err());
    }
}
