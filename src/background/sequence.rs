use super::video::{DecodeError, VideoDecoder};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const STILL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Frames decoded up front and played back in order.
///
/// Backs animated GIFs and directories of stills. Frame timing in the
/// source is ignored: one frame is returned per call.
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    next: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>) -> Result<Self, DecodeError> {
        if frames.is_empty() {
            return Err(DecodeError::Empty("<memory>".into()));
        }
        Ok(Self { frames, next: 0 })
    }

    pub fn from_gif(path: &Path) -> Result<Self, DecodeError> {
        let reader = BufReader::new(File::open(path)?);
        let decoder = GifDecoder::new(reader)?;
        let frames: Vec<RgbImage> = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8())
            .collect();

        tracing::debug!("Decoded {} GIF frames from {}", frames.len(), path.display());
        if frames.is_empty() {
            return Err(DecodeError::Empty(path.to_path_buf()));
        }
        Ok(Self { frames, next: 0 })
    }

    pub fn from_dir(path: &Path) -> Result<Self, DecodeError> {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| STILL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let frames = files
            .iter()
            .map(|file| Ok(image::open(file)?.to_rgb8()))
            .collect::<Result<Vec<_>, DecodeError>>()?;

        tracing::debug!("Loaded {} frames from {}", frames.len(), path.display());
        if frames.is_empty() {
            return Err(DecodeError::Empty(path.to_path_buf()));
        }
        Ok(Self { frames, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoDecoder for FrameSequence {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let frame = self.frames.get(self.next).cloned();
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        self.next = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Frame, Rgb, Rgba, RgbaImage};

    fn write_gif(path: &Path, colors: &[[u8; 3]]) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for c in colors {
            let buffer = RgbaImage::from_pixel(4, 4, Rgba([c[0], c[1], c[2], 255]));
            encoder.encode_frame(Frame::new(buffer)).unwrap();
        }
    }

    #[test]
    fn test_new_rejects_empty() {
        assert!(matches!(FrameSequence::new(vec![]), Err(DecodeError::Empty(_))));
    }

    #[test]
    fn test_plays_in_order_then_ends() {
        let frames = vec![RgbImage::new(1, 1), RgbImage::from_pixel(1, 1, Rgb([9, 9, 9]))];
        let mut seq = FrameSequence::new(frames).unwrap();
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 9);
        assert!(seq.next_frame().unwrap().is_none());
        seq.rewind().unwrap();
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_from_gif_decodes_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.gif");
        write_gif(&path, &[[255, 0, 0], [0, 255, 0], [0, 0, 255]]);

        let mut seq = FrameSequence::from_gif(&path).unwrap();
        assert_eq!(seq.len(), 3);
        let first = seq.next_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (4, 4));
        let p = first.get_pixel(1, 1);
        assert!(p[0] > 200 && p[1] < 50 && p[2] < 50, "expected red, got {:?}", p);
    }

    #[test]
    fn test_from_dir_sorts_by_name_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(3, 3, Rgb([20, 20, 20]))
            .save(dir.path().join("frame_002.png"))
            .unwrap();
        RgbImage::from_pixel(3, 3, Rgb([10, 10, 10]))
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let mut seq = FrameSequence::from_dir(dir.path()).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 10);
        assert_eq!(seq.next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 20);
    }

    #[test]
    fn test_from_empty_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FrameSequence::from_dir(dir.path()),
            Err(DecodeError::Empty(_))
        ));
    }
}
