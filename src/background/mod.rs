#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod sequence;
mod video;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use sequence::FrameSequence;
pub use video::{open_video, DecodeError, LoopingVideo, VideoDecoder};

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What the compositor draws behind the foreground.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundMode {
    StaticImage,
    LoopingVideo,
    LiveBlur,
}

impl fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackgroundMode::StaticImage => "image",
            BackgroundMode::LoopingVideo => "video",
            BackgroundMode::LiveBlur => "blur",
        };
        f.write_str(name)
    }
}

/// A rejected background selection. The provider keeps its previous state.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("could not load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("could not open video {path}: {source}")]
    Video {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

enum Resource {
    Image(Option<RgbImage>),
    Video(LoopingVideo),
}

/// Owns the selected background resource and the blur overlay flag.
///
/// Selections replace the resource in one assignment, dropping the old one.
/// A failed selection leaves everything as it was.
pub struct BackgroundProvider {
    resource: Resource,
    blur: bool,
}

impl BackgroundProvider {
    pub fn new() -> Self {
        Self {
            resource: Resource::Image(None),
            blur: false,
        }
    }

    pub fn select_image(&mut self, path: &Path) -> Result<(), SelectionError> {
        let image = image::open(path)
            .map_err(|source| SelectionError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        tracing::info!(
            "Background image {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        self.set_image(image);
        Ok(())
    }

    pub fn set_image(&mut self, image: RgbImage) {
        if matches!(self.resource, Resource::Video(_)) {
            tracing::debug!("Releasing background video");
        }
        self.resource = Resource::Image(Some(image));
    }

    pub fn select_video(&mut self, path: &Path) -> Result<(), SelectionError> {
        let decoder = open_video(path).map_err(|source| SelectionError::Video {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Background video {}", path.display());
        self.set_video(decoder);
        Ok(())
    }

    pub fn set_video(&mut self, decoder: Box<dyn VideoDecoder>) {
        if matches!(self.resource, Resource::Video(_)) {
            tracing::debug!("Releasing previous background video");
        }
        self.resource = Resource::Video(LoopingVideo::new(decoder));
    }

    pub fn set_blur(&mut self, enabled: bool) {
        if self.blur != enabled {
            tracing::info!("Background blur {}", if enabled { "on" } else { "off" });
        }
        self.blur = enabled;
    }

    /// Flip the blur flag, returning the new value.
    pub fn toggle_blur(&mut self) -> bool {
        self.set_blur(!self.blur);
        self.blur
    }

    pub fn blur_enabled(&self) -> bool {
        self.blur
    }

    /// Effective mode: `LiveBlur` whenever blur is on.
    pub fn mode(&self) -> BackgroundMode {
        if self.blur {
            BackgroundMode::LiveBlur
        } else {
            self.selected_mode()
        }
    }

    /// Mode of the stored resource, ignoring the blur flag.
    pub fn selected_mode(&self) -> BackgroundMode {
        match self.resource {
            Resource::Image(_) => BackgroundMode::StaticImage,
            Resource::Video(_) => BackgroundMode::LoopingVideo,
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self.resource, Resource::Image(Some(_)))
    }

    /// Position of the next video frame, when a video is selected.
    pub fn video_position(&self) -> Option<usize> {
        match &self.resource {
            Resource::Video(video) => Some(video.position()),
            Resource::Image(_) => None,
        }
    }

    /// Background frame sized `width`x`height` from the stored resource.
    ///
    /// Never fails: a missing image or unreadable video frame yields a
    /// black frame. The blur flag is not consulted; callers in blur mode
    /// derive the background from the camera frame instead.
    pub fn resolve(&mut self, width: u32, height: u32) -> RgbImage {
        let _span = tracing::debug_span!("resolve_background").entered();

        let source = match &mut self.resource {
            Resource::Image(Some(image)) => return resample(image, width, height),
            Resource::Image(None) => None,
            Resource::Video(video) => video.next_frame(),
        };

        match source {
            Some(frame) => resample(&frame, width, height),
            None => RgbImage::new(width, height),
        }
    }

    /// Drop the stored resource, closing any open video.
    pub fn release(&mut self) {
        if matches!(self.resource, Resource::Video(_)) {
            tracing::info!("Closing background video");
        }
        self.resource = Resource::Image(None);
    }
}

impl Default for BackgroundProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Bilinear resize to `width`x`height`; a plain copy when already that size.
pub fn resample(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sequence(count: u8) -> Box<dyn VideoDecoder> {
        let frames = (0..count)
            .map(|i| RgbImage::from_pixel(3, 2, Rgb([i * 10, 0, 0])))
            .collect();
        Box::new(FrameSequence::new(frames).unwrap())
    }

    fn red_png(dir: &Path) -> PathBuf {
        let path = dir.join("red.png");
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_nothing_selected_resolves_black() {
        let mut provider = BackgroundProvider::new();
        assert_eq!(provider.mode(), BackgroundMode::StaticImage);
        let frame = provider.resolve(5, 4);
        assert_eq!(frame.dimensions(), (5, 4));
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_static_image_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = BackgroundProvider::new();
        provider.select_image(&red_png(dir.path())).unwrap();

        let frame = provider.resolve(4, 4);
        assert_eq!(frame.dimensions(), (4, 4));
        assert!(frame.pixels().all(|p| p.0 == [255, 0, 0]));
    }

    #[test]
    fn test_video_loops_in_order() {
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(3));
        assert_eq!(provider.mode(), BackgroundMode::LoopingVideo);

        let order: Vec<u8> = (0..5)
            .map(|_| provider.resolve(3, 2).get_pixel(0, 0)[0] / 10)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_video_frames_are_resampled() {
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(2));
        assert_eq!(provider.resolve(8, 6).dimensions(), (8, 6));
    }

    #[test]
    fn test_invalid_image_keeps_previous_selection() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.png");
        std::fs::write(&bogus, b"definitely not a png").unwrap();

        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(3));
        provider.resolve(3, 2);

        let err = provider.select_image(&bogus).unwrap_err();
        assert!(matches!(err, SelectionError::Image { .. }));
        assert!(provider
            .select_image(&dir.path().join("missing.jpg"))
            .is_err());

        assert_eq!(provider.mode(), BackgroundMode::LoopingVideo);
        assert_eq!(provider.resolve(3, 2).get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn test_invalid_video_keeps_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = BackgroundProvider::new();
        provider.select_image(&red_png(dir.path())).unwrap();

        let err = provider
            .select_video(&dir.path().join("missing.gif"))
            .unwrap_err();
        assert!(matches!(err, SelectionError::Video { .. }));
        assert!(provider.select_video(&dir.path().join("clip.xyz")).is_err());

        assert_eq!(provider.mode(), BackgroundMode::StaticImage);
        assert!(provider.resolve(2, 2).pixels().all(|p| p.0 == [255, 0, 0]));
    }

    #[test]
    fn test_image_selection_replaces_video() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(3));
        provider.select_image(&red_png(dir.path())).unwrap();
        assert_eq!(provider.mode(), BackgroundMode::StaticImage);
        assert_eq!(provider.video_position(), None);
    }

    #[test]
    fn test_new_video_starts_from_first_frame() {
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(3));
        provider.resolve(3, 2);
        provider.resolve(3, 2);
        provider.set_video(sequence(4));
        assert_eq!(provider.video_position(), Some(0));
        assert_eq!(provider.resolve(3, 2).get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_blur_overlay_restores_selection() {
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(3));
        provider.resolve(3, 2);

        assert!(provider.toggle_blur());
        assert_eq!(provider.mode(), BackgroundMode::LiveBlur);
        assert_eq!(provider.selected_mode(), BackgroundMode::LoopingVideo);

        assert!(!provider.toggle_blur());
        assert_eq!(provider.mode(), BackgroundMode::LoopingVideo);
        assert_eq!(provider.video_position(), Some(1));
        assert_eq!(provider.resolve(3, 2).get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn test_selection_while_blurred_keeps_blur() {
        let mut provider = BackgroundProvider::new();
        provider.set_blur(true);
        provider.set_image(RgbImage::new(1, 1));
        assert_eq!(provider.mode(), BackgroundMode::LiveBlur);
        provider.set_blur(false);
        assert_eq!(provider.mode(), BackgroundMode::StaticImage);
        assert!(provider.has_image());
    }

    #[test]
    fn test_release_drops_resource() {
        let mut provider = BackgroundProvider::new();
        provider.set_video(sequence(2));
        provider.release();
        assert_eq!(provider.selected_mode(), BackgroundMode::StaticImage);
        assert!(!provider.has_image());
        assert!(provider.resolve(2, 2).pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(BackgroundMode::LiveBlur.to_string(), "blur");
    }
}
