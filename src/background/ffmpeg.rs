use super::video::{DecodeError, VideoDecoder};
use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Streams frames from a video container via ffmpeg-next, converting each
/// decoded frame to RGB24.
pub struct FfmpegDecoder {
    path: PathBuf,
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Scaler,
    stream_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(path)?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;
        let stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let scaler = Scaler::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )?;

        tracing::info!(
            "Opened background video {} ({}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            scaler,
            stream_index,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;
        Ok(Some(to_rgb_image(&rgb)))
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.input.packets().next() else {
                if let Err(e) = self.decoder.send_eof() {
                    tracing::debug!("Failed to flush video decoder: {}", e);
                }
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };

            if stream.index() != self.stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    /// Reopens the container; seeking is unreliable across codecs.
    fn rewind(&mut self) -> Result<(), DecodeError> {
        let path = self.path.clone();
        *self = Self::open(&path)?;
        Ok(())
    }
}

/// Copy RGB24 plane data, dropping row padding.
fn to_rgb_image(frame: &Video) -> RgbImage {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    RgbImage::from_vec(width, height, pixels).unwrap_or_else(|| RgbImage::new(width, height))
}
