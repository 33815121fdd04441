use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask has {actual} values, expected {expected} for {width}x{height}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("mask must not be empty")]
    Empty,
}

/// Per-pixel foreground probability: 0.0 = background, 1.0 = foreground.
///
/// Stored as an `(height, width)` array. Values are whatever the model
/// produced; the compositor clamps them before use.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    values: Array2<f32>,
}

impl Mask {
    /// Build a mask from row-major values.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::Empty);
        }
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(MaskError::LengthMismatch {
                width,
                height,
                expected,
                actual: values.len(),
            });
        }
        let values = Array2::from_shape_vec((height as usize, width as usize), values).map_err(
            |_| MaskError::LengthMismatch {
                width,
                height,
                expected,
                actual: expected,
            },
        )?;
        Ok(Self { values })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::Empty);
        }
        Ok(Self {
            values: Array2::from_elem((height as usize, width as usize), value),
        })
    }

    pub fn from_array(values: Array2<f32>) -> Result<Self, MaskError> {
        if values.is_empty() {
            return Err(MaskError::Empty);
        }
        Ok(Self { values })
    }

    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[[y as usize, x as usize]]
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn into_array(self) -> Array2<f32> {
        self.values
    }

    /// Bilinear resample to the given size. Returns a clone when the size
    /// already matches.
    pub fn resized(&self, width: u32, height: u32) -> Result<Mask, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::Empty);
        }
        if self.dimensions() == (width, height) {
            return Ok(self.clone());
        }
        let _span = tracing::debug_span!("mask_resize").entered();

        let (src_w, src_h) = self.dimensions();
        let source: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(src_w, src_h, |x, y| Luma([self.get(x, y)]));
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);

        let values = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            resized.get_pixel(x as u32, y as u32)[0]
        });
        Ok(Mask { values })
    }

    /// Grayscale rendering of the mask, used by the matte view.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let value = (self.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8;
            image::Rgb([value, value, value])
        })
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, a fixed mask in tests, ...)
pub trait SegmentationModel {
    /// Process a frame and return a foreground mask.
    ///
    /// The mask should match the frame's dimensions; a mask at another
    /// resolution is resampled by the compositor. An `Err` skips the tick.
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

impl<T: SegmentationModel + ?Sized> SegmentationModel for Box<T> {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        (**self).segment(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Treats every pixel as foreground, so the composite is the camera frame
/// itself. Used when no model is configured.
#[derive(Debug, Default)]
pub struct PassthroughModel;

impl SegmentationModel for PassthroughModel {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let (width, height) = frame.dimensions();
        Ok(Mask::filled(width, height, 1.0)?)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Mask::new(2, 2, vec![0.0; 3]).unwrap_err();
        assert_eq!(
            err,
            MaskError::LengthMismatch {
                width: 2,
                height: 2,
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(Mask::new(0, 4, vec![]).unwrap_err(), MaskError::Empty);
    }

    #[test]
    fn test_filled_rejects_empty() {
        assert_eq!(Mask::filled(0, 0, 1.0).unwrap_err(), MaskError::Empty);
        assert_eq!(Mask::filled(3, 0, 1.0).unwrap_err(), MaskError::Empty);
    }

    #[test]
    fn test_resized_to_nothing_is_rejected() {
        let mask = Mask::filled(2, 2, 0.5).unwrap();
        assert_eq!(mask.resized(0, 4).unwrap_err(), MaskError::Empty);
    }

    #[test]
    fn test_row_major_layout() {
        let mask = Mask::new(3, 2, vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(mask.dimensions(), (3, 2));
        assert_abs_diff_eq!(mask.get(2, 0), 0.2);
        assert_abs_diff_eq!(mask.get(0, 1), 0.3);
    }

    #[test]
    fn test_resized_uniform_stays_uniform() {
        let mask = Mask::filled(4, 4, 0.75).unwrap();
        let resized = mask.resized(10, 6).unwrap();
        assert_eq!(resized.dimensions(), (10, 6));
        for v in resized.as_array() {
            assert_abs_diff_eq!(*v, 0.75, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_to_rgb_scales_to_bytes() {
        let mask = Mask::new(2, 1, vec![0.0, 1.0]).unwrap();
        let rgb = mask.to_rgb();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_passthrough_is_all_foreground() {
        let frame = RgbImage::new(5, 3);
        let mask = PassthroughModel.segment(&frame).unwrap();
        assert_eq!(mask.dimensions(), (5, 3));
        assert!(mask.as_array().iter().all(|&v| v == 1.0));
    }
}
