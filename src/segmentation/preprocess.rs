use super::types::Mask;
use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::{Array2, Array4, ArrayViewD};

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
    }

    /// Turn the model's `[1, 1, H, W]` alpha output into a [`Mask`] at the
    /// frame's resolution.
    pub fn postprocess(
        pha: ArrayViewD<'_, f32>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Mask> {
        let _span = tracing::debug_span!("postprocess").entered();

        let shape = pha.shape();
        anyhow::ensure!(
            shape.len() == 4 && shape[0] == 1 && shape[1] == 1,
            "unexpected alpha output shape {:?}",
            shape
        );
        let (h, w) = (shape[2], shape[3]);
        let values: Array2<f32> = pha.to_shape((h, w))?.to_owned();
        let mask = Mask::from_array(values)?;

        Ok(mask.resized(frame_width, frame_height)?)
    }
}
