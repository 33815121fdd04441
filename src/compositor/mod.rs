mod gaussian;

pub use gaussian::{blur_plane, blur_rgb, GaussianKernel};

use crate::segmentation::{Mask, MaskError};
use image::RgbImage;
use ndarray::{Array2, ArrayView3, ArrayViewMut3, Axis, Zip};
use thiserror::Error;

/// Feather kernel applied to the mask before blending.
pub const DEFAULT_FEATHER_KERNEL: usize = 9;
/// Kernel used to derive the live-blur background from the frame.
pub const DEFAULT_BLUR_KERNEL: usize = 55;

const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("background is {background:?}, frame is {frame:?}")]
    BackgroundMismatch {
        frame: (u32, u32),
        background: (u32, u32),
    },
    #[error("alpha map is {alpha:?}, frame is {frame:?}")]
    AlphaMismatch { frame: (u32, u32), alpha: (u32, u32) },
    #[error("unusable mask: {0}")]
    Mask(#[from] MaskError),
    #[error("pixel buffer does not match its dimensions")]
    Layout(#[from] ndarray::ShapeError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositorConfig {
    pub feather_kernel: usize,
    pub blur_kernel: usize,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            feather_kernel: DEFAULT_FEATHER_KERNEL,
            blur_kernel: DEFAULT_BLUR_KERNEL,
        }
    }
}

/// Clamped, feathered blend weights. One weight per pixel; every color
/// channel of that pixel uses the same weight.
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaMap {
    weights: Array2<f32>,
}

impl AlphaMap {
    /// Clamp `mask` to [0, 1], resample it to `width`x`height` if needed and
    /// feather it with `kernel`.
    pub fn from_mask(
        mask: &Mask,
        width: u32,
        height: u32,
        kernel: &GaussianKernel,
        temp: &mut Array2<f32>,
    ) -> Result<Self, CompositeError> {
        let _span = tracing::debug_span!("feather").entered();

        let clamped = Mask::from_array(mask.as_array().mapv(clamp_unit))?;
        let mut weights = clamped.resized(width, height)?.into_array();

        blur_plane(&mut weights, kernel, temp);
        weights.mapv_inplace(clamp_unit);

        Ok(Self { weights })
    }

    pub fn width(&self) -> u32 {
        self.weights.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.weights.nrows() as u32
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Grayscale view of the weights.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let weight = self.weights[[y as usize, x as usize]];
            let value = (weight * 255.0).round().clamp(0.0, 255.0) as u8;
            image::Rgb([value, value, value])
        })
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// `alpha * frame + (1 - alpha) * background`, rounded to u8.
///
/// `frame`, `background` and `alpha` must share dimensions.
pub fn blend(
    frame: &RgbImage,
    alpha: &AlphaMap,
    background: &RgbImage,
) -> Result<RgbImage, CompositeError> {
    let _span = tracing::debug_span!("blend").entered();

    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(CompositeError::EmptyFrame);
    }
    if background.dimensions() != (width, height) {
        return Err(CompositeError::BackgroundMismatch {
            frame: (width, height),
            background: background.dimensions(),
        });
    }
    if (alpha.width(), alpha.height()) != (width, height) {
        return Err(CompositeError::AlphaMismatch {
            frame: (width, height),
            alpha: (alpha.width(), alpha.height()),
        });
    }

    let shape = (height as usize, width as usize, CHANNELS);
    let fg = ArrayView3::from_shape(shape, frame.as_raw())?;
    let bg = ArrayView3::from_shape(shape, background.as_raw())?;
    let weights = alpha.weights.view().insert_axis(Axis(2));
    let weights = weights
        .broadcast(shape)
        .ok_or(CompositeError::AlphaMismatch {
            frame: (width, height),
            alpha: (alpha.width(), alpha.height()),
        })?;

    let mut output = RgbImage::new(width, height);
    {
        let mut out = ArrayViewMut3::from_shape(shape, &mut *output)?;
        Zip::from(&mut out)
            .and(&fg)
            .and(&bg)
            .and(&weights)
            .for_each(|o, &f, &b, &a| {
                let v = a * f as f32 + (1.0 - a) * b as f32;
                *o = v.round().clamp(0.0, 255.0) as u8;
            });
    }
    Ok(output)
}

/// Blends camera frames over backgrounds and keeps the most recent result
/// for snapshots.
pub struct Compositor {
    feather: GaussianKernel,
    blur: GaussianKernel,
    plane_temp: Array2<f32>,
    rgb_temp: Vec<f32>,
    last: Option<RgbImage>,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        let feather = GaussianKernel::new(config.feather_kernel);
        let blur = GaussianKernel::new(config.blur_kernel);
        tracing::debug!(
            "Compositor feather kernel {}, blur kernel {}",
            feather.size(),
            blur.size()
        );
        Self {
            feather,
            blur,
            plane_temp: Array2::zeros((0, 0)),
            rgb_temp: Vec::new(),
            last: None,
        }
    }

    pub fn feather_kernel(&self) -> &GaussianKernel {
        &self.feather
    }

    /// Feathered alpha for `mask` at `frame`'s resolution.
    pub fn alpha_map(
        &mut self,
        mask: &Mask,
        frame: &RgbImage,
    ) -> Result<AlphaMap, CompositeError> {
        let (width, height) = frame.dimensions();
        AlphaMap::from_mask(mask, width, height, &self.feather, &mut self.plane_temp)
    }

    /// Composite `frame` over `background` using `mask`.
    ///
    /// On error nothing is recorded and the previous result stays available.
    pub fn composite(
        &mut self,
        frame: &RgbImage,
        mask: &Mask,
        background: &RgbImage,
    ) -> Result<&RgbImage, CompositeError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CompositeError::EmptyFrame);
        }
        if background.dimensions() != frame.dimensions() {
            return Err(CompositeError::BackgroundMismatch {
                frame: frame.dimensions(),
                background: background.dimensions(),
            });
        }
        let alpha = self.alpha_map(mask, frame)?;
        let output = blend(frame, &alpha, background)?;
        Ok(&*self.last.insert(output))
    }

    /// Feathered mask rendered as grayscale, recorded as the latest output.
    pub fn matte(&mut self, frame: &RgbImage, mask: &Mask) -> Result<&RgbImage, CompositeError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CompositeError::EmptyFrame);
        }
        let alpha = self.alpha_map(mask, frame)?;
        Ok(&*self.last.insert(alpha.to_rgb()))
    }

    /// Strongly blurred copy of `frame`, used as the live-blur background.
    pub fn blurred_background(&mut self, frame: &RgbImage) -> RgbImage {
        let _span = tracing::debug_span!("live_blur").entered();
        blur_rgb(frame, &self.blur, &mut self.rgb_temp)
    }

    /// Most recent output, `None` before the first successful call.
    pub fn last_composited(&self) -> Option<&RgbImage> {
        self.last.as_ref()
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(CompositorConfig::default())
    }
}
