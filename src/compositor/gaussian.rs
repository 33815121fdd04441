use image::RgbImage;
use ndarray::Array2;

/// Normalized, symmetric 1-D Gaussian kernel for separable filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Build a kernel of `size` taps. Even sizes are rounded up to the next
    /// odd size; 0 becomes 1 (identity).
    ///
    /// Sigma follows the zero-sigma convention of common imaging libraries:
    /// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
    pub fn new(size: usize) -> Self {
        let size = odd_size(size);
        if size == 1 {
            return Self { weights: vec![1.0] };
        }
        let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
        let half = (size / 2) as f64;
        let mut weights: Vec<f64> = (0..size)
            .map(|i| {
                let x = i as f64 - half;
                (-x * x / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        Self {
            weights: weights.into_iter().map(|w| w as f32).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn half(&self) -> isize {
        (self.weights.len() / 2) as isize
    }
}

pub(crate) fn odd_size(size: usize) -> usize {
    if size == 0 {
        1
    } else if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Separable blur of a single-channel float plane in place. Borders
/// replicate the edge sample. `temp` is scratch space reused across calls.
pub fn blur_plane(plane: &mut Array2<f32>, kernel: &GaussianKernel, temp: &mut Array2<f32>) {
    let (height, width) = plane.dim();
    if kernel.size() <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = kernel.half();
    if temp.dim() != (height, width) {
        *temp = Array2::zeros((height, width));
    }

    // Horizontal pass: plane -> temp
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.weights().iter().enumerate() {
                let sx = clamp_index(x as isize + k as isize - half, width);
                sum += plane[[y, sx]] * w;
            }
            temp[[y, x]] = sum;
        }
    }

    // Vertical pass: temp -> plane
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.weights().iter().enumerate() {
                let sy = clamp_index(y as isize + k as isize - half, height);
                sum += temp[[sy, x]] * w;
            }
            plane[[y, x]] = sum;
        }
    }
}

/// Separable blur of an RGB image, returning a new image.
pub fn blur_rgb(image: &RgbImage, kernel: &GaussianKernel, temp: &mut Vec<f32>) -> RgbImage {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let mut out = image.clone();
    if kernel.size() <= 1 || width == 0 || height == 0 {
        return out;
    }
    let channels = 3;
    let half = kernel.half();
    let src = image.as_raw();
    temp.resize(width * height * channels, 0.0);

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.weights().iter().enumerate() {
                    let sx = clamp_index(x as isize + k as isize - half, width);
                    sum += src[(y * width + sx) * channels + c] as f32 * w;
                }
                temp[(y * width + x) * channels + c] = sum;
            }
        }
    }

    let dst: &mut [u8] = &mut out;
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.weights().iter().enumerate() {
                    let sy = clamp_index(y as isize + k as isize - half, height);
                    sum += temp[(sy * width + x) * channels + c] * w;
                }
                dst[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(9, 9)]
    #[case(55, 55)]
    #[case(8, 9)]
    #[case(0, 1)]
    #[case(1, 1)]
    fn test_kernel_size_is_odd(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(GaussianKernel::new(requested).size(), expected);
    }

    #[rstest]
    #[case(3)]
    #[case(9)]
    #[case(55)]
    fn test_kernel_normalized_and_symmetric(#[case] size: usize) {
        let kernel = GaussianKernel::new(size);
        let sum: f32 = kernel.weights().iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
        let w = kernel.weights();
        for i in 0..w.len() / 2 {
            assert_abs_diff_eq!(w[i], w[w.len() - 1 - i], epsilon = 1e-7);
        }
        assert!(w[w.len() / 2] >= w[0]);
    }

    #[test]
    fn test_blur_plane_uniform_is_noop() {
        let mut plane = Array2::from_elem((12, 17), 0.6f32);
        let mut temp = Array2::zeros((0, 0));
        blur_plane(&mut plane, &GaussianKernel::new(9), &mut temp);
        for v in plane.iter() {
            assert_abs_diff_eq!(*v, 0.6, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_blur_plane_spreads_impulse_and_preserves_mass() {
        let mut plane = Array2::zeros((21, 21));
        plane[[10, 10]] = 1.0f32;
        let mut temp = Array2::zeros((0, 0));
        blur_plane(&mut plane, &GaussianKernel::new(9), &mut temp);
        assert!(plane[[10, 10]] < 1.0);
        assert!(plane[[10, 12]] > 0.0);
        assert_eq!(plane[[0, 0]], 0.0);
        assert_abs_diff_eq!(plane.sum(), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(plane[[10, 9]], plane[[10, 11]], epsilon = 1e-7);
    }

    #[test]
    fn test_blur_plane_softens_hard_edge() {
        let mut plane = Array2::from_shape_fn((8, 20), |(_, x)| if x < 10 { 0.0f32 } else { 1.0 });
        let mut temp = Array2::zeros((0, 0));
        blur_plane(&mut plane, &GaussianKernel::new(9), &mut temp);
        let left = plane[[4, 9]];
        let right = plane[[4, 10]];
        assert!(left > 0.0 && left < 0.5);
        assert!(right > 0.5 && right < 1.0);
        assert_abs_diff_eq!(plane[[4, 0]], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(plane[[4, 19]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_blur_rgb_uniform_is_noop() {
        let image = RgbImage::from_pixel(9, 7, image::Rgb([10, 128, 250]));
        let mut temp = Vec::new();
        let blurred = blur_rgb(&image, &GaussianKernel::new(55), &mut temp);
        assert_eq!(blurred, image);
    }

    #[test]
    fn test_blur_rgb_changes_detailed_image() {
        let image = RgbImage::from_fn(16, 16, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let mut temp = Vec::new();
        let blurred = blur_rgb(&image, &GaussianKernel::new(9), &mut temp);
        assert_eq!(blurred.dimensions(), (16, 16));
        let p = blurred.get_pixel(8, 8)[0];
        assert!(p > 64 && p < 192, "checkerboard should average out, got {p}");
    }
}
