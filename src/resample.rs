// resample.rs — Resize matching planes by the configured scale.
//
// Pixel convention: output pixel (x', y') looks at input position
// (x'/s, y'/s). That is the same mapping `CameraMatrix::scaled` applies to
// K (first two rows times s), so a point projecting to (u, v) at full
// resolution projects to (s·u, s·v) in the resized planes.
//
// Downscaling first blurs with a Gaussian whose sigma grows with the
// reduction factor, then samples bilinearly. Upscaling only interpolates.
// Output size is round(w·s) × round(h·s), at least 1×1.

use rayon::prelude::*;

use crate::convolution::{convolve_separable, gaussian_kernel_1d};
use crate::image::{interpolate_bilinear, Image};

/// Output dimensions for an input of `width × height` at `scale`.
pub fn scaled_size(width: usize, height: usize, scale: f64) -> (usize, usize) {
    let w = ((width as f64) * scale).round().max(1.0) as usize;
    let h = ((height as f64) * scale).round().max(1.0) as usize;
    (w, h)
}

/// Anti-aliasing sigma for a downscale by `scale` (< 1).
fn prefilter_sigma(scale: f64) -> f32 {
    (0.5 / scale) as f32
}

/// Resize one plane. `scale == 1` returns a copy.
pub fn resize(src: &Image<f32>, scale: f64) -> Image<f32> {
    if scale == 1.0 {
        return src.clone();
    }

    let smoothed;
    let source = if scale < 1.0 {
        let sigma = prefilter_sigma(scale);
        let half = (3.0 * sigma).ceil().max(1.0) as usize;
        let kernel = gaussian_kernel_1d(half, sigma);
        smoothed = convolve_separable(src, &kernel, &kernel);
        &smoothed
    } else {
        src
    };

    let (w, h) = scaled_size(src.width(), src.height(), scale);
    let inv = (1.0 / scale) as f32;
    let mut dst = Image::<f32>::new(w, h);
    dst.par_rows_mut().for_each(|(y, out)| {
        let sy = y as f32 * inv;
        for (x, o) in out.iter_mut().enumerate() {
            *o = interpolate_bilinear(source, x as f32 * inv, sy);
        }
    });
    dst
}

/// Resize every channel plane of a frame.
pub fn resize_planes(planes: &[Image<f32>], scale: f64) -> Vec<Image<f32>> {
    planes.iter().map(|p| resize(p, scale)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size() {
        assert_eq!(scaled_size(640, 480, 0.25), (160, 120));
        assert_eq!(scaled_size(3, 3, 0.1), (1, 1));
        assert_eq!(scaled_size(10, 5, 2.0), (20, 10));
    }

    #[test]
    fn test_identity_scale_copies() {
        let img = Image::from_fn(7, 5, |x, y| (x * y) as f32);
        let out = resize(&img, 1.0);
        assert_eq!(out.as_slice(), img.as_slice());
    }

    #[test]
    fn test_downscale_keeps_constant() {
        let img = Image::filled(40, 30, 77.0f32);
        let out = resize(&img, 0.25);
        assert_eq!((out.width(), out.height()), (10, 8));
        for (_, _, v) in out.pixels() {
            assert!((v - 77.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_upscale_follows_pixel_convention() {
        // Linear ramp: output x' must read input x'/s.
        let img = Image::from_fn(16, 4, |x, _| x as f32 * 3.0);
        let out = resize(&img, 2.0);
        for x in 0..28 {
            let expected = (x as f32 / 2.0) * 3.0;
            assert!((out.get(x, 1) - expected).abs() < 1e-4, "x={x}");
        }
    }
}
