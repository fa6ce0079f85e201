// convolution.rs — Separable 1D convolution for Image<T>.
//
// Two users in the sweep:
//   - resample.rs blurs a frame with a Gaussian before downscaling it.
//   - cost.rs turns per-pixel quantities (|ref − warped|, ref·warped, ...)
//     into matching-window means with a box kernel. A W×H window mean is a
//     separable convolution with kernels [1/W; W] and [1/H; H], so it costs
//     O(W + H) per pixel instead of O(W·H).
//
// BORDER HANDLING: Clamp (replicate edge pixels). A window that hangs over
// the image edge reads the edge pixel again, exactly like the per-window
// loops in plane_sweep.wgsl.
//
// Both passes are row-parallel (rayon); each output row depends only on the
// input image, so rows are independent tasks.

use rayon::prelude::*;

use crate::image::{Image, Pixel};

/// Convolve each row of `src` with a 1D kernel (horizontal pass).
///
/// The kernel is applied centred: for a kernel of length K the centre
/// element is at index K/2.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, src.height());

    dst.par_rows_mut().for_each(|(y, out)| {
        let row = src.row(y);
        for (x, o) in out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            if x >= half && x + half < w {
                // Interior: the whole kernel is inside the row.
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += row[x + ki - half].to_f32() * kv;
                }
            } else {
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sx = (x as isize + ki as isize - half as isize)
                        .clamp(0, w as isize - 1) as usize;
                    acc += row[sx].to_f32() * kv;
                }
            }
            *o = acc;
        }
    });
    dst
}

/// Convolve each column of `src` with a 1D kernel (vertical pass).
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(src.width(), h);

    dst.par_rows_mut().for_each(|(y, out)| {
        for (ki, &kv) in kernel.iter().enumerate() {
            let sy = (y as isize + ki as isize - half as isize)
                .clamp(0, h as isize - 1) as usize;
            for (o, &v) in out.iter_mut().zip(src.row(sy)) {
                *o += v * kv;
            }
        }
    });
    dst
}

/// Full separable 2D convolution: horizontal pass then vertical pass.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Generate a 1D Gaussian kernel with the given half-size and sigma.
///
/// Returns a kernel of length `2 * half_size + 1`, normalised to sum to 1.
///
/// # Examples
/// ```
/// let k = plane_sweep::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let len = 2 * half_size + 1;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// A normalised box kernel of odd length `len` (every tap = 1/len).
pub fn box_kernel_1d(len: usize) -> Vec<f32> {
    assert!(len % 2 == 1, "box kernel length must be odd (got {len})");
    vec![1.0 / len as f32; len]
}

/// Mean over a `win_w × win_h` window centred on every pixel.
///
/// Window dimensions must be odd. Borders are clamped.
pub fn box_filter<T: Pixel>(src: &Image<T>, win_w: usize, win_h: usize) -> Image<f32> {
    convolve_separable(src, &box_kernel_1d(win_w), &box_kernel_1d(win_h))
}
