// cost.rs — Window matching costs between the reference and a warped view.
//
//   SAD   mean over the window and channels of |ref − warped|, raw [0, 255]
//         intensity units.
//   ZNCC  per channel 1 − ncc, ncc = cov / sqrt(var_ref · var_warped), then
//         averaged over channels. Range [0, 2]; 0 is a perfect match.
//
// All window statistics are box-filter means with clamp-to-edge borders
// (convolution::box_filter). The reference side of ZNCC does not depend on
// the plane, so `ReferenceStats` computes it once per sweep.

use crate::config::{MatchingCost, WindowSize};
use crate::convolution::box_filter;
use crate::image::Image;

/// Below this window variance a patch counts as flat and its ncc is 0.
pub const ZNCC_MIN_VARIANCE: f32 = 0.5;

/// ncc for one window, given its second-order statistics.
#[inline]
pub fn ncc(cov: f32, var_r: f32, var_w: f32) -> f32 {
    if var_r < ZNCC_MIN_VARIANCE || var_w < ZNCC_MIN_VARIANCE {
        return 0.0;
    }
    (cov / (var_r * var_w).sqrt()).clamp(-1.0, 1.0)
}

fn zip_map(a: &Image<f32>, b: &Image<f32>, f: impl Fn(f32, f32) -> f32) -> Image<f32> {
    let data = a.as_slice().iter().zip(b.as_slice()).map(|(&x, &y)| f(x, y)).collect();
    Image::from_vec(a.width(), a.height(), data)
}

/// Per-channel window mean and variance of the reference image.
pub struct ReferenceStats {
    pub mean: Vec<Image<f32>>,
    pub var: Vec<Image<f32>>,
}

impl ReferenceStats {
    pub fn new(reference: &[Image<f32>], window: WindowSize) -> Self {
        let mut mean = Vec::with_capacity(reference.len());
        let mut var = Vec::with_capacity(reference.len());
        for r in reference {
            let m = box_filter(r, window.width, window.height);
            let sq = zip_map(r, r, |a, b| a * b);
            let m2 = box_filter(&sq, window.width, window.height);
            var.push(zip_map(&m2, &m, |m2, m| m2 - m * m));
            mean.push(m);
        }
        ReferenceStats { mean, var }
    }
}

/// Window cost image for one warped view.
///
/// `stats` is only read for ZNCC and may be `None` for SAD.
pub fn window_cost(
    kind: MatchingCost,
    window: WindowSize,
    reference: &[Image<f32>],
    stats: Option<&ReferenceStats>,
    warped: &[Image<f32>],
) -> Image<f32> {
    assert_eq!(reference.len(), warped.len(), "channel count mismatch");
    let channels = reference.len() as f32;

    let per_channel: Vec<Image<f32>> = match (kind, stats) {
        (MatchingCost::Zncc, Some(stats)) => reference
            .iter()
            .zip(warped)
            .enumerate()
            .map(|(c, (r, w))| zncc_channel(window, r, &stats.mean[c], &stats.var[c], w))
            .collect(),
        (MatchingCost::Zncc, None) => {
            let stats = ReferenceStats::new(reference, window);
            return window_cost(kind, window, reference, Some(&stats), warped);
        }
        (MatchingCost::Sad, _) => reference
            .iter()
            .zip(warped)
            .map(|(r, w)| box_filter(&zip_map(r, w, |a, b| (a - b).abs()), window.width, window.height))
            .collect(),
    };

    let mut total = per_channel[0].clone();
    for img in &per_channel[1..] {
        for (t, v) in total.as_mut_slice().iter_mut().zip(img.as_slice()) {
            *t += v;
        }
    }
    for t in total.as_mut_slice() {
        *t /= channels;
    }
    total
}

fn zncc_channel(
    window: WindowSize,
    r: &Image<f32>,
    mean_r: &Image<f32>,
    var_r: &Image<f32>,
    w: &Image<f32>,
) -> Image<f32> {
    let (ww, wh) = (window.width, window.height);
    let mean_w = box_filter(w, ww, wh);
    let mean_ww = box_filter(&zip_map(w, w, |a, b| a * b), ww, wh);
    let mean_rw = box_filter(&zip_map(r, w, |a, b| a * b), ww, wh);

    Image::from_fn(r.width(), r.height(), |x, y| {
        let (mr, mw) = (mean_r.get(x, y), mean_w.get(x, y));
        let var_w = mean_ww.get(x, y) - mw * mw;
        let cov = mean_rw.get(x, y) - mr * mw;
        1.0 - ncc(cov, var_r.get(x, y), var_w)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const W3: WindowSize = WindowSize { width: 3, height: 3 };

    fn textured(w: usize, h: usize) -> Image<f32> {
        Image::from_fn(w, h, |x, y| ((x * 37 + y * 91) % 101) as f32 + 20.0)
    }

    #[test]
    fn test_sad_identical_is_zero() {
        let img = textured(10, 8);
        let cost = window_cost(MatchingCost::Sad, W3, &[img.clone()], None, &[img]);
        assert!(cost.as_slice().iter().all(|&c| c.abs() < 1e-4));
    }

    #[test]
    fn test_sad_constant_offset() {
        let img = textured(10, 8);
        let shifted = Image::from_fn(10, 8, |x, y| img.get(x, y) + 12.0);
        let cost = window_cost(MatchingCost::Sad, W3, &[img], None, &[shifted]);
        for &c in cost.as_slice() {
            assert!((c - 12.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zncc_invariant_to_gain_and_offset() {
        let img = textured(12, 9);
        let affine = Image::from_fn(12, 9, |x, y| 0.5 * img.get(x, y) + 30.0);
        let cost = window_cost(MatchingCost::Zncc, W3, &[img], None, &[affine]);
        for &c in cost.as_slice() {
            assert!(c.abs() < 1e-3, "cost {c}");
        }
    }

    #[test]
    fn test_zncc_anticorrelated_and_flat() {
        let img = textured(12, 9);
        let inverted = Image::from_fn(12, 9, |x, y| 255.0 - img.get(x, y));
        let cost = window_cost(MatchingCost::Zncc, W3, &[img.clone()], None, &[inverted]);
        assert!((cost.get(5, 4) - 2.0).abs() < 1e-3);

        let flat = Image::filled(12, 9, 80.0f32);
        let cost = window_cost(MatchingCost::Zncc, W3, &[img], None, &[flat]);
        assert!((cost.get(5, 4) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_channels_are_averaged() {
        let a = Image::filled(5, 5, 10.0f32);
        let b = Image::filled(5, 5, 20.0f32);
        let cost = window_cost(MatchingCost::Sad, W3, &[a.clone(), a.clone()], None, &[a, b]);
        assert!((cost.get(2, 2) - 5.0).abs() < 1e-5);
    }
}
