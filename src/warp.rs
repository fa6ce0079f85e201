// warp.rs — Resample a source view onto the reference image grid.
//
// For plane depth d the homography H(d) maps reference pixel (x, y) to
// q = H·(x, y, 1)ᵀ in the source view. The warped sample is the bilinear
// (clamp-to-edge) value at (q_x/q_z, q_y/q_z). When q_z <= MIN_PROJECTION_DEPTH
// the plane point is behind the source camera: the sample is invalid and
// holds 0.
//
// `valid` is the per-pixel mask of those centre samples. A source view only
// contributes to the aggregated cost of the pixels where it is set.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::camera::MIN_PROJECTION_DEPTH;
use crate::image::{interpolate_bilinear, Image};

/// One source view resampled through one plane.
pub struct WarpedView {
    /// One image per channel, on the reference grid.
    pub planes: Vec<Image<f32>>,
    /// Row-major, `width * height`.
    pub valid: Vec<bool>,
}

/// Source coordinates of every reference pixel, `None` behind the camera.
pub fn warp_coordinates(h: &Matrix3<f64>, width: usize, height: usize) -> Vec<Option<(f32, f32)>> {
    let mut coords = vec![None; width * height];
    coords.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, c) in row.iter_mut().enumerate() {
            let q = h * Vector3::new(x as f64, y as f64, 1.0);
            if q.z > MIN_PROJECTION_DEPTH {
                *c = Some(((q.x / q.z) as f32, (q.y / q.z) as f32));
            }
        }
    });
    coords
}

/// Warp every channel of a source view through `h` onto a
/// `width × height` reference grid.
pub fn warp_view(source: &[Image<f32>], h: &Matrix3<f64>, width: usize, height: usize) -> WarpedView {
    let coords = warp_coordinates(h, width, height);

    let planes = source
        .iter()
        .map(|src| {
            let mut out = Image::<f32>::new(width, height);
            out.par_rows_mut().for_each(|(y, row)| {
                for (x, o) in row.iter_mut().enumerate() {
                    *o = match coords[y * width + x] {
                        Some((sx, sy)) => interpolate_bilinear(src, sx, sy),
                        None => 0.0,
                    };
                }
            });
            out
        })
        .collect();

    let valid = coords.iter().map(Option::is_some).collect();
    WarpedView { planes, valid }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_warp_is_copy() {
        let src = Image::from_fn(9, 6, |x, y| (x * 3 + y * 7) as f32);
        let warped = warp_view(std::slice::from_ref(&src), &Matrix3::identity(), 9, 6);
        assert_eq!(warped.planes[0].as_slice(), src.as_slice());
        assert!(warped.valid.iter().all(|&v| v));
    }

    #[test]
    fn test_translation_warp_clamps_to_edge() {
        // H shifts x by +2.5: interior samples interpolate, the right edge
        // replicates the last column.
        let src = Image::from_fn(8, 2, |x, _| x as f32 * 10.0);
        let mut h = Matrix3::identity();
        h[(0, 2)] = 2.5;
        let warped = warp_view(std::slice::from_ref(&src), &h, 8, 2);
        assert!((warped.planes[0].get(0, 0) - 25.0).abs() < 1e-5);
        assert!((warped.planes[0].get(3, 1) - 55.0).abs() < 1e-5);
        assert_eq!(warped.planes[0].get(7, 0), 70.0);
    }

    #[test]
    fn test_points_behind_camera_are_invalid() {
        let src = Image::filled(4, 4, 50.0f32);
        // q_z = 1 - x: columns 1.. land on or behind the camera plane.
        let mut h = Matrix3::identity();
        h[(2, 0)] = -1.0;
        let warped = warp_view(std::slice::from_ref(&src), &h, 4, 4);
        assert!(warped.valid[2 * 4]);
        assert!(!warped.valid[2 * 4 + 1]);
        assert_eq!(warped.planes[0].get(3, 0), 0.0);
    }
}
