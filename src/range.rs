// range.rs — Depth search range from the rig's own baseline.
//
// The reconstructions are not metric, so the sweep range is expressed in
// units of the average distance between camera centres:
//
//   min_z = 2.5 * avg_distance
//   max_z = 100 * avg_distance
//
// The average is taken over every unordered pair of distinct stored frames,
// not only over the frames that end up being uploaded.

use log::info;
use nalgebra::Point3;

use crate::error::SweepError;
use crate::frame::FrameStore;

/// Near plane, in multiples of the average camera distance.
pub const MIN_Z_FACTOR: f64 = 2.5;
/// Far plane, in multiples of the average camera distance.
pub const MAX_Z_FACTOR: f64 = 100.0;

/// Sweep range derived from the camera rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min_z: f64,
    pub max_z: f64,
    /// Average pairwise camera-centre distance the range was derived from.
    pub avg_distance: f64,
    /// Number of camera pairs that went into the average.
    pub pairs: usize,
}

impl DepthRange {
    /// Range for a given average baseline.
    pub fn from_avg_distance(avg_distance: f64, pairs: usize) -> Self {
        DepthRange {
            min_z: MIN_Z_FACTOR * avg_distance,
            max_z: MAX_Z_FACTOR * avg_distance,
            avg_distance,
            pairs,
        }
    }
}

/// Sum of pairwise distances and the number of pairs.
pub fn pairwise_distances<'a>(centers: impl IntoIterator<Item = &'a Point3<f64>>) -> (f64, usize) {
    let centers: Vec<&Point3<f64>> = centers.into_iter().collect();
    let mut sum = 0.0;
    let mut pairs = 0;
    for (i, a) in centers.iter().enumerate() {
        for b in &centers[i + 1..] {
            sum += (*a - *b).norm();
            pairs += 1;
        }
    }
    (sum, pairs)
}

/// Estimate the sweep range from every frame in `store`.
///
/// # Errors
/// - `InsufficientFrames` if fewer than `min_pairs` camera pairs exist.
/// - `DegenerateBaseline` if all centres coincide (average distance 0).
pub fn estimate_depth_range(store: &FrameStore, min_pairs: usize) -> Result<DepthRange, SweepError> {
    let centers: Vec<Point3<f64>> = store.iter().map(|f| f.camera.center()).collect();
    let (sum, pairs) = pairwise_distances(&centers);

    if pairs < min_pairs.max(1) {
        return Err(SweepError::InsufficientFrames { pairs, required: min_pairs.max(1) });
    }

    let avg = sum / pairs as f64;
    if !(avg > 0.0) || !avg.is_finite() {
        return Err(SweepError::DegenerateBaseline);
    }

    let range = DepthRange::from_avg_distance(avg, pairs);
    info!(
        "cameras have an average distance of {avg:.6} over {pairs} pair(s); z range {:.6} - {:.6}",
        range.min_z, range.max_z
    );
    Ok(range)
}
