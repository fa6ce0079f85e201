// planes.rs — Sweep plane depths.
//
// Planes are fronto-parallel to the reference camera and listed near → far:
//
//   UNIFORM_DEPTH:      d_i = min + i·(max − min)/(n − 1)
//   UNIFORM_DISPARITY:  1/d_i = 1/min − i·(1/min − 1/max)/(n − 1)
//
// Both put plane 0 at min_z and plane n−1 at max_z.

use crate::config::PlaneGenerationMode;

/// `num_planes` depths between `min_z` and `max_z` inclusive.
///
/// # Panics
/// If `num_planes < 2` or the range is not `0 < min_z < max_z`. The config
/// resolver and the range estimator guarantee both.
pub fn generate_planes(mode: PlaneGenerationMode, min_z: f64, max_z: f64, num_planes: usize) -> Vec<f64> {
    assert!(num_planes >= 2, "at least two planes are needed (got {num_planes})");
    assert!(min_z > 0.0 && min_z < max_z, "invalid depth range {min_z}..{max_z}");

    let steps = (num_planes - 1) as f64;
    match mode {
        PlaneGenerationMode::UniformDepth => {
            let step = (max_z - min_z) / steps;
            (0..num_planes).map(|i| min_z + i as f64 * step).collect()
        }
        PlaneGenerationMode::UniformDisparity => {
            let (near, far) = (1.0 / min_z, 1.0 / max_z);
            let step = (near - far) / steps;
            (0..num_planes).map(|i| 1.0 / (near - i as f64 * step)).collect()
        }
    }
}
