// depth.rs — Caller-owned results of a sweep.
//
// The engines produce flat per-pixel buffers (`RawSweep`); `SweepOutput`
// keeps the ones the configuration asked for and wraps them in owned types.
// Nothing here borrows from the engine, so results outlive the sweeper and
// survive later `process` calls.
//
// All maps have the processed (resized) reference resolution.

use crate::config::SweepConfig;
use crate::image::Image;
use crate::range::DepthRange;

/// Per-pixel buffers straight out of a CPU or GPU sweep, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSweep {
    pub width: usize,
    pub height: usize,
    /// Best-plane depth, 0.0 where unmatched.
    pub depth: Vec<f32>,
    pub best_cost: Vec<f32>,
    pub uniqueness: Vec<f32>,
    /// `num_planes * width * height`, plane-major, when requested.
    pub cost_volume: Option<Vec<f32>>,
}

/// Dense depth map of the reference view. 0.0 marks "no valid match".
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl DepthMap {
    /// # Panics
    /// If `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height, "depth buffer size mismatch");
        DepthMap { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Depth at (x, y).
    pub fn get(&self, x: usize, y: usize) -> f32 {
        assert!(x < self.width && y < self.height, "({x},{y}) out of bounds");
        self.data[y * self.width + x]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// 1/depth per pixel; unmatched pixels stay 0.
    pub fn to_inverse_depth(&self) -> Image<f32> {
        Image::from_fn(self.width, self.height, |x, y| {
            let d = self.get(x, y);
            if d > 0.0 {
                1.0 / d
            } else {
                0.0
            }
        })
    }

    /// Number of pixels with a valid (non-zero) depth.
    pub fn valid_pixel_count(&self) -> usize {
        self.data.iter().filter(|&&d| d > 0.0).count()
    }

    /// Smallest and largest valid depth, `None` if nothing matched.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|&d| d > 0.0)
            .fold(None, |acc, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}

/// Aggregated cost of every pixel on every sweep plane.
#[derive(Debug, Clone, PartialEq)]
pub struct CostVolume {
    width: usize,
    height: usize,
    depths: Vec<f64>,
    data: Vec<f32>,
}

impl CostVolume {
    pub fn new(width: usize, height: usize, depths: Vec<f64>, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height * depths.len(), "cost volume size mismatch");
        CostVolume { width, height, depths, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_planes(&self) -> usize {
        self.depths.len()
    }

    /// Plane depths, near to far.
    pub fn depths(&self) -> &[f64] {
        &self.depths
    }

    /// Cost slice of one plane, row-major.
    pub fn plane(&self, index: usize) -> &[f32] {
        let n = self.width * self.height;
        &self.data[index * n..(index + 1) * n]
    }

    pub fn cost(&self, x: usize, y: usize, plane: usize) -> f32 {
        self.plane(plane)[y * self.width + x]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Every output buffer a sweep was configured to produce.
#[derive(Debug, Clone)]
pub struct SweepOutput {
    pub reference_id: i32,
    pub range: DepthRange,
    pub depth: Option<DepthMap>,
    pub best_costs: Option<Image<f32>>,
    pub uniqueness: Option<Image<f32>>,
    pub cost_volume: Option<CostVolume>,
}

impl SweepOutput {
    /// Keep the buffers enabled in `config`.
    pub fn assemble(raw: RawSweep, depths: Vec<f64>, config: &SweepConfig, reference_id: i32, range: DepthRange) -> Self {
        let RawSweep { width, height, depth, best_cost, uniqueness, cost_volume } = raw;
        SweepOutput {
            reference_id,
            range,
            depth: config.enable_output_best_depth.then(|| DepthMap::new(width, height, depth)),
            best_costs: config
                .enable_output_best_costs
                .then(|| Image::from_vec(width, height, best_cost)),
            uniqueness: config
                .enable_output_uniqueness_ratio
                .then(|| Image::from_vec(width, height, uniqueness)),
            cost_volume: match (config.enable_output_cost_volume, cost_volume) {
                (true, Some(data)) => Some(CostVolume::new(width, height, depths, data)),
                _ => None,
            },
        }
    }
}
