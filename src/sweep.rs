// sweep.rs — CPU plane-sweep engine.
//
// This is the reference implementation of the cost-volume pipeline; the
// WGSL kernels in shaders/plane_sweep.wgsl compute the same quantities and
// are tested against it.
//
// Pipeline for one `process` call:
//
//   upload      frames → resized f32 planes + scaled cameras (SweepInput)
//   per plane   warp every source view through H(d)       (warp.rs)
//               window cost per view                      (cost.rs)
//               aggregate over contributing views         (occlusion.rs)
//   per pixel   best plane, uniqueness, sub-pixel depth   (select_pixel)
//
// The full cost volume is kept in memory (num_planes × w × h f32) because
// uniqueness and sub-pixel refinement need more than the running minimum.
// Work inside a stage is row-parallel via rayon; every output element is
// written by exactly one task, so results do not depend on scheduling.

use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use crate::camera::CameraMatrix;
use crate::config::{MatchingCost, OcclusionMode, SubPixelMode, SweepConfig, WindowSize};
use crate::convert::frame_to_planes;
use crate::cost::{window_cost, ReferenceStats};
use crate::depth::RawSweep;
use crate::error::SweepError;
use crate::frame::Frame;
use crate::image::Image;
use crate::occlusion::{Aggregator, ViewCost, ViewSide, UNMATCHED_COST};
use crate::resample::resize_planes;
use crate::warp::warp_view;

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// A frame prepared for matching: resized channel planes plus the camera
/// scaled to match them. Owns its data; holds no reference to the store.
#[derive(Debug, Clone)]
pub struct UploadedView {
    pub id: i32,
    pub planes: Vec<Image<f32>>,
    pub camera: CameraMatrix,
}

impl UploadedView {
    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    pub fn height(&self) -> usize {
        self.planes[0].height()
    }
}

#[derive(Debug, Clone)]
pub struct SourceView {
    pub view: UploadedView,
    pub side: ViewSide,
}

/// Everything a backend needs for one sweep.
#[derive(Debug, Clone)]
pub struct SweepInput {
    pub reference: UploadedView,
    pub sources: Vec<SourceView>,
    /// Plane depths, near to far.
    pub depths: Vec<f64>,
}

impl SweepInput {
    /// Prepare `frames` (already in upload order) for a sweep about `target`.
    ///
    /// Colour planes are used only when colour matching is enabled and every
    /// frame has three channels; otherwise all frames are reduced to luma.
    ///
    /// # Errors
    /// `TargetNotFound` if `target` is not among `frames`, `NoSourceViews`
    /// if it is the only one.
    pub fn upload(frames: &[&Frame], target: i32, config: &SweepConfig, depths: Vec<f64>) -> Result<Self, SweepError> {
        let ref_index = frames
            .iter()
            .position(|f| f.id == target)
            .ok_or(SweepError::TargetNotFound(target))?;
        if frames.len() < 2 {
            return Err(SweepError::NoSourceViews);
        }

        let color = config.enable_color_matching && frames.iter().all(|f| f.image.channels() == 3);
        let scale = config.scale;
        let prepare = |f: &Frame| UploadedView {
            id: f.id,
            planes: resize_planes(&frame_to_planes(&f.image, color), scale),
            camera: f.camera.scaled(scale),
        };

        let reference = prepare(frames[ref_index]);
        let sources = frames
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != ref_index)
            .map(|(i, f)| SourceView { view: prepare(*f), side: ViewSide::of(i, ref_index) })
            .collect();

        Ok(SweepInput { reference, sources, depths })
    }

    pub fn width(&self) -> usize {
        self.reference.width()
    }

    pub fn height(&self) -> usize {
        self.reference.height()
    }

    pub fn channels(&self) -> usize {
        self.reference.planes.len()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The subset of `SweepConfig` the engines read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub cost: MatchingCost,
    pub window: WindowSize,
    pub occlusion: OcclusionMode,
    pub best_k: usize,
    pub sub_pixel: Option<SubPixelMode>,
    pub keep_cost_volume: bool,
}

impl SweepParams {
    pub fn from_config(config: &SweepConfig) -> Self {
        SweepParams {
            cost: config.matching_costs,
            window: config.match_window_size,
            occlusion: config.occlusion_mode,
            best_k: config.best_k_or_zero(),
            sub_pixel: config.enable_sub_pixel.then_some(config.sub_pixel_interpolation_mode),
            keep_cost_volume: config.enable_output_cost_volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Best-plane selection
// ---------------------------------------------------------------------------

/// Result of the per-pixel search over planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSelection {
    pub depth: f32,
    pub cost: f32,
    pub uniqueness: f32,
}

/// Parabola vertex offset from the costs at planes b−1, b, b+1, in
/// [−0.5, 0.5]. 0 when a neighbour is unmatched or the curve is not convex.
pub fn sub_pixel_offset(c_minus: f32, c0: f32, c_plus: f32) -> f32 {
    if c_minus >= UNMATCHED_COST || c_plus >= UNMATCHED_COST {
        return 0.0;
    }
    let denom = c_minus - 2.0 * c0 + c_plus;
    if !(denom > 0.0) {
        return 0.0;
    }
    ((c_minus - c_plus) / (2.0 * denom)).clamp(-0.5, 0.5)
}

/// Depth at fractional plane position `best + delta`, interpolated linearly
/// in depth (DIRECT) or inverse depth (INVERSE).
pub fn interpolate_depth(depths: &[f64], best: usize, delta: f32, mode: SubPixelMode) -> f64 {
    let param = |d: f64| match mode {
        SubPixelMode::Direct => d,
        SubPixelMode::Inverse => 1.0 / d,
    };
    let delta = delta as f64;
    let pb = param(depths[best]);
    let p = if delta >= 0.0 {
        match depths.get(best + 1) {
            Some(&next) => pb + delta * (param(next) - pb),
            None => pb,
        }
    } else if best > 0 {
        pb + delta * (pb - param(depths[best - 1]))
    } else {
        pb
    };
    match mode {
        SubPixelMode::Direct => p,
        SubPixelMode::Inverse => 1.0 / p,
    }
}

/// Best plane of one pixel. `cost_at(i)` is the aggregated cost on plane i.
///
/// The lowest cost wins, the nearest plane on ties. Uniqueness is
/// best / second-best, where second-best ignores the planes adjacent to the
/// best one; it is 1.0 when no such plane exists or the ratio is undefined.
pub fn select_pixel(
    cost_at: impl Fn(usize) -> f32,
    depths: &[f64],
    sub_pixel: Option<SubPixelMode>,
) -> PixelSelection {
    let n = depths.len();
    let mut best = 0;
    let mut best_cost = cost_at(0);
    for i in 1..n {
        let c = cost_at(i);
        if c < best_cost {
            best = i;
            best_cost = c;
        }
    }

    if best_cost >= UNMATCHED_COST {
        return PixelSelection { depth: 0.0, cost: UNMATCHED_COST, uniqueness: 1.0 };
    }

    let second = (0..n)
        .filter(|&i| i.abs_diff(best) > 1)
        .map(&cost_at)
        .fold(f32::INFINITY, f32::min);
    let uniqueness = if second.is_finite() && second > 0.0 { best_cost / second } else { 1.0 };

    let depth = match sub_pixel {
        Some(mode) if best > 0 && best + 1 < n => {
            let delta = sub_pixel_offset(cost_at(best - 1), best_cost, cost_at(best + 1));
            interpolate_depth(depths, best, delta, mode)
        }
        _ => depths[best],
    };

    PixelSelection { depth: depth as f32, cost: best_cost, uniqueness }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Aggregated cost of every pixel on plane `depth`, written into `out`.
fn sweep_plane(input: &SweepInput, params: &SweepParams, stats: Option<&ReferenceStats>, depth: f64, out: &mut [f32]) {
    let (w, h) = (input.width(), input.height());
    let reference = &input.reference;

    let per_view: Vec<_> = input
        .sources
        .iter()
        .map(|src| {
            let hmat = reference.camera.plane_homography(&src.view.camera, depth);
            let warped = warp_view(&src.view.planes, &hmat, w, h);
            let cost = window_cost(params.cost, params.window, &reference.planes, stats, &warped.planes);
            (cost, warped.valid, src.side)
        })
        .collect();

    let aggregator = Aggregator::new(params.occlusion, params.best_k);
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let mut samples = Vec::with_capacity(per_view.len());
        for (x, o) in row.iter_mut().enumerate() {
            samples.clear();
            for (cost, valid, side) in &per_view {
                if valid[y * w + x] {
                    samples.push(ViewCost { cost: cost.get(x, y), side: *side });
                }
            }
            *o = aggregator.aggregate(&mut samples);
        }
    });
}

/// Run the whole sweep on the CPU.
pub fn sweep_cpu(input: &SweepInput, params: &SweepParams) -> RawSweep {
    let (w, h) = (input.width(), input.height());
    let n = w * h;
    let depths = &input.depths;

    let t0 = Instant::now();
    let stats = (params.cost == MatchingCost::Zncc)
        .then(|| ReferenceStats::new(&input.reference.planes, params.window));

    let mut volume = vec![0.0f32; n * depths.len()];
    for (plane, &d) in depths.iter().enumerate() {
        sweep_plane(input, params, stats.as_ref(), d, &mut volume[plane * n..(plane + 1) * n]);
    }
    debug!(
        "cpu cost volume: {} planes × {} view(s) at {w}×{h} in {:.1} ms",
        depths.len(),
        input.sources.len(),
        t0.elapsed().as_secs_f64() * 1e3
    );

    let t1 = Instant::now();
    let mut depth = vec![0.0f32; n];
    let mut best_cost = vec![0.0f32; n];
    let mut uniqueness = vec![0.0f32; n];
    depth
        .par_chunks_mut(w)
        .zip(best_cost.par_chunks_mut(w))
        .zip(uniqueness.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, ((d_row, c_row), u_row))| {
            for x in 0..w {
                let pix = y * w + x;
                let sel = select_pixel(|i| volume[i * n + pix], depths, params.sub_pixel);
                d_row[x] = sel.depth;
                c_row[x] = sel.cost;
                u_row[x] = sel.uniqueness;
            }
        });
    debug!("cpu selection in {:.1} ms", t1.elapsed().as_secs_f64() * 1e3);

    RawSweep {
        width: w,
        height: h,
        depth,
        best_cost,
        uniqueness,
        cost_volume: params.keep_cost_volume.then_some(volume),
    }
}
