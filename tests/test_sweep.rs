// tests/test_sweep.rs — End-to-end sweeps on a synthetic three-camera rig.
//
// Three cameras with R = I sit on the x axis at -0.1, 0 and +0.1 and look
// down +z at a textured fronto-parallel plane z = 1. Every view is rendered
// analytically, so the true depth of every reference pixel is exactly 1.
//
// Average centre distance is (0.1 + 0.1 + 0.2) / 3, which gives a search
// range of roughly 0.33 .. 13.3 with the plane well inside it.

use nalgebra::Matrix4;
use serde_json::{json, Value};

use plane_sweep::planes::generate_planes;
use plane_sweep::{Backend, DepthMap, FrameImage, PlaneSweeper, SweepError};

const W: usize = 64;
const H: usize = 48;
const F: f64 = 60.0;
const CX: f64 = 32.0;
const CY: f64 = 24.0;
const MARGIN: usize = 12;

fn texture(x: f64, y: f64) -> f64 {
    128.0
        + 50.0 * (9.0 * x + 4.0 * y).sin()
        + 35.0 * (13.0 * y - 6.0 * x).sin()
        + 25.0 * (40.0 * x + 17.0 * y).sin()
}

/// View of the z = 1 plane from a camera centred at (c, 0, 0).
fn render_gray(c: f64) -> FrameImage {
    FrameImage::from_gray_fn(W, H, |u, v| {
        let x = (u as f64 - CX) / F + c;
        let y = (v as f64 - CY) / F;
        texture(x, y).round() as u8
    })
    .unwrap()
}

fn render_rgb(c: f64) -> FrameImage {
    FrameImage::from_rgb_fn(W, H, |u, v| {
        let x = (u as f64 - CX) / F + c;
        let y = (v as f64 - CY) / F;
        let t = texture(x, y);
        [t.round() as u8, (255.0 - t).round() as u8, texture(y, x).round() as u8]
    })
    .unwrap()
}

/// World→camera pose of a camera at (c, 0, 0) with R = I.
fn pose(c: f64) -> Matrix4<f64> {
    let mut p = Matrix4::identity();
    p[(0, 3)] = -c;
    p
}

fn config(extra: Value) -> Value {
    let mut doc = json!({
        "pinhole_intrinsics": { "fx": F, "fy": F, "cx": CX, "cy": CY },
        "scale": 1.0,
        "num_planes": 64,
        "match_window_size": { "width": 7, "height": 7 },
        "backend": "CPU",
    });
    if let (Some(base), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    doc
}

fn rig(extra: Value) -> PlaneSweeper {
    let mut sweeper = PlaneSweeper::new(&config(extra)).unwrap();
    for (id, c) in [(0, -0.1), (1, 0.0), (2, 0.1)] {
        sweeper.add_frame(id, render_gray(c), &pose(c)).unwrap();
    }
    sweeper
}

/// Fraction of interior pixels within `tol` of the true depth 1.
fn fraction_near_plane(depth: &DepthMap, tol: f32) -> f32 {
    let mut good = 0;
    let mut total = 0;
    for y in MARGIN..depth.height() - MARGIN {
        for x in MARGIN..depth.width() - MARGIN {
            total += 1;
            if (depth.get(x, y) - 1.0).abs() < tol {
                good += 1;
            }
        }
    }
    good as f32 / total as f32
}

/// Gap between the two sweep planes that bracket z = 1 in the last run.
fn plane_spacing_at_unit_depth(sweeper: &PlaneSweeper) -> f32 {
    let range = sweeper.last_range().unwrap();
    let cfg = sweeper.config();
    let depths = generate_planes(cfg.plane_generation_mode, range.min_z, range.max_z, cfg.num_planes);
    let gap = depths
        .windows(2)
        .find(|w| w[0] <= 1.0 && 1.0 <= w[1])
        .map(|w| w[1] - w[0])
        .unwrap();
    gap as f32
}

/// Every interior pixel lies strictly within `tol` of z = 1.
fn assert_all_near_plane(depth: &DepthMap, tol: f32) {
    for y in MARGIN..depth.height() - MARGIN {
        for x in MARGIN..depth.width() - MARGIN {
            let d = depth.get(x, y);
            assert!((d - 1.0).abs() < tol, "depth {d} at ({x}, {y}) is not within {tol} of z = 1");
        }
    }
}

// ===== Recovering the plane =====

#[test]
fn recovers_plane_uniform_disparity_sad() {
    let mut sweeper = rig(json!({}));
    let depth = sweeper.process(1).unwrap();
    assert_eq!((depth.width(), depth.height()), (W, H));
    assert_eq!(sweeper.active_backend(), Some(Backend::Cpu));

    let spacing = plane_spacing_at_unit_depth(&sweeper);
    assert!(spacing > 0.04 && spacing < 0.06, "unexpected plane spacing {spacing}");
    assert_all_near_plane(&depth, spacing);
}

#[test]
fn recovers_plane_uniform_depth_sad() {
    let mut sweeper = rig(json!({ "plane_generation_mode": "UNIFORM_DEPTH" }));
    let depth = sweeper.process(1).unwrap();

    let spacing = plane_spacing_at_unit_depth(&sweeper);
    assert!(spacing > 0.2 && spacing < 0.21, "unexpected plane spacing {spacing}");
    assert_all_near_plane(&depth, spacing);
}

#[test]
fn recovers_plane_zncc() {
    let mut sweeper = rig(json!({ "matching_costs": "ZNCC" }));
    let depth = sweeper.process(1).unwrap();
    let frac = fraction_near_plane(&depth, 0.1);
    assert!(frac > 0.9, "only {:.0}% of interior pixels near z = 1", frac * 100.0);
}

#[test]
fn recovers_plane_with_every_occlusion_mode() {
    for extra in [
        json!({ "occlusion_mode": "NONE" }),
        json!({ "occlusion_mode": "BEST_K", "best_k": 1 }),
        json!({ "occlusion_mode": "BEST_K", "best_k": 2 }),
    ] {
        let mut sweeper = rig(extra.clone());
        let depth = sweeper.process(1).unwrap();
        let frac = fraction_near_plane(&depth, 0.1);
        assert!(frac > 0.9, "{extra}: only {:.0}% near z = 1", frac * 100.0);
    }
}

#[test]
fn recovers_plane_from_color_frames() {
    let mut sweeper = PlaneSweeper::new(&config(json!({}))).unwrap();
    for (id, c) in [(0, -0.1), (1, 0.0), (2, 0.1)] {
        sweeper.add_frame(id, render_rgb(c), &pose(c)).unwrap();
    }
    let depth = sweeper.process(1).unwrap();
    let frac = fraction_near_plane(&depth, 0.1);
    assert!(frac > 0.9, "only {:.0}% of interior pixels near z = 1", frac * 100.0);
}

#[test]
fn depth_map_is_at_processed_resolution() {
    let mut sweeper = rig(json!({ "scale": 0.5, "match_window_size": { "width": 5, "height": 5 } }));
    let depth = sweeper.process(1).unwrap();
    assert_eq!((depth.width(), depth.height()), (W / 2, H / 2));
}

#[test]
fn repeated_runs_are_identical() {
    let mut sweeper = rig(json!({}));
    let a = sweeper.process(1).unwrap();
    let b = sweeper.process(1).unwrap();
    assert_eq!(a.as_slice(), b.as_slice());
}

#[test]
fn every_frame_can_be_the_reference() {
    let mut sweeper = rig(json!({}));
    for target in [0, 2] {
        let depth = sweeper.process(target).unwrap();
        let frac = fraction_near_plane(&depth, 0.1);
        assert!(frac > 0.8, "target {target}: only {:.0}% near z = 1", frac * 100.0);
    }
}

// ===== Optional outputs =====

#[test]
fn full_output_is_consistent() {
    let mut sweeper = rig(json!({
        "enable_output_best_costs": true,
        "enable_output_uniqueness_ratio": true,
        "enable_output_cost_volume": true,
    }));
    let out = sweeper.process_full(1).unwrap();
    assert_eq!(out.reference_id, 1);

    let costs = out.best_costs.as_ref().unwrap();
    let uniq = out.uniqueness.as_ref().unwrap();
    let volume = out.cost_volume.as_ref().unwrap();
    assert_eq!(volume.num_planes(), 64);
    assert_eq!((volume.width(), volume.height()), (W, H));

    for y in MARGIN..H - MARGIN {
        for x in MARGIN..W - MARGIN {
            let min = (0..volume.num_planes())
                .map(|i| volume.cost(x, y, i))
                .fold(f32::INFINITY, f32::min);
            assert_eq!(costs.get(x, y), min, "best cost at ({x}, {y})");

            let u = uniq.get(x, y);
            assert!(u >= 0.0 && u <= 1.0, "uniqueness {u} at ({x}, {y})");
        }
    }
}

#[test]
fn disabled_outputs_are_absent() {
    let mut sweeper = rig(json!({}));
    let out = sweeper.process_full(1).unwrap();
    assert!(out.depth.is_some());
    assert!(out.best_costs.is_none());
    assert!(out.uniqueness.is_none());
    assert!(out.cost_volume.is_none());
}

#[test]
fn process_without_depth_output_fails() {
    let mut sweeper = rig(json!({ "enable_output_best_depth": false, "enable_output_best_costs": true }));
    assert!(matches!(sweeper.process(1), Err(SweepError::DepthOutputDisabled)));

    let out = sweeper.process_full(1).unwrap();
    assert!(out.depth.is_none());
    assert!(out.best_costs.is_some());
}

// ===== Frame requirements =====

#[test]
fn single_frame_is_insufficient() {
    let mut sweeper = PlaneSweeper::new(&config(json!({}))).unwrap();
    sweeper.add_frame(1, render_gray(0.0), &pose(0.0)).unwrap();
    assert!(matches!(
        sweeper.process(1),
        Err(SweepError::InsufficientFrames { pairs: 0, required: 2 })
    ));
}

#[test]
fn two_frames_need_a_lower_pair_threshold() {
    let mut sweeper = PlaneSweeper::new(&config(json!({}))).unwrap();
    sweeper.add_frame(0, render_gray(0.0), &pose(0.0)).unwrap();
    sweeper.add_frame(1, render_gray(0.1), &pose(0.1)).unwrap();
    assert!(matches!(
        sweeper.process(0),
        Err(SweepError::InsufficientFrames { pairs: 1, required: 2 })
    ));

    sweeper.set_configs(&config(json!({ "min_camera_pairs": 1 }))).unwrap();
    let depth = sweeper.process(0).unwrap();
    assert_eq!(depth.width(), W);
}

#[test]
fn unknown_target_leaves_store_unchanged() {
    let mut sweeper = rig(json!({}));
    assert!(matches!(sweeper.process(42), Err(SweepError::TargetNotFound(42))));
    assert_eq!(sweeper.frame_ids(), vec![0, 1, 2]);
}

#[test]
fn range_is_reported_after_process() {
    let mut sweeper = rig(json!({}));
    assert!(sweeper.last_range().is_none());
    sweeper.process(1).unwrap();
    let range = sweeper.last_range().unwrap();
    let avg = 0.4 / 3.0;
    assert!((range.avg_distance - avg).abs() < 1e-12);
    assert!((range.min_z - 2.5 * avg).abs() < 1e-12);
    assert!((range.max_z - 100.0 * avg).abs() < 1e-12);
}

// ===== View selection =====

#[test]
fn first_view_selection_rejects_target_outside_window() {
    let mut sweeper = rig(json!({ "view_selection": { "mode": "FIRST", "max_views": 2 } }));
    assert!(sweeper.process(1).is_ok());
    assert!(matches!(sweeper.process(2), Err(SweepError::TargetNotFound(2))));
}

#[test]
fn nearest_view_selection_matches_plane() {
    let mut sweeper = rig(json!({ "view_selection": { "mode": "NEAREST", "max_views": 2 } }));
    // A far-away fourth camera must not be picked for reference 1.
    sweeper.add_frame(3, render_gray(0.3), &pose(0.3)).unwrap();
    let depth = sweeper.process(1).unwrap();
    let frac = fraction_near_plane(&depth, 0.1);
    assert!(frac > 0.8, "only {:.0}% of interior pixels near z = 1", frac * 100.0);
}
