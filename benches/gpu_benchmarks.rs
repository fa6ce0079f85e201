// benches/gpu_benchmarks.rs — CPU vs GPU sweep on the same input.
//
//   cargo bench --bench gpu_benchmarks
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// Criterion measures wall time: buffer uploads, bind group creation,
// submit, the blocking poll and the readback of the whole cost volume are
// all included. That is what `PlaneSweeper::process` pays per call.
//
// The first iterations pay the driver's shader compilation, hence the
// explicit warm-up time.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Matrix4;
use serde_json::json;
use std::time::Duration;

use plane_sweep::config::SweepConfig;
use plane_sweep::frame::{Frame, FrameImage, FrameStore};
use plane_sweep::gpu::device::GpuDevice;
use plane_sweep::gpu::sweep::GpuSweepPipeline;
use plane_sweep::planes::generate_planes;
use plane_sweep::range::estimate_depth_range;
use plane_sweep::sweep::{sweep_cpu, SweepInput, SweepParams};

// ============================================================
// Shared helpers
// ============================================================

const W: usize = 320;
const H: usize = 240;
const F: f64 = 300.0;

fn render(c: f64) -> FrameImage {
    FrameImage::from_gray_fn(W, H, |u, v| {
        let x = (u as f64 - W as f64 / 2.0) / F + c;
        let y = (v as f64 - H as f64 / 2.0) / F;
        (128.0 + 60.0 * (11.0 * x + 3.0 * y).sin() + 40.0 * (17.0 * y - 5.0 * x).sin()).round() as u8
    })
    .unwrap()
}

fn make_input(cfg: &SweepConfig) -> SweepInput {
    let mut store = FrameStore::new(cfg.pinhole_intrinsics.k());
    for (id, c) in [(0, -0.2), (1, -0.1), (2, 0.0), (3, 0.1), (4, 0.2)] {
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = -c;
        store.add(id, render(c), &pose).unwrap();
    }
    let range = estimate_depth_range(&store, cfg.min_camera_pairs).unwrap();
    let depths = generate_planes(cfg.plane_generation_mode, range.min_z, range.max_z, cfg.num_planes);
    let frames: Vec<&Frame> = store.iter().collect();
    SweepInput::upload(&frames, 2, cfg, depths).unwrap()
}

// ============================================================
// Sweep: CPU vs GPU
// ============================================================

fn bench_sweep(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let gpu = GpuDevice::new().expect("no Vulkan GPU");
    let pipeline = GpuSweepPipeline::new(&gpu);

    let mut group = c.benchmark_group("sweep");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(10);

    for (planes, cost) in [(64, "SAD"), (64, "ZNCC"), (256, "SAD")] {
        let cfg = SweepConfig::resolve(&json!({
            "pinhole_intrinsics": { "fx": F, "fy": F, "cx": W as f64 / 2.0, "cy": H as f64 / 2.0 },
            "scale": 1.0,
            "num_planes": planes,
            "matching_costs": cost,
        }))
        .unwrap();
        let input = make_input(&cfg);
        let params = SweepParams::from_config(&cfg);
        let id = format!("{cost}_{planes}planes_320x240");

        group.bench_function(BenchmarkId::new("cpu", &id), |b| b.iter(|| sweep_cpu(&input, &params)));
        group.bench_function(BenchmarkId::new("gpu", &id), |b| {
            b.iter(|| pipeline.run(&gpu, &input, &params).unwrap())
        });
    }
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(benches, bench_sweep);
criterion_main!(benches);
