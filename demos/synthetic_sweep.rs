// demos/synthetic_sweep.rs
//
// Sweep a synthetic scene: a textured slanted plane seen by five cameras on
// a horizontal rail. Prints depth statistics and writes the inverse depth
// map as a grayscale PGM.
//
// Usage:
//   cargo run --example synthetic_sweep --release -- [CPU|GPU|AUTO] [planes]
//
// Logging goes through env_logger:
//   RUST_LOG=plane_sweep=debug cargo run --example synthetic_sweep --release
//
// Output:
//   vis_output/synthetic_inverse_depth.pgm  — 1/z, scaled to 0..255
//   stdout                                  — range, timings, depth error

use plane_sweep::{FrameImage, InputError, PlaneSweeper, SweepError};

use nalgebra::Matrix4;
use serde_json::json;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Instant;

const W: usize = 640;
const H: usize = 480;
const F: f64 = 500.0;

/// Scene depth along the reference ray through normalised (xn, yn):
/// the plane z = 2 + 0.5·x (world), tilted about the y axis.
fn plane_depth(xn: f64) -> f64 {
    // z = 2 + 0.5 (xn z)  =>  z = 2 / (1 - 0.5 xn)
    2.0 / (1.0 - 0.5 * xn)
}

fn texture(x: f64, y: f64) -> f64 {
    128.0 + 55.0 * (7.0 * x + 2.0 * y).sin() + 35.0 * (11.0 * y - 4.0 * x).sin() + 20.0 * (29.0 * x + 13.0 * y).sin()
}

/// Render the plane from a camera at (c, 0, 0) looking down +z.
fn render(c: f64) -> Result<FrameImage, InputError> {
    FrameImage::from_gray_fn(W, H, |u, v| {
        let xn = (u as f64 - W as f64 / 2.0) / F;
        let yn = (v as f64 - H as f64 / 2.0) / F;
        // Ray c + s (xn, yn, 1) hits z = 2 + 0.5 x at s = (2 + 0.5 c) / (1 - 0.5 xn).
        let s = (2.0 + 0.5 * c) / (1.0 - 0.5 * xn);
        texture(c + s * xn, s * yn).round() as u8
    })
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let backend = args.get(1).map(String::as_str).unwrap_or("AUTO").to_uppercase();
    let planes: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(128);

    let config = json!({
        "pinhole_intrinsics": { "fx": F, "fy": F, "cx": W as f64 / 2.0, "cy": H as f64 / 2.0 },
        "scale": 0.5,
        "num_planes": planes,
        "matching_costs": "ZNCC",
        "enable_output_uniqueness_ratio": true,
        "backend": backend,
    });
    let mut sweeper = match PlaneSweeper::new(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    for (id, c) in [(0, -0.2), (1, -0.1), (2, 0.0), (3, 0.1), (4, 0.2)] {
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = -c;
        let added = render(c).map_err(SweepError::from).and_then(|image| sweeper.add_frame(id, image, &pose));
        if let Err(e) = added {
            eprintln!("Error: frame {id}: {e}");
            std::process::exit(1);
        }
    }

    let t0 = Instant::now();
    let output = match sweeper.process_full(2) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let elapsed = t0.elapsed();

    let Some(depth) = output.depth else {
        eprintln!("Error: no depth output");
        std::process::exit(1);
    };
    let range = output.range;
    println!("Backend: {:?}", sweeper.active_backend());
    println!("Range: {:.3} .. {:.3} (avg camera distance {:.3})", range.min_z, range.max_z, range.avg_distance);
    println!("Depth map: {}×{}, {} planes, {:.1} ms", depth.width(), depth.height(), planes, elapsed.as_secs_f64() * 1e3);

    // Error against the analytic plane, ignoring a border of one window.
    let scale = depth.width() as f64 / W as f64;
    let margin = 8;
    let mut abs_err = Vec::new();
    for y in margin..depth.height() - margin {
        for x in margin..depth.width() - margin {
            let d = depth.get(x, y) as f64;
            if d > 0.0 {
                let xn = (x as f64 / scale - W as f64 / 2.0) / F;
                abs_err.push((d - plane_depth(xn)).abs() / plane_depth(xn));
            }
        }
    }
    abs_err.sort_by(f64::total_cmp);
    if let Some(median) = abs_err.get(abs_err.len() / 2) {
        let within = abs_err.iter().filter(|&&e| e < 0.05).count();
        println!(
            "Relative depth error: median {:.2}%, {:.1}% of pixels within 5%",
            median * 100.0,
            100.0 * within as f64 / abs_err.len() as f64
        );
    }
    if let Some(uniq) = &output.uniqueness {
        let mean = uniq.as_slice().iter().sum::<f32>() / uniq.as_slice().len() as f32;
        println!("Mean uniqueness ratio: {mean:.3}");
    }

    let out_dir = Path::new("vis_output");
    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Error: {}: {e}", out_dir.display());
        std::process::exit(1);
    }
    let path = out_dir.join("synthetic_inverse_depth.pgm");
    match fs::write(&path, inverse_depth_pgm(&depth)) {
        Ok(()) => println!("Wrote {}", path.display()),
        Err(e) => eprintln!("Error: {}: {e}", path.display()),
    }
}

/// Binary PGM of 1/z, normalised to the observed range.
fn inverse_depth_pgm(depth: &plane_sweep::DepthMap) -> Vec<u8> {
    let inv = depth.to_inverse_depth();
    let (lo, hi) = inv
        .as_slice()
        .iter()
        .filter(|&&v| v > 0.0)
        .fold((f32::INFINITY, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut out = format!("P5\n{} {}\n255\n", inv.width(), inv.height()).into_bytes();
    for (_, _, v) in inv.pixels() {
        let g = if v > 0.0 { 1.0 + 254.0 * (v - lo) / span } else { 0.0 };
        out.push(g.round() as u8);
    }
    out
}
