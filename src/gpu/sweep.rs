// gpu/sweep.rs — GPU plane sweep.
//
// Mirrors the CPU `sweep::sweep_cpu`: same inputs (`SweepInput`), same
// parameters (`SweepParams`), same output (`RawSweep`). The CPU engine
// stays the reference; the tests at the bottom compare the two.
//
//
// BUFFERS (group 0)
// ─────────────────
//   0  uniform   SweepUniforms      sizes, window, modes, m = K_ref^-T n
//   1  storage   ref_pixels         reference planes, planar f32
//   2  storage   view_pixels        all source views back to back, planar
//   3  storage   views              GpuViewInfo per source view
//   4  storage   plane_depths       f32, near to far
//   5  rw        cost_volume        num_planes × h × w
//   6  rw        selection          depth | best cost | uniqueness, 3 × h × w
//
// Every buffer is created for one `run` and dropped when it returns; only
// the compiled pipelines live in `GpuSweepPipeline`.
//
//
// PRECISION
// ─────────
// The homography basis (A, b, m) is computed in f64 on the CPU and uploaded
// as f32; the kernel rebuilds H(d) per plane in f32. Costs therefore agree
// with the CPU engine to float tolerance, not bit for bit.

use std::time::Instant;

use log::debug;
use wgpu::util::DeviceExt;

use crate::config::{MatchingCost, OcclusionMode, SubPixelMode};
use crate::depth::RawSweep;
use crate::gpu::buffer::{append_planes, f32_bytes, read_f32, storage_from_f32, storage_from_pod, storage_output};
use crate::gpu::device::{GpuDevice, GpuError};
use crate::occlusion::ViewSide;
use crate::sweep::{SweepInput, SweepParams};

// ---------------------------------------------------------------------------
// Uniform / storage structs (must match plane_sweep.wgsl exactly)
// ---------------------------------------------------------------------------

/// Layout of `SweepParams` in plane_sweep.wgsl:
///   offset  0: 12 × u32 (width .. _pad0)
///   offset 48: m (vec4<f32>)
///   total: 64 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SweepUniforms {
    width: u32,
    height: u32,
    channels: u32,
    num_views: u32,
    num_planes: u32,
    half_w: u32,
    half_h: u32,
    cost_kind: u32,
    occlusion: u32,
    best_k: u32,
    sub_pixel: u32,
    _pad0: u32,
    m: [f32; 4],
}

/// `ViewInfo` in plane_sweep.wgsl: rows of A, b, then four u32. 80 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuViewInfo {
    a0: [f32; 4],
    a1: [f32; 4],
    a2: [f32; 4],
    b: [f32; 4],
    offset: u32,
    width: u32,
    height: u32,
    side: u32,
}

fn cost_code(cost: MatchingCost) -> u32 {
    match cost {
        MatchingCost::Sad => 0,
        MatchingCost::Zncc => 1,
    }
}

fn occlusion_code(mode: OcclusionMode) -> u32 {
    match mode {
        OcclusionMode::None => 0,
        OcclusionMode::RefSplit => 1,
        OcclusionMode::BestK => 2,
    }
}

fn sub_pixel_code(mode: Option<SubPixelMode>) -> u32 {
    match mode {
        None => 0,
        Some(SubPixelMode::Direct) => 1,
        Some(SubPixelMode::Inverse) => 2,
    }
}

// ---------------------------------------------------------------------------
// GpuSweepPipeline
// ---------------------------------------------------------------------------

/// Compiled `sweep_costs` and `select_best` pipelines.
///
/// Shader compilation is the expensive part; create once per `GpuDevice`
/// and call [`GpuSweepPipeline::run`] for every sweep.
pub struct GpuSweepPipeline {
    sweep: wgpu::ComputePipeline,
    select: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuSweepPipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let shader_template = include_str!("../shaders/plane_sweep.wgsl");
        let shader_src = shader_template
            .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
            .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("plane_sweep.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuSweep BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
                storage_entry(6, false),
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GpuSweep pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let make = |entry_point: &'static str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&layout),
                module: &shader,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        GpuSweepPipeline { sweep: make("sweep_costs"), select: make("select_best"), bgl }
    }

    /// Run one sweep and read the results back.
    ///
    /// # Errors
    /// `BufferTooLarge` when the cost volume or the uploaded views exceed
    /// the device's storage binding limit; `Readback` if mapping fails.
    pub fn run(&self, gpu: &GpuDevice, input: &SweepInput, params: &SweepParams) -> Result<RawSweep, GpuError> {
        let t0 = Instant::now();
        let (w, h) = (input.width(), input.height());
        let npix = w * h;
        let num_planes = input.depths.len();

        gpu.check_storage_size("cost volume", f32_bytes(npix * num_planes))?;

        // ── Upload ────────────────────────────────────────────────────────────
        let mut ref_data = Vec::with_capacity(npix * input.channels());
        append_planes(&mut ref_data, &input.reference.planes);

        let mut view_data = Vec::new();
        let mut infos = Vec::with_capacity(input.sources.len());
        let mut m = [0.0f32; 4];
        for src in &input.sources {
            let basis = input.reference.camera.homography_basis(&src.view.camera);
            let offset = append_planes(&mut view_data, &src.view.planes);
            let row = |r: usize| [basis.a[(r, 0)] as f32, basis.a[(r, 1)] as f32, basis.a[(r, 2)] as f32, 0.0];
            infos.push(GpuViewInfo {
                a0: row(0),
                a1: row(1),
                a2: row(2),
                b: [basis.b.x as f32, basis.b.y as f32, basis.b.z as f32, 0.0],
                offset,
                width: src.view.width() as u32,
                height: src.view.height() as u32,
                side: match src.side {
                    ViewSide::Before => 0,
                    ViewSide::After => 1,
                },
            });
            m = [basis.m.x as f32, basis.m.y as f32, basis.m.z as f32, 0.0];
        }
        gpu.check_storage_size("source views", f32_bytes(view_data.len()))?;

        let (half_w, half_h) = params.window.half();
        let uniforms = SweepUniforms {
            width: w as u32,
            height: h as u32,
            channels: input.channels() as u32,
            num_views: infos.len() as u32,
            num_planes: num_planes as u32,
            half_w: half_w as u32,
            half_h: half_h as u32,
            cost_kind: cost_code(params.cost),
            occlusion: occlusion_code(params.occlusion),
            best_k: params.best_k as u32,
            sub_pixel: sub_pixel_code(params.sub_pixel),
            _pad0: 0,
            m,
        };

        let depths_f32: Vec<f32> = input.depths.iter().map(|&d| d as f32).collect();

        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SweepUniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let ref_buf = storage_from_f32(gpu, "ref_pixels", &ref_data);
        let view_buf = storage_from_f32(gpu, "view_pixels", &view_data);
        let info_buf = storage_from_pod(gpu, "views", &infos);
        let depth_buf = storage_from_f32(gpu, "plane_depths", &depths_f32);
        let volume_buf = storage_output(gpu, "cost_volume", npix * num_planes);
        let select_buf = storage_output(gpu, "selection", 3 * npix);

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuSweep bind group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: ref_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: view_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: info_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: depth_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: volume_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 6, resource: select_buf.as_entire_binding() },
            ],
        });

        // ── Dispatch ──────────────────────────────────────────────────────────
        let (dx, dy) = gpu.dispatch_size(w as u32, h as u32);
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuSweep::run") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sweep_costs"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.sweep);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dx, dy, num_planes as u32);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("select_best"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.select);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dx, dy, 1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        // ── Readback ──────────────────────────────────────────────────────────
        let mut selection = read_f32(gpu, &select_buf, 3 * npix)?;
        let cost_volume = if params.keep_cost_volume {
            Some(read_f32(gpu, &volume_buf, npix * num_planes)?)
        } else {
            None
        };
        debug!(
            "gpu sweep: {num_planes} planes × {} view(s) at {w}×{h} in {:.1} ms",
            infos.len(),
            t0.elapsed().as_secs_f64() * 1e3
        );

        let uniqueness = selection.split_off(2 * npix);
        let best_cost = selection.split_off(npix);
        Ok(RawSweep { width: w, height: h, depth: selection, best_cost, uniqueness, cost_volume })
    }
}
