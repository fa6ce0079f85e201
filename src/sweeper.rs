// sweeper.rs — The public plane-sweep engine.
//
// `PlaneSweeper` owns the resolved configuration, the frame store and (once
// a GPU sweep has been requested) the wgpu device with its compiled
// pipelines. All methods take `&mut self` or `&self`; one caller drives one
// sweeper.
//
// `process_full(target)`:
//   1. depth range from every stored camera            (range.rs)
//   2. view selection, then upload of the chosen frames (sweep.rs)
//   3. plane generation                                 (planes.rs)
//   4. sweep on the configured backend                  (sweep.rs / gpu/)
//   5. owned outputs                                    (depth.rs)
//
// Any failure aborts the call without a partial result. The frame store is
// never modified by `process`.

use std::time::Instant;

use log::{debug, info, warn};
use nalgebra::Matrix4;
use serde_json::Value;

use crate::config::{Backend, SweepConfig, ViewSelection, ViewSelectionMode};
use crate::depth::{DepthMap, RawSweep, SweepOutput};
use crate::error::SweepError;
use crate::frame::{Frame, FrameImage, FrameStore};
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::sweep::GpuSweepPipeline;
use crate::planes::generate_planes;
use crate::range::{estimate_depth_range, DepthRange};
use crate::sweep::{sweep_cpu, SweepInput, SweepParams};

/// Device plus pipelines, created on the first GPU sweep.
struct GpuContext {
    pipeline: GpuSweepPipeline,
    device: GpuDevice,
}

impl GpuContext {
    fn new() -> Result<Self, GpuError> {
        let device = GpuDevice::new()?;
        let pipeline = GpuSweepPipeline::new(&device);
        Ok(GpuContext { pipeline, device })
    }
}

/// Multi-view plane-sweep stereo over a store of posed frames.
pub struct PlaneSweeper {
    config: SweepConfig,
    store: FrameStore,
    gpu: Option<GpuContext>,
    /// Set once GPU initialisation failed under `Backend::Auto`.
    gpu_unavailable: bool,
    last_range: Option<DepthRange>,
    last_backend: Option<Backend>,
}

impl PlaneSweeper {
    /// Build a sweeper from a configuration document.
    ///
    /// # Errors
    /// `SweepError::Config` if the document does not resolve.
    pub fn new(config: &Value) -> Result<Self, SweepError> {
        let config = SweepConfig::resolve(config)?;
        log_config(&config);
        Ok(PlaneSweeper {
            store: FrameStore::new(config.pinhole_intrinsics.k()),
            config,
            gpu: None,
            gpu_unavailable: false,
            last_range: None,
            last_backend: None,
        })
    }

    /// Replace the configuration.
    ///
    /// On error nothing changes. New intrinsics apply to frames added
    /// afterwards; stored frames keep their cameras.
    pub fn set_configs(&mut self, config: &Value) -> Result<(), SweepError> {
        let config = SweepConfig::resolve(config)?;
        log_config(&config);
        self.store.set_intrinsics(config.pinhole_intrinsics.k());
        self.config = config;
        Ok(())
    }

    /// Store frame `id` with its 4×4 world→camera pose. Replaces any frame
    /// with the same id.
    pub fn add_frame(&mut self, id: i32, image: FrameImage, pose: &Matrix4<f64>) -> Result<(), SweepError> {
        self.store.add(id, image, pose)?;
        debug!("added frame {id} ({} stored)", self.store.len());
        Ok(())
    }

    /// Remove frame `id`; unknown ids are ignored.
    pub fn delete_frame(&mut self, id: i32) {
        if self.store.remove(id).is_some() {
            debug!("deleted frame {id} ({} stored)", self.store.len());
        }
    }

    pub fn clear_frames(&mut self) {
        self.store.clear();
    }

    /// Stored frame ids, ascending.
    pub fn frame_ids(&self) -> Vec<i32> {
        self.store.ids()
    }

    pub fn frames(&self) -> &FrameStore {
        &self.store
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Depth range of the most recent `process` call that got that far.
    pub fn last_range(&self) -> Option<DepthRange> {
        self.last_range
    }

    /// Backend that ran the most recent successful sweep.
    pub fn active_backend(&self) -> Option<Backend> {
        self.last_backend
    }

    /// Depth map of frame `target`.
    ///
    /// # Errors
    /// `DepthOutputDisabled` when `enable_output_best_depth` is off, plus
    /// everything [`Self::process_full`] can return.
    pub fn process(&mut self, target: i32) -> Result<DepthMap, SweepError> {
        if !self.config.enable_output_best_depth {
            return Err(SweepError::DepthOutputDisabled);
        }
        self.process_full(target)?.depth.ok_or(SweepError::DepthOutputDisabled)
    }

    /// Run a sweep about frame `target` and return every enabled output.
    pub fn process_full(&mut self, target: i32) -> Result<SweepOutput, SweepError> {
        let t0 = Instant::now();

        let range = estimate_depth_range(&self.store, self.config.min_camera_pairs)?;
        self.last_range = Some(range);

        let frames = select_views(&self.store, target, &self.config.view_selection)?;
        let ids: Vec<i32> = frames.iter().map(|f| f.id).collect();
        debug!("uploading frames {ids:?} for target {target}");

        let depths = generate_planes(
            self.config.plane_generation_mode,
            range.min_z,
            range.max_z,
            self.config.num_planes,
        );
        let input = SweepInput::upload(&frames, target, &self.config, depths.clone())?;
        let params = SweepParams::from_config(&self.config);

        let (raw, backend) = self.run_backend(&input, &params)?;
        self.last_backend = Some(backend);

        let output = SweepOutput::assemble(raw, depths, &self.config, target, range);
        if let Some(depth) = &output.depth {
            info!(
                "frame {target}: {} source view(s), {} planes, {}×{}, {}/{} pixels matched, {:?} backend, {:.1} ms",
                input.sources.len(),
                self.config.num_planes,
                depth.width(),
                depth.height(),
                depth.valid_pixel_count(),
                depth.width() * depth.height(),
                backend,
                t0.elapsed().as_secs_f64() * 1e3
            );
        }
        Ok(output)
    }

    fn run_backend(&mut self, input: &SweepInput, params: &SweepParams) -> Result<(RawSweep, Backend), SweepError> {
        match self.config.backend {
            Backend::Cpu => Ok((sweep_cpu(input, params), Backend::Cpu)),
            Backend::Gpu => {
                let ctx = self.gpu_context()?;
                Ok((ctx.pipeline.run(&ctx.device, input, params)?, Backend::Gpu))
            }
            Backend::Auto => {
                if self.gpu_unavailable {
                    return Ok((sweep_cpu(input, params), Backend::Cpu));
                }
                let result = self
                    .gpu_context()
                    .and_then(|ctx| ctx.pipeline.run(&ctx.device, input, params));
                match result {
                    Ok(raw) => Ok((raw, Backend::Gpu)),
                    Err(e) => {
                        warn!("GPU sweep unavailable ({e}); falling back to the CPU backend");
                        if !matches!(e, GpuError::BufferTooLarge { .. }) {
                            self.gpu_unavailable = true;
                        }
                        Ok((sweep_cpu(input, params), Backend::Cpu))
                    }
                }
            }
        }
    }

    fn gpu_context(&mut self) -> Result<&GpuContext, GpuError> {
        if self.gpu.is_none() {
            self.gpu = Some(GpuContext::new()?);
        }
        self.gpu.as_ref().ok_or(GpuError::NoSuitableAdapter)
    }
}

fn log_config(config: &SweepConfig) {
    match config.to_document() {
        Ok(doc) => info!("plane sweep configuration: {doc}"),
        Err(e) => debug!("could not serialise configuration: {e}"),
    }
}

/// Frames to upload for `target`, in ascending id order.
///
/// # Errors
/// `TargetNotFound` if `target` is not stored, or (FIRST) not among the
/// selected frames.
pub fn select_views<'a>(
    store: &'a FrameStore,
    target: i32,
    selection: &ViewSelection,
) -> Result<Vec<&'a Frame>, SweepError> {
    let target_frame = store.get(target).ok_or(SweepError::TargetNotFound(target))?;

    let frames: Vec<&Frame> = match (selection.mode, selection.max_views) {
        (ViewSelectionMode::All, _) | (_, None) => store.iter().collect(),
        (ViewSelectionMode::First, Some(n)) => {
            let first: Vec<&Frame> = store.iter().take(n).collect();
            if !first.iter().any(|f| f.id == target) {
                return Err(SweepError::TargetNotFound(target));
            }
            first
        }
        (ViewSelectionMode::Nearest, Some(n)) => {
            let c = target_frame.camera.center();
            let mut others: Vec<(f64, &Frame)> = store
                .iter()
                .filter(|f| f.id != target)
                .map(|f| ((f.camera.center() - c).norm(), f))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

            let mut chosen: Vec<&Frame> = others.into_iter().take(n.saturating_sub(1)).map(|(_, f)| f).collect();
            chosen.push(target_frame);
            chosen.sort_by_key(|f| f.id);
            chosen
        }
    };
    Ok(frames)
}
