// gpu/mod.rs — GPU backend for the plane sweep.
//
// wgpu compute kernels that mirror `sweep::sweep_cpu`. The CPU engine stays
// the reference; the GPU path is validated against it on synthetic scenes.
//
//   CPU: range estimate, view selection, resampling, homographies
//   GPU: per-plane window costs and aggregation, best-plane selection
//
// Both backends fill the same `depth::RawSweep`, so everything after the
// sweep is shared.

pub mod buffer;
pub mod device;
pub mod sweep;
