// plane-sweep: multi-view plane-sweep stereo
//
// CPU reference engine plus a wgpu compute backend. Frames are stored with
// their world→camera poses; `PlaneSweeper::process` sweeps fronto-parallel
// planes through the reference camera and returns a per-pixel depth map.
//
// Reference: Collins, "A Space-Sweep Approach to True Multi-Image Matching"
// (CVPR 1996); Gallup et al., "Real-Time Plane-Sweeping Stereo with Multiple
// Sweeping Directions" (CVPR 2007)

pub mod image;
pub mod convert;
pub mod convolution;
pub mod resample;

pub mod camera;
pub mod frame;
pub mod range;
pub mod config;
pub mod error;

pub mod planes;
pub mod warp;
pub mod cost;
pub mod occlusion;
pub mod sweep;
pub mod depth;
pub mod sweeper;

pub mod gpu;

pub use camera::{CameraMatrix, PinholeIntrinsics};
pub use config::{Backend, MatchingCost, OcclusionMode, PlaneGenerationMode, SubPixelMode, SweepConfig, ViewSelectionMode};
pub use depth::{CostVolume, DepthMap, SweepOutput};
pub use error::{ConfigError, InputError, SweepError};
pub use frame::FrameImage;
pub use range::DepthRange;
pub use sweeper::PlaneSweeper;
