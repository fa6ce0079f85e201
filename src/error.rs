// error.rs — Error taxonomy for the plane-sweep engine.
//
// Three families, matching when they can occur:
//   ConfigError — while resolving a configuration document (new / set_configs)
//   InputError  — while adding a frame (malformed image buffer)
//   SweepError  — the top-level error returned by every public operation;
//                 wraps the two above plus the state errors of `process`.
//
// GpuError lives in gpu::device next to the code that produces it and is
// wrapped here via `#[from]`.

use thiserror::Error;

use crate::gpu::device::GpuError;

/// Configuration document rejected by the resolver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("configuration must be a JSON object")]
    NotAnObject,

    #[error("configuration must contain `{group}`")]
    MissingGroup { group: &'static str },

    #[error("`{group}` must contain `{field}`")]
    MissingField {
        group: &'static str,
        field: &'static str,
    },

    #[error("`{key}` must be {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
    },

    #[error("`{key}` must be one of {expected}, got {value:?}")]
    UnknownVariant {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("`{key}` is invalid: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Image buffer rejected by `add_frame`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("image rows are not contiguous (stride {stride} bytes, expected {expected})")]
    NonContiguous { stride: usize, expected: usize },

    #[error("image must have 1 or 3 channels, got {0}")]
    UnsupportedChannels(usize),

    #[error("image buffer holds {actual} bytes, expected {expected}")]
    BufferSize { actual: usize, expected: usize },

    #[error("image has zero width or height")]
    EmptyImage,
}

/// Any failure surfaced by [`crate::sweeper::PlaneSweeper`].
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid frame: {0}")]
    Input(#[from] InputError),

    #[error(
        "could not compute average camera distance: {pairs} camera pair(s) found, \
         at least {required} required"
    )]
    InsufficientFrames { pairs: usize, required: usize },

    #[error("all camera centres coincide; depth range is undefined")]
    DegenerateBaseline,

    #[error("target frame {0} not found among the uploaded frames")]
    TargetNotFound(i32),

    #[error("no source view available besides the reference frame")]
    NoSourceViews,

    #[error("best depth output is disabled (enable_output_best_depth = false)")]
    DepthOutputDisabled,

    #[error("gpu: {0}")]
    Gpu(#[from] GpuError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let e = ConfigError::MissingField { group: "pinhole_intrinsics", field: "fx" };
        assert_eq!(e.to_string(), "`pinhole_intrinsics` must contain `fx`");

        let e = ConfigError::UnknownVariant {
            key: "matching_costs",
            value: "NCC".into(),
            expected: "SAD, ZNCC",
        };
        assert!(e.to_string().contains("\"NCC\""));
    }

    #[test]
    fn test_sweep_error_wraps_config() {
        let e: SweepError = ConfigError::NotAnObject.into();
        assert!(matches!(e, SweepError::Config(ConfigError::NotAnObject)));
    }

    #[test]
    fn test_insufficient_frames_message() {
        let e = SweepError::InsufficientFrames { pairs: 1, required: 2 };
        let msg = e.to_string();
        assert!(msg.contains("1 camera pair"));
        assert!(msg.contains("at least 2"));
    }
}
