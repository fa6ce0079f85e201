// config.rs — Configuration resolver.
//
// Turns a structured document (serde_json::Value) into a fully resolved
// `SweepConfig`. Every option except `pinhole_intrinsics` is optional and has
// a hardcoded default; every present option is type-checked and validated
// before anything is applied, so a rejected document never leaves a
// half-applied configuration behind.
//
// The resolved config serialises back to the same document shape
// (`to_document`), which is how it is logged and how tests check the
// defaults table.
//
// Enum-valued options are parsed through serde: the variant names are the
// SCREAMING_SNAKE_CASE strings of the document ("REF_SPLIT", "ZNCC", ...).

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::camera::PinholeIntrinsics;
use crate::error::ConfigError;

/// Largest `best_k` the GPU kernel can hold in registers.
pub const MAX_BEST_K: usize = 16;

pub const DEFAULT_SCALE: f64 = 0.25;
pub const DEFAULT_WINDOW: usize = 7;
pub const DEFAULT_NUM_PLANES: usize = 256;
pub const DEFAULT_MIN_CAMERA_PAIRS: usize = 2;

// ---------------------------------------------------------------------------
// Option enums
// ---------------------------------------------------------------------------

/// How per-view costs are combined at each pixel and plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcclusionMode {
    /// Plain mean over all contributing views.
    None,
    /// Views before / after the reference (upload order) are averaged
    /// separately; the lower of the two means wins.
    RefSplit,
    /// Mean of the `best_k` lowest per-view costs.
    BestK,
}

/// Spacing law of the sweep planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaneGenerationMode {
    UniformDepth,
    UniformDisparity,
}

/// Photo-consistency metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingCost {
    Sad,
    Zncc,
}

/// Parameter space in which the sub-pixel parabola offset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubPixelMode {
    Direct,
    Inverse,
}

/// Which stored frames are uploaded for a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewSelectionMode {
    /// Every stored frame.
    All,
    /// The first `max_views` frames in ascending id order.
    First,
    /// The target plus its `max_views - 1` nearest frames by camera centre.
    Nearest,
}

/// Where the cost volume is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Backend {
    Cpu,
    Gpu,
    /// GPU when an adapter is available, CPU otherwise.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: usize,
    pub height: usize,
}

impl WindowSize {
    /// Half extents (window is `2*hx+1 × 2*hy+1`).
    pub fn half(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSelection {
    pub mode: ViewSelectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_views: Option<usize>,
}

impl Default for ViewSelection {
    fn default() -> Self {
        ViewSelection { mode: ViewSelectionMode::All, max_views: None }
    }
}

// ---------------------------------------------------------------------------
// SweepConfig
// ---------------------------------------------------------------------------

/// Fully resolved engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepConfig {
    pub pinhole_intrinsics: PinholeIntrinsics,
    /// Image resize factor applied before matching.
    pub scale: f64,
    pub match_window_size: WindowSize,
    pub num_planes: usize,
    pub occlusion_mode: OcclusionMode,
    /// Set iff `occlusion_mode == BestK`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_k: Option<usize>,
    pub plane_generation_mode: PlaneGenerationMode,
    pub matching_costs: MatchingCost,
    pub sub_pixel_interpolation_mode: SubPixelMode,
    pub enable_color_matching: bool,
    pub enable_output_best_costs: bool,
    pub enable_output_best_depth: bool,
    pub enable_output_cost_volume: bool,
    pub enable_output_uniqueness_ratio: bool,
    pub enable_sub_pixel: bool,
    pub view_selection: ViewSelection,
    /// Minimum number of camera pairs required to estimate the depth range.
    pub min_camera_pairs: usize,
    pub backend: Backend,
}

const KNOWN_KEYS: &[&str] = &[
    "pinhole_intrinsics",
    "scale",
    "match_window_size",
    "num_planes",
    "occlusion_mode",
    "best_k",
    "plane_generation_mode",
    "matching_costs",
    "sub_pixel_interpolation_mode",
    "enable_color_matching",
    "enable_output_best_costs",
    "enable_output_best_depth",
    "enable_output_cost_volume",
    "enable_output_uniqueness_ratio",
    "enable_sub_pixel",
    "view_selection",
    "min_camera_pairs",
    "backend",
];

impl SweepConfig {
    /// Every option at its default, with the given intrinsics.
    pub fn with_intrinsics(pinhole_intrinsics: PinholeIntrinsics) -> Self {
        SweepConfig {
            pinhole_intrinsics,
            scale: DEFAULT_SCALE,
            match_window_size: WindowSize { width: DEFAULT_WINDOW, height: DEFAULT_WINDOW },
            num_planes: DEFAULT_NUM_PLANES,
            occlusion_mode: OcclusionMode::RefSplit,
            best_k: None,
            plane_generation_mode: PlaneGenerationMode::UniformDisparity,
            matching_costs: MatchingCost::Sad,
            sub_pixel_interpolation_mode: SubPixelMode::Inverse,
            enable_color_matching: true,
            enable_output_best_costs: false,
            enable_output_best_depth: true,
            enable_output_cost_volume: false,
            enable_output_uniqueness_ratio: false,
            enable_sub_pixel: true,
            view_selection: ViewSelection::default(),
            min_camera_pairs: DEFAULT_MIN_CAMERA_PAIRS,
            backend: Backend::Auto,
        }
    }

    /// Resolve a configuration document.
    ///
    /// # Errors
    /// The first problem found, as a typed [`ConfigError`].
    pub fn resolve(doc: &Value) -> Result<Self, ConfigError> {
        let obj = doc.as_object().ok_or(ConfigError::NotAnObject)?;

        for key in obj.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!("ignoring unknown configuration key `{key}`");
            }
        }

        let intrinsics = parse_intrinsics(obj)?;
        let mut cfg = SweepConfig::with_intrinsics(intrinsics);

        if let Some(v) = obj.get("scale") {
            let scale = as_f64("scale", v)?;
            if !(scale > 0.0 && scale.is_finite()) {
                return Err(invalid("scale", format!("must be a positive number, got {scale}")));
            }
            cfg.scale = scale;
        }

        if let Some(v) = obj.get("match_window_size") {
            let group = v.as_object().ok_or_else(|| wrong_type("match_window_size", "an object"))?;
            let width = required_usize(group, "match_window_size", "width")?;
            let height = required_usize(group, "match_window_size", "height")?;
            for (name, size) in [("match_window_size.width", width), ("match_window_size.height", height)] {
                if size == 0 || size % 2 == 0 {
                    return Err(invalid(name, format!("must be a positive odd integer, got {size}")));
                }
            }
            cfg.match_window_size = WindowSize { width, height };
        }

        if let Some(v) = obj.get("num_planes") {
            let n = as_usize("num_planes", v)?;
            if n < 2 {
                return Err(invalid("num_planes", format!("at least 2 planes are required, got {n}")));
            }
            cfg.num_planes = n;
        }

        if let Some(v) = obj.get("occlusion_mode") {
            cfg.occlusion_mode = parse_enum("occlusion_mode", v, "NONE, REF_SPLIT, BEST_K")?;
        }
        if cfg.occlusion_mode == OcclusionMode::BestK {
            let v = obj.get("best_k").ok_or(ConfigError::InvalidValue {
                key: "best_k".into(),
                reason: "occlusion_mode is BEST_K, but best_k is not set".into(),
            })?;
            let k = as_usize("best_k", v)?;
            if k == 0 || k > MAX_BEST_K {
                return Err(invalid("best_k", format!("must be in 1..={MAX_BEST_K}, got {k}")));
            }
            cfg.best_k = Some(k);
        }

        if let Some(v) = obj.get("plane_generation_mode") {
            cfg.plane_generation_mode =
                parse_enum("plane_generation_mode", v, "UNIFORM_DEPTH, UNIFORM_DISPARITY")?;
        }
        if let Some(v) = obj.get("matching_costs") {
            cfg.matching_costs = parse_enum("matching_costs", v, "SAD, ZNCC")?;
        }
        if let Some(v) = obj.get("sub_pixel_interpolation_mode") {
            cfg.sub_pixel_interpolation_mode =
                parse_enum("sub_pixel_interpolation_mode", v, "DIRECT, INVERSE")?;
        }

        let flags: [(&str, &mut bool); 6] = [
            ("enable_color_matching", &mut cfg.enable_color_matching),
            ("enable_output_best_costs", &mut cfg.enable_output_best_costs),
            ("enable_output_best_depth", &mut cfg.enable_output_best_depth),
            ("enable_output_cost_volume", &mut cfg.enable_output_cost_volume),
            ("enable_output_uniqueness_ratio", &mut cfg.enable_output_uniqueness_ratio),
            ("enable_sub_pixel", &mut cfg.enable_sub_pixel),
        ];
        for (key, slot) in flags {
            if let Some(v) = obj.get(key) {
                *slot = v.as_bool().ok_or_else(|| wrong_type(key, "a boolean"))?;
            }
        }

        if let Some(v) = obj.get("view_selection") {
            cfg.view_selection = parse_view_selection(v)?;
        }

        if let Some(v) = obj.get("min_camera_pairs") {
            let n = as_usize("min_camera_pairs", v)?;
            if n == 0 {
                return Err(invalid("min_camera_pairs", "must be at least 1".into()));
            }
            cfg.min_camera_pairs = n;
        }

        if let Some(v) = obj.get("backend") {
            cfg.backend = parse_enum("backend", v, "CPU, GPU, AUTO")?;
        }

        Ok(cfg)
    }

    /// Serialise back into the document shape accepted by [`Self::resolve`].
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Effective K for the given best_k setting (0 when not BEST_K).
    pub fn best_k_or_zero(&self) -> usize {
        self.best_k.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn parse_intrinsics(obj: &Map<String, Value>) -> Result<PinholeIntrinsics, ConfigError> {
    const GROUP: &str = "pinhole_intrinsics";
    let group = obj
        .get(GROUP)
        .ok_or(ConfigError::MissingGroup { group: GROUP })?
        .as_object()
        .ok_or_else(|| wrong_type(GROUP, "an object"))?;

    let mut values = [0.0f64; 4];
    for (slot, field) in values.iter_mut().zip(["fx", "fy", "cx", "cy"]) {
        let v = group
            .get(field)
            .ok_or(ConfigError::MissingField { group: GROUP, field })?;
        *slot = as_f64(&format!("{GROUP}.{field}"), v)?;
    }
    let [fx, fy, cx, cy] = values;
    Ok(PinholeIntrinsics { fx, fy, cx, cy })
}

fn parse_view_selection(v: &Value) -> Result<ViewSelection, ConfigError> {
    let group = v.as_object().ok_or_else(|| wrong_type("view_selection", "an object"))?;
    let mode = match group.get("mode") {
        Some(m) => parse_enum("view_selection.mode", m, "ALL, FIRST, NEAREST")?,
        None => ViewSelectionMode::All,
    };
    let max_views = group
        .get("max_views")
        .map(|m| as_usize("view_selection.max_views", m))
        .transpose()?;

    match (mode, max_views) {
        (ViewSelectionMode::All, _) => Ok(ViewSelection { mode, max_views: None }),
        (_, None) => Err(ConfigError::MissingField { group: "view_selection", field: "max_views" }),
        (_, Some(n)) if n < 2 => Err(invalid(
            "view_selection.max_views",
            format!("a reference and at least one source view are needed, got {n}"),
        )),
        (_, Some(n)) => Ok(ViewSelection { mode, max_views: Some(n) }),
    }
}

fn parse_enum<T: DeserializeOwned>(key: &'static str, v: &Value, expected: &'static str) -> Result<T, ConfigError> {
    let s = v.as_str().ok_or_else(|| wrong_type(key, "a string"))?;
    serde_json::from_value(Value::String(s.to_owned())).map_err(|_| ConfigError::UnknownVariant {
        key,
        value: s.to_owned(),
        expected,
    })
}

fn as_f64(key: &str, v: &Value) -> Result<f64, ConfigError> {
    v.as_f64().ok_or_else(|| wrong_type(key, "a number"))
}

fn as_usize(key: &str, v: &Value) -> Result<usize, ConfigError> {
    v.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| wrong_type(key, "a non-negative integer"))
}

fn required_usize(
    group: &Map<String, Value>,
    group_name: &'static str,
    field: &'static str,
) -> Result<usize, ConfigError> {
    let v = group
        .get(field)
        .ok_or(ConfigError::MissingField { group: group_name, field })?;
    as_usize(&format!("{group_name}.{field}"), v)
}

fn wrong_type(key: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType { key: key.to_owned(), expected }
}

fn invalid(key: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_owned(), reason }
}
