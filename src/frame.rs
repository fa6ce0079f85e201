// frame.rs — Posed input frames and the store that owns them.
//
// `FrameImage` is the caller-facing image: interleaved 8-bit, 1 or 3
// channels, H×W×C, with a row stride in bytes. Only contiguous images
// (stride == width * channels) are accepted by the store; strided images
// can still be built, e.g. as views into a larger buffer, and compacted with
// `to_contiguous()` before being added.
//
// `FrameStore` keys frames by caller-assigned integer id. A BTreeMap keeps
// `ids()` in ascending order, which is also the "upload order" used by the
// view selector and by the REF_SPLIT occlusion mode.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::camera::CameraMatrix;
use crate::error::InputError;

/// Interleaved 8-bit image, H×W×C with C ∈ {1, 3}.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameImage {
    width: usize,
    height: usize,
    channels: usize,
    /// Row stride in bytes, >= width * channels.
    stride: usize,
    data: Vec<u8>,
}

impl FrameImage {
    /// Build a contiguous image from packed row-major data.
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, InputError> {
        Self::with_stride(width, height, channels, width * channels, data)
    }

    /// Build an image whose rows are `stride` bytes apart.
    ///
    /// The buffer must hold `stride * (height - 1) + width * channels` bytes
    /// at least.
    pub fn with_stride(
        width: usize,
        height: usize,
        channels: usize,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self, InputError> {
        if channels != 1 && channels != 3 {
            return Err(InputError::UnsupportedChannels(channels));
        }
        if width == 0 || height == 0 {
            return Err(InputError::EmptyImage);
        }
        let row_bytes = width * channels;
        if stride < row_bytes {
            return Err(InputError::NonContiguous { stride, expected: row_bytes });
        }
        let expected = stride * (height - 1) + row_bytes;
        if data.len() < expected {
            return Err(InputError::BufferSize { actual: data.len(), expected });
        }
        Ok(FrameImage { width, height, channels, stride, data })
    }

    /// Grayscale image from a closure, handy for synthetic scenes.
    ///
    /// # Errors
    /// `InputError::EmptyImage` if either dimension is zero.
    pub fn from_gray_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> u8,
    ) -> Result<Self, InputError> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, 1, data)
    }

    /// RGB image from a closure returning `[r, g, b]`.
    pub fn from_rgb_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> [u8; 3],
    ) -> Result<Self, InputError> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self::new(width, height, 3, data)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// True when rows are packed back to back.
    pub fn is_contiguous(&self) -> bool {
        self.stride == self.width * self.channels
    }

    /// Channel `c` of pixel (x, y).
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> u8 {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "pixel ({x},{y},{c}) out of bounds for image {}×{}×{}",
            self.width, self.height, self.channels,
        );
        self.data[y * self.stride + x * self.channels + c]
    }

    /// Active bytes of row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * self.channels]
    }

    /// Copy into a packed image (no-op clone when already contiguous).
    pub fn to_contiguous(&self) -> FrameImage {
        if self.is_contiguous() {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width * self.height * self.channels);
        for y in 0..self.height {
            data.extend_from_slice(self.row(y));
        }
        FrameImage {
            width: self.width,
            height: self.height,
            channels: self.channels,
            stride: self.width * self.channels,
            data,
        }
    }
}

impl std::fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FrameImage {{ {}×{}×{}, stride={} }}",
            self.width, self.height, self.channels, self.stride
        )
    }
}

/// One posed frame: image plus camera.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: i32,
    pub image: FrameImage,
    pub camera: CameraMatrix,
}

/// Split a 4×4 world-to-camera pose into (R, t).
///
/// R is the top-left 3×3 block and t the top-right 3×1 block; the bottom
/// row is ignored.
pub fn decompose_pose(pose: &Matrix4<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let r: Matrix3<f64> = pose.fixed_view::<3, 3>(0, 0).into_owned();
    let t: Vector3<f64> = pose.fixed_view::<3, 1>(0, 3).into_owned();
    (r, t)
}

/// Frames keyed by id. The shared intrinsics K are applied to every frame
/// at insertion time.
#[derive(Debug, Clone)]
pub struct FrameStore {
    k: Matrix3<f64>,
    frames: BTreeMap<i32, Frame>,
}

impl FrameStore {
    pub fn new(k: Matrix3<f64>) -> Self {
        FrameStore { k, frames: BTreeMap::new() }
    }

    /// Intrinsics used for frames added from now on.
    ///
    /// Frames already stored keep the K they were added with.
    pub fn set_intrinsics(&mut self, k: Matrix3<f64>) {
        self.k = k;
    }

    /// Insert or overwrite frame `id`.
    ///
    /// # Errors
    /// `InputError::EmptyImage` for a zero-sized image and
    /// `InputError::NonContiguous` if the image rows are padded. Channel
    /// count and buffer size are already guaranteed by `FrameImage`'s
    /// constructors. On error the store is left untouched.
    pub fn add(&mut self, id: i32, image: FrameImage, pose: &Matrix4<f64>) -> Result<(), InputError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(InputError::EmptyImage);
        }
        if !image.is_contiguous() {
            return Err(InputError::NonContiguous {
                stride: image.stride(),
                expected: image.width() * image.channels(),
            });
        }
        let (r, t) = decompose_pose(pose);
        let mut camera = CameraMatrix::default();
        camera.set_krt(self.k, r, t);
        self.frames.insert(id, Frame { id, image, camera });
        Ok(())
    }

    /// Remove frame `id`; absent ids are ignored.
    pub fn remove(&mut self, id: i32) -> Option<Frame> {
        self.frames.remove(&id)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Stored ids in ascending order.
    pub fn ids(&self) -> Vec<i32> {
        self.frames.keys().copied().collect()
    }

    pub fn get(&self, id: i32) -> Option<&Frame> {
        self.frames.get(&id)
    }

    /// Frames in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.values()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
