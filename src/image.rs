// image.rs — Runtime-sized single-plane image, generic over pixel type.
//
// Every stage of the sweep works on planes: the reference and source views
// are split into one `Image<f32>` per channel (raw intensities in [0, 255]),
// warped views are `Image<f32>`, cost slices and depth buffers are
// `Image<f32>`. Interleaved 8-bit frames as handed in by the caller live in
// frame.rs and are converted to planes by convert.rs.
//
// Memory layout is row-major with an explicit stride (in elements):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|
//
// BORDER HANDLING: every sampler in this crate clamps to the edge. The GPU
// kernels do the same in plane_sweep.wgsl, which is what makes the CPU
// reference and the GPU output comparable pixel-for-pixel.

use std::fmt;

use rayon::prelude::*;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// `Send + Sync` is required so row-parallel loops (rayon) can share and
/// split images across worker threads.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Raw value as f32 (42u8 -> 42.0).
    fn to_f32(self) -> f32;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        // Raw cast: 42u8 -> 42.0. SAD costs are reported in these units.
        self as f32
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

// Manual Clone: this is a deep copy of the pixel buffer, never cheap.
impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (stride == width).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image::from_vec(width, height, data)
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get the pixel at (x, y) with both coordinates clamped into the image.
    ///
    /// This is the clamp-to-edge addressing used by window costs and by the
    /// box filter in convolution.rs.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.stride + cx]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row (active pixels only, no stride padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Parallel iterator over `(y, row)` pairs, rows without padding.
    ///
    /// The sweep stages fill their outputs through this: each rayon task owns
    /// a disjoint `&mut [T]`, so no synchronisation is needed.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = (usize, &mut [T])> + '_ {
        let width = self.width;
        self.data
            .par_chunks_mut(self.stride.max(1))
            .take(self.height)
            .map(move |row| &mut row[..width])
            .enumerate()
    }

    /// Iterate over all pixels as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Access the underlying data as a flat slice (includes stride padding).
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying data.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy the active pixels into a tightly packed vector (stride == width).
    pub fn to_packed_vec(&self) -> Vec<T> {
        if self.stride == self.width {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Bilinear Interpolation
// ---------------------------------------------------------------------------

/// Bilinear interpolation for sub-pixel access on an f32 image.
///
/// **Boundary handling:** coordinates are clamped to `[0, w-1] × [0, h-1]`
/// (edge pixels replicated). Homography warps routinely land outside the
/// source view; clamping keeps those samples finite and matches
/// `view_bilinear` in plane_sweep.wgsl.
///
/// # Panics
/// Panics if the image is empty (width or height is 0).
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    assert!(img.width() > 0 && img.height() > 0, "cannot interpolate on an empty image");

    let max_x = (img.width() - 1) as f32;
    let max_y = (img.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    // SAFETY: x and y are clamped into the valid coordinate range above.
    unsafe { interpolate_bilinear_unchecked(img, x, y) }
}

/// Bilinear interpolation without the assert or clamp overhead.
///
/// # Safety
/// Caller must guarantee:
///   - img is non-empty
///   - x is in [0.0, width-1] and y is in [0.0, height-1]
#[inline(always)]
pub unsafe fn interpolate_bilinear_unchecked(img: &Image<f32>, x: f32, y: f32) -> f32 {
    let x0 = x as usize; // floor for non-negative
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let w = img.width();
    let x1 = if x0 + 1 < w { x0 + 1 } else { x0 };
    let h = img.height();
    let y1 = if y0 + 1 < h { y0 + 1 } else { y0 };

    let p00 = img.get_unchecked(x0, y0);
    let p10 = img.get_unchecked(x1, y0);
    let p01 = img.get_unchecked(x0, y1);
    let p11 = img.get_unchecked(x1, y1);

    // Same evaluation order as mix(mix(p00, p10, fx), mix(p01, p11, fx), fy)
    // in the shader.
    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    top + (bottom - top) * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_u8() {
        let img: Image<u8> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.stride(), 10);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, 0u8);
        }
    }

    #[test]
    fn test_from_fn_layout() {
        let img = Image::from_fn(4, 3, |x, y| (y * 4 + x) as u8);
        assert_eq!(img.row(0), &[0, 1, 2, 3]);
        assert_eq!(img.row(2), &[8, 9, 10, 11]);
    }

    #[test]
    fn test_get_clamped() {
        let img = Image::from_fn(3, 2, |x, y| (y * 3 + x) as f32);
        assert_eq!(img.get_clamped(-5, 0), 0.0);
        assert_eq!(img.get_clamped(10, 0), 2.0);
        assert_eq!(img.get_clamped(1, 7), 4.0);
        assert_eq!(img.get_clamped(-1, -1), 0.0);
    }

    #[test]
    fn test_par_rows_mut_skips_padding() {
        let mut img: Image<f32> = Image::new_with_stride(3, 4, 5);
        img.par_rows_mut().for_each(|(y, row)| {
            assert_eq!(row.len(), 3);
            for v in row.iter_mut() {
                *v = y as f32;
            }
        });
        for y in 0..4 {
            assert_eq!(img.row(y), &[y as f32; 3]);
        }
        assert_eq!(img.to_packed_vec().len(), 12);
    }

    #[test]
    fn test_bilinear_at_integer() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let img = Image::from_vec(3, 3, data);
        assert!((interpolate_bilinear(&img, 0.0, 0.0) - 1.0).abs() < 1e-6);
        assert!((interpolate_bilinear(&img, 1.0, 1.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = Image::from_vec(2, 2, vec![0.0, 10.0, 20.0, 30.0]);
        let v = interpolate_bilinear(&img, 0.5, 0.5);
        assert!((v - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_boundary_clamp() {
        let img = Image::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert!((interpolate_bilinear(&img, 1.0, 1.0) - 4.0).abs() < 1e-6);
        assert!((interpolate_bilinear(&img, 5.0, 5.0) - 4.0).abs() < 1e-6);
        assert!((interpolate_bilinear(&img, -1.0, -1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<u8> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "stride")]
    fn test_stride_less_than_width() {
        let _img: Image<u8> = Image::new_with_stride(10, 5, 8);
    }
}
