// camera.rs -- Pinhole camera with world->camera extrinsics.
//
// Convention (x_cam = R * X_world + t, pixel ~ K * x_cam):
//   - R, t are the world-to-camera rotation and translation, as taken from
//     the top 3x4 block of the pose passed to `add_frame`.
//   - The camera centre in world coordinates is C = -R^T t.
//
// The sweep needs one thing beyond projection: the homography that maps a
// reference pixel onto a source view through the fronto-parallel plane
// z_ref = d. For a plane n^T X_ref = d in reference camera coordinates,
//
//   H(d) = K_v (R_rel + t_rel n^T / d) K_ref^-1
//        = A + b m^T / d
//
// with R_rel = R_v R_ref^T, t_rel = t_v - R_rel t_ref, A = K_v R_rel K_ref^-1,
// b = K_v t_rel and m^T = n^T K_ref^-1. A, b and m do not depend on the plane,
// so the GPU receives them once per view and rebuilds H per plane.
//
// No validation is done on K, R or t; a non-orthonormal R simply produces a
// wrong geometry.

use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Minimum homogeneous depth for a projected point to count as "in front".
pub const MIN_PROJECTION_DEPTH: f64 = 1e-9;

/// Pinhole intrinsics shared by every frame of a rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    /// Focal length in pixels (x-axis).
    pub fx: f64,
    /// Focal length in pixels (y-axis).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl PinholeIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        PinholeIntrinsics { fx, fy, cx, cy }
    }

    /// The 3x3 calibration matrix.
    ///
    /// ```text
    /// | fx  0  cx |
    /// |  0 fy  cy |
    /// |  0  0   1 |
    /// ```
    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx,
            0.0, self.fy, self.cy,
            0.0, 0.0, 1.0,
        )
    }
}

/// Full projection model of one frame: K, R, t.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMatrix {
    k: Matrix3<f64>,
    r: Matrix3<f64>,
    t: Vector3<f64>,
}

impl Default for CameraMatrix {
    /// Identity intrinsics and extrinsics: camera at the world origin.
    fn default() -> Self {
        CameraMatrix {
            k: Matrix3::identity(),
            r: Matrix3::identity(),
            t: Vector3::zeros(),
        }
    }
}

impl CameraMatrix {
    pub fn new(k: Matrix3<f64>, r: Matrix3<f64>, t: Vector3<f64>) -> Self {
        CameraMatrix { k, r, t }
    }

    /// Replace all projection parameters at once.
    pub fn set_krt(&mut self, k: Matrix3<f64>, r: Matrix3<f64>, t: Vector3<f64>) {
        self.k = k;
        self.r = r;
        self.t = t;
    }

    #[inline]
    pub fn k(&self) -> &Matrix3<f64> {
        &self.k
    }

    #[inline]
    pub fn r(&self) -> &Matrix3<f64> {
        &self.r
    }

    #[inline]
    pub fn t(&self) -> &Vector3<f64> {
        &self.t
    }

    /// Camera centre in world coordinates, C = -R^T t.
    pub fn center(&self) -> Point3<f64> {
        Point3::from(-(self.r.transpose() * self.t))
    }

    /// World point to camera coordinates.
    pub fn to_camera(&self, world: &Point3<f64>) -> Vector3<f64> {
        self.r * world.coords + self.t
    }

    /// Project a world point to pixel coordinates.
    ///
    /// Returns `None` when the point lies on or behind the camera plane.
    pub fn project(&self, world: &Point3<f64>) -> Option<Point2<f64>> {
        let p = self.k * self.to_camera(world);
        if p.z <= MIN_PROJECTION_DEPTH {
            return None;
        }
        Some(Point2::new(p.x / p.z, p.y / p.z))
    }

    /// Back-project pixel (u, v) at camera-frame depth `depth` to world.
    ///
    /// A singular K is treated as identity: a malformed camera yields a
    /// meaningless point, not a panic.
    pub fn unproject(&self, u: f64, v: f64, depth: f64) -> Point3<f64> {
        let k_inv = self.k.try_inverse().unwrap_or_else(Matrix3::identity);
        let ray = k_inv * Vector3::new(u, v, 1.0);
        let x_cam = ray * (depth / ray.z);
        Point3::from(self.r.transpose() * (x_cam - self.t))
    }

    /// The same camera for an image resized by factor `scale`.
    ///
    /// The first two rows of K are multiplied by `scale`, i.e. pixel
    /// coordinates map as u' = scale * u. resample.rs samples with the same
    /// convention so the two stay consistent.
    pub fn scaled(&self, scale: f64) -> CameraMatrix {
        let mut k = self.k;
        for c in 0..3 {
            k[(0, c)] *= scale;
            k[(1, c)] *= scale;
        }
        CameraMatrix { k, r: self.r, t: self.t }
    }

    /// Plane-independent parts of the reference->`view` plane homography.
    pub fn homography_basis(&self, view: &CameraMatrix) -> PlaneHomographyBasis {
        let k_ref_inv = self.k.try_inverse().unwrap_or_else(Matrix3::identity);
        let r_rel = view.r * self.r.transpose();
        let t_rel = view.t - r_rel * self.t;
        let n = Vector3::new(0.0, 0.0, 1.0);
        PlaneHomographyBasis {
            a: view.k * r_rel * k_ref_inv,
            b: view.k * t_rel,
            m: k_ref_inv.transpose() * n,
        }
    }

    /// Homography mapping reference pixels onto `view` through the plane
    /// z_ref = `depth`.
    pub fn plane_homography(&self, view: &CameraMatrix, depth: f64) -> Matrix3<f64> {
        self.homography_basis(view).at_depth(depth)
    }
}

/// H(d) = A + b m^T / d, see the module comment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneHomographyBasis {
    pub a: Matrix3<f64>,
    pub b: Vector3<f64>,
    pub m: Vector3<f64>,
}

impl PlaneHomographyBasis {
    pub fn at_depth(&self, depth: f64) -> Matrix3<f64> {
        self.a + self.b * self.m.transpose() / depth
    }
}
