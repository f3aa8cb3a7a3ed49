// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pinhole camera projection for a calibrated RGB-D rig.

use nalgebra::{Matrix3x4, Vector3, Vector4};

/// Calibrated camera: fixed 3×4 intrinsic projection matrix
/// plus the image bounds used to clip projected pixels.
#[derive(Debug, Clone)]
pub struct Camera {
    proj: Matrix3x4<f64>,
    width: usize,
    height: usize,
}

impl Camera {
    pub fn new(proj: Matrix3x4<f64>, width: usize, height: usize) -> Self {
        Self {
            proj,
            width,
            height,
        }
    }

    /// Intrinsics of the RealSense rig the recordings were made with.
    #[rustfmt::skip]
    pub fn default_rig() -> Self {
        let proj = Matrix3x4::new(
            918.359130859375, 0.0, 645.8908081054688, 0.0,
            0.0, 916.265869140625, 354.02392578125, 0.0,
            0.0, 0.0, 1.0, 0.0,
        );
        Self::new(proj, 1280, 720)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Focal lengths and principal point, read out of the projection matrix.
    pub fn intrinsics(&self) -> (f64, f64, f64, f64) {
        (
            self.proj[(0, 0)],
            self.proj[(1, 1)],
            self.proj[(0, 2)],
            self.proj[(1, 2)],
        )
    }

    /// Project a camera-frame point to integer pixel coordinates `(u, v)`,
    /// clipped to the image bounds.
    pub fn project(&self, p: &Vector3<f64>) -> (usize, usize) {
        let hom = self.proj * Vector4::new(p.x, p.y, p.z, 1.0);
        let u = (hom.x / hom.z).floor();
        let v = (hom.y / hom.z).floor();
        let u = (u.max(0.0) as usize).min(self.width - 1);
        let v = (v.max(0.0) as usize).min(self.height - 1);
        (u, v)
    }

    /// Back-project pixel `(u, v)` at depth `z` (metres) into the camera frame.
    pub fn unproject(&self, u: f64, v: f64, z: f64) -> Vector3<f64> {
        let (fx, fy, cx, cy) = self.intrinsics();
        Vector3::new((u - cx) * z / fx, (v - cy) * z / fy, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_point_projects_to_image_center() {
        let cam = Camera::default_rig();
        let (u, v) = cam.project(&Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(u, 645);
        assert_eq!(v, 354);
    }

    #[test]
    fn projection_is_clipped_to_bounds() {
        let cam = Camera::default_rig();
        let (u, v) = cam.project(&Vector3::new(10.0, 10.0, 0.5));
        assert_eq!(u, 1279);
        assert_eq!(v, 719);
        let (u, v) = cam.project(&Vector3::new(-10.0, -10.0, 0.5));
        assert_eq!(u, 0);
        assert_eq!(v, 0);
    }

    #[test]
    fn unproject_inverts_project() {
        let cam = Camera::default_rig();
        let p = Vector3::new(0.05, -0.02, 0.7);
        let hom = cam.unproject(
            918.359130859375 * p.x / p.z + 645.8908081054688,
            916.265869140625 * p.y / p.z + 354.02392578125,
            p.z,
        );
        assert!((hom - p).norm() < 1e-9);
    }
}
