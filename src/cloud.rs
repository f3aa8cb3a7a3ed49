// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Organised point cloud assembly and down-sampling.

use image::{ImageBuffer, Luma};
use nalgebra::{DMatrix, Vector3};
use std::collections::BTreeMap;

use crate::camera::Camera;
use crate::mask::Mask;
use crate::utils;

/// Depth image scale: RealSense depth PNGs store millimetres.
const DEPTH_SCALE: f64 = 1e-3;

/// Organised point cloud: one (possibly missing) 3D point per pixel,
/// row major, in the camera frame.
#[derive(Debug, Clone)]
pub struct OrganisedCloud {
    points: Vec<Option<Vector3<f64>>>,
    width: usize,
    height: usize,
}

impl OrganisedCloud {
    /// Back-project an aligned 16-bit depth image through the camera
    /// intrinsics. Zero depth means no return at that pixel.
    pub fn from_depth(depth: &ImageBuffer<Luma<u16>, Vec<u16>>, camera: &Camera) -> Self {
        let (width, height) = (depth.width() as usize, depth.height() as usize);
        let mut points = Vec::with_capacity(width * height);
        for v in 0..height {
            for u in 0..width {
                let raw = depth.get_pixel(u as u32, v as u32)[0];
                if raw == 0 {
                    points.push(None);
                } else {
                    let z = raw as f64 * DEPTH_SCALE;
                    points.push(Some(camera.unproject(u as f64, v as f64, z)));
                }
            }
        }
        Self {
            points,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn point_at(&self, v: usize, u: usize) -> Option<Vector3<f64>> {
        self.points[v * self.width + u]
    }

    /// Gather the points under the foreground mask into an N×3 matrix.
    pub fn masked_points(&self, mask: &Mask) -> DMatrix<f64> {
        let mut gathered = Vec::new();
        for v in 0..self.height.min(mask.height()) {
            for u in 0..self.width.min(mask.width()) {
                if mask.is_foreground(v, u) {
                    if let Some(p) = self.point_at(v, u) {
                        gathered.push(p);
                    }
                }
            }
        }
        utils::points_matrix(&gathered)
    }
}

/// Voxel-grid down-sampling: average all points falling into the same
/// cubic cell of side `leaf` metres. Cell order is deterministic.
pub fn voxel_downsample(points: &DMatrix<f64>, leaf: f64) -> DMatrix<f64> {
    let mut cells: BTreeMap<(i64, i64, i64), (Vector3<f64>, usize)> = BTreeMap::new();
    for i in 0..points.nrows() {
        let p = utils::row_point(points, i);
        let key = (
            (p.x / leaf).floor() as i64,
            (p.y / leaf).floor() as i64,
            (p.z / leaf).floor() as i64,
        );
        let entry = cells.entry(key).or_insert((Vector3::zeros(), 0));
        entry.0 += p;
        entry.1 += 1;
    }
    let averaged: Vec<Vector3<f64>> = cells
        .values()
        .map(|(sum, count)| sum / *count as f64)
        .collect();
    utils::points_matrix(&averaged)
}
