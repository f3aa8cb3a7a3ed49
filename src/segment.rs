// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! HSV colour segmentation of the object and its markers.
//!
//! The rope body and the marker tape are segmented with fixed HSV
//! thresholds (hue on the 0..180 scale), the union is restricted by the
//! external occlusion mask, and marker pixel centres come from
//! connected-component centroids of the marker mask.

use image::RgbImage;
use nalgebra::DMatrix;

use crate::mask::Mask;

/// Inclusive HSV band, hue in 0..180.
#[derive(Debug, Clone, Copy)]
pub struct HsvBand {
    pub h: (u8, u8),
    pub s: (u8, u8),
    pub v: (u8, u8),
}

/// Marker tape band.
pub const MARKER_BAND: HsvBand = HsvBand {
    h: (110, 255),
    s: (50, 255),
    v: (50, 255),
};

/// Rope body band.
pub const BODY_BAND: HsvBand = HsvBand {
    h: (90, 120),
    s: (100, 255),
    v: (100, 255),
};

/// Blobs smaller than this many pixels are noise, not markers.
const MIN_BLOB_AREA: usize = 10;

/// RGB to HSV with hue scaled to 0..180 and saturation/value to 0..255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = r as f64 / 255.0;
    let gf = g as f64 / 255.0;
    let bf = b as f64 / 255.0;
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta) % 6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };
    let sat = if max == 0.0 { 0.0 } else { delta / max };

    ((hue / 2.0) as u8, (sat * 255.0) as u8, (max * 255.0) as u8)
}

/// Binary matrix of the pixels falling inside the HSV band.
pub fn threshold(img: &RgbImage, band: &HsvBand) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_fn(height as usize, width as usize, |i, j| {
        let px = img.get_pixel(j as u32, i as u32);
        let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
        let inside = h >= band.h.0
            && h <= band.h.1.min(180)
            && s >= band.s.0
            && s <= band.s.1
            && v >= band.v.0
            && v <= band.v.1;
        if inside {
            255
        } else {
            0
        }
    })
}

/// Marker pixels only.
pub fn marker_mask(img: &RgbImage) -> DMatrix<u8> {
    threshold(img, &MARKER_BAND)
}

/// Foreground mask of the whole object: markers plus body, restricted
/// to the externally supplied occlusion mask.
pub fn foreground_mask(img: &RgbImage, occlusion: Option<&Mask>) -> Mask {
    let markers = threshold(img, &MARKER_BAND);
    let body = threshold(img, &BODY_BAND);
    let (h, w) = markers.shape();
    let combined = DMatrix::from_fn(h, w, |i, j| {
        let fg = markers[(i, j)] > 0 || body[(i, j)] > 0;
        let open = occlusion.map_or(true, |m| m.is_foreground(i, j));
        if fg && open {
            255
        } else {
            0
        }
    });
    Mask::new(combined)
}

/// Centroids `(u, v)` of the connected components of a binary matrix,
/// ignoring components below the minimum blob area.
pub fn blob_centroids(mask: &DMatrix<u8>) -> Vec<(f64, f64)> {
    let (h, w) = mask.shape();
    let mut visited = vec![false; h * w];
    let mut centroids = Vec::new();
    let mut stack = Vec::new();

    for v0 in 0..h {
        for u0 in 0..w {
            if mask[(v0, u0)] == 0 || visited[v0 * w + u0] {
                continue;
            }
            // Flood-fill one component.
            let mut sum_u = 0.0;
            let mut sum_v = 0.0;
            let mut area = 0usize;
            stack.push((v0, u0));
            visited[v0 * w + u0] = true;
            while let Some((v, u)) = stack.pop() {
                sum_u += u as f64;
                sum_v += v as f64;
                area += 1;
                let neighbours = [
                    (v.wrapping_sub(1), u),
                    (v + 1, u),
                    (v, u.wrapping_sub(1)),
                    (v, u + 1),
                ];
                for (nv, nu) in neighbours {
                    if nv < h && nu < w && mask[(nv, nu)] > 0 && !visited[nv * w + nu] {
                        visited[nv * w + nu] = true;
                        stack.push((nv, nu));
                    }
                }
            }
            if area >= MIN_BLOB_AREA {
                centroids.push((sum_u / area as f64, sum_v / area as f64));
            }
        }
    }
    centroids
}
