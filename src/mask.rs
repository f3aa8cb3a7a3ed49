// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Binary foreground mask and its Euclidean distance transform.

use image::GrayImage;
use nalgebra::DMatrix;

use crate::interop;

/// Binary foreground mask of one frame (255 on the object, 0 elsewhere),
/// stored row-major as an H×W matrix.
#[derive(Debug, Clone)]
pub struct Mask {
    pixels: DMatrix<u8>,
}

impl Mask {
    pub fn new(pixels: DMatrix<u8>) -> Self {
        Self { pixels }
    }

    pub fn from_image(img: &GrayImage) -> Self {
        Self::new(interop::binary_matrix_from_image(img))
    }

    /// Render the mask as a grayscale image.
    pub fn to_image(&self) -> GrayImage {
        interop::image_from_binary_matrix(&self.pixels)
    }

    /// A mask covering the whole image, used when no occluder is reported.
    pub fn full(height: usize, width: usize) -> Self {
        Self::new(DMatrix::from_element(height, width, 255))
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn is_foreground(&self, v: usize, u: usize) -> bool {
        self.pixels[(v, u)] > 0
    }

    pub fn pixels(&self) -> &DMatrix<u8> {
        &self.pixels
    }

    /// Exact Euclidean distance (in pixels) from every pixel to the nearest
    /// foreground pixel. Foreground pixels map to 0. This is the distance
    /// transform of the inverted mask.
    pub fn distance_to_foreground(&self) -> DMatrix<f64> {
        let (h, w) = self.pixels.shape();
        let inf = (h * h + w * w) as f64 + 1.0;

        // Column pass: squared distance to the nearest foreground pixel
        // within the same column.
        let mut dist_sq = DMatrix::from_element(h, w, inf);
        let mut scratch = vec![0.0; h.max(w)];
        for u in 0..w {
            for v in 0..h {
                scratch[v] = if self.pixels[(v, u)] > 0 { 0.0 } else { inf };
            }
            let transformed = distance_transform_1d(&scratch[..h]);
            for v in 0..h {
                dist_sq[(v, u)] = transformed[v];
            }
        }

        // Row pass over the column results gives the full 2D transform.
        let mut out = DMatrix::zeros(h, w);
        for v in 0..h {
            for u in 0..w {
                scratch[u] = dist_sq[(v, u)];
            }
            let transformed = distance_transform_1d(&scratch[..w]);
            for u in 0..w {
                out[(v, u)] = transformed[u].sqrt();
            }
        }
        out
    }
}

/// One-dimensional squared distance transform of a sampled function,
/// by lower envelope of parabolas (Felzenszwalb & Huttenlocher).
fn distance_transform_1d(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut out = vec![0.0; n];
    // Hull vertices and boundaries.
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let mut s;
        loop {
            let p = v[k];
            s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q - p) as f64);
            if s <= z[k] {
                if k == 0 {
                    break;
                }
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    let mut k = 0usize;
    for q in 0..n {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let d = q as f64 - v[k] as f64;
        out[q] = d * d + f[v[k]];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_on_foreground() {
        let mut px = DMatrix::from_element(5, 5, 0u8);
        px[(2, 2)] = 255;
        let mask = Mask::new(px);
        let dist = mask.distance_to_foreground();
        assert_eq!(dist[(2, 2)], 0.0);
        assert!((dist[(2, 4)] - 2.0).abs() < 1e-9);
        assert!((dist[(0, 0)] - (8.0f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn distance_of_vertical_stripe() {
        let mut px = DMatrix::from_element(4, 8, 0u8);
        for v in 0..4 {
            px[(v, 3)] = 255;
        }
        let mask = Mask::new(px);
        let dist = mask.distance_to_foreground();
        for v in 0..4 {
            assert!((dist[(v, 0)] - 3.0).abs() < 1e-9);
            assert!((dist[(v, 7)] - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn full_mask_is_everywhere_zero() {
        let mask = Mask::full(3, 3);
        let dist = mask.distance_to_foreground();
        assert!(dist.iter().all(|&d| d == 0.0));
    }
}
