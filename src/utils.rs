// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper module for functions that didn't fit anywhere else.
//!
//! Point sets are stored as `DMatrix<f64>` with one 3D point per row,
//! so most helpers here operate on rows of such matrices.

use nalgebra::{DMatrix, Vector3};

/// Squared Euclidean distance between row `i` of `a` and row `j` of `b`.
#[inline]
pub fn row_dist_sq(a: &DMatrix<f64>, i: usize, b: &DMatrix<f64>, j: usize) -> f64 {
    let dx = a[(i, 0)] - b[(j, 0)];
    let dy = a[(i, 1)] - b[(j, 1)];
    let dz = a[(i, 2)] - b[(j, 2)];
    dx * dx + dy * dy + dz * dz
}

/// Euclidean distance between row `i` of `a` and row `j` of `b`.
#[inline]
pub fn row_dist(a: &DMatrix<f64>, i: usize, b: &DMatrix<f64>, j: usize) -> f64 {
    row_dist_sq(a, i, b, j).sqrt()
}

/// Row `i` of a point matrix as a `Vector3`.
#[inline]
pub fn row_point(m: &DMatrix<f64>, i: usize) -> Vector3<f64> {
    Vector3::new(m[(i, 0)], m[(i, 1)], m[(i, 2)])
}

/// Overwrite row `i` of a point matrix.
#[inline]
pub fn set_row_point(m: &mut DMatrix<f64>, i: usize, p: &Vector3<f64>) {
    m[(i, 0)] = p.x;
    m[(i, 1)] = p.y;
    m[(i, 2)] = p.z;
}

/// Build an N×3 point matrix from a slice of points.
pub fn points_matrix(points: &[Vector3<f64>]) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(points.len(), 3);
    for (i, p) in points.iter().enumerate() {
        set_row_point(&mut m, i, p);
    }
    m
}

/// Stack `top` above `bottom`. Both must have the same number of columns.
pub fn vstack(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(top.ncols(), bottom.ncols());
    let mut out = DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    out.rows_mut(0, top.nrows()).copy_from(top);
    out.rows_mut(top.nrows(), bottom.nrows()).copy_from(bottom);
    out
}

/// Total length of the polyline formed by the rows of `points`.
pub fn polyline_length(points: &DMatrix<f64>) -> f64 {
    let mut len = 0.0;
    for i in 1..points.nrows() {
        len += row_dist(points, i, points, i - 1);
    }
    len
}

/// Cumulative arc-length coordinate of every row of `points`,
/// measured along the polyline from row 0.
pub fn arc_coordinates(points: &DMatrix<f64>) -> Vec<f64> {
    let mut coords = Vec::with_capacity(points.nrows());
    let mut acc = 0.0;
    coords.push(acc);
    for i in 1..points.nrows() {
        acc += row_dist(points, i, points, i - 1);
        coords.push(acc);
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_chain(n: usize, step: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n, 3, |i, j| if j == 0 { i as f64 * step } else { 0.0 })
    }

    #[test]
    fn arc_coordinates_of_straight_chain_are_uniform() {
        let pts = straight_chain(5, 0.014);
        let coords = arc_coordinates(&pts);
        assert_eq!(coords.len(), 5);
        for (i, c) in coords.iter().enumerate() {
            assert!((c - 0.014 * i as f64).abs() < 1e-12);
        }
        assert!((polyline_length(&pts) - 0.056).abs() < 1e-12);
    }

    #[test]
    fn vstack_keeps_row_order() {
        let a = straight_chain(2, 1.0);
        let b = straight_chain(3, 2.0);
        let s = vstack(&a, &b);
        assert_eq!(s.nrows(), 5);
        assert_eq!(s[(1, 0)], 1.0);
        assert_eq!(s[(4, 0)], 4.0);
    }
}
