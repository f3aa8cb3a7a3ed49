// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parametric cubic spline through an ordered 3D polyline.
//!
//! The spline is parameterised by chord length and fitted per coordinate
//! as a natural cubic (second derivatives vanish at both ends). A small
//! smoothing factor damps the second differences of the control points
//! before fitting, so slightly noisy guide chains do not produce
//! oscillating resamples.

use nalgebra::{DMatrix, Vector3};

use crate::utils;

/// Chord-parameterised natural cubic spline over 3D control points.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Chord-length parameter of each control point, `ts[0] == 0`.
    ts: Vec<f64>,
    /// Control points, possibly smoothed.
    points: Vec<Vector3<f64>>,
    /// Second derivative of each coordinate at each control point.
    second: Vec<Vector3<f64>>,
}

impl CubicSpline {
    /// Fit a spline through the rows of `points` (at least 2 required).
    ///
    /// `smoothing` damps each interior control point towards the average
    /// of its neighbours; 0 disables it, the tracking pipeline uses 1e-4.
    pub fn fit(points: &DMatrix<f64>, smoothing: f64) -> Option<Self> {
        let n = points.nrows();
        if n < 2 {
            return None;
        }

        let mut ctrl: Vec<Vector3<f64>> = (0..n).map(|i| utils::row_point(points, i)).collect();
        if smoothing > 0.0 {
            let orig = ctrl.clone();
            for i in 1..n - 1 {
                let lap = orig[i - 1] - 2.0 * orig[i] + orig[i + 1];
                ctrl[i] += smoothing * lap;
            }
        }

        // Chord-length parameterisation. Coincident control points would
        // produce a zero knot interval, so they get a tiny epsilon step.
        let mut ts = Vec::with_capacity(n);
        let mut acc = 0.0;
        ts.push(0.0);
        for i in 1..n {
            acc += (ctrl[i] - ctrl[i - 1]).norm().max(1e-12);
            ts.push(acc);
        }

        let second = natural_second_derivatives(&ts, &ctrl);
        Some(Self {
            ts,
            points: ctrl,
            second,
        })
    }

    /// Total parameter span (the chord length of the control polyline).
    pub fn span(&self) -> f64 {
        *self.ts.last().unwrap_or(&0.0)
    }

    /// Evaluate the spline at parameter `t`, clamped to the fitted span.
    pub fn eval(&self, t: f64) -> Vector3<f64> {
        let t = t.clamp(0.0, self.span());
        // Locate the knot interval containing t.
        let mut hi = match self.ts.iter().position(|&k| k >= t) {
            Some(0) => 1,
            Some(i) => i,
            None => self.ts.len() - 1,
        };
        if hi >= self.ts.len() {
            hi = self.ts.len() - 1;
        }
        let lo = hi - 1;

        let h = self.ts[hi] - self.ts[lo];
        let a = (self.ts[hi] - t) / h;
        let b = (t - self.ts[lo]) / h;
        let h2 = h * h / 6.0;
        self.points[lo] * a
            + self.points[hi] * b
            + self.second[lo] * ((a * a * a - a) * h2)
            + self.second[hi] * ((b * b * b - b) * h2)
    }

    /// Sample the spline at `count` parameters uniformly spanning the fit,
    /// returned as a count×3 point matrix.
    pub fn sample_uniform(&self, count: usize) -> DMatrix<f64> {
        assert!(count >= 2);
        let span = self.span();
        let mut out = DMatrix::zeros(count, 3);
        for i in 0..count {
            let t = span * i as f64 / (count - 1) as f64;
            let p = self.eval(t);
            utils::set_row_point(&mut out, i, &p);
        }
        out
    }
}

/// Natural cubic second derivatives per coordinate: tridiagonal system
/// solved by the Thomas algorithm.
fn natural_second_derivatives(ts: &[f64], pts: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    let n = ts.len();
    let mut second = vec![Vector3::zeros(); n];
    if n < 3 {
        return second;
    }

    let interior = n - 2;
    let mut diag = vec![0.0; interior];
    let mut off = vec![0.0; interior];
    let mut rhs = vec![Vector3::zeros(); interior];
    for i in 1..n - 1 {
        let h0 = ts[i] - ts[i - 1];
        let h1 = ts[i + 1] - ts[i];
        diag[i - 1] = 2.0 * (h0 + h1);
        off[i - 1] = h1;
        rhs[i - 1] = 6.0 * ((pts[i + 1] - pts[i]) / h1 - (pts[i] - pts[i - 1]) / h0);
    }

    // Forward sweep.
    for i in 1..interior {
        let h0 = ts[i + 1] - ts[i];
        let w = h0 / diag[i - 1];
        diag[i] -= w * off[i - 1];
        let carried = rhs[i - 1];
        rhs[i] -= w * carried;
    }
    // Back substitution.
    second[n - 2] = rhs[interior - 1] / diag[interior - 1];
    for i in (0..interior - 1).rev() {
        second[i + 1] = (rhs[i] - off[i] * second[i + 2]) / diag[i];
    }
    second
}
