// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Locally linear embedding weights over the node chain.
//!
//! The weight graph preserves the chain topology during deformation:
//! each node is reconstructed from its neighbours *along the chain*
//! (by index, not by Euclidean proximity), so a folded configuration
//! cannot rewire the topology.

use nalgebra::{DMatrix, DVector};

const GRAM_REGULARISATION: f64 = 1e-5;

/// Indices of the `2 * half_k` chain neighbours of node `idx`,
/// `half_k` on each side, reflected at the chain ends so every
/// node always has the same number of neighbours.
pub fn neighbour_indices(count: usize, half_k: usize, idx: usize) -> Vec<usize> {
    assert!(count > 2 * half_k);
    let mut indices = Vec::with_capacity(2 * half_k);
    if idx < half_k {
        // Near the head: take everything on the left and
        // borrow the deficit from the right side.
        indices.extend(0..idx);
        indices.extend(idx + 1..=idx + half_k + (half_k - idx));
    } else if idx + half_k >= count {
        // Near the tail: symmetric.
        let last = count - 1;
        let overshoot = idx + half_k - last;
        indices.extend(idx - half_k - overshoot..idx);
        indices.extend(idx + 1..count);
    } else {
        indices.extend(idx - half_k..idx);
        indices.extend(idx + 1..=idx + half_k);
    }
    indices
}

/// LLE reconstruction weights of every node from its `k` chain neighbours.
///
/// Row `i` of the returned M×M matrix holds the weights reconstructing
/// node `i`; each row sums to 1 and is supported on `neighbour_indices`.
pub fn lle_weights(nodes: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let m = nodes.nrows();
    let half_k = k / 2;
    let mut weights = DMatrix::zeros(m, m);

    for i in 0..m {
        let indices = neighbour_indices(m, half_k, i);
        let nb = indices.len();

        // Gram matrix of the difference vectors to the neighbours.
        let mut gram = DMatrix::zeros(nb, nb);
        for (a, &ia) in indices.iter().enumerate() {
            for (b, &ib) in indices.iter().enumerate() {
                let mut dot = 0.0;
                for c in 0..3 {
                    dot += (nodes[(i, c)] - nodes[(ia, c)]) * (nodes[(i, c)] - nodes[(ib, c)]);
                }
                gram[(a, b)] = dot;
            }
        }

        // Solve G w = 1, with a Tikhonov fallback when the Gram matrix is
        // singular (always the case for collinear neighbourhoods).
        let ones = DVector::from_element(nb, 1.0);
        let w = match gram.clone().lu().solve(&ones) {
            Some(w) if w.iter().all(|x| x.is_finite()) => w,
            _ => {
                let regularised = gram + DMatrix::identity(nb, nb) * GRAM_REGULARISATION;
                regularised
                    .lu()
                    .solve(&ones)
                    .expect("Error solving regularised LLE Gram system")
            }
        };

        let sum: f64 = w.sum();
        for (a, &ia) in indices.iter().enumerate() {
            weights[(i, ia)] = w[a] / sum;
        }
    }
    weights
}

/// The LLE penalty operator H = (I − L)ᵀ(I − L).
pub fn lle_operator(weights: &DMatrix<f64>) -> DMatrix<f64> {
    let m = weights.nrows();
    let i_minus_l = DMatrix::identity(m, m) - weights;
    i_minus_l.transpose() * &i_minus_l
}

/// Convenience: weights and operator in one call.
pub fn build(nodes: &DMatrix<f64>, k: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let weights = lle_weights(nodes, k);
    let operator = lle_operator(&weights);
    (weights, operator)
}
