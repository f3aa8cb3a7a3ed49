// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Non-rigid registration of an ordered node chain onto a point cloud.
//!
//! The engine runs a regularised Expectation-Maximisation over a Gaussian
//! mixture centred on the nodes, combining a Motion Coherence deformation
//! prior, a locally-linear-embedding topology prior, optional anchored
//! correspondences, and an occlusion-aware reweighting of the
//! responsibilities.

use nalgebra::{DMatrix, DVector, Vector3};
use std::f64::consts::PI;

use crate::error::Error;
use crate::lle;
use crate::utils;

/// Lowest anchored-correspondence strength accepted; weaker (smaller)
/// values make the M-step system numerically unsolvable.
pub const OMEGA_FLOOR: f64 = 1e-6;

/// Deformation kernel selected once per registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Gaussian,
    Laplacian,
    FirstOrder,
    SecondOrder,
}

impl Kernel {
    /// Kernel value for a pair of nodes at distance `dist`
    /// (`dist_sq` is its square), with bandwidth `beta`.
    fn apply(self, beta: f64, dist: f64, dist_sq: f64) -> f64 {
        match self {
            Kernel::Gaussian => (-dist_sq / (2.0 * beta * beta)).exp(),
            Kernel::Laplacian => (-dist / (2.0 * beta * beta)).exp(),
            Kernel::FirstOrder => {
                1.0 / (4.0 * beta * beta)
                    * (-(2.0f64).sqrt() * dist / beta).exp()
                    * ((2.0f64).sqrt() * dist + beta)
            }
            Kernel::SecondOrder => {
                27.0 / (72.0 * beta.powi(3))
                    * (-(3.0f64).sqrt() * dist / beta).exp()
                    * ((3.0f64).sqrt() * beta * beta + 3.0 * beta * dist + (3.0f64).sqrt() * dist_sq)
            }
        }
    }
}

/// A correspondence prior anchoring a node to a known visible position.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub node: usize,
    pub position: Vector3<f64>,
}

impl Anchor {
    pub fn new(node: usize, position: Vector3<f64>) -> Self {
        Self { node, position }
    }
}

/// Configuration (parameters) of one registration call.
#[derive(Debug, Clone)]
pub struct Config {
    /// Kernel bandwidth (metres).
    pub beta: f64,
    /// Motion-coherence regularisation weight.
    pub alpha: f64,
    /// Topology (LLE) regularisation weight.
    pub gamma: f64,
    /// Outlier mixing fraction, in (0, 1).
    pub mu: f64,
    /// Anchored-correspondence strength, floored at `OMEGA_FLOOR`.
    pub omega: f64,
    pub max_iterations: usize,
    /// Stop once the squared Frobenius step of the nodes falls below this.
    pub tolerance: f64,
    pub include_lle: bool,
    /// Build the kernel and the E-step distances along the chain
    /// instead of through free space.
    pub use_geodesic: bool,
    /// Use the correspondence priors as soft anchors.
    pub use_anchors: bool,
    pub kernel: Kernel,
}

impl Config {
    /// First-frame fit of the node chain onto the cloud.
    pub fn initialization() -> Self {
        Self {
            beta: 0.5,
            alpha: 1.0,
            gamma: 1.0,
            mu: 0.1,
            omega: 1e-3,
            max_iterations: 30,
            tolerance: 1e-5,
            include_lle: true,
            use_geodesic: false,
            use_anchors: true,
            kernel: Kernel::Gaussian,
        }
    }

    /// Coarse guide-node pass used by the visibility pre-processing.
    pub fn guide() -> Self {
        Self {
            beta: 10.0,
            alpha: 1.0,
            gamma: 1.0,
            mu: 0.2,
            omega: 1e-3,
            max_iterations: 30,
            tolerance: 1e-5,
            include_lle: true,
            use_geodesic: true,
            use_anchors: false,
            kernel: Kernel::Laplacian,
        }
    }

    /// Per-frame tracking solve.
    pub fn tracking() -> Self {
        Self {
            beta: 7.0,
            alpha: 1.0,
            gamma: 1.0,
            mu: 0.1,
            omega: 1e-3,
            max_iterations: 30,
            tolerance: 1e-5,
            include_lle: true,
            use_geodesic: true,
            use_anchors: true,
            kernel: Kernel::FirstOrder,
        }
    }
}

/// "Observations" of one registration call, borrowed from the caller.
pub struct Obs<'a> {
    /// Foreground cloud, one point per row.
    pub cloud: &'a DMatrix<f64>,
    /// Reference node configuration, one node per row, in chain order.
    pub nodes_0: &'a DMatrix<f64>,
    /// Variance carried over from the previous frame, if any.
    pub sigma2_0: Option<f64>,
    /// Correspondence priors, sorted by node index.
    pub anchors: &'a [Anchor],
    /// Contiguous occluded node indices, empty when fully visible.
    pub occluded: &'a [usize],
}

impl<'a> Obs<'a> {
    /// Cloud and reference nodes only, everything else default.
    pub fn new(cloud: &'a DMatrix<f64>, nodes_0: &'a DMatrix<f64>) -> Self {
        Self {
            cloud,
            nodes_0,
            sigma2_0: None,
            anchors: &[],
            occluded: &[],
        }
    }
}

/// Register the node chain onto the observed cloud.
///
/// Returns the new node positions and the final mixture variance.
/// Running out of iterations is not an error; an unsolvable M-step or a
/// collapsed variance is.
pub fn register(config: &Config, obs: &Obs) -> Result<(DMatrix<f64>, f64), Error> {
    let m = obs.nodes_0.nrows();

    // Anchored positions are prepended to the cloud so that their
    // responsibility columns line up with the anchor matrix below.
    let has_anchors = config.use_anchors && !obs.anchors.is_empty();
    let x = if has_anchors {
        let anchor_pts: Vec<Vector3<f64>> = obs.anchors.iter().map(|a| a.position).collect();
        utils::vstack(&utils::points_matrix(&anchor_pts), obs.cloud)
    } else {
        obs.cloud.clone_owned()
    };
    let n = x.nrows();
    if n == 0 {
        return Err(Error::EmptyCloud);
    }

    let (kernel_g, node_arc_dist) = build_kernel(obs.nodes_0, config);

    let mut sigma2 = match obs.sigma2_0 {
        Some(s) => s,
        None => initial_variance(&x, obs.nodes_0),
    };

    let (_, lle_h) = lle::build(obs.nodes_0, 6);

    let identity = DMatrix::identity(m, m);
    let omega = config.omega.max(OMEGA_FLOOR);
    let mut y = obs.nodes_0.clone_owned();

    for iteration in 0..config.max_iterations {
        let sig = sigma2.max(f64::EPSILON);

        // E-step: responsibilities of every node for every observation.
        let mut dist_sq = DMatrix::zeros(m, n);
        for i in 0..m {
            for j in 0..n {
                dist_sq[(i, j)] = utils::row_dist_sq(&y, i, &x, j);
            }
        }
        let outlier_full =
            (2.0 * PI * sig).powf(1.5) * config.mu / (1.0 - config.mu) * m as f64 / n as f64;
        let mut p = dist_sq.map(|d| (-d / (2.0 * sig)).exp());
        normalise_columns(&mut p, outlier_full);
        let max_nodes = argmax_columns(&p);

        if config.use_geodesic {
            let arc_dist = node_arc_dist
                .as_ref()
                .expect("geodesic registration always builds the arc table");
            let geo = geodesic_distances(&dist_sq, &p, &max_nodes, arc_dist);
            p = geo.map(|d| (-d * d / (2.0 * sig)).exp());
            if obs.occluded.is_empty() {
                normalise_columns(&mut p, outlier_full);
            } else {
                let outlier_vis = (2.0 * PI * sig).powf(1.5) * config.mu / (1.0 - config.mu) / n as f64;
                visibility_reweight(&mut p, &max_nodes, obs.occluded, outlier_vis);
            }
        } else if !obs.occluded.is_empty() {
            let outlier_vis = (2.0 * PI * sig).powf(1.5) * config.mu / (1.0 - config.mu) / n as f64;
            visibility_reweight(&mut p, &max_nodes, obs.occluded, outlier_vis);
        }

        // Aggregates of the responsibility matrix.
        let mut pt1: DVector<f64> = DVector::zeros(n);
        let mut p1: DVector<f64> = DVector::zeros(m);
        for j in 0..n {
            for i in 0..m {
                let v = p[(i, j)];
                pt1[j] += v;
                p1[i] += v;
            }
        }
        let np_total: f64 = p1.sum();
        let px = &p * &x;

        // M-step: solve A W = B for the kernel weights.
        let mut a = scale_rows(&kernel_g, &p1);
        a += &identity * (config.alpha * sig);
        let mut b = &px - scale_rows(obs.nodes_0, &p1);
        if config.include_lle {
            a += (&lle_h * &kernel_g) * (sig * config.gamma);
            b -= (&lle_h * obs.nodes_0) * (sig * config.gamma);
        }
        if config.use_anchors {
            let (anchor_1, anchor_x) = anchor_aggregates(m, &x, obs.anchors, &max_nodes, has_anchors);
            let scale = sig / omega;
            a += scale_rows(&kernel_g, &anchor_1) * scale;
            let mut anchor_b = anchor_x - scale_rows(obs.nodes_0, &anchor_1);
            if config.include_lle {
                anchor_b -= (&lle_h * obs.nodes_0) * (sig * config.gamma);
            }
            b += anchor_b * scale;
        }

        let w = a.lu().solve(&b).ok_or(Error::SingularSystem)?;
        let t = obs.nodes_0 + &kernel_g * &w;

        // Variance update from the weighted distances to the new nodes.
        let mut tr_xpx = 0.0;
        for j in 0..n {
            tr_xpx += pt1[j] * (x[(j, 0)].powi(2) + x[(j, 1)].powi(2) + x[(j, 2)].powi(2));
        }
        let tr_pxt = px.component_mul(&t).sum();
        let mut tr_tpt = 0.0;
        for i in 0..m {
            tr_tpt += p1[i] * (t[(i, 0)].powi(2) + t[(i, 1)].powi(2) + t[(i, 2)].powi(2));
        }
        let new_sigma2 = (tr_xpx - 2.0 * tr_pxt + tr_tpt) / (np_total * 3.0);
        if !new_sigma2.is_finite() || new_sigma2 <= 0.0 {
            return Err(Error::DegenerateVariance(new_sigma2));
        }
        sigma2 = new_sigma2;

        let step = (&t - &y).norm_squared();
        y = t;
        if step < config.tolerance {
            log::debug!("registration converged after {} iterations", iteration + 1);
            break;
        }
    }

    Ok((y, sigma2))
}

/// Kernel matrix over the reference nodes, plus the node-to-node
/// arc-length distances when registering along the chain.
fn build_kernel(nodes_0: &DMatrix<f64>, config: &Config) -> (DMatrix<f64>, Option<DMatrix<f64>>) {
    let m = nodes_0.nrows();
    if config.use_geodesic {
        let coords = utils::arc_coordinates(nodes_0);
        let arc_dist = DMatrix::from_fn(m, m, |i, j| (coords[i] - coords[j]).abs());
        let g = DMatrix::from_fn(m, m, |i, j| {
            let d = arc_dist[(i, j)];
            config.kernel.apply(config.beta, d, d * d)
        });
        (g, Some(arc_dist))
    } else {
        let g = DMatrix::from_fn(m, m, |i, j| {
            let d_sq = utils::row_dist_sq(nodes_0, i, nodes_0, j);
            config.kernel.apply(config.beta, d_sq.sqrt(), d_sq)
        });
        (g, None)
    }
}

/// Mean squared distance between every (observation, node) pair, over 3.
fn initial_variance(x: &DMatrix<f64>, nodes: &DMatrix<f64>) -> f64 {
    let (n, m) = (x.nrows(), nodes.nrows());
    let mut acc = 0.0;
    for i in 0..m {
        for j in 0..n {
            acc += utils::row_dist_sq(nodes, i, x, j);
        }
    }
    acc / (3 * m * n) as f64
}

/// Normalise every column of `p` by its sum plus the outlier constant.
/// Degenerate (all-zero) columns are floored at machine epsilon first.
fn normalise_columns(p: &mut DMatrix<f64>, outlier: f64) {
    for j in 0..p.ncols() {
        let mut den: f64 = p.column(j).sum();
        if den == 0.0 {
            den = f64::EPSILON;
        }
        den += outlier;
        for i in 0..p.nrows() {
            p[(i, j)] /= den;
        }
    }
}

/// Row index of the maximum of every column; ties pick the lower index.
fn argmax_columns(p: &DMatrix<f64>) -> Vec<usize> {
    let (m, n) = p.shape();
    let mut out = Vec::with_capacity(n);
    for j in 0..n {
        let mut best = 0;
        let mut best_val = p[(0, j)];
        for i in 1..m {
            if p[(i, j)] > best_val {
                best_val = p[(i, j)];
                best = i;
            }
        }
        out.push(best);
    }
    out
}

/// Distances along the chain from every observation to every node.
///
/// For each observation, the distance to a node is the Euclidean hop to
/// the most responsible node (or its runner-up neighbour, whichever side
/// of the chain the node lies on) plus the arc length from there. When
/// the runner-up coincides with the maximum (clamping at a chain end),
/// the observation keeps its Euclidean distances.
fn geodesic_distances(
    dist_sq: &DMatrix<f64>,
    p: &DMatrix<f64>,
    max_nodes: &[usize],
    arc_dist: &DMatrix<f64>,
) -> DMatrix<f64> {
    let (m, n) = dist_sq.shape();
    let mut geo = DMatrix::zeros(m, n);
    for j in 0..n {
        let mp = max_nodes[j];
        let cand_low = if mp == 0 { 1 } else { mp - 1 };
        let cand_high = if mp + 1 > m - 1 { m - 2 } else { mp + 1 };
        let next = if p[(cand_low, j)] > p[(cand_high, j)] {
            cand_low
        } else {
            cand_high
        };

        if next == mp {
            for i in 0..m {
                geo[(i, j)] = dist_sq[(i, j)].sqrt();
            }
            continue;
        }

        let d_max = dist_sq[(mp, j)].sqrt();
        let d_next = dist_sq[(next, j)].sqrt();
        if mp < next {
            for i in 0..=mp {
                geo[(i, j)] = arc_dist[(mp, i)] + d_max;
            }
            for i in next..m {
                geo[(i, j)] = arc_dist[(next, i)] + d_next;
            }
        } else {
            for i in 0..=next {
                geo[(i, j)] = arc_dist[(next, i)] + d_next;
            }
            for i in mp..m {
                geo[(i, j)] = arc_dist[(mp, i)] + d_max;
            }
        }
    }
    geo
}

/// Concentrate every observation's probability mass on the visibility
/// block (head, floating, or tail) of its most responsible node, then
/// renormalise with the occlusion outlier constant.
pub(crate) fn visibility_reweight(
    p: &mut DMatrix<f64>,
    max_nodes: &[usize],
    occluded: &[usize],
    outlier: f64,
) {
    let m = p.nrows();
    let m_head = occluded[0];
    let m_tail = m - 1 - occluded[occluded.len() - 1];
    let floating = m - m_head - m_tail;

    for j in 0..p.ncols() {
        let mp = max_nodes[j];
        let (start, end, size) = if mp < m_head {
            (0, m_head, m_head)
        } else if mp >= m - m_tail {
            (m - m_tail, m, m_tail)
        } else {
            (m_head, m - m_tail, floating)
        };
        let fill = 1.0 / size as f64;
        for i in 0..m {
            if i >= start && i < end {
                p[(i, j)] *= fill;
            } else {
                p[(i, j)] = 0.0;
            }
        }
    }
    normalise_columns(p, outlier);
}

/// Per-node mass and weighted positions of the anchor matrix P̃.
///
/// With anchors present, each prior row of the (prepended) cloud maps to
/// its declared node; without them, every observation maps fully to its
/// most responsible node.
fn anchor_aggregates(
    m: usize,
    x: &DMatrix<f64>,
    anchors: &[Anchor],
    max_nodes: &[usize],
    has_anchors: bool,
) -> (DVector<f64>, DMatrix<f64>) {
    let mut mass = DVector::zeros(m);
    let mut pos = DMatrix::zeros(m, 3);
    if has_anchors {
        for (j, anchor) in anchors.iter().enumerate() {
            mass[anchor.node] += 1.0;
            for c in 0..3 {
                pos[(anchor.node, c)] += x[(j, c)];
            }
        }
    } else {
        for (j, &mp) in max_nodes.iter().enumerate() {
            mass[mp] += 1.0;
            for c in 0..3 {
                pos[(mp, c)] += x[(j, c)];
            }
        }
    }
    (mass, pos)
}

/// Scale row `i` of `mat` by `scale[i]`.
fn scale_rows(mat: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    let mut out = mat.clone_owned();
    for i in 0..out.nrows() {
        for j in 0..out.ncols() {
            out[(i, j)] *= scale[i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eight nodes 14 mm apart along x, like the recorded marker layout.
    fn straight_nodes() -> DMatrix<f64> {
        DMatrix::from_fn(8, 3, |i, j| if j == 0 { i as f64 * 0.014 } else { 0.0 })
    }

    /// Deterministic dense sampling of the same segment with sub-mm jitter.
    fn jittered_cloud(count: usize) -> DMatrix<f64> {
        DMatrix::from_fn(count, 3, |i, j| {
            let t = i as f64 / (count - 1) as f64;
            let jitter = 0.0005 * ((7.3 * i as f64 + 1.7 * j as f64).sin());
            match j {
                0 => 0.098 * t + jitter,
                _ => jitter,
            }
        })
    }

    fn anchors_at(nodes: &DMatrix<f64>) -> Vec<Anchor> {
        (0..nodes.nrows())
            .map(|i| Anchor::new(i, utils::row_point(nodes, i)))
            .collect()
    }

    #[test]
    fn kernel_matrix_is_symmetric_with_constant_diagonal() {
        let nodes = straight_nodes();
        for kernel in [
            Kernel::Gaussian,
            Kernel::Laplacian,
            Kernel::FirstOrder,
            Kernel::SecondOrder,
        ] {
            for use_geodesic in [false, true] {
                let config = Config {
                    kernel,
                    use_geodesic,
                    beta: 0.5,
                    ..Config::initialization()
                };
                let (g, _) = build_kernel(&nodes, &config);
                for i in 0..8 {
                    for j in 0..8 {
                        assert!((g[(i, j)] - g[(j, i)]).abs() < 1e-12);
                    }
                    assert!((g[(i, i)] - g[(0, 0)]).abs() < 1e-12);
                }
                // Gaussian and Laplacian are normalised at zero distance.
                if matches!(kernel, Kernel::Gaussian | Kernel::Laplacian) {
                    assert!((g[(0, 0)] - 1.0).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn straight_rope_initialisation_lands_on_the_markers() {
        let nodes = straight_nodes();
        let cloud = jittered_cloud(1000);
        let config = Config::initialization();
        let anchors = anchors_at(&nodes);
        let obs = Obs {
            anchors: &anchors,
            ..Obs::new(&cloud, &nodes)
        };
        let (y, sigma2) = register(&config, &obs).unwrap();
        assert!(sigma2 > 0.0);
        for i in 0..8 {
            let d = utils::row_dist(&y, i, &nodes, i);
            assert!(d < 1e-3, "node {} off by {} m", i, d);
        }
    }

    #[test]
    fn variance_decreases_on_noise_free_input() {
        let nodes = straight_nodes();
        let cloud = DMatrix::from_fn(400, 3, |i, j| {
            if j == 0 {
                0.098 * i as f64 / 399.0
            } else {
                0.0
            }
        });
        let mut previous = f64::INFINITY;
        for iterations in 1..=5 {
            let config = Config {
                max_iterations: iterations,
                tolerance: 0.0,
                use_anchors: false,
                ..Config::initialization()
            };
            let (_, sigma2) = register(&config, &Obs::new(&cloud, &nodes)).unwrap();
            assert!(
                sigma2 < previous,
                "sigma2 did not decrease at iteration {}: {} >= {}",
                iterations,
                sigma2,
                previous
            );
            previous = sigma2;
        }
    }

    #[test]
    fn converged_output_is_a_fixed_point() {
        let nodes = straight_nodes();
        let cloud = jittered_cloud(600);
        let anchors = anchors_at(&nodes);
        let hard = Config {
            max_iterations: 200,
            tolerance: 1e-14,
            ..Config::initialization()
        };
        let obs = Obs {
            anchors: &anchors,
            ..Obs::new(&cloud, &nodes)
        };
        let (y1, sigma2) = register(&hard, &obs).unwrap();

        let once = Config {
            max_iterations: 1,
            tolerance: 0.0,
            ..Config::initialization()
        };
        let obs2 = Obs {
            sigma2_0: Some(sigma2),
            anchors: &anchors,
            ..Obs::new(&cloud, &y1)
        };
        let (y2, _) = register(&once, &obs2).unwrap();
        let step = (&y2 - &y1).norm();
        assert!(step < 1e-5, "fixed-point step was {}", step);
    }

    #[test]
    fn huge_omega_matches_the_plain_path() {
        let nodes = straight_nodes();
        let cloud = jittered_cloud(300);
        let anchors = anchors_at(&nodes);
        let anchor_mat = utils::points_matrix(
            &anchors.iter().map(|a| a.position).collect::<Vec<_>>(),
        );
        let stacked = utils::vstack(&anchor_mat, &cloud);

        let with_anchors = Config {
            omega: 1e12,
            ..Config::initialization()
        };
        let obs_a = Obs {
            anchors: &anchors,
            ..Obs::new(&cloud, &nodes)
        };
        let (ya, _) = register(&with_anchors, &obs_a).unwrap();

        let without = Config {
            use_anchors: false,
            ..Config::initialization()
        };
        let (yb, _) = register(&without, &Obs::new(&stacked, &nodes)).unwrap();

        assert!((&ya - &yb).norm() < 1e-6);
    }

    #[test]
    fn strong_anchors_pin_the_nodes() {
        // No cloud at all: the anchors alone must place the nodes.
        let nodes = straight_nodes();
        let shifted = DMatrix::from_fn(8, 3, |i, j| nodes[(i, j)] + if j == 1 { 0.005 } else { 0.0 });
        let anchors = anchors_at(&shifted);
        let empty = DMatrix::zeros(0, 3);
        let config = Config {
            omega: 1e-6,
            ..Config::initialization()
        };
        let obs = Obs {
            anchors: &anchors,
            ..Obs::new(&empty, &nodes)
        };
        let (y, _) = register(&config, &obs).unwrap();
        for i in 0..8 {
            let d = utils::row_dist(&y, i, &shifted, i);
            assert!(d < 1e-4, "anchored node {} off by {} m", i, d);
        }
    }

    #[test]
    fn large_bandwidth_keeps_the_chain_rigid() {
        let nodes = straight_nodes();
        let cloud = jittered_cloud(300);
        for kernel in [Kernel::Gaussian, Kernel::Laplacian] {
            let config = Config {
                beta: 1e3,
                kernel,
                use_anchors: false,
                max_iterations: 10,
                ..Config::initialization()
            };
            let (y, _) = register(&config, &Obs::new(&cloud, &nodes)).unwrap();
            let drift = (&y - &nodes).norm();
            assert!(drift < 2e-3, "{:?} kernel drifted {}", kernel, drift);
        }
    }

    #[test]
    fn empty_cloud_without_anchors_is_an_error() {
        let nodes = straight_nodes();
        let empty = DMatrix::zeros(0, 3);
        let config = Config {
            use_anchors: false,
            ..Config::initialization()
        };
        assert!(matches!(
            register(&config, &Obs::new(&empty, &nodes)),
            Err(Error::EmptyCloud)
        ));
    }

    #[test]
    fn reweighting_confines_mass_to_the_picked_block() {
        // 8 nodes, indices 3..=4 occluded: head block [0,3), tail block [5,8).
        let occluded = [3usize, 4];
        let mut p = DMatrix::from_element(8, 3, 0.1);
        // Column 0 favours a head node, column 1 a floating node,
        // column 2 a tail node.
        p[(1, 0)] = 0.9;
        p[(3, 1)] = 0.9;
        p[(6, 2)] = 0.9;
        let max_nodes = argmax_columns(&p);
        visibility_reweight(&mut p, &max_nodes, &occluded, 1e-3);

        for i in 3..8 {
            assert_eq!(p[(i, 0)], 0.0);
        }
        for i in (0..3).chain(5..8) {
            assert_eq!(p[(i, 1)], 0.0);
        }
        for i in 0..5 {
            assert_eq!(p[(i, 2)], 0.0);
        }
        // Columns keep near-unit mass after renormalisation.
        for j in 0..3 {
            let sum: f64 = p.column(j).sum();
            assert!(sum > 0.9 && sum <= 1.0);
        }
    }
}
