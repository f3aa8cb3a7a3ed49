// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-frame orchestration of the tracking pipeline.
//!
//! The tracker owns the state carried between frames: the node chain,
//! its variance, the arc-length table frozen at initialisation, and the
//! head anchor used to keep marker chains consistently oriented. A frame
//! that fails leaves all of it untouched.

use nalgebra::{DMatrix, Vector3};

use crate::camera::Camera;
use crate::chain;
use crate::error::Error;
use crate::mask::Mask;
use crate::preprocess;
use crate::registration::{self, Anchor, Config, Obs};
use crate::utils;

/// State derived at initialisation and updated after every tracked frame.
#[derive(Debug, Clone)]
struct TrackState {
    nodes: DMatrix<f64>,
    sigma2: f64,
    /// Arc-length coordinate of every node, frozen at initialisation.
    arc_coords: Vec<f64>,
    total_len: f64,
}

/// Everything produced for one frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Ordered node positions after this frame's solve.
    pub nodes: DMatrix<f64>,
    /// Markers ordered into a chain consistent with the head anchor.
    pub markers: Vec<Vector3<f64>>,
    /// Guide nodes of the pre-processing pass (absent on the init frame).
    pub guide_nodes: Option<DMatrix<f64>>,
    /// Mean node-to-marker distance, when the marker count matches.
    pub frame_error: Option<f64>,
}

/// Deformable-linear-object tracker.
pub struct Tracker {
    camera: Camera,
    state: Option<TrackState>,
    head: Option<Vector3<f64>>,
}

impl Tracker {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            state: None,
            head: None,
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.state.is_some()
    }

    /// Current node chain, if initialised.
    pub fn nodes(&self) -> Option<&DMatrix<f64>> {
        self.state.as_ref().map(|s| &s.nodes)
    }

    /// Process one frame: foreground cloud, foreground mask, detected
    /// marker centres. The first complete frame initialises the chain
    /// from the markers; later frames track it through the EM solve.
    pub fn process_frame(
        &mut self,
        cloud: &DMatrix<f64>,
        mask: &Mask,
        markers: &[Vector3<f64>],
    ) -> Result<FrameResult, Error> {
        if cloud.nrows() == 0 {
            return Err(Error::EmptyCloud);
        }

        let sorted = chain::sort_markers(markers);
        let (ordered, new_head) = if sorted.points.is_empty() {
            (Vec::new(), self.head.unwrap_or_else(Vector3::zeros))
        } else {
            chain::reconcile_orientation(sorted.points.clone(), self.head.as_ref())
        };

        let result = if self.state.is_none() {
            if !sorted.complete {
                return Err(Error::MarkerChainBreak {
                    sorted: sorted.points.len(),
                    total: markers.len(),
                });
            }
            self.initialise(cloud, &ordered)?
        } else {
            self.track(cloud, mask, &ordered)?
        };

        // Commit the orientation anchor only once the frame succeeded.
        if !result.markers.is_empty() {
            self.head = Some(new_head);
        }
        Ok(result)
    }

    /// First frame: fit the chain onto the cloud with the ordered
    /// markers as both the reference configuration and the anchors,
    /// then freeze the arc-length table.
    fn initialise(
        &mut self,
        cloud: &DMatrix<f64>,
        ordered: &[Vector3<f64>],
    ) -> Result<FrameResult, Error> {
        // The LLE neighbourhood needs a handful of nodes on each side.
        if ordered.len() < 7 {
            return Err(Error::MarkerChainBreak {
                sorted: ordered.len(),
                total: ordered.len(),
            });
        }
        let nodes_0 = utils::points_matrix(ordered);
        let anchors: Vec<Anchor> = ordered
            .iter()
            .enumerate()
            .map(|(i, p)| Anchor::new(i, *p))
            .collect();

        let obs = Obs {
            anchors: &anchors,
            ..Obs::new(cloud, &nodes_0)
        };
        let (nodes, sigma2) = registration::register(&Config::initialization(), &obs)?;

        let arc_coords = utils::arc_coordinates(&nodes);
        let total_len = *arc_coords.last().unwrap();
        log::info!(
            "initialised {} nodes, total length {:.3} m",
            nodes.nrows(),
            total_len
        );

        let frame_error = frame_error(&nodes, ordered);
        self.state = Some(TrackState {
            nodes: nodes.clone(),
            sigma2,
            arc_coords,
            total_len,
        });
        Ok(FrameResult {
            nodes,
            markers: ordered.to_vec(),
            guide_nodes: None,
            frame_error,
        })
    }

    /// Subsequent frames: visibility pre-processing, then the tracking
    /// solve seeded with the previous nodes and variance.
    fn track(
        &mut self,
        cloud: &DMatrix<f64>,
        mask: &Mask,
        ordered: &[Vector3<f64>],
    ) -> Result<FrameResult, Error> {
        let state = self.state.as_ref().ok_or(Error::NotInitialised)?;

        let visibility = preprocess::pre_process(
            cloud,
            &state.nodes,
            &state.arc_coords,
            state.total_len,
            mask,
            &self.camera,
        )?;

        let obs = Obs {
            sigma2_0: Some(state.sigma2),
            anchors: &visibility.anchors,
            occluded: &visibility.occluded,
            ..Obs::new(cloud, &state.nodes)
        };
        let (nodes, sigma2) = registration::register(&Config::tracking(), &obs)?;

        let frame_error = frame_error(&nodes, ordered);
        let state = self.state.as_mut().expect("state checked above");
        state.nodes = nodes.clone();
        state.sigma2 = sigma2;

        Ok(FrameResult {
            nodes,
            markers: ordered.to_vec(),
            guide_nodes: Some(visibility.guide_nodes),
            frame_error,
        })
    }
}

/// Mean distance between the tracked nodes and the ordered markers,
/// defined only when the counts match.
fn frame_error(nodes: &DMatrix<f64>, markers: &[Vector3<f64>]) -> Option<f64> {
    let m = nodes.nrows();
    if markers.len() != m || m < 2 {
        return None;
    }
    let sum: f64 = markers
        .iter()
        .enumerate()
        .map(|(i, p)| (utils::row_point(nodes, i) - p).norm())
        .sum();
    Some(sum / (m - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: f64 = 0.7;

    fn markers() -> Vec<Vector3<f64>> {
        (0..8)
            .map(|i| Vector3::new(i as f64 * 0.014, 0.0, DEPTH))
            .collect()
    }

    fn rope_cloud(count: usize) -> DMatrix<f64> {
        let pts: Vec<Vector3<f64>> = (0..count)
            .map(|i| {
                let t = 0.098 * i as f64 / (count - 1) as f64;
                let jitter = 0.0003 * (7.3 * i as f64).sin();
                Vector3::new(t, jitter, DEPTH + jitter)
            })
            .collect();
        utils::points_matrix(&pts)
    }

    fn full_mask(camera: &Camera, cloud: &DMatrix<f64>) -> Mask {
        let mut pixels = DMatrix::from_element(camera.height(), camera.width(), 0u8);
        for i in 0..cloud.nrows() {
            let (u, v) = camera.project(&utils::row_point(cloud, i));
            pixels[(v, u)] = 255;
        }
        Mask::new(pixels)
    }

    #[test]
    fn first_frame_initialises_on_the_markers() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera.clone());
        let cloud = rope_cloud(1000);
        let mask = full_mask(&camera, &cloud);
        let markers = markers();

        let result = tracker.process_frame(&cloud, &mask, &markers).unwrap();
        assert!(tracker.is_initialised());
        assert!(result.guide_nodes.is_none());
        for (i, marker) in markers.iter().enumerate() {
            let d = (utils::row_point(&result.nodes, i) - marker).norm();
            assert!(d < 1e-3, "node {} off by {} m", i, d);
        }
        // The arc table was frozen: 7 links of roughly 14 mm.
        let state = tracker.state.as_ref().unwrap();
        assert!((state.total_len - 0.098).abs() < 0.004);
        assert_eq!(state.arc_coords.len(), 8);
        assert_eq!(state.arc_coords[0], 0.0);
    }

    #[test]
    fn tracking_a_static_rope_stays_put() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera.clone());
        let cloud = rope_cloud(1000);
        let mask = full_mask(&camera, &cloud);
        let markers = markers();

        let first = tracker.process_frame(&cloud, &mask, &markers).unwrap();
        let second = tracker.process_frame(&cloud, &mask, &markers).unwrap();

        assert!(second.guide_nodes.is_some());
        let drift = (&second.nodes - &first.nodes).norm();
        assert!(drift < 3e-3, "static rope drifted {} m", drift);
        assert!(second.frame_error.unwrap() < 3e-3);
    }

    #[test]
    fn reversed_markers_are_reoriented() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera.clone());
        let cloud = rope_cloud(1000);
        let mask = full_mask(&camera, &cloud);
        let markers = markers();

        tracker.process_frame(&cloud, &mask, &markers).unwrap();

        let mut reversed = markers.clone();
        reversed.reverse();
        let result = tracker.process_frame(&cloud, &mask, &reversed).unwrap();
        // The chain is flipped back to the original orientation.
        assert!((result.markers[0] - markers[0]).norm() < 1e-9);
        assert!((result.markers[7] - markers[7]).norm() < 1e-9);
    }

    #[test]
    fn empty_cloud_skips_the_frame() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera);
        let empty = DMatrix::zeros(0, 3);
        let mask = Mask::full(720, 1280);
        assert!(matches!(
            tracker.process_frame(&empty, &mask, &markers()),
            Err(Error::EmptyCloud)
        ));
        assert!(!tracker.is_initialised());
    }

    #[test]
    fn broken_marker_chain_skips_initialisation() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera.clone());
        let cloud = rope_cloud(500);
        let mask = full_mask(&camera, &cloud);

        // A far-away island breaks the chain.
        let mut bad_markers = markers();
        bad_markers.push(Vector3::new(2.0, 0.0, DEPTH));
        assert!(matches!(
            tracker.process_frame(&cloud, &mask, &bad_markers),
            Err(Error::MarkerChainBreak { .. })
        ));
        assert!(!tracker.is_initialised());
    }

    #[test]
    fn too_few_markers_cannot_initialise() {
        let camera = Camera::default_rig();
        let mut tracker = Tracker::new(camera.clone());
        let cloud = rope_cloud(500);
        let mask = full_mask(&camera, &cloud);
        let few: Vec<Vector3<f64>> = markers().into_iter().take(3).collect();
        assert!(tracker.process_frame(&cloud, &mask, &few).is_err());
        assert!(!tracker.is_initialised());
    }
}
