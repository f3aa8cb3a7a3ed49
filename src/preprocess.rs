// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility-aware pre-processing of one tracking frame.
//!
//! A coarse registration pass produces *guide nodes*: a quick fit of the
//! chain onto this frame's cloud, used only to reason about which part
//! of the object is visible. Projecting the guide nodes into the mask
//! splits the chain into a visible head segment, a visible tail segment
//! and an occluded middle; the visible segments are resampled with a
//! spline and indexed by the stored arc-length table to produce
//! correspondence priors for the tracking solve.

use nalgebra::DMatrix;

use crate::camera::Camera;
use crate::error::Error;
use crate::mask::Mask;
use crate::registration::{self, Anchor, Config, Obs};
use crate::spline::CubicSpline;
use crate::utils;

/// End displacement below which a chain end counts as visible (metres).
pub const END_VISIBLE_THRESHOLD: f64 = 0.007;
/// Projected guide node is visible when the mask distance transform is
/// below this many pixels.
pub const MASK_DIST_THRESHOLD: f64 = 10.0;
/// Spline resampling resolution (metres).
const SPLINE_STEP: f64 = 0.001;
/// Spline smoothing factor.
const SPLINE_SMOOTHING: f64 = 1e-4;

/// Everything the tracking solve needs to know about visibility.
#[derive(Debug, Clone)]
pub struct Visibility {
    /// Coarse fit of the chain onto this frame's cloud.
    pub guide_nodes: DMatrix<f64>,
    /// Correspondence priors for the visible segments, sorted by node.
    pub anchors: Vec<Anchor>,
    /// Contiguous occluded node index range (empty when fully visible).
    pub occluded: Vec<usize>,
}

/// Run the guide pass, then classify visibility and synthesise
/// correspondence priors for the frame.
pub fn pre_process(
    cloud: &DMatrix<f64>,
    nodes_0: &DMatrix<f64>,
    arc_coords: &[f64],
    total_len: f64,
    mask: &Mask,
    camera: &Camera,
) -> Result<Visibility, Error> {
    let (guide_nodes, _) = registration::register(&Config::guide(), &Obs::new(cloud, nodes_0))?;
    classify_visibility(guide_nodes, nodes_0, arc_coords, total_len, mask, camera)
}

/// Classify which part of the chain is visible from a finished guide
/// pass, and build the correspondence priors and the occluded range.
pub fn classify_visibility(
    guide_nodes: DMatrix<f64>,
    nodes_0: &DMatrix<f64>,
    arc_coords: &[f64],
    total_len: f64,
    mask: &Mask,
    camera: &Camera,
) -> Result<Visibility, Error> {
    let m = nodes_0.nrows();

    let head_disp = utils::row_dist(&guide_nodes, 0, nodes_0, 0);
    let tail_disp = utils::row_dist(&guide_nodes, m - 1, nodes_0, m - 1);
    let mut head_visible = head_disp < END_VISIBLE_THRESHOLD;
    let mut tail_visible = tail_disp < END_VISIBLE_THRESHOLD;
    if !head_visible && !tail_visible {
        // Neither end obviously anchored: call the steadier one visible.
        if head_disp < tail_disp {
            head_visible = true;
        } else {
            tail_visible = true;
        }
    }

    let guide_len = utils::polyline_length(&guide_nodes);
    log::debug!(
        "head displacement {:.4}, tail displacement {:.4}, length difference {:.4}",
        head_disp,
        tail_disp,
        (guide_len - total_len).abs()
    );

    if (guide_len - total_len).abs() < END_VISIBLE_THRESHOLD {
        return Ok(length_preserved(guide_nodes));
    }

    // The chain lost length: part of it occupies no observed space.
    // Project the guide nodes into the mask to find which part.
    let valid = mask_valid_nodes(&guide_nodes, mask, camera);
    let head_prefix = valid.iter().take_while(|&&v| v).count();
    let tail_suffix = valid.iter().rev().take_while(|&&v| v).count();

    let outcome = if head_visible && tail_visible {
        log::debug!("both ends visible, middle occluded");
        middle_occluded(&guide_nodes, arc_coords, head_prefix, tail_suffix)
    } else if head_visible {
        log::debug!("head visible only");
        head_only(&guide_nodes, arc_coords, head_prefix)
    } else {
        log::debug!("tail visible only");
        tail_only(&guide_nodes, arc_coords, tail_suffix)
    };

    match outcome {
        Ok(visibility) => Ok(visibility),
        Err(Error::EmptyValidPrefix(end)) => {
            // No usable segment on a side we expected visible: treat the
            // frame as length-preserved rather than dropping it.
            log::warn!("no valid {} segment, treating frame as fully visible", end);
            Ok(length_preserved(guide_nodes))
        }
        Err(err) => Err(err),
    }
}

/// Case 1: the whole chain is accounted for; anchor both ends.
fn length_preserved(guide_nodes: DMatrix<f64>) -> Visibility {
    let m = guide_nodes.nrows();
    let anchors = vec![
        Anchor::new(0, utils::row_point(&guide_nodes, 0)),
        Anchor::new(m - 1, utils::row_point(&guide_nodes, m - 1)),
    ];
    Visibility {
        guide_nodes,
        anchors,
        occluded: Vec::new(),
    }
}

/// Mask-distance validity of every projected guide node.
fn mask_valid_nodes(guide_nodes: &DMatrix<f64>, mask: &Mask, camera: &Camera) -> Vec<bool> {
    let dist_map = mask.distance_to_foreground();
    (0..guide_nodes.nrows())
        .map(|i| {
            let (u, v) = camera.project(&utils::row_point(guide_nodes, i));
            dist_map[(v, u)] < MASK_DIST_THRESHOLD
        })
        .collect()
}

fn middle_occluded(
    guide_nodes: &DMatrix<f64>,
    arc_coords: &[f64],
    head_prefix: usize,
    tail_suffix: usize,
) -> Result<Visibility, Error> {
    let (head_anchors, last_head) = head_segment_priors(guide_nodes, arc_coords, head_prefix)?;
    let (tail_anchors, first_tail) = tail_segment_priors(guide_nodes, arc_coords, tail_suffix)?;

    let occluded: Vec<usize> = (last_head + 1..first_tail).collect();
    let mut anchors = head_anchors;
    anchors.extend(tail_anchors);
    Ok(Visibility {
        guide_nodes: guide_nodes.clone_owned(),
        anchors,
        occluded,
    })
}

fn head_only(
    guide_nodes: &DMatrix<f64>,
    arc_coords: &[f64],
    head_prefix: usize,
) -> Result<Visibility, Error> {
    let m = guide_nodes.nrows();
    let (anchors, last_head) = head_segment_priors(guide_nodes, arc_coords, head_prefix)?;
    let occluded: Vec<usize> = (last_head + 1..m).collect();
    Ok(Visibility {
        guide_nodes: guide_nodes.clone_owned(),
        anchors,
        occluded,
    })
}

fn tail_only(
    guide_nodes: &DMatrix<f64>,
    arc_coords: &[f64],
    tail_suffix: usize,
) -> Result<Visibility, Error> {
    let (anchors, first_tail) = tail_segment_priors(guide_nodes, arc_coords, tail_suffix)?;
    let occluded: Vec<usize> = (0..first_tail).collect();
    Ok(Visibility {
        guide_nodes: guide_nodes.clone_owned(),
        anchors,
        occluded,
    })
}

/// Spline-resample the visible head segment and anchor every node whose
/// arc coordinate falls inside it. Returns the anchors and the last
/// head-visible node index.
fn head_segment_priors(
    guide_nodes: &DMatrix<f64>,
    arc_coords: &[f64],
    head_prefix: usize,
) -> Result<(Vec<Anchor>, usize), Error> {
    let samples = resample_segment(guide_nodes, 0, head_prefix, false)
        .ok_or(Error::EmptyValidPrefix("head"))?;
    let spline_len = utils::polyline_length(&samples);

    let visible = arc_coords.iter().filter(|&&g| g <= spline_len).count();
    if visible == 0 {
        return Err(Error::EmptyValidPrefix("head"));
    }
    let last_head = visible - 1;
    let anchors = (0..=last_head)
        .map(|i| {
            let idx = sample_index(arc_coords[i], samples.nrows());
            Anchor::new(i, utils::row_point(&samples, idx))
        })
        .collect();
    Ok((anchors, last_head))
}

/// Mirror of `head_segment_priors`: the tail segment is resampled from
/// the chain end inward and indexed by the arc table reflected about its
/// last entry. Returns the anchors and the first tail-visible node index.
fn tail_segment_priors(
    guide_nodes: &DMatrix<f64>,
    arc_coords: &[f64],
    tail_suffix: usize,
) -> Result<(Vec<Anchor>, usize), Error> {
    let m = guide_nodes.nrows();
    let samples = resample_segment(guide_nodes, m - tail_suffix, tail_suffix, true)
        .ok_or(Error::EmptyValidPrefix("tail"))?;
    let spline_len = utils::polyline_length(&samples);

    let total = arc_coords[m - 1];
    let arc_from_tail: Vec<f64> = (0..m)
        .map(|j| (total - arc_coords[m - 1 - j]).abs())
        .collect();

    let visible = arc_from_tail.iter().filter(|&&g| g <= spline_len).count();
    if visible == 0 {
        return Err(Error::EmptyValidPrefix("tail"));
    }
    let first_tail = m - visible;
    let anchors = (0..visible)
        .map(|j| {
            let idx = sample_index(arc_from_tail[j], samples.nrows());
            Anchor::new(m - 1 - j, utils::row_point(&samples, idx))
        })
        .collect();
    Ok((anchors, first_tail))
}

/// Fit the spline through `count` guide nodes starting at `start` and
/// resample it at millimetre resolution. `reversed` walks the segment
/// from its far end inward (used for the tail).
fn resample_segment(
    guide_nodes: &DMatrix<f64>,
    start: usize,
    count: usize,
    reversed: bool,
) -> Option<DMatrix<f64>> {
    if count < 2 {
        return None;
    }
    let mut segment = DMatrix::zeros(count, 3);
    for i in 0..count {
        let src = if reversed {
            start + count - 1 - i
        } else {
            start + i
        };
        for c in 0..3 {
            segment[(i, c)] = guide_nodes[(src, c)];
        }
    }
    let chord = utils::polyline_length(&segment);
    let sample_count = (chord / SPLINE_STEP) as usize;
    if sample_count < 2 {
        return None;
    }
    let spline = CubicSpline::fit(&segment, SPLINE_SMOOTHING)?;
    Some(spline.sample_uniform(sample_count))
}

/// Index of the millimetre sample at arc position `g`, clamped into range.
fn sample_index(g: f64, sample_count: usize) -> usize {
    ((g * 1000.0) as usize).min(sample_count - 1)
}
