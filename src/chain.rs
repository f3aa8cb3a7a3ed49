// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Ordering of detected marker centres into a 1D chain.
//!
//! Markers come out of blob detection in arbitrary order. The chain is
//! grown greedily: from the current end, the next marker must be the
//! nearest remaining point lying on the opposite side of the previous
//! link, within a fixed distance guard.

use nalgebra::Vector3;

/// Maximum link length accepted when growing the chain (metres).
pub const OPPOSITE_GUARD: f64 = 0.07;

/// Distance below which the previous head matching the current tail
/// means the chain came out reversed (metres).
pub const REVERSE_THRESHOLD: f64 = 0.05;

/// Result of ordering one frame's markers.
#[derive(Debug, Clone)]
pub struct SortedChain {
    /// Markers in chain order. Contains all inputs iff `complete`.
    pub points: Vec<Vector3<f64>>,
    /// False when the opposite-closest search broke mid-chain.
    pub complete: bool,
}

/// Index and point of the nearest element of `arr` to `pt`.
fn find_closest(pt: &Vector3<f64>, arr: &[Vector3<f64>]) -> (usize, Vector3<f64>) {
    let mut idx = 0;
    let mut min_dist = (arr[0] - pt).norm_squared();
    for (i, cand) in arr.iter().enumerate().skip(1) {
        let d = (cand - pt).norm_squared();
        if d < min_dist {
            min_dist = d;
            idx = i;
        }
    }
    (idx, arr[idx])
}

/// Nearest element of `arr` to `pt` lying on the opposite side of `pt`
/// from `direction_pt`, within the distance guard.
fn find_opposite_closest(
    pt: &Vector3<f64>,
    arr: &[Vector3<f64>],
    direction_pt: &Vector3<f64>,
) -> Option<Vector3<f64>> {
    let mut remaining: Vec<Vector3<f64>> = arr.to_vec();
    while !remaining.is_empty() {
        let (idx, closest) = find_closest(pt, &remaining);
        remaining.swap_remove(idx);

        let vec1 = closest - pt;
        let vec2 = direction_pt - pt;
        if vec1.dot(&vec2) < 0.0 && vec1.norm_squared() < OPPOSITE_GUARD * OPPOSITE_GUARD {
            return Some(closest);
        }
    }
    None
}

fn remove_point(arr: &mut Vec<Vector3<f64>>, pt: &Vector3<f64>) {
    if let Some(idx) = arr.iter().position(|p| p == pt) {
        arr.remove(idx);
    }
}

/// Order an unordered set of marker centres into a chain.
///
/// The first input point seeds the chain; growth proceeds towards its
/// nearest neighbour, and if the seed also has an opposite-side
/// neighbour, the chain is afterwards extended from the front until
/// exhaustion.
pub fn sort_markers(markers: &[Vector3<f64>]) -> SortedChain {
    let total = markers.len();
    if total < 2 {
        return SortedChain {
            points: markers.to_vec(),
            complete: true,
        };
    }

    let mut pts = markers.to_vec();
    let seed = pts.remove(0);
    let mut chain = vec![seed];

    let (idx, closest_1) = find_closest(&seed, &pts);
    chain.push(closest_1);
    pts.remove(idx);

    // If the seed has a neighbour on the other side, it is an interior
    // point and the chain will also have to grow from the front.
    let closest_2 = find_opposite_closest(&seed, &pts, &closest_1);

    while !pts.is_empty() {
        let target = chain[chain.len() - 1];
        let direction = chain[chain.len() - 2];
        match find_opposite_closest(&target, &pts, &direction) {
            Some(next) => {
                remove_point(&mut pts, &next);
                chain.push(next);
            }
            None => break,
        }
    }

    if let Some(closest_2) = closest_2 {
        // Grow from the front, inserting each new point at index 0.
        if pts.iter().any(|p| *p == closest_2) {
            remove_point(&mut pts, &closest_2);
            chain.insert(0, closest_2);

            while !pts.is_empty() {
                let target = chain[0];
                let direction = chain[1];
                match find_opposite_closest(&target, &pts, &direction) {
                    Some(next) => {
                        remove_point(&mut pts, &next);
                        chain.insert(0, next);
                    }
                    None => break,
                }
            }
        }
    }

    SortedChain {
        complete: chain.len() == total,
        points: chain,
    }
}

/// Reverse the chain when it came out pointing away from the previous
/// frame's head anchor. Returns the (possibly reversed) chain and the
/// new head anchor.
pub fn reconcile_orientation(
    mut chain: Vec<Vector3<f64>>,
    previous_head: Option<&Vector3<f64>>,
) -> (Vec<Vector3<f64>>, Vector3<f64>) {
    if let (Some(head), Some(last)) = (previous_head, chain.last().copied()) {
        if (head - last).norm() < REVERSE_THRESHOLD {
            chain.reverse();
        }
    }
    let new_head = chain[0];
    (chain, new_head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_markers() -> Vec<Vector3<f64>> {
        (0..8)
            .map(|i| Vector3::new(i as f64 * 0.014, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn sorts_a_straight_chain_from_an_end_seed() {
        let markers = straight_markers();
        let sorted = sort_markers(&markers);
        assert!(sorted.complete);
        assert_eq!(sorted.points.len(), 8);
        for (i, p) in sorted.points.iter().enumerate() {
            assert!((p.x - i as f64 * 0.014).abs() < 1e-12);
        }
    }

    #[test]
    fn sorts_from_an_interior_seed() {
        let mut markers = straight_markers();
        markers.swap(0, 4); // seed in the middle of the chain
        let sorted = sort_markers(&markers);
        assert!(sorted.complete);
        assert_eq!(sorted.points.len(), 8);
        let xs: Vec<f64> = sorted.points.iter().map(|p| p.x).collect();
        let mut ascending = xs.clone();
        ascending.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut descending = ascending.clone();
        descending.reverse();
        assert!(xs == ascending || xs == descending);
    }

    #[test]
    fn reversed_input_yields_the_same_chain_reversed() {
        let markers = straight_markers();
        let forward = sort_markers(&markers);
        let mut rev_markers = markers.clone();
        rev_markers.reverse();
        let backward = sort_markers(&rev_markers);
        assert!(backward.complete);
        let mut back = backward.points.clone();
        back.reverse();
        assert!(forward.points == backward.points || forward.points == back);
    }

    #[test]
    fn breaks_when_a_gap_exceeds_the_guard() {
        let mut markers = straight_markers();
        // A far-away island the guard must refuse.
        markers.push(Vector3::new(1.0, 0.0, 0.0));
        let sorted = sort_markers(&markers);
        assert!(!sorted.complete);
        assert_eq!(sorted.points.len(), 8);
    }

    #[test]
    fn orientation_reconciliation_restores_direction() {
        let markers = straight_markers();
        let sorted = sort_markers(&markers);
        let head = sorted.points[0];

        // Same chain handed over reversed: previous head now matches the tail.
        let mut reversed = sorted.points.clone();
        reversed.reverse();
        let (restored, new_head) = reconcile_orientation(reversed, Some(&head));
        assert_eq!(restored[0], head);
        assert_eq!(new_head, head);
    }

    #[test]
    fn far_head_leaves_chain_untouched() {
        let markers = straight_markers();
        let sorted = sort_markers(&markers);
        let far = Vector3::new(5.0, 5.0, 5.0);
        let (kept, _) = reconcile_orientation(sorted.points.clone(), Some(&far));
        assert_eq!(kept, sorted.points);
    }
}
