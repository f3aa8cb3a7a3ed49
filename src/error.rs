// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type shared by the tracking pipeline.

use thiserror::Error;

/// Everything that can go wrong while processing one frame.
///
/// None of these is fatal to the tracker: a failed frame leaves the tracker
/// state untouched and the next frame may recover.
#[derive(Debug, Error)]
pub enum Error {
    /// The M-step system could not be factored, even after regularisation.
    #[error("singular linear system in the M-step")]
    SingularSystem,

    /// Mask projection left no visible node at an end that was classified
    /// visible.
    #[error("no valid {0} segment after mask projection")]
    EmptyValidPrefix(&'static str),

    /// The opposite-closest search failed while points were still left,
    /// so the marker chain could not be completed.
    #[error("marker chain broke after {sorted} of {total} points")]
    MarkerChainBreak { sorted: usize, total: usize },

    /// The foreground cloud of this frame is empty.
    #[error("empty foreground point cloud")]
    EmptyCloud,

    /// The mixture variance collapsed to a non-finite or non-positive value.
    #[error("degenerate mixture variance: {0}")]
    DegenerateVariance(f64),

    /// Tracking was requested before a successful initialisation.
    #[error("tracker is not initialised")]
    NotInitialised,
}
