// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Deformable linear object tracking
//!
//! Real-time tracking of a rope or cable from a calibrated RGB-D stream:
//! an ordered chain of 3D nodes follows the object's centerline frame by
//! frame, staying consistent through partial occlusion. The core is a
//! regularised expectation-maximisation registration combining a motion
//! coherence prior, a chain topology prior and anchored correspondences
//! synthesised from the visible parts of the object.

// #![warn(missing_docs)]

pub mod camera;
pub mod chain;
pub mod cloud;
pub mod error;
pub mod interop;
pub mod lle;
pub mod mask;
pub mod preprocess;
pub mod registration;
pub mod segment;
pub mod spline;
pub mod tracker;
pub mod utils;
pub mod viz;

pub use error::Error;
