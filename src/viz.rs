// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Overlay rendering of the tracked chain onto the colour frame.

use image::{Rgb, RgbImage};
use nalgebra::DMatrix;

use crate::camera::Camera;
use crate::mask::Mask;
use crate::preprocess::MASK_DIST_THRESHOLD;
use crate::utils;

const VISIBLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OCCLUDED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_COLOR: Rgb<u8> = Rgb([255, 150, 0]);
const NODE_RADIUS: i64 = 5;

/// Draw the tracked nodes and the detected marker centres on the frame.
///
/// Nodes and links are green where the node passes the mask-distance
/// test and red where it does not; marker ground truths are orange.
pub fn draw_overlay(
    img: &mut RgbImage,
    nodes: &DMatrix<f64>,
    mask: &Mask,
    camera: &Camera,
    marker_centres: &[(f64, f64)],
) {
    let dist_map = mask.distance_to_foreground();
    let m = nodes.nrows();

    let pixels: Vec<(usize, usize)> = (0..m)
        .map(|i| camera.project(&utils::row_point(nodes, i)))
        .collect();
    let visible: Vec<bool> = pixels
        .iter()
        .map(|&(u, v)| dist_map[(v, u)] < MASK_DIST_THRESHOLD)
        .collect();

    for i in 0..m {
        if i + 1 < m {
            let color = if visible[i] {
                VISIBLE_COLOR
            } else {
                OCCLUDED_COLOR
            };
            draw_segment(img, pixels[i], pixels[i + 1], color);
        }
    }
    for i in 0..m {
        let color = if visible[i] {
            VISIBLE_COLOR
        } else {
            OCCLUDED_COLOR
        };
        draw_disc(img, pixels[i], NODE_RADIUS, color);
    }
    for &(u, v) in marker_centres {
        draw_disc(img, (u as usize, v as usize), NODE_RADIUS, MARKER_COLOR);
    }
}

/// Darken everything outside the occlusion mask, mirroring how the
/// occluder is shown in the recordings.
pub fn darken_occluder(img: &mut RgbImage, occlusion: &Mask) {
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let (v, u) = (y as usize, x as usize);
        if v < occlusion.height() && u < occlusion.width() && !occlusion.is_foreground(v, u) {
            *pixel = Rgb([0, 0, 0]);
        }
    }
}

fn draw_disc(img: &mut RgbImage, center: (usize, usize), radius: i64, color: Rgb<u8>) {
    let (cu, cv) = (center.0 as i64, center.1 as i64);
    for dv in -radius..=radius {
        for du in -radius..=radius {
            if du * du + dv * dv > radius * radius {
                continue;
            }
            let (u, v) = (cu + du, cv + dv);
            if u >= 0 && v >= 0 && (u as u32) < img.width() && (v as u32) < img.height() {
                img.put_pixel(u as u32, v as u32, color);
            }
        }
    }
}

/// Bresenham segment, drawn 2 px wide.
fn draw_segment(img: &mut RgbImage, from: (usize, usize), to: (usize, usize), color: Rgb<u8>) {
    let (mut u0, mut v0) = (from.0 as i64, from.1 as i64);
    let (u1, v1) = (to.0 as i64, to.1 as i64);
    let du = (u1 - u0).abs();
    let dv = -(v1 - v0).abs();
    let su = if u0 < u1 { 1 } else { -1 };
    let sv = if v0 < v1 { 1 } else { -1 };
    let mut err = du + dv;
    loop {
        for (ou, ov) in [(0, 0), (1, 0), (0, 1)] {
            let (u, v) = (u0 + ou, v0 + ov);
            if u >= 0 && v >= 0 && (u as u32) < img.width() && (v as u32) < img.height() {
                img.put_pixel(u as u32, v as u32, color);
            }
        }
        if u0 == u1 && v0 == v1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dv {
            err += dv;
            u0 += su;
        }
        if e2 <= du {
            err += du;
            v0 += sv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn nodes_on_the_mask_are_drawn_green() {
        let camera = Camera::default_rig();
        let mut img = RgbImage::new(1280, 720);

        // One node at the principal point, mask painted there.
        let nodes = DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 0.7]);
        let mut pixels = DMatrix::from_element(720, 1280, 0u8);
        let (u, v) = camera.project(&Vector3::new(0.0, 0.0, 0.7));
        pixels[(v, u)] = 255;
        let mask = Mask::new(pixels);

        draw_overlay(&mut img, &nodes, &mask, &camera, &[]);
        assert_eq!(*img.get_pixel(u as u32, v as u32), VISIBLE_COLOR);
    }

    #[test]
    fn nodes_off_the_mask_are_drawn_red() {
        let camera = Camera::default_rig();
        let mut img = RgbImage::new(1280, 720);
        let nodes = DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 0.7]);
        // Mask painted far away from the node's projection.
        let mut pixels = DMatrix::from_element(720, 1280, 0u8);
        pixels[(10, 10)] = 255;
        let mask = Mask::new(pixels);

        let (u, v) = camera.project(&Vector3::new(0.0, 0.0, 0.7));
        draw_overlay(&mut img, &nodes, &mask, &camera, &[]);
        assert_eq!(*img.get_pixel(u as u32, v as u32), OCCLUDED_COLOR);
    }

    #[test]
    fn occluder_darkens_the_frame() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let pixels = DMatrix::from_fn(4, 4, |i, _| if i < 2 { 0u8 } else { 255 });
        let occl = Mask::new(pixels);
        darken_occluder(&mut img, &occl);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(0, 3), Rgb([200, 200, 200]));
    }
}
