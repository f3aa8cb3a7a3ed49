// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Conversions between image buffers and the binary mask matrices used
//! by the tracking pipeline.

use image::{GrayImage, Luma};
use nalgebra::DMatrix;

/// Binarise a grayscale image into a mask matrix:
/// 255 where the pixel is strictly positive, 0 elsewhere.
///
/// Images are row major and indexed `(x, y)`, matrices are indexed
/// `(row, column)`, so the axes swap here.
pub fn binary_matrix_from_image(img: &GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_fn(height as usize, width as usize, |i, j| {
        if img.get_pixel(j as u32, i as u32)[0] > 0 {
            255
        } else {
            0
        }
    })
}

/// Render a binary mask matrix back into a grayscale image, for writing
/// the per-frame segmentation next to the overlay.
pub fn image_from_binary_matrix(mat: &DMatrix<u8>) -> GrayImage {
    let (nb_rows, nb_cols) = mat.shape();
    GrayImage::from_fn(nb_cols as u32, nb_rows as u32, |x, y| {
        Luma([mat[(y as usize, x as usize)]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binarise_thresholds_at_zero() {
        let img = GrayImage::from_fn(2, 2, |x, y| Luma([if x == y { 7 } else { 0 }]));
        let mat = binary_matrix_from_image(&img);
        assert_eq!(mat[(0, 0)], 255);
        assert_eq!(mat[(0, 1)], 0);
        assert_eq!(mat[(1, 1)], 255);
    }

    #[test]
    fn rendered_mask_transposes_back_to_image_axes() {
        // 2 rows x 3 columns, foreground in row 1, column 2.
        let mut mat = DMatrix::from_element(2, 3, 0u8);
        mat[(1, 2)] = 255;
        let img = image_from_binary_matrix(&mat);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
    }
}
