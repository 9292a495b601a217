use crate::homography::apply_homography;
use crate::image::{ImageF32, ImageViewMut};
use nalgebra::Matrix3;

/// Value used for canvas pixels that map outside the scan.
pub const OUTSIDE: f32 = 1.0;

/// Resample `src` into a `w × h` canvas. `canvas_to_src` maps canvas pixel
/// centres to source pixel coordinates; samples are bilinear.
pub fn warp_to_canvas(src: &ImageF32, canvas_to_src: &Matrix3<f32>, w: usize, h: usize) -> ImageF32 {
    let mut out = ImageF32::filled(w, h, OUTSIDE);
    for y in 0..h {
        let row = out.row_mut(y);
        for (x, dst) in row.iter_mut().enumerate() {
            if let Some(p) = apply_homography(canvas_to_src, [x as f32, y as f32]) {
                if let Some(v) = src.sample_bilinear(p[0], p[1]) {
                    *dst = v;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_shifts_content() {
        let mut src = ImageF32::filled(10, 10, 1.0);
        src.set(6, 4, 0.0);
        let shift = Matrix3::new(1.0, 0.0, 3.0, 0.0, 1.0, 2.0, 0.0, 0.0, 1.0);
        let out = warp_to_canvas(&src, &shift, 5, 5);
        assert_eq!(out.get(3, 2), 0.0);
        assert_eq!(out.get(0, 0), 1.0);
    }

    #[test]
    fn unmapped_pixels_are_paper() {
        let src = ImageF32::new(4, 4);
        let far = Matrix3::new(1.0, 0.0, 100.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let out = warp_to_canvas(&src, &far, 3, 3);
        assert!(out.data.iter().all(|&v| v == OUTSIDE));
    }
}
