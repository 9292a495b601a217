//! Adaptive (local-mean) binarization.
//!
//! A pixel counts as ink when it is darker than `(1 - sensitivity)` times the
//! mean of a square window around it, or darker than the absolute
//! `dark_floor`. Window means come from a summed-area table, so the cost is
//! O(W·H) regardless of window size.
use crate::image::{ImageF32, ImageView};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// Window radius as a fraction of the shorter image side.
    pub window_frac: f32,
    /// Lower bound on the window radius in pixels.
    pub min_window_radius: usize,
    /// Relative darkness below the local mean that counts as ink.
    pub sensitivity: f32,
    /// Intensities at or below this are always ink (solid marks larger than
    /// the window would otherwise come out hollow).
    pub dark_floor: f32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            window_frac: 0.06,
            min_window_radius: 3,
            sensitivity: 0.15,
            dark_floor: 0.15,
        }
    }
}

impl ThresholdParams {
    pub fn window_radius(&self, w: usize, h: usize) -> usize {
        let frac = (w.min(h) as f32 * self.window_frac.max(0.0)).round() as usize;
        frac.max(self.min_window_radius).max(1)
    }
}

/// Binary raster: 1 = ink, 0 = paper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InkMask {
    pub w: usize,
    pub h: usize,
    pub data: Vec<u8>,
}

impl InkMask {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0; w * h],
        }
    }

    #[inline]
    pub fn is_ink(&self, x: usize, y: usize) -> bool {
        self.data[y * self.w + x] != 0
    }

    pub fn ink_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Render as black ink on white paper for debug output.
    pub fn to_gray_u8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| if v != 0 { 0 } else { 255 })
            .collect()
    }
}

impl ImageView for InkMask {
    type Pixel = u8;

    fn width(&self) -> usize {
        self.w
    }
    fn height(&self) -> usize {
        self.h
    }
    fn stride(&self) -> usize {
        self.w
    }
    fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.w..(y + 1) * self.w]
    }
    fn as_slice(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// Summed-area table with a zero-padded first row and column.
struct Integral {
    stride: usize,
    table: Vec<f64>,
}

impl Integral {
    fn new(img: &ImageF32) -> Self {
        let stride = img.w + 1;
        let mut table = vec![0.0f64; stride * (img.h + 1)];
        for y in 0..img.h {
            let mut row_sum = 0.0f64;
            for (x, &px) in img.row(y).iter().enumerate() {
                row_sum += px as f64;
                table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
            }
        }
        Self { stride, table }
    }

    /// Mean over the half-open box `[x0, x1) × [y0, y1)`.
    fn box_mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f32 {
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        if area == 0.0 {
            return 1.0;
        }
        let s = self.stride;
        let sum = self.table[y1 * s + x1] - self.table[y0 * s + x1] - self.table[y1 * s + x0]
            + self.table[y0 * s + x0];
        (sum / area) as f32
    }
}

/// Binarize `img` with a local-mean threshold.
pub fn adaptive_threshold(img: &ImageF32, params: &ThresholdParams) -> InkMask {
    let mut mask = InkMask::new(img.w, img.h);
    if img.w == 0 || img.h == 0 {
        return mask;
    }
    let integral = Integral::new(img);
    let r = params.window_radius(img.w, img.h);
    let scale = 1.0 - params.sensitivity.clamp(0.0, 1.0);
    for y in 0..img.h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(img.h);
        let row = img.row(y);
        let out = &mut mask.data[y * img.w..(y + 1) * img.w];
        for (x, (&px, dst)) in row.iter().zip(out.iter_mut()).enumerate() {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(img.w);
            let mean = integral.box_mean(x0, y0, x1, y1);
            *dst = u8::from(px <= params.dark_floor || px < mean * scale);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_paper_has_no_ink() {
        let img = ImageF32::filled(50, 40, 0.9);
        let mask = adaptive_threshold(&img, &ThresholdParams::default());
        assert_eq!(mask.ink_count(), 0);
    }

    #[test]
    fn dark_square_survives_lighting_gradient() {
        // Paper fades from 1.0 to 0.45 left to right; a mid-gray mark sits on
        // the dim side and must still be found while bright-side paper stays clean.
        let (w, h) = (120usize, 60usize);
        let mut img = ImageF32::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let paper = 1.0 - 0.55 * x as f32 / (w - 1) as f32;
                img.set(x, y, paper);
            }
        }
        for y in 28..32 {
            for x in 98..102 {
                img.set(x, y, 0.25);
            }
        }
        let mask = adaptive_threshold(&img, &ThresholdParams::default());
        assert!(mask.is_ink(100, 30));
        assert!(!mask.is_ink(10, 10));
        assert!(!mask.is_ink(100, 5));
    }

    #[test]
    fn solid_block_larger_than_window_is_filled() {
        let mut img = ImageF32::filled(80, 80, 1.0);
        for y in 10..70 {
            for x in 10..70 {
                img.set(x, y, 0.05);
            }
        }
        let params = ThresholdParams {
            window_frac: 0.0,
            min_window_radius: 3,
            ..Default::default()
        };
        let mask = adaptive_threshold(&img, &params);
        assert!(mask.is_ink(40, 40));
    }
}
