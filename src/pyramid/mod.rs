//! Grayscale pyramid used to search for fiducials on a coarse raster.
//!
//! Level 0 is the full-resolution scan in `[0, 1]`. Each further level
//! applies a separable filter (5-tap Gaussian by default) and keeps every
//! other pixel, so a point `p` on level `k` maps to `p * 2^k` at full
//! resolution. Borders clamp to the image extents.

pub mod filters;

use crate::image::{ImageF32, ImageView, ImageViewMut};
pub use filters::{SeparableFilter, GAUSSIAN_5TAP, IDENTITY};

#[derive(Clone, Debug, Default)]
pub struct Pyramid {
    pub levels: Vec<ImageF32>,
}

impl Pyramid {
    /// Downsample until the longer side is at most `max_dim` (or the image
    /// stops shrinking). `max_dim == 0` keeps only level 0.
    pub fn build_to_max_dim(image: ImageF32, max_dim: usize, filter: SeparableFilter) -> Self {
        let mut levels = vec![image];
        if max_dim == 0 {
            return Self { levels };
        }
        let mut horiz_cache = Vec::new();
        let mut cached_rows = Vec::new();
        loop {
            let prev = levels.last().expect("level 0 always present");
            if prev.w.max(prev.h) <= max_dim || prev.w < 2 || prev.h < 2 {
                break;
            }
            let mut down = ImageF32::new(prev.w.div_ceil(2), prev.h.div_ceil(2));
            downsample_with_filter(prev, &mut down, filter, &mut horiz_cache, &mut cached_rows);
            levels.push(down);
        }
        Self { levels }
    }

    pub fn coarsest(&self) -> &ImageF32 {
        self.levels.last().expect("pyramid has at least one level")
    }

    pub fn coarsest_index(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Multiplier mapping level-`index` pixel coordinates to level 0.
    pub fn scale_to_full(index: usize) -> f32 {
        (1u32 << index.min(31)) as f32
    }
}

fn downsample_with_filter(
    src: &ImageF32,
    dst: &mut ImageF32,
    filter: SeparableFilter,
    horiz_cache: &mut Vec<f32>,
    cached_rows: &mut Vec<isize>,
) {
    if src.w == 0 || src.h == 0 || dst.w == 0 || dst.h == 0 {
        return;
    }
    let taps = filter.taps();
    let radius = filter.radius();
    let taps_len = taps.len();
    let cache_width = dst.w;

    horiz_cache.clear();
    horiz_cache.resize(cache_width * taps_len, 0.0);
    cached_rows.clear();
    cached_rows.resize(taps_len, -1);

    for y in 0..dst.h {
        let center_sy = (y * 2) as isize;
        for ky in 0..taps_len {
            let offset = ky as isize - radius as isize;
            let sy = clamp_index(center_sy + offset, src.h) as isize;
            if cached_rows[ky] != sy {
                let cache_row = &mut horiz_cache[ky * cache_width..(ky + 1) * cache_width];
                filter_row_downsample(src.row(sy as usize), cache_row, taps, radius);
                cached_rows[ky] = sy;
            }
        }
        let dst_row = dst.row_mut(y);
        for (x, dst_px) in dst_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ky, &tap) in taps.iter().enumerate() {
                acc += tap * horiz_cache[ky * cache_width + x];
            }
            *dst_px = acc;
        }
    }
}

fn filter_row_downsample(row: &[f32], out: &mut [f32], taps: &[f32], radius: usize) {
    let mut sx = 0isize;
    for dst_px in out {
        let mut acc = 0.0f32;
        for (k, &tap) in taps.iter().enumerate() {
            let idx = clamp_index(sx + k as isize - radius as isize, row.len());
            acc += tap * row[idx];
        }
        *dst_px = acc;
        sx += 2;
    }
}

fn clamp_index(idx: isize, upper: usize) -> usize {
    if idx < 0 {
        0
    } else {
        (idx as usize).min(upper.saturating_sub(1))
    }
}
