//! Rasterize a template: printable blank sheets and synthetic test scans.
use super::{BubbleGrid, BubbleRegion};
use crate::image::ImageF32;

const PAPER: f32 = 1.0;
const INK: f32 = 0.05;
const OUTLINE: f32 = 0.35;
const PENCIL: f32 = 0.12;

/// Paint a sheet with the given marks (`marks[slot]` lists marked option
/// indices; missing slots stay blank, out-of-range indices are ignored).
pub fn render_sheet(grid: &BubbleGrid, marks: &[Vec<usize>]) -> ImageF32 {
    let mut img = ImageF32::filled(grid.width, grid.height, PAPER);
    for f in &grid.fiducials {
        let half = f.size / 2.0;
        fill_rect(
            &mut img,
            f.center[0] - half,
            f.center[1] - half,
            f.center[0] + half,
            f.center[1] + half,
            INK,
        );
    }
    for (i, slot) in grid.slots.iter().enumerate() {
        for bubble in &slot.options {
            paint_ring(&mut img, bubble, 1.2, OUTLINE);
        }
        if let Some(selected) = marks.get(i) {
            for &o in selected {
                if let Some(bubble) = slot.options.get(o) {
                    paint_disc(&mut img, bubble, 0.9, PENCIL);
                }
            }
        }
    }
    img
}

fn fill_rect(img: &mut ImageF32, x0: f32, y0: f32, x1: f32, y1: f32, value: f32) {
    let xs = x0.max(0.0).round() as usize;
    let ys = y0.max(0.0).round() as usize;
    let xe = (x1.round().max(0.0) as usize).min(img.w);
    let ye = (y1.round().max(0.0) as usize).min(img.h);
    for y in ys..ye {
        for x in xs..xe {
            img.set(x, y, value);
        }
    }
}

/// Visit pixels whose centre lies within `[r_in, r_out]` of the bubble centre.
fn for_each_in_annulus(
    img: &ImageF32,
    bubble: &BubbleRegion,
    r_in: f32,
    r_out: f32,
    mut f: impl FnMut(usize, usize),
) {
    let [cx, cy] = bubble.center;
    let x0 = (cx - r_out).floor().max(0.0) as usize;
    let y0 = (cy - r_out).floor().max(0.0) as usize;
    let x1 = ((cx + r_out).ceil().max(0.0) as usize).min(img.w.saturating_sub(1));
    let y1 = ((cy + r_out).ceil().max(0.0) as usize).min(img.h.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if d >= r_in && d <= r_out {
                f(x, y);
            }
        }
    }
}

fn paint_ring(img: &mut ImageF32, bubble: &BubbleRegion, thickness: f32, value: f32) {
    let mut pts = Vec::new();
    for_each_in_annulus(
        img,
        bubble,
        bubble.radius - thickness,
        bubble.radius + thickness,
        |x, y| pts.push((x, y)),
    );
    for (x, y) in pts {
        img.set(x, y, value);
    }
}

/// Fill a disc of `scale × radius` with `value`.
pub fn paint_disc(img: &mut ImageF32, bubble: &BubbleRegion, scale: f32, value: f32) {
    let mut pts = Vec::new();
    for_each_in_annulus(img, bubble, 0.0, bubble.radius * scale, |x, y| {
        pts.push((x, y))
    });
    for (x, y) in pts {
        img.set(x, y, value);
    }
}

/// Shade the top `fraction` (by height) of a bubble, imitating a half-erased
/// or sloppy mark.
pub fn paint_partial_fill(img: &mut ImageF32, bubble: &BubbleRegion, fraction: f32) {
    let limit = bubble.center[1] - bubble.radius + 2.0 * bubble.radius * fraction.clamp(0.0, 1.0);
    let mut pts = Vec::new();
    for_each_in_annulus(img, bubble, 0.0, bubble.radius * 0.9, |x, y| {
        if (y as f32) < limit {
            pts.push((x, y));
        }
    });
    for (x, y) in pts {
        img.set(x, y, PENCIL);
    }
}
