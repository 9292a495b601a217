//! Bubble-sheet templates: canvas, corner fiducials and question slots.
//!
//! All coordinates are canonical sheet pixels with the origin at the top-left
//! corner of the canvas. A template is independent of any scan; the
//! normalizer warps scans into this frame and the extractor reads bubbles
//! from it.
//!
//! Templates are either written by hand as JSON ([`BubbleGrid`]) or generated
//! from a regular column layout ([`GridLayout`]).

mod layout;
mod render;

pub use layout::GridLayout;
pub use render::{paint_disc, paint_partial_fill, render_sheet};

use crate::error::{OmrError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Solid square reference marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    pub center: [f32; 2],
    /// Side length in canonical pixels.
    pub size: f32,
}

/// How many bubbles of a slot may legitimately be marked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    Single,
    Multiple,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubbleRegion {
    pub center: [f32; 2],
    pub radius: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionSlot {
    pub label: String,
    #[serde(default)]
    pub kind: SelectionKind,
    pub options: Vec<BubbleRegion>,
}

/// Complete sheet template.
///
/// Fiducials are ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubbleGrid {
    pub width: usize,
    pub height: usize,
    pub fiducials: [Fiducial; 4],
    pub slots: Vec<QuestionSlot>,
}

impl BubbleGrid {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn fiducial_centers(&self) -> [[f32; 2]; 4] {
        self.fiducials.map(|f| f.center)
    }

    /// Mean fiducial area relative to the canvas area.
    pub fn fiducial_area_fraction(&self) -> f32 {
        let canvas = (self.width * self.height) as f32;
        if canvas <= 0.0 {
            return 0.0;
        }
        let mean_area = self.fiducials.iter().map(|f| f.size * f.size).sum::<f32>() / 4.0;
        mean_area / canvas
    }

    /// Width/height ratio of the fiducial rectangle (mean of opposite sides).
    pub fn fiducial_aspect(&self) -> f32 {
        quad_aspect(&self.fiducial_centers())
    }

    /// Check geometry: non-empty canvas, fiducials and bubbles inside it,
    /// every slot has options, no degenerate radii.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OmrError::Config("template canvas has zero extent".into()));
        }
        let (w, h) = (self.width as f32, self.height as f32);
        let inside = |c: [f32; 2], r: f32| {
            c[0] - r >= 0.0 && c[1] - r >= 0.0 && c[0] + r <= w && c[1] + r <= h
        };
        for (i, f) in self.fiducials.iter().enumerate() {
            if f.size < 2.0 || !inside(f.center, f.size / 2.0) {
                return Err(OmrError::Config(format!(
                    "fiducial {i} at {:?} (size {}) is degenerate or off the canvas",
                    f.center, f.size
                )));
            }
        }
        if !(self.fiducial_aspect() > 0.0) {
            return Err(OmrError::Config("fiducials do not span a rectangle".into()));
        }
        for slot in &self.slots {
            if slot.options.is_empty() {
                return Err(OmrError::Config(format!(
                    "question {} has no options",
                    slot.label
                )));
            }
            for (j, b) in slot.options.iter().enumerate() {
                if b.radius < 1.0 || !inside(b.center, b.radius) {
                    return Err(OmrError::Config(format!(
                        "question {} option {} is degenerate or off the canvas",
                        slot.label,
                        option_label(j)
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let grid: BubbleGrid = serde_json::from_str(json)
            .map_err(|e| OmrError::Config(format!("invalid template JSON: {e}")))?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let grid: BubbleGrid = serde_json::from_str(&contents).map_err(|source| OmrError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        grid.validate()?;
        Ok(grid)
    }
}

/// Letter shown for option `index` (`A`, `B`, ...; `?` past `Z`).
pub fn option_label(index: usize) -> char {
    if index < 26 {
        (b'A' + index as u8) as char
    } else {
        '?'
    }
}

/// Letters for a set of option indices, e.g. `[1, 3]` → `"BD"`.
pub fn option_labels(indices: &[usize]) -> String {
    indices.iter().map(|&i| option_label(i)).collect()
}

/// Mean horizontal side over mean vertical side of a TL, TR, BR, BL quad.
pub(crate) fn quad_aspect(q: &[[f32; 2]; 4]) -> f32 {
    let d = |a: [f32; 2], b: [f32; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
    let horizontal = 0.5 * (d(q[0], q[1]) + d(q[3], q[2]));
    let vertical = 0.5 * (d(q[0], q[3]) + d(q[1], q[2]));
    if vertical <= f32::EPSILON {
        return 0.0;
    }
    horizontal / vertical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let grid = GridLayout::default().to_grid().unwrap();
        assert_eq!(grid.len(), 20);
        assert!(grid.slots.iter().all(|s| s.options.len() == 4));
        grid.validate().unwrap();
    }

    #[test]
    fn json_round_trip_keeps_geometry() {
        let grid = GridLayout::default().to_grid().unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        let back = BubbleGrid::from_json_str(&json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn rejects_bubble_off_canvas() {
        let mut grid = GridLayout::default().to_grid().unwrap();
        grid.slots[0].options[0].center = [-5.0, 10.0];
        assert!(matches!(grid.validate(), Err(OmrError::Config(_))));
    }

    #[test]
    fn labels_follow_alphabet() {
        assert_eq!(option_label(0), 'A');
        assert_eq!(option_labels(&[1, 3]), "BD");
        assert_eq!(option_label(30), '?');
    }
}
