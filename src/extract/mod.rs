//! Bubble grid extractor: aligned sheet + template → one reading per slot.
//!
//! Each bubble is measured as the share of ink pixels inside a disc of
//! `inner_radius_scale × radius`; the scale stays below 1 so the printed
//! outline does not count as a mark. Ratios above `filled_threshold` read as
//! filled, below `empty_threshold` as empty, anything in between is
//! uncertain.
//!
//! A slot is ambiguous when any of its bubbles is uncertain, or when a
//! single-selection slot has more than one filled bubble. Ambiguity is a
//! reading, not an error; the scorer applies the configured policy.

mod reading;

pub use reading::{AmbiguityReason, MarkReading, MarkState};

use crate::error::{OmrError, Result};
use crate::normalize::AlignedSheet;
use crate::template::{BubbleGrid, BubbleRegion, QuestionSlot, SelectionKind};
use crate::threshold::InkMask;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorParams {
    pub filled_threshold: f32,
    pub empty_threshold: f32,
    pub inner_radius_scale: f32,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            filled_threshold: 0.55,
            empty_threshold: 0.25,
            inner_radius_scale: 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OptionState {
    Filled,
    Empty,
    Uncertain,
}

pub struct Extractor {
    params: ExtractorParams,
}

impl Extractor {
    pub fn new(params: ExtractorParams) -> Result<Self> {
        let ExtractorParams {
            filled_threshold: hi,
            empty_threshold: lo,
            inner_radius_scale: scale,
        } = params;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
            return Err(OmrError::Config(format!(
                "need 0 <= empty_threshold < filled_threshold <= 1, got {lo} and {hi}"
            )));
        }
        if !(scale > 0.0 && scale <= 1.5) {
            return Err(OmrError::Config(format!(
                "inner_radius_scale must be in (0, 1.5], got {scale}"
            )));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &ExtractorParams {
        &self.params
    }

    /// One reading per slot of `grid`, in slot order.
    pub fn extract(&self, sheet: &AlignedSheet, grid: &BubbleGrid) -> Vec<MarkReading> {
        grid.slots
            .iter()
            .map(|slot| self.read_slot(sheet.ink(), slot))
            .collect()
    }

    /// Ink share inside the inner disc of `bubble`; `None` when no pixel of
    /// the disc lies on the mask.
    pub fn fill_ratio(&self, ink: &InkMask, bubble: &BubbleRegion) -> Option<f32> {
        let r = bubble.radius * self.params.inner_radius_scale;
        let [cx, cy] = bubble.center;
        let r2 = r * r;
        let x0 = (cx - r).floor().max(0.0) as usize;
        let y0 = (cy - r).floor().max(0.0) as usize;
        let x1 = (cx + r).ceil();
        let y1 = (cy + r).ceil();
        if x1 < 0.0 || y1 < 0.0 {
            return None;
        }
        let x1 = (x1 as usize).min(ink.w.saturating_sub(1));
        let y1 = (y1 as usize).min(ink.h.saturating_sub(1));
        let mut total = 0usize;
        let mut inked = 0usize;
        for y in y0..=y1.max(y0) {
            for x in x0..=x1.max(x0) {
                if x >= ink.w || y >= ink.h {
                    continue;
                }
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                if d2 <= r2 {
                    total += 1;
                    inked += usize::from(ink.is_ink(x, y));
                }
            }
        }
        (total > 0).then(|| inked as f32 / total as f32)
    }

    fn classify(&self, ratio: Option<f32>) -> (OptionState, f32) {
        let ExtractorParams {
            filled_threshold: hi,
            empty_threshold: lo,
            ..
        } = self.params;
        let Some(r) = ratio else {
            return (OptionState::Uncertain, 0.0);
        };
        if r >= hi {
            let conf = if hi < 1.0 {
                0.5 + 0.5 * (r - hi) / (1.0 - hi)
            } else {
                1.0
            };
            (OptionState::Filled, conf.min(1.0))
        } else if r <= lo {
            let conf = if lo > 0.0 {
                0.5 + 0.5 * (lo - r) / lo
            } else {
                1.0
            };
            (OptionState::Empty, conf.min(1.0))
        } else {
            let half_band = 0.5 * (hi - lo);
            let margin = (r - lo).min(hi - r);
            (OptionState::Uncertain, 0.5 * margin / half_band)
        }
    }

    fn read_slot(&self, ink: &InkMask, slot: &QuestionSlot) -> MarkReading {
        let ratios: Vec<Option<f32>> = slot
            .options
            .iter()
            .map(|b| self.fill_ratio(ink, b))
            .collect();
        let mut confidence = 1.0f32;
        let mut marked = Vec::new();
        let mut uncertain = false;
        for (i, &ratio) in ratios.iter().enumerate() {
            let (state, conf) = self.classify(ratio);
            confidence = confidence.min(conf);
            match state {
                OptionState::Filled => marked.push(i),
                OptionState::Uncertain => uncertain = true,
                OptionState::Empty => {}
            }
        }
        let state = if uncertain {
            MarkState::Ambiguous {
                reason: AmbiguityReason::UncertainFill,
                marked,
            }
        } else if marked.is_empty() {
            MarkState::Empty
        } else if marked.len() > 1 && slot.kind == SelectionKind::Single {
            MarkState::Ambiguous {
                reason: AmbiguityReason::MultiMark,
                marked,
            }
        } else {
            MarkState::Filled { options: marked }
        };
        MarkReading {
            state,
            confidence,
            fill_ratios: ratios.into_iter().map(|r| r.unwrap_or(0.0)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{paint_partial_fill, render_sheet, GridLayout};
    use crate::threshold::ThresholdParams;

    fn sheet_for(grid: &BubbleGrid, marks: &[Vec<usize>]) -> AlignedSheet {
        AlignedSheet::from_canvas(render_sheet(grid, marks), &ThresholdParams::default())
    }

    #[test]
    fn reads_single_marks_and_blanks() {
        let grid = GridLayout::default().to_grid().unwrap();
        let sheet = sheet_for(&grid, &[vec![1], vec![], vec![3]]);
        let extractor = Extractor::new(ExtractorParams::default()).unwrap();
        let readings = extractor.extract(&sheet, &grid);
        assert_eq!(readings.len(), grid.len());
        assert_eq!(readings[0].state, MarkState::Filled { options: vec![1] });
        assert_eq!(readings[1].state, MarkState::Empty);
        assert_eq!(readings[2].state, MarkState::Filled { options: vec![3] });
        assert!(readings[0].confidence >= 0.5);
        assert!(readings[0].fill_ratios[1] > 0.9);
        assert!(readings[0].fill_ratios[0] < 0.05);
    }

    #[test]
    fn double_mark_on_single_slot_is_ambiguous() {
        let grid = GridLayout::default().to_grid().unwrap();
        let sheet = sheet_for(&grid, &[vec![0, 2]]);
        let extractor = Extractor::new(ExtractorParams::default()).unwrap();
        let reading = &extractor.extract(&sheet, &grid)[0];
        assert_eq!(
            reading.state,
            MarkState::Ambiguous {
                reason: AmbiguityReason::MultiMark,
                marked: vec![0, 2]
            }
        );
    }

    #[test]
    fn double_mark_on_multiple_slot_is_filled() {
        let layout = GridLayout {
            multiple: vec![1],
            ..Default::default()
        };
        let grid = layout.to_grid().unwrap();
        let sheet = sheet_for(&grid, &[vec![0, 2]]);
        let extractor = Extractor::new(ExtractorParams::default()).unwrap();
        let reading = &extractor.extract(&sheet, &grid)[0];
        assert_eq!(reading.state, MarkState::Filled { options: vec![0, 2] });
    }

    #[test]
    fn half_filled_bubble_is_uncertain() {
        let grid = GridLayout::default().to_grid().unwrap();
        let mut canvas = render_sheet(&grid, &[]);
        paint_partial_fill(&mut canvas, &grid.slots[4].options[1], 0.5);
        let sheet = AlignedSheet::from_canvas(canvas, &ThresholdParams::default());
        let extractor = Extractor::new(ExtractorParams::default()).unwrap();
        let reading = &extractor.extract(&sheet, &grid)[4];
        assert!(matches!(
            reading.state,
            MarkState::Ambiguous {
                reason: AmbiguityReason::UncertainFill,
                ..
            }
        ));
        assert!(reading.confidence < 0.5);
    }

    #[test]
    fn extraction_is_deterministic() {
        let grid = GridLayout::default().to_grid().unwrap();
        let marks: Vec<Vec<usize>> = (0..grid.len()).map(|i| vec![i % 4]).collect();
        let sheet = sheet_for(&grid, &marks);
        let extractor = Extractor::new(ExtractorParams::default()).unwrap();
        assert_eq!(extractor.extract(&sheet, &grid), extractor.extract(&sheet, &grid));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let params = ExtractorParams {
            filled_threshold: 0.2,
            empty_threshold: 0.4,
            ..Default::default()
        };
        assert!(matches!(Extractor::new(params), Err(OmrError::Config(_))));
    }
}
