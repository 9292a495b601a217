use super::{BubbleGrid, BubbleRegion, Fiducial, QuestionSlot, SelectionKind};
use crate::error::{OmrError, Result};
use serde::{Deserialize, Serialize};

/// Regular column layout: questions run top to bottom, then continue in the
/// next column. Options of one question sit on a horizontal row.
///
/// Defaults describe a US-letter sheet rendered at 100 dpi with 20 questions
/// of four options in two columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    pub questions: usize,
    pub options: usize,
    pub columns: usize,
    pub width: usize,
    pub height: usize,
    /// Blank border between the paper edge and the fiducials.
    pub margin: f32,
    pub fiducial_size: f32,
    pub bubble_radius: f32,
    /// Centre-to-centre distance of neighbouring options.
    pub option_spacing: f32,
    /// Centre-to-centre distance of consecutive questions.
    pub row_spacing: f32,
    /// Space left of the first bubble of every row (question numbers).
    pub label_width: f32,
    /// Gap between the fiducial band and the first/last row.
    pub band_gap: f32,
    /// 1-based question numbers that accept several marks.
    pub multiple: Vec<usize>,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            questions: 20,
            options: 4,
            columns: 2,
            width: 850,
            height: 1100,
            margin: 30.0,
            fiducial_size: 40.0,
            bubble_radius: 11.0,
            option_spacing: 34.0,
            row_spacing: 40.0,
            label_width: 50.0,
            band_gap: 30.0,
            multiple: Vec::new(),
        }
    }
}

impl GridLayout {
    pub fn to_grid(&self) -> Result<BubbleGrid> {
        if self.questions == 0 || self.options == 0 || self.columns == 0 {
            return Err(OmrError::Config(
                "layout needs at least one question, option and column".into(),
            ));
        }
        let (w, h) = (self.width as f32, self.height as f32);
        let half = self.fiducial_size / 2.0;
        let near = self.margin + half;
        let fiducials = [
            Fiducial {
                center: [near, near],
                size: self.fiducial_size,
            },
            Fiducial {
                center: [w - near, near],
                size: self.fiducial_size,
            },
            Fiducial {
                center: [w - near, h - near],
                size: self.fiducial_size,
            },
            Fiducial {
                center: [near, h - near],
                size: self.fiducial_size,
            },
        ];

        let top = self.margin + self.fiducial_size + self.band_gap;
        let bottom = h - top;
        let left = self.margin;
        let column_width = (w - 2.0 * self.margin) / self.columns as f32;
        let rows = self.questions.div_ceil(self.columns);

        let needed_width = self.label_width
            + (self.options.saturating_sub(1)) as f32 * self.option_spacing
            + 2.0 * self.bubble_radius;
        if needed_width > column_width {
            return Err(OmrError::Config(format!(
                "{} options need {needed_width:.0}px but a column is {column_width:.0}px wide",
                self.options
            )));
        }
        let needed_height = rows as f32 * self.row_spacing;
        if needed_height > bottom - top {
            return Err(OmrError::Config(format!(
                "{rows} rows need {needed_height:.0}px but only {:.0}px are available",
                bottom - top
            )));
        }

        let mut slots = Vec::with_capacity(self.questions);
        for q in 0..self.questions {
            let col = q / rows;
            let row = q % rows;
            let cy = top + (row as f32 + 0.5) * self.row_spacing;
            let x0 = left + col as f32 * column_width + self.label_width + self.bubble_radius;
            let options = (0..self.options)
                .map(|o| BubbleRegion {
                    center: [x0 + o as f32 * self.option_spacing, cy],
                    radius: self.bubble_radius,
                })
                .collect();
            let number = q + 1;
            slots.push(QuestionSlot {
                label: number.to_string(),
                kind: if self.multiple.contains(&number) {
                    SelectionKind::Multiple
                } else {
                    SelectionKind::Single
                },
                options,
            });
        }

        let grid = BubbleGrid {
            width: self.width,
            height: self.height,
            fiducials,
            slots,
        };
        grid.validate()?;
        Ok(grid)
    }
}
