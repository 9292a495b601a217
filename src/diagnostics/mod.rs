//! Per-sheet diagnostics: what each stage saw and how long it took.
//!
//! [`SheetTrace`] is attached to every sheet report, successful or not, so a
//! sheet flagged for manual review comes with enough context (fiducial
//! detections, homography, timings) to tell a bad scan from a bad template.

pub mod alignment;
pub mod timing;

pub use alignment::AlignmentStage;
pub use timing::{StageTiming, TimingBreakdown};

use serde::Serialize;

/// Reading counts per state for one sheet.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStage {
    pub filled: usize,
    pub empty: usize,
    pub ambiguous: usize,
    /// Lowest slot confidence on the sheet.
    pub min_confidence: Option<f32>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionStage>,
    pub timings: TimingBreakdown,
}
