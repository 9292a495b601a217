//! Evaluator: owns the three stages plus the template and the shared key.
//!
//! Per sheet: bytes → [`ScanImage`] → [`Normalizer`] → [`Extractor`] →
//! [`Scorer`]. Failures are captured in the [`SheetReport`] and never abort a
//! batch. Batches fan out over rayon; the cancel flag is only consulted
//! before a sheet starts.
//!
//! ```no_run
//! use omr_scorer::prelude::*;
//! use std::sync::Arc;
//!
//! # fn example(bytes: Vec<u8>) -> omr_scorer::Result<()> {
//! let grid = GridLayout::default().to_grid()?;
//! let key = Arc::new(AnswerKey::from_answers((0..20).map(|i| vec![i % 4]))?);
//! let evaluator = Evaluator::new(EvaluatorConfig::default(), grid, key)?;
//! let report = evaluator.evaluate_sheet(&SheetInput::new("sheet-1", bytes));
//! if let Some(score) = report.score() {
//!     println!("{} / {}", score.total(), score.max_total());
//! }
//! # Ok(())
//! # }
//! ```

use crate::diagnostics::{ExtractionStage, SheetTrace};
use crate::error::{OmrError, Result};
use crate::extract::{Extractor, ExtractorParams, MarkReading};
use crate::image::{Orientation, ScanImage};
use crate::key::AnswerKey;
use crate::normalize::{AlignedSheet, Normalizer, NormalizerParams};
use crate::score::{ScoreResult, Scorer, ScoringPolicy};
use crate::template::{option_label, BubbleGrid, SelectionKind};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub normalizer: NormalizerParams,
    pub extractor: ExtractorParams,
    pub scoring: ScoringPolicy,
    /// Keep the aligned raster in every report (debug output).
    pub retain_aligned: bool,
}

/// Cooperative cancellation shared between the caller and a running batch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One uploaded sheet: an identifier and the encoded image bytes.
#[derive(Clone, Debug)]
pub struct SheetInput {
    pub id: String,
    pub bytes: Vec<u8>,
    pub orientation: Orientation,
    pub dpi: Option<f32>,
}

impl SheetInput {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
            orientation: Orientation::Upright,
            dpi: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

#[derive(Debug)]
pub enum SheetOutcome {
    Scored(ScoreResult),
    Failed(OmrError),
    /// Not started because the batch was cancelled.
    Skipped,
}

#[derive(Debug)]
pub struct SheetReport {
    pub id: String,
    pub outcome: SheetOutcome,
    /// Empty unless extraction ran.
    pub readings: Vec<MarkReading>,
    pub trace: SheetTrace,
    pub aligned: Option<AlignedSheet>,
}

impl SheetReport {
    fn skipped(id: &str) -> Self {
        Self {
            id: id.to_string(),
            outcome: SheetOutcome::Skipped,
            readings: Vec::new(),
            trace: SheetTrace::default(),
            aligned: None,
        }
    }

    pub fn score(&self) -> Option<&ScoreResult> {
        match &self.outcome {
            SheetOutcome::Scored(s) => Some(s),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OmrError> {
        match &self.outcome {
            SheetOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, SheetOutcome::Skipped)
    }

    /// `ok`, `skipped`, or the error kind with its message.
    pub fn status(&self) -> String {
        match &self.outcome {
            SheetOutcome::Scored(_) => "ok".to_string(),
            SheetOutcome::Failed(e) => format!("{}: {e}", e.kind()),
            SheetOutcome::Skipped => "skipped".to_string(),
        }
    }
}

/// Reports in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub sheets: Vec<SheetReport>,
    pub elapsed_ms: f64,
}

impl BatchReport {
    pub fn scored(&self) -> usize {
        self.sheets.iter().filter(|s| s.score().is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.sheets.iter().filter(|s| s.error().is_some()).count()
    }

    pub fn skipped(&self) -> usize {
        self.sheets.iter().filter(|s| s.is_skipped()).count()
    }
}

pub struct Evaluator {
    normalizer: Normalizer,
    extractor: Extractor,
    scorer: Scorer,
    grid: BubbleGrid,
    key: Arc<AnswerKey>,
    retain_aligned: bool,
}

impl Evaluator {
    /// Validate the template against the key and build the stages.
    ///
    /// Slot kinds follow the key: an entry with several correct options makes
    /// its slot multiple-selection, an entry with one makes it single.
    pub fn new(config: EvaluatorConfig, mut grid: BubbleGrid, key: Arc<AnswerKey>) -> Result<Self> {
        grid.validate()?;
        if grid.len() != key.len() {
            return Err(OmrError::KeyMismatch(format!(
                "template has {} questions, answer key has {}",
                grid.len(),
                key.len()
            )));
        }
        for (slot, entry) in grid.slots.iter_mut().zip(key.entries()) {
            let n = slot.options.len();
            if let Some(&bad) = entry.correct.iter().find(|&&o| o >= n) {
                return Err(OmrError::KeyMismatch(format!(
                    "question {} expects option {} but its slot has {n} options",
                    entry.question,
                    option_label(bad)
                )));
            }
            slot.kind = if entry.is_multi() {
                SelectionKind::Multiple
            } else {
                SelectionKind::Single
            };
        }
        let extractor = Extractor::new(config.extractor)?;
        let scorer = Scorer::new(config.scoring)?;
        Ok(Self {
            normalizer: Normalizer::new(config.normalizer),
            extractor,
            scorer,
            grid,
            key,
            retain_aligned: config.retain_aligned,
        })
    }

    /// Template with slot kinds derived from the key.
    pub fn grid(&self) -> &BubbleGrid {
        &self.grid
    }

    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    /// Read and score a sheet that is already aligned.
    pub fn score_aligned(&self, sheet: &AlignedSheet) -> Result<(Vec<MarkReading>, ScoreResult)> {
        let readings = self.extractor.extract(sheet, &self.grid);
        let score = self.scorer.score(&readings, &self.key)?;
        Ok((readings, score))
    }

    pub fn evaluate_sheet(&self, input: &SheetInput) -> SheetReport {
        let start = Instant::now();
        let mut report = SheetReport::skipped(&input.id);
        let result = self.run(input, &mut report);
        report.outcome = match result {
            Ok(score) => {
                debug!(
                    "sheet {}: {} / {}",
                    input.id,
                    score.total(),
                    score.max_total()
                );
                SheetOutcome::Scored(score)
            }
            Err(e) => {
                warn!("sheet {} not scored: {e}", input.id);
                SheetOutcome::Failed(e)
            }
        };
        report.trace.timings.total_ms = start.elapsed().as_secs_f64() * 1000.0;
        report
    }

    fn run(&self, input: &SheetInput, report: &mut SheetReport) -> Result<ScoreResult> {
        let timings = &mut report.trace.timings;

        let t = Instant::now();
        let mut scan = ScanImage::from_bytes(&input.bytes)?.with_orientation(input.orientation);
        if let Some(dpi) = input.dpi {
            scan = scan.with_dpi(dpi);
        }
        timings.push_since("decode", t);

        let t = Instant::now();
        let (aligned, stage) = self.normalizer.normalize_with_trace(&scan, &self.grid);
        report.trace.alignment = Some(stage);
        let timings = &mut report.trace.timings;
        timings.push_since("normalize", t);
        let aligned = aligned?;

        let t = Instant::now();
        let readings = self.extractor.extract(&aligned, &self.grid);
        timings.push_since("extract", t);

        let t = Instant::now();
        let score = self.scorer.score(&readings, &self.key);
        timings.push_since("score", t);

        report.trace.extraction = Some(extraction_stage(&readings));
        report.readings = readings;
        if self.retain_aligned {
            report.aligned = Some(aligned);
        }
        score
    }

    /// Evaluate all sheets in parallel. Sheets not yet started when `cancel`
    /// is raised are reported as skipped; reports keep the input order.
    pub fn evaluate_batch(&self, inputs: &[SheetInput], cancel: &CancelFlag) -> BatchReport {
        let start = Instant::now();
        info!("evaluating {} sheets", inputs.len());
        let sheets: Vec<SheetReport> = inputs
            .par_iter()
            .map(|input| {
                if cancel.is_cancelled() {
                    SheetReport::skipped(&input.id)
                } else {
                    self.evaluate_sheet(input)
                }
            })
            .collect();
        let report = BatchReport {
            sheets,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            "batch done in {:.1} ms: {} scored, {} failed, {} skipped",
            report.elapsed_ms,
            report.scored(),
            report.failed(),
            report.skipped()
        );
        report
    }
}

fn extraction_stage(readings: &[MarkReading]) -> ExtractionStage {
    let mut stage = ExtractionStage::default();
    for r in readings {
        if r.is_filled() {
            stage.filled += 1;
        } else if r.is_empty() {
            stage.empty += 1;
        } else {
            stage.ambiguous += 1;
        }
        stage.min_confidence = Some(match stage.min_confidence {
            Some(c) => c.min(r.confidence),
            None => r.confidence,
        });
    }
    stage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AmbiguityReason, MarkState};
    use crate::score::Outcome;
    use crate::template::{render_sheet, GridLayout};
    use crate::threshold::ThresholdParams;

    fn layout() -> GridLayout {
        GridLayout {
            questions: 6,
            options: 4,
            ..Default::default()
        }
    }

    fn key(answers: &[&[usize]]) -> Arc<AnswerKey> {
        Arc::new(AnswerKey::from_answers(answers.iter().map(|a| a.to_vec())).unwrap())
    }

    #[test]
    fn rejects_key_with_wrong_length() {
        let grid = layout().to_grid().unwrap();
        let err = Evaluator::new(EvaluatorConfig::default(), grid, key(&[&[0], &[1]]))
            .err()
            .unwrap();
        assert!(matches!(err, OmrError::KeyMismatch(_)));
    }

    #[test]
    fn rejects_key_option_outside_slot() {
        let grid = layout().to_grid().unwrap();
        let k = key(&[&[0], &[1], &[2], &[3], &[4], &[0]]);
        let err = Evaluator::new(EvaluatorConfig::default(), grid, k)
            .err()
            .unwrap();
        assert!(matches!(err, OmrError::KeyMismatch(msg) if msg.contains("option E")));
    }

    #[test]
    fn multi_answer_keys_make_multiple_slots() {
        let grid = layout().to_grid().unwrap();
        let k = key(&[&[0], &[1, 3], &[2], &[3], &[0], &[0]]);
        let ev = Evaluator::new(EvaluatorConfig::default(), grid, k).unwrap();
        assert_eq!(ev.grid().slots[0].kind, SelectionKind::Single);
        assert_eq!(ev.grid().slots[1].kind, SelectionKind::Multiple);
    }

    #[test]
    fn double_mark_on_single_answer_question_is_ambiguous() {
        let layout = GridLayout {
            multiple: vec![1],
            ..layout()
        };
        let grid = layout.to_grid().unwrap();
        assert_eq!(grid.slots[0].kind, SelectionKind::Multiple);
        let config = EvaluatorConfig {
            scoring: ScoringPolicy {
                ambiguous_penalty: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let k = key(&[&[0], &[1], &[2], &[3], &[0], &[0]]);
        let ev = Evaluator::new(config, grid.clone(), k).unwrap();
        assert_eq!(ev.grid().slots[0].kind, SelectionKind::Single);

        let marks = vec![vec![0, 2], vec![1], vec![2], vec![3], vec![0], vec![0]];
        let canvas = render_sheet(&grid, &marks);
        let sheet = AlignedSheet::from_canvas(canvas, &ThresholdParams::default());
        let (readings, score) = ev.score_aligned(&sheet).unwrap();
        assert!(matches!(
            readings[0].state,
            MarkState::Ambiguous {
                reason: AmbiguityReason::MultiMark,
                ..
            }
        ));
        let first = &score.outcomes()[0];
        assert_eq!(first.outcome, Outcome::Ambiguous);
        assert_eq!(first.points, -0.5);
        assert_eq!(score.total(), 4.5);
    }

    #[test]
    fn scores_aligned_canvas() {
        let grid = layout().to_grid().unwrap();
        let answers: Vec<Vec<usize>> = (0..6).map(|i| vec![i % 4]).collect();
        let k = Arc::new(AnswerKey::from_answers(answers.clone()).unwrap());
        let ev = Evaluator::new(EvaluatorConfig::default(), grid.clone(), k).unwrap();
        let canvas = render_sheet(&grid, &answers);
        let sheet = AlignedSheet::from_canvas(canvas, &ThresholdParams::default());
        let (readings, score) = ev.score_aligned(&sheet).unwrap();
        assert_eq!(readings.len(), 6);
        assert_eq!(score.total(), 6.0);
        assert_eq!(score.percentage(), 100.0);
    }

    #[test]
    fn unreadable_bytes_fail_the_sheet_only() {
        let grid = layout().to_grid().unwrap();
        let k = key(&[&[0], &[1], &[2], &[3], &[0], &[0]]);
        let ev = Evaluator::new(EvaluatorConfig::default(), grid, k).unwrap();
        let inputs = vec![
            SheetInput::new("empty", Vec::new()),
            SheetInput::new("garbage", b"not an image".to_vec()),
        ];
        let batch = ev.evaluate_batch(&inputs, &CancelFlag::new());
        assert_eq!(batch.sheets.len(), 2);
        assert_eq!(batch.failed(), 2);
        assert_eq!(batch.sheets[0].id, "empty");
        assert!(matches!(batch.sheets[1].error(), Some(OmrError::Input(_))));
        assert!(batch.sheets[1].status().starts_with("input:"));
    }

    #[test]
    fn cancelled_batch_skips_every_sheet() {
        let grid = layout().to_grid().unwrap();
        let k = key(&[&[0], &[1], &[2], &[3], &[0], &[0]]);
        let ev = Evaluator::new(EvaluatorConfig::default(), grid, k).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let inputs: Vec<SheetInput> = (0..4)
            .map(|i| SheetInput::new(format!("s{i}"), Vec::new()))
            .collect();
        let batch = ev.evaluate_batch(&inputs, &cancel);
        assert_eq!(batch.skipped(), 4);
        assert!(batch.sheets.iter().all(|s| s.status() == "skipped"));
    }
}
