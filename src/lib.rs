#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod key;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod template;

// Building blocks used by the stages, public for tools and tests.
pub mod homography;
pub mod image;
pub mod pyramid;
pub mod threshold;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{OmrError, Result};
pub use crate::extract::{Extractor, ExtractorParams, MarkReading, MarkState};
pub use crate::key::{AnswerKey, KeyEntry};
pub use crate::normalize::{AlignedSheet, Normalizer, NormalizerParams};
pub use crate::pipeline::{
    BatchReport, CancelFlag, Evaluator, EvaluatorConfig, SheetInput, SheetOutcome, SheetReport,
};
pub use crate::report::ResultsTable;
pub use crate::score::{Outcome, PartialCredit, ScoreResult, Scorer, ScoringPolicy};
pub use crate::template::{BubbleGrid, GridLayout};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for scoring runs.
///
/// ```no_run
/// use omr_scorer::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> omr_scorer::Result<()> {
/// let grid = GridLayout::default().to_grid()?;
/// let key = Arc::new(AnswerKey::load("key.csv".as_ref())?);
/// let evaluator = Evaluator::new(EvaluatorConfig::default(), grid, key)?;
/// let sheets = vec![SheetInput::new("s1.png", std::fs::read("s1.png")?)];
/// let batch = evaluator.evaluate_batch(&sheets, &CancelFlag::new());
/// print!("{}", ResultsTable::from_batch(&batch, 0).to_text());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::{
        AnswerKey, BubbleGrid, CancelFlag, Evaluator, EvaluatorConfig, GridLayout, ResultsTable,
        SheetInput,
    };
}
