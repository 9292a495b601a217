//! Results table and exports.
//!
//! One row per sheet with the columns `OMR Sheet`, `Total Score`,
//! `Max Score`, `Status` and optionally `Q1..QN` holding the letters read
//! for every question (`-` for blank, a trailing `?` for ambiguous).
//! Sheets that were not scored keep empty score cells and carry the error in
//! `Status`. CSV output has a header row and no index column.

use crate::diagnostics::SheetTrace;
use crate::error::{OmrError, Result};
use crate::extract::{MarkReading, MarkState};
use crate::image::io::{ensure_parent_dir, write_json_file};
use crate::pipeline::{BatchReport, SheetReport};
use crate::score::ScoreResult;
use crate::template::option_labels;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_CSV_NAME: &str = "OMR_results.csv";

const BASE_COLUMNS: [&str; 4] = ["OMR Sheet", "Total Score", "Max Score", "Status"];

#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub sheet: String,
    pub total: Option<f32>,
    pub max: Option<f32>,
    pub status: String,
    /// Per-question answer text; empty when per-question columns are off.
    pub answers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultsTable {
    questions: usize,
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    /// Build the table in batch order. `questions > 0` adds `Q1..Qn` columns.
    pub fn from_batch(batch: &BatchReport, questions: usize) -> Self {
        let rows = batch
            .sheets
            .iter()
            .map(|s| row_for(s, questions))
            .collect();
        Self { questions, rows }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn headers(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain((1..=self.questions).map(|q| format!("Q{q}")))
            .collect()
    }

    fn record(&self, row: &ResultRow) -> Vec<String> {
        let num = |v: Option<f32>| v.map(|x| x.to_string()).unwrap_or_default();
        let mut rec = vec![
            row.sheet.clone(),
            num(row.total),
            num(row.max),
            row.status.clone(),
        ];
        if self.questions > 0 {
            rec.extend(
                (0..self.questions).map(|i| row.answers.get(i).cloned().unwrap_or_default()),
            );
        }
        rec
    }

    /// Write header plus rows as CSV; `path` only labels errors.
    pub fn write_csv<W: Write>(&self, writer: W, path: &Path) -> Result<()> {
        let csv_err = |source| OmrError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(self.headers()).map_err(csv_err)?;
        for row in &self.rows {
            w.write_record(self.record(row)).map_err(csv_err)?;
        }
        w.into_inner()
            .map_err(|e| OmrError::Io(e.into_error()))?
            .flush()?;
        Ok(())
    }

    /// CSV bytes as offered for download.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, Path::new("<buffer>"))?;
        Ok(buf)
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file), path)
    }

    /// Plain-text rendering with padded columns for terminal output.
    pub fn to_text(&self) -> String {
        let mut lines: Vec<Vec<String>> = vec![self.headers()];
        lines.extend(self.rows.iter().map(|r| self.record(r)));
        let cols = lines[0].len();
        let widths: Vec<usize> = (0..cols)
            .map(|c| lines.iter().map(|l| l[c].chars().count()).max().unwrap_or(0))
            .collect();
        let mut out = String::new();
        for line in &lines {
            let cells: Vec<String> = line
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect();
            out.push_str(cells.join("  ").trim_end());
            out.push('\n');
        }
        out
    }
}

fn row_for(sheet: &SheetReport, questions: usize) -> ResultRow {
    let score = sheet.score();
    let answers = if questions > 0 {
        sheet.readings.iter().map(answer_text).collect()
    } else {
        Vec::new()
    };
    ResultRow {
        sheet: sheet.id.clone(),
        total: score.map(ScoreResult::total),
        max: score.map(ScoreResult::max_total),
        status: sheet.status(),
        answers,
    }
}

/// Letters read for one question: `B`, `AC`, `-` when blank, `AC?` when
/// ambiguous.
pub fn answer_text(reading: &MarkReading) -> String {
    match &reading.state {
        MarkState::Filled { options } => option_labels(options),
        MarkState::Empty => "-".to_string(),
        MarkState::Ambiguous { marked, .. } => format!("{}?", option_labels(marked)),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetJson<'a> {
    id: &'a str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<&'a ScoreResult>,
    #[serde(skip_serializing_if = "no_readings")]
    readings: &'a [MarkReading],
    trace: &'a SheetTrace,
}

fn no_readings(readings: &&[MarkReading]) -> bool {
    readings.is_empty()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchJson<'a> {
    elapsed_ms: f64,
    scored: usize,
    failed: usize,
    skipped: usize,
    sheets: Vec<SheetJson<'a>>,
}

/// Full batch report (scores, readings, traces) as pretty JSON.
pub fn write_json_report(path: &Path, batch: &BatchReport) -> Result<()> {
    let json = BatchJson {
        elapsed_ms: batch.elapsed_ms,
        scored: batch.scored(),
        failed: batch.failed(),
        skipped: batch.skipped(),
        sheets: batch
            .sheets
            .iter()
            .map(|s| SheetJson {
                id: &s.id,
                status: s.status(),
                score: s.score(),
                readings: &s.readings,
                trace: &s.trace,
            })
            .collect(),
    };
    write_json_file(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::AmbiguityReason;
    use crate::key::AnswerKey;
    use crate::pipeline::SheetOutcome;
    use crate::score::{Scorer, ScoringPolicy};

    fn batch() -> BatchReport {
        let key = AnswerKey::from_answers(vec![vec![0], vec![1], vec![2]]).unwrap();
        let readings = vec![
            MarkReading::filled(vec![0]),
            MarkReading::empty(),
            MarkReading::ambiguous(AmbiguityReason::MultiMark, vec![0, 2]),
        ];
        let score = Scorer::new(ScoringPolicy::default())
            .unwrap()
            .score(&readings, &key)
            .unwrap();
        BatchReport {
            sheets: vec![
                SheetReport {
                    id: "a.png".into(),
                    outcome: SheetOutcome::Scored(score),
                    readings,
                    trace: SheetTrace::default(),
                    aligned: None,
                },
                SheetReport {
                    id: "b.png".into(),
                    outcome: SheetOutcome::Failed(OmrError::Alignment(
                        "fiducials not found".into(),
                    )),
                    readings: Vec::new(),
                    trace: SheetTrace::default(),
                    aligned: None,
                },
            ],
            elapsed_ms: 1.0,
        }
    }

    #[test]
    fn csv_has_header_and_no_index() {
        let table = ResultsTable::from_batch(&batch(), 0);
        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "OMR Sheet,Total Score,Max Score,Status");
        assert_eq!(lines[1], "a.png,1,3,ok");
        assert_eq!(
            lines[2],
            "b.png,,,alignment: alignment failed: fiducials not found"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn per_question_columns_show_letters() {
        let table = ResultsTable::from_batch(&batch(), 3);
        assert_eq!(table.headers()[4..], ["Q1", "Q2", "Q3"]);
        assert_eq!(table.rows()[0].answers, vec!["A", "-", "AC?"]);
        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        assert!(csv.lines().nth(2).unwrap().ends_with(",,,"));
    }

    #[test]
    fn text_table_is_padded() {
        let text = ResultsTable::from_batch(&batch(), 0).to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("OMR Sheet  Total Score"));
        assert!(lines[1].starts_with("a.png      1"));
    }

    #[test]
    fn json_report_lists_every_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        write_json_report(&path, &batch()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["scored"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["sheets"][0]["score"]["total"], 1.0);
        let status = value["sheets"][1]["status"].as_str().unwrap();
        assert!(status.starts_with("alignment:"));
        assert!(value["sheets"][1].get("readings").is_none());
    }
}
