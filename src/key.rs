//! Answer keys: which options are correct for every question.
//!
//! # Table schema
//!
//! Keys are CSV files or spreadsheets (`.xlsx`, `.xls`, `.ods`; the first
//! worksheet is read). One header row, one row per question. Column names are
//! matched case-insensitively:
//!
//! - `question` (or `q`, `no`): 1-based question number.
//! - `answer` (or `key`, `correct`): option letters `A`..`Z` or 1-based
//!   option numbers. Several correct options are separated by `;`, `,`, `|`
//!   or spaces (`B;D`, `2 4`), or written as one run of letters (`BD`).
//! - `points` (or `marks`, `weight`), optional: question weight, default 1.
//!
//! Rows may come in any order but must number the questions exactly `1..=N`.
//! Blank rows are skipped. A key that cannot be decoded is an
//! [`OmrError::Input`].
use crate::error::{OmrError, Result};
use calamine::{open_workbook_auto_from_rs, Reader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

const QUESTION_COLUMNS: &[&str] = &["question", "q", "no"];
const ANSWER_COLUMNS: &[&str] = &["answer", "key", "correct"];
const POINTS_COLUMNS: &[&str] = &["points", "marks", "weight"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// 1-based question number.
    pub question: usize,
    /// Correct option indices, ascending and unique.
    pub correct: Vec<usize>,
    pub points: f32,
}

impl KeyEntry {
    pub fn is_multi(&self) -> bool {
        self.correct.len() > 1
    }
}

/// Validated answer key, shared read-only across all sheets of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerKey {
    entries: Vec<KeyEntry>,
}

impl AnswerKey {
    /// Build from entries in any order; questions must be exactly `1..=N`.
    pub fn new(mut entries: Vec<KeyEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(OmrError::Input("answer key has no questions".into()));
        }
        entries.sort_by_key(|e| e.question);
        for (i, e) in entries.iter_mut().enumerate() {
            if e.question != i + 1 {
                let msg = if i > 0 && e.question == i {
                    format!("question {} appears twice", e.question)
                } else {
                    format!("question {} is missing", i + 1)
                };
                return Err(OmrError::Input(format!("answer key: {msg}")));
            }
            e.correct.sort_unstable();
            e.correct.dedup();
            if e.correct.is_empty() {
                return Err(OmrError::Input(format!(
                    "answer key: question {} has no correct option",
                    e.question
                )));
            }
            if !e.points.is_finite() || e.points <= 0.0 {
                return Err(OmrError::Input(format!(
                    "answer key: question {} has invalid points {}",
                    e.question, e.points
                )));
            }
        }
        Ok(Self { entries })
    }

    /// One-point questions from a list of correct option sets.
    pub fn from_answers<I, A>(answers: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<usize>>,
    {
        let entries = answers
            .into_iter()
            .enumerate()
            .map(|(i, a)| KeyEntry {
                question: i + 1,
                correct: a.into(),
                points: 1.0,
            })
            .collect();
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn max_score(&self) -> f32 {
        self.entries.iter().map(|e| e.points).sum()
    }

    /// Read a key file; the extension picks CSV or spreadsheet parsing.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if is_spreadsheet(path) {
            parse_spreadsheet(bytes, path)
        } else {
            parse_csv(&bytes, path)
        }
    }

    /// Parse CSV bytes as handed over by an upload layer.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        parse_csv(bytes, Path::new("<buffer>"))
    }

    /// Parse an uploaded spreadsheet (XLSX, XLS or ODS, detected from the
    /// bytes).
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Self> {
        parse_spreadsheet(bytes.to_vec(), Path::new("<buffer>"))
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|e| matches!(e.as_str(), "xlsx" | "xlsm" | "xls" | "ods"))
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Header row plus data rows as `(line, cells)`; lines are 1-based.
fn entries_from_rows(
    headers: &[String],
    rows: Vec<(usize, Vec<String>)>,
    origin: &Path,
) -> Result<AnswerKey> {
    let q_col = find_column(headers, QUESTION_COLUMNS).ok_or_else(|| {
        OmrError::Input(format!("{}: no `question` column", origin.display()))
    })?;
    let a_col = find_column(headers, ANSWER_COLUMNS)
        .ok_or_else(|| OmrError::Input(format!("{}: no `answer` column", origin.display())))?;
    let p_col = find_column(headers, POINTS_COLUMNS);

    let mut entries = Vec::with_capacity(rows.len());
    for (line, cells) in rows {
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cell = |col: usize| cells.get(col).map(|c| c.trim()).unwrap_or("");
        let bad = |what: &str| OmrError::Input(format!("{} line {line}: {what}", origin.display()));
        let q_raw = cell(q_col);
        let question = parse_question(q_raw)
            .ok_or_else(|| bad(&format!("invalid question number `{q_raw}`")))?;
        let correct = parse_answer(cell(a_col)).map_err(|e| bad(&e))?;
        let points = match p_col.map(cell).filter(|p| !p.is_empty()) {
            Some(p) => p
                .parse::<f32>()
                .map_err(|_| bad(&format!("invalid points `{p}`")))?,
            None => 1.0,
        };
        entries.push(KeyEntry {
            question,
            correct,
            points,
        });
    }
    AnswerKey::new(entries)
}

/// Spreadsheets store question numbers as floats (`3` may arrive as `3.0`).
fn parse_question(raw: &str) -> Option<usize> {
    let n = match raw.parse::<usize>() {
        Ok(n) => n,
        Err(_) => {
            let f = raw.parse::<f64>().ok()?;
            if f.fract() != 0.0 || f < 1.0 || f > usize::MAX as f64 {
                return None;
            }
            f as usize
        }
    };
    (n > 0).then_some(n)
}

fn unreadable_key(origin: &Path, e: impl fmt::Display) -> OmrError {
    OmrError::Input(format!("{}: unreadable answer key: {e}", origin.display()))
}

fn parse_csv(bytes: &[u8], origin: &Path) -> Result<AnswerKey> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let unreadable = |e: csv::Error| unreadable_key(origin, e);
    let mut records = reader.records().enumerate();
    let headers: Vec<String> = match records.next() {
        Some((_, record)) => record.map_err(unreadable)?.iter().map(str::to_owned).collect(),
        None => return Err(OmrError::Input(format!("{}: answer key is empty", origin.display()))),
    };
    let rows = records
        .map(|(i, record)| -> Result<(usize, Vec<String>)> {
            let cells = record.map_err(unreadable)?.iter().map(str::to_owned).collect();
            Ok((i + 1, cells))
        })
        .collect::<Result<Vec<_>>>()?;
    entries_from_rows(&headers, rows, origin)
}

fn parse_spreadsheet(bytes: Vec<u8>, origin: &Path) -> Result<AnswerKey> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| unreadable_key(origin, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| OmrError::Input(format!("{}: workbook has no sheets", origin.display())))?
        .map_err(|e| unreadable_key(origin, e))?;
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range
        .rows()
        .enumerate()
        .map(|(i, row)| (first_row + i + 1, row.iter().map(|c| c.to_string()).collect::<Vec<_>>()));
    let headers = match rows.next() {
        Some((_, cells)) => cells,
        None => return Err(OmrError::Input(format!("{}: answer key is empty", origin.display()))),
    };
    entries_from_rows(&headers, rows.collect(), origin)
}

/// Parse an answer cell into 0-based option indices.
pub fn parse_answer(cell: &str) -> std::result::Result<Vec<usize>, String> {
    let mut out = Vec::new();
    for token in cell
        .split(|c: char| c == ';' || c == ',' || c == '|' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if let Ok(n) = token.parse::<usize>() {
            if n == 0 {
                return Err("option numbers start at 1".into());
            }
            out.push(n - 1);
        } else if token.chars().all(|c| c.is_ascii_alphabetic()) {
            out.extend(
                token
                    .chars()
                    .map(|c| (c.to_ascii_uppercase() as u8 - b'A') as usize),
            );
        } else {
            return Err(format!("cannot read option `{token}`"));
        }
    }
    if out.is_empty() {
        return Err("empty answer".into());
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}
