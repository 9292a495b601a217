//! JSON runtime configuration for the `omr-score` tool.
//!
//! ```json
//! {
//!   "sheets": ["scans/"],
//!   "answer_key": "key.csv",
//!   "template": { "layout": { "questions": 20, "options": 4 } },
//!   "evaluator": { "scoring": { "wrong_penalty": 0.25 } },
//!   "output": { "csv_out": "OMR_results.csv", "per_question": true }
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file. Every parameter block may be given partially; missing fields take
//! their defaults.

use crate::error::{OmrError, Result};
use crate::image::Orientation;
use crate::pipeline::{EvaluatorConfig, SheetInput};
use crate::report::DEFAULT_CSV_NAME;
use crate::template::{BubbleGrid, GridLayout};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const SHEET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Where the sheet template comes from.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    /// Inline bubble grid.
    Grid(BubbleGrid),
    /// Path to a bubble grid JSON file.
    GridFile(PathBuf),
    /// Regular layout generating the grid.
    Layout(GridLayout),
}

impl Default for TemplateSource {
    fn default() -> Self {
        TemplateSource::Layout(GridLayout::default())
    }
}

impl TemplateSource {
    pub fn resolve(&self) -> Result<BubbleGrid> {
        match self {
            TemplateSource::Grid(grid) => {
                grid.validate()?;
                Ok(grid.clone())
            }
            TemplateSource::GridFile(path) => BubbleGrid::load(path),
            TemplateSource::Layout(layout) => layout.to_grid(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_out: PathBuf,
    pub json_out: Option<PathBuf>,
    /// Aligned sheets and ink masks are written here as PNGs.
    pub debug_dir: Option<PathBuf>,
    /// Add one column per question with the letters read.
    pub per_question: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_out: PathBuf::from(DEFAULT_CSV_NAME),
            json_out: None,
            debug_dir: None,
            per_question: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Image files, or directories whose PNG/JPEG files are all taken.
    pub sheets: Vec<PathBuf>,
    pub answer_key: PathBuf,
    #[serde(default)]
    pub template: TemplateSource,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Orientation applied to every sheet.
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RuntimeConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.sheets.iter_mut().for_each(join);
        join(&mut self.answer_key);
        if let TemplateSource::GridFile(p) = &mut self.template {
            join(p);
        }
        join(&mut self.output.csv_out);
        if let Some(p) = &mut self.output.json_out {
            join(p);
        }
        if let Some(p) = &mut self.output.debug_dir {
            join(p);
        }
    }

    /// Sheet files in configuration order; directory contents sorted by name.
    pub fn sheet_paths(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for path in &self.sheets {
            if path.is_dir() {
                let mut files: Vec<PathBuf> = fs::read_dir(path)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && has_sheet_extension(p))
                    .collect();
                files.sort();
                out.extend(files);
            } else if path.is_file() {
                out.push(path.clone());
            } else {
                return Err(OmrError::Input(format!(
                    "sheet path {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(out)
    }

    /// Read every sheet into memory. The file name becomes the sheet id.
    pub fn sheet_inputs(&self) -> Result<Vec<SheetInput>> {
        self.sheet_paths()?
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path)?;
                let id = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Ok(SheetInput::new(id, bytes).with_orientation(self.orientation))
            })
            .collect()
    }
}

fn has_sheet_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let contents = fs::read_to_string(path)?;
    let mut config: RuntimeConfig =
        serde_json::from_str(&contents).map_err(|source| OmrError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}
