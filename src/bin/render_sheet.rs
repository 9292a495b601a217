//! `render-sheet <template.json> <out.png> [answers]`
//!
//! Renders a printable sheet from a bubble grid or a grid layout. With
//! `answers` (questions separated by `/`, e.g. `A/BD/-/C`) the bubbles are
//! filled in, which makes quick test scans.
use omr_scorer::image::io::save_grayscale_f32;
use omr_scorer::key::parse_answer;
use omr_scorer::template::render_sheet;
use omr_scorer::{BubbleGrid, GridLayout, OmrError, Result};
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn usage() -> OmrError {
    OmrError::Input("usage: render-sheet <template.json> <out.png> [answers]".to_string())
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let template_path = args.next().ok_or_else(usage)?;
    let out_path = args.next().ok_or_else(usage)?;
    let answers = args.next();

    let grid = load_template(Path::new(&template_path))?;
    let marks = match answers.as_deref() {
        Some(text) => parse_marks(text)?,
        None => Vec::new(),
    };
    if marks.len() > grid.len() {
        return Err(OmrError::Input(format!(
            "{} answers given for {} questions",
            marks.len(),
            grid.len()
        )));
    }
    let sheet = render_sheet(&grid, &marks);
    save_grayscale_f32(&sheet, Path::new(&out_path))?;
    println!(
        "Rendered {}x{} sheet with {} questions to {out_path}",
        grid.width,
        grid.height,
        grid.len()
    );
    Ok(())
}

/// A JSON object with `slots` is a bubble grid, anything else a layout.
fn load_template(path: &Path) -> Result<BubbleGrid> {
    let json_err = |source| OmrError::Json {
        path: path.to_path_buf(),
        source,
    };
    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(json_err)?;
    if value.get("slots").is_some() {
        BubbleGrid::from_json_str(&text)
    } else {
        let layout: GridLayout = serde_json::from_value(value).map_err(json_err)?;
        layout.to_grid()
    }
}

fn parse_marks(text: &str) -> Result<Vec<Vec<usize>>> {
    text.split('/')
        .enumerate()
        .map(|(i, cell)| {
            let cell = cell.trim();
            if cell.is_empty() || cell == "-" {
                return Ok(Vec::new());
            }
            parse_answer(cell).map_err(|e| OmrError::Input(format!("question {}: {e}", i + 1)))
        })
        .collect()
}
