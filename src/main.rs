//! `omr-score <config.json>`: score a folder of scanned sheets.
//!
//! Reads the sheets and the answer key named in the config, evaluates them
//! in parallel, prints the results table and writes it as CSV (plus an
//! optional JSON report and aligned-sheet PNGs for manual review).
use log::info;
use omr_scorer::config::load_config;
use omr_scorer::image::io::{save_grayscale_f32, save_grayscale_u8};
use omr_scorer::report::{write_json_report, ResultsTable};
use omr_scorer::{AnswerKey, BatchReport, CancelFlag, Evaluator, OmrError, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn usage() -> OmrError {
    OmrError::Input("usage: omr-score <config.json>".to_string())
}

fn run() -> Result<()> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;

    let grid = config.template.resolve()?;
    let key = Arc::new(AnswerKey::load(&config.answer_key)?);
    let mut evaluator_config = config.evaluator.clone();
    evaluator_config.retain_aligned |= config.output.debug_dir.is_some();
    let evaluator = Evaluator::new(evaluator_config, grid, key)?;

    let sheets = config.sheet_inputs()?;
    if sheets.is_empty() {
        return Err(OmrError::Input("no sheet images found".to_string()));
    }
    info!(
        "{} sheets, {} questions, max score {}",
        sheets.len(),
        evaluator.key().len(),
        evaluator.key().max_score()
    );

    let batch = evaluator.evaluate_batch(&sheets, &CancelFlag::new());
    let questions = if config.output.per_question {
        evaluator.grid().len()
    } else {
        0
    };
    let table = ResultsTable::from_batch(&batch, questions);
    print!("{}", table.to_text());

    table.save_csv(&config.output.csv_out)?;
    println!("\nResults written to {}", config.output.csv_out.display());

    if let Some(path) = &config.output.json_out {
        write_json_report(path, &batch)?;
        println!("JSON report written to {}", path.display());
    }
    if let Some(dir) = &config.output.debug_dir {
        save_debug_artifacts(dir, &batch)?;
        println!("Debug artifacts written to {}", dir.display());
    }
    if batch.failed() > 0 {
        println!(
            "{} of {} sheets need manual review",
            batch.failed(),
            batch.sheets.len()
        );
    }
    Ok(())
}

fn save_debug_artifacts(dir: &Path, batch: &BatchReport) -> Result<()> {
    for sheet in &batch.sheets {
        let Some(aligned) = &sheet.aligned else {
            continue;
        };
        let stem = Path::new(&sheet.id)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| sheet.id.clone());
        save_grayscale_f32(aligned.gray(), &dir.join(format!("{stem}_aligned.png")))?;
        let ink = aligned.ink();
        save_grayscale_u8(
            ink.w,
            ink.h,
            &ink.to_gray_u8(),
            &dir.join(format!("{stem}_ink.png")),
        )?;
    }
    Ok(())
}
