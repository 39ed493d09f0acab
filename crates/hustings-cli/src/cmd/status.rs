//! `hustings status` - one row per run with its stage and artifacts

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use hustings_bundle::{RunManifest, RunStage, WatermarkStore};
use hustings_pipeline::Bundle;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let (layout, _config) = Bundle::open_readonly(&args.bundle)?;
    let runs = layout.list_runs()?;

    if runs.is_empty() {
        eprintln!("No runs yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Pages").fg(Color::Cyan),
            Cell::new("Failed terms").fg(Color::Cyan),
        ]);

    for run in &runs {
        let stage = RunStage::detect(&layout, run);
        let stage_cell = match stage {
            RunStage::Archived => Cell::new(stage).fg(Color::Green),
            RunStage::Created | RunStage::Collecting => Cell::new(stage).fg(Color::Yellow),
            _ => Cell::new(stage),
        };
        let (pages, failed) = match RunManifest::read_from(&layout.manifest_path(run)) {
            Ok(m) => (m.page_hashes.len().to_string(), m.failed_terms.join(", ")),
            Err(_) => ("-".to_string(), String::new()),
        };
        table.add_row(vec![
            Cell::new(run),
            stage_cell,
            Cell::new(pages),
            Cell::new(failed),
        ]);
    }
    eprintln!("\n{table}");

    let marks = WatermarkStore::load(&layout.watermarks_path());
    eprintln!("{} watermarked terms", marks.len());
    Ok(())
}
