use std::path::Path;

use takenote_core::export::{self, collect_export_notes, render_notes_export};

use crate::cli::ExportFormat;
use crate::commands::common::load_store;
use crate::error::CliError;

pub const fn export_format(format: ExportFormat) -> export::ExportFormat {
    match format {
        ExportFormat::Json => export::ExportFormat::Json,
        ExportFormat::Markdown => export::ExportFormat::Markdown,
    }
}

pub fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    include_trash: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = load_store(db_path)?;
    let notes = collect_export_notes(&store, include_trash);
    let rendered = render_notes_export(&notes, export_format(format))?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
