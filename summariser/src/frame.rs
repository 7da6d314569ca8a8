use anyhow::{bail, Context};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Load a CSV sink into a [DataFrame].
///
/// Rows with a different number of fields than the header are skipped with a warning. Every
/// remaining row is scanned to infer column types and unparseable values become null, so a single
/// malformed row does not take the whole file down with it.
pub(crate) fn load_csv(path: &Path) -> anyhow::Result<DataFrame> {
    let content = well_formed_rows(path)?;

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_ignore_errors(true)
        .into_reader_with_file_handle(Cursor::new(content))
        .finish()?;

    log::trace!(
        "Loaded {} rows with columns {:?} from {}",
        frame.height(),
        frame.get_column_names(),
        path.display()
    );

    Ok(frame)
}

/// Re-encode `path` keeping only the header and the rows that match its width.
fn well_formed_rows(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let header = reader.byte_headers()?.clone();
    if header.is_empty() {
        bail!("{} has no header", path.display());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_byte_record(&header)?;

    for record in reader.byte_records() {
        let record = record?;
        if record.len() != header.len() {
            log::warn!(
                "Skipping row at line {} of {}: {} field(s) where the header has {}",
                record.position().map(|p| p.line()).unwrap_or_default(),
                path.display(),
                record.len(),
                header.len()
            );
            continue;
        }
        writer.write_byte_record(&record)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}
