// src/catalog/export.rs
use anyhow::{Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use super::discover::{CATALOG_CSV, CATALOG_JSON};
use super::entry::CatalogEntry;
use crate::store::TableRow;

/// Cleaned mirror path: the artifact's path relative to `input_dir`, under
/// `clean_dir`, with a `.csv` extension.
pub fn clean_export_path(input_dir: &Path, clean_dir: &Path, artifact: &Path) -> PathBuf {
    let relative = artifact.strip_prefix(input_dir).unwrap_or(artifact);
    clean_dir.join(relative).with_extension("csv")
}

/// Write `batch` as CSV with a header row.
pub fn write_batch_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let mut writer = WriterBuilder::new().with_header(true).build(BufWriter::new(file));
    writer
        .write(batch)
        .with_context(|| format!("writing csv {:?}", path))?;
    Ok(())
}

/// Write the run's catalog as `catalogo_dataset_nil.json` and `.csv` under
/// `dir`. Returns both paths.
pub fn write_catalog_exports(entries: &[CatalogEntry], dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

    let json_path = dir.join(CATALOG_JSON);
    let file = File::create(&json_path).with_context(|| format!("creating {:?}", json_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), entries)
        .with_context(|| format!("writing {:?}", json_path))?;

    let csv_path = dir.join(CATALOG_CSV);
    write_batch_csv(&CatalogEntry::to_batch(entries)?, &csv_path)?;
    Ok((json_path, csv_path))
}
