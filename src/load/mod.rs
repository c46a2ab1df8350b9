// src/load/mod.rs
use arrow::record_batch::RecordBatch;
use std::{fs, path::Path};
use tracing::{debug, info};

mod delimited;
mod error;
mod json;

pub use delimited::{parse_delimited, read_delimited, read_delimited_bytes, sniff_delimiter, TextEncoding};
pub use error::LoadError;
pub use json::{parse_geojson, parse_json};

use crate::process::{clean::clean_table, raw_table::RawTable};

/// Raw name of the serialized geometry column; `geometry` once slugged.
pub const GEOMETRY_COLUMN: &str = "_geometry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    GeoJson,
    Json,
}

impl DatasetFormat {
    /// By file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(DatasetFormat::Csv),
            "geojson" => Ok(DatasetFormat::GeoJson),
            "json" => Ok(DatasetFormat::Json),
            other => Err(LoadError::UnsupportedFormat(format!("extension {:?}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetFormat::Csv => "csv",
            DatasetFormat::GeoJson => "geojson",
            DatasetFormat::Json => "json",
        }
    }
}

/// One artifact after loading and cleaning, ready to persist.
#[derive(Debug, Clone)]
pub struct StagedTable {
    pub name: String,
    pub batch: RecordBatch,
    /// Original header → stored column name.
    pub column_mapping: Vec<(String, String)>,
    pub format: DatasetFormat,
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse one artifact into an untyped table.
#[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn load_dataset(path: &Path) -> Result<(RawTable, DatasetFormat), LoadError> {
    let format = DatasetFormat::from_path(path)?;
    let table = match format {
        DatasetFormat::Csv => read_delimited(path)?,
        DatasetFormat::GeoJson => parse_geojson(&read_text(path)?)?,
        DatasetFormat::Json => parse_json(&read_text(path)?)?,
    };
    debug!(
        format = format.as_str(),
        rows = table.num_rows,
        columns = table.columns.len(),
        "parsed"
    );
    Ok((table, format))
}

/// Load + clean one artifact into a staged table named `table_name`.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.display()))]
pub fn load_and_clean(path: &Path, table_name: &str) -> Result<StagedTable, LoadError> {
    let (raw, format) = load_dataset(path)?;
    let cleaned = clean_table(raw, GEOMETRY_COLUMN)?;
    info!(
        rows = cleaned.batch.num_rows(),
        columns = cleaned.batch.num_columns(),
        dropped = cleaned.dropped_columns.len(),
        "staged"
    );
    Ok(StagedTable {
        name: table_name.to_string(),
        batch: cleaned.batch,
        column_mapping: cleaned.column_mapping,
        format,
    })
}
