// src/process/clean.rs
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use tracing::debug;

use crate::load::LoadError;
use crate::process::{
    convert::to_record_batch,
    infer::{infer_column, text_column, ColumnKind},
    raw_table::RawTable,
    trimming::apply_trimming,
    utils::{clean_cell, dedupe_columns},
};

/// Result of the uniform post-load cleaning.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub batch: RecordBatch,
    /// Original header → final column name, in source order.
    pub column_mapping: Vec<(String, String)>,
    /// Columns removed because every cell was null.
    pub dropped_columns: Vec<String>,
}

/// Clean a freshly loaded table:
/// 1) slug + dedupe column names
/// 2) trim text cells, blanks → null (geometry untouched)
/// 3) re-serialize geometry canonically
/// 4) infer each column
/// 5) drop all-null columns, unless the table has no rows at all
///
/// A header-only table stays a valid 0-row table with text columns.
pub fn clean_table(mut raw: RawTable, geometry_column: &str) -> Result<CleanedTable, LoadError> {
    let header_only = raw.num_rows == 0;

    // 1) names
    let headers: Vec<String> = raw.columns.iter().map(|c| c.name.clone()).collect();
    let (names, column_mapping) = dedupe_columns(&headers);
    let geometry_name = headers
        .iter()
        .position(|h| h == geometry_column)
        .map(|i| names[i].clone());
    for (col, name) in raw.columns.iter_mut().zip(names) {
        col.name = name;
    }

    // 2) cells
    let skip: Vec<&str> = geometry_name.as_deref().into_iter().collect();
    apply_trimming(&mut raw, &skip);

    let mut inferred = Vec::with_capacity(raw.columns.len());
    let mut dropped_columns = Vec::new();
    for col in raw.columns {
        let is_geometry = geometry_name.as_deref() == Some(col.name.as_str());
        let column = if is_geometry {
            // 3) geometry is never inferred
            let cells = col
                .cells
                .iter()
                .map(|c| c.as_deref().and_then(canonical_geometry))
                .collect();
            text_column(col.name, ColumnKind::Text, cells)
        } else {
            // 4) type
            infer_column(col)
        };
        // 5) drop empties
        if !header_only && column.values.is_all_null() {
            debug!(column = %column.name, "all-null column dropped");
            dropped_columns.push(column.name);
            continue;
        }
        debug!(column = %column.name, kind = ?column.kind, "column typed");
        inferred.push(column);
    }

    if inferred.is_empty() {
        return Err(LoadError::Empty("no usable columns".into()));
    }
    let batch = to_record_batch(&inferred).map_err(|e| LoadError::Arrow(e.to_string()))?;
    Ok(CleanedTable {
        batch,
        column_mapping,
        dropped_columns,
    })
}

/// Parse + re-serialize with sorted keys and no whitespace. Text that is not
/// JSON is kept trimmed; blank text is null.
pub fn canonical_geometry(raw: &str) -> Option<String> {
    let trimmed = clean_cell(raw)?;
    match serde_json::from_str::<Value>(&trimmed) {
        Ok(Value::Null) => None,
        Ok(v) => Some(v.to_string()),
        Err(_) => Some(trimmed),
    }
}
