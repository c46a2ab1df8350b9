// src/catalog/entry.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use crate::store::TableRow;

pub const CATALOG_TABLE: &str = "dataset_catalog";

/// Processing metadata for one artifact, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub table_name: String,
    pub filename: String,
    pub category: String,
    /// Human label of the category; the category itself when none is configured.
    #[serde(default)]
    pub category_name: String,
    pub description: String,
    /// `csv` / `geojson` / `json`, or `unknown` when loading failed.
    pub format: String,
    pub rows: i64,
    pub columns: i64,
    pub column_names: Vec<String>,
    /// Original header → stored column name.
    pub column_mapping: BTreeMap<String, String>,
    pub source_path: String,
    pub file_size_kb: f64,
    /// RFC 3339, UTC.
    pub processed_at: String,
    /// Empty on success.
    pub error: String,
}

impl CatalogEntry {
    pub fn is_failure(&self) -> bool {
        !self.error.is_empty()
    }
}

impl TableRow for CatalogEntry {
    const TABLE: &'static str = CATALOG_TABLE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("table_name", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("category_name", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, false),
            Field::new("format", DataType::Utf8, false),
            Field::new("rows", DataType::Int64, false),
            Field::new("columns", DataType::Int64, false),
            Field::new("column_names", DataType::Utf8, false),
            Field::new("column_mapping", DataType::Utf8, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("file_size_kb", DataType::Float64, false),
            Field::new("processed_at", DataType::Utf8, false),
            Field::new("error", DataType::Utf8, false),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        fn text<F: Fn(&CatalogEntry) -> String>(rows: &[CatalogEntry], f: F) -> ArrayRef {
            Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
        }
        // encoding a string list or string map cannot fail
        vec![
            text(rows, |r| r.table_name.clone()),
            text(rows, |r| r.filename.clone()),
            text(rows, |r| r.category.clone()),
            text(rows, |r| r.category_name.clone()),
            text(rows, |r| r.description.clone()),
            text(rows, |r| r.format.clone()),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.rows).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.columns).collect::<Vec<_>>())),
            text(rows, |r| serde_json::to_string(&r.column_names).unwrap_or_default()),
            text(rows, |r| serde_json::to_string(&r.column_mapping).unwrap_or_default()),
            text(rows, |r| r.source_path.clone()),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.file_size_kb).collect::<Vec<_>>())),
            text(rows, |r| r.processed_at.clone()),
            text(rows, |r| r.error.clone()),
        ]
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("catalog column `{}` missing or not Utf8", name))
}

/// Decode a stored catalog table back into entries.
pub fn entries_from_batch(batch: &RecordBatch) -> Result<Vec<CatalogEntry>> {
    let table_name = string_column(batch, "table_name")?;
    let filename = string_column(batch, "filename")?;
    let category = string_column(batch, "category")?;
    // catalogs written before the column existed read back as ""
    let category_name = string_column(batch, "category_name").ok();
    let description = string_column(batch, "description")?;
    let format = string_column(batch, "format")?;
    let column_names = string_column(batch, "column_names")?;
    let column_mapping = string_column(batch, "column_mapping")?;
    let source_path = string_column(batch, "source_path")?;
    let processed_at = string_column(batch, "processed_at")?;
    let error = string_column(batch, "error")?;
    let rows = batch
        .column_by_name("rows")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("catalog column `rows` missing or not Int64"))?;
    let columns = batch
        .column_by_name("columns")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("catalog column `columns` missing or not Int64"))?;
    let size = batch
        .column_by_name("file_size_kb")
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| anyhow!("catalog column `file_size_kb` missing or not Float64"))?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(CatalogEntry {
                table_name: table_name.value(i).to_string(),
                filename: filename.value(i).to_string(),
                category: category.value(i).to_string(),
                category_name: category_name.map(|c| c.value(i).to_string()).unwrap_or_default(),
                description: description.value(i).to_string(),
                format: format.value(i).to_string(),
                rows: rows.value(i),
                columns: columns.value(i),
                column_names: serde_json::from_str(column_names.value(i))
                    .with_context(|| format!("column_names of row {}", i))?,
                column_mapping: serde_json::from_str(column_mapping.value(i))
                    .with_context(|| format!("column_mapping of row {}", i))?,
                source_path: source_path.value(i).to_string(),
                file_size_kb: if size.is_null(i) { 0.0 } else { size.value(i) },
                processed_at: processed_at.value(i).to_string(),
                error: error.value(i).to_string(),
            })
        })
        .collect()
}

/// Entries of this run replace existing ones with the same table name.
/// Output is sorted by table name.
pub fn merge_entries(existing: Vec<CatalogEntry>, fresh: &[CatalogEntry]) -> Vec<CatalogEntry> {
    let replaced: HashSet<&str> = fresh.iter().map(|e| e.table_name.as_str()).collect();
    let mut merged: Vec<CatalogEntry> = existing
        .into_iter()
        .filter(|e| !replaced.contains(e.table_name.as_str()))
        .collect();
    merged.extend(fresh.iter().cloned());
    merged.sort_by(|a, b| a.table_name.cmp(&b.table_name));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(table: &str, rows: i64, error: &str) -> CatalogEntry {
        CatalogEntry {
            table_name: table.into(),
            filename: format!("{}.csv", table),
            category: "01_struttura_demografica".into(),
            category_name: "Struttura demografica".into(),
            description: String::new(),
            format: if error.is_empty() { "csv".into() } else { "unknown".into() },
            rows,
            columns: if error.is_empty() { 2 } else { 0 },
            column_names: if error.is_empty() {
                vec!["nil".into(), "anno".into()]
            } else {
                vec![]
            },
            column_mapping: BTreeMap::from([("NIL".to_string(), "nil".to_string())]),
            source_path: format!("data_raw/{}.csv", table),
            file_size_kb: 1.5,
            processed_at: "2024-01-01T00:00:00+00:00".into(),
            error: error.into(),
        }
    }

    #[test]
    fn batch_round_trip_keeps_json_fields() -> Result<()> {
        let entries = vec![entry("ds_a", 10, ""), entry("ds_b", 0, "csv: bad")];
        let batch = CatalogEntry::to_batch(&entries)?;
        assert_eq!(batch.num_rows(), 2);
        let names = string_column(&batch, "column_names")?;
        assert_eq!(names.value(0), r#"["nil","anno"]"#);
        assert_eq!(entries_from_batch(&batch)?, entries);
        Ok(())
    }

    #[test]
    fn merge_replaces_by_table_name() {
        let old = vec![entry("ds_a", 1, ""), entry("ds_c", 3, "")];
        let fresh = vec![entry("ds_a", 5, ""), entry("ds_b", 0, "boom")];
        let merged = merge_entries(old, &fresh);
        let names: Vec<&str> = merged.iter().map(|e| e.table_name.as_str()).collect();
        assert_eq!(names, vec!["ds_a", "ds_b", "ds_c"]);
        assert_eq!(merged[0].rows, 5);
        assert!(merged[1].is_failure());
    }

    #[test]
    fn older_catalog_without_category_name_still_reads() -> Result<()> {
        let batch = CatalogEntry::to_batch(&[entry("ds_a", 1, "")])?;
        let idx = batch.schema_ref().index_of("category_name")?;
        let mut older = batch.clone();
        older.remove_column(idx);
        let read = entries_from_batch(&older)?;
        assert_eq!(read[0].category_name, "");
        assert_eq!(read[0].category, "01_struttura_demografica");
        Ok(())
    }
}
