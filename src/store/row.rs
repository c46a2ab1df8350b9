// src/store/row.rs
use anyhow::{Context, Result};
use arrow::{array::ArrayRef, datatypes::Schema, record_batch::RecordBatch};
use std::sync::Arc;

/// A typed row of one of the fixed output tables.
/// - `schema` and `columns` must agree on order and types.
pub trait TableRow: Sized {
    /// Stored table name.
    const TABLE: &'static str;
    /// Arrow schema for this row type
    fn schema() -> Schema;
    /// Column arrays for `rows`, matching the schema
    fn columns(rows: &[Self]) -> Vec<ArrayRef>;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        RecordBatch::try_new(Arc::new(Self::schema()), Self::columns(rows))
            .with_context(|| format!("building record batch for `{}`", Self::TABLE))
    }
}
