// src/store/mod.rs
//! Table storage. Every write is a full replace of one named table.

use anyhow::Result;
use arrow::record_batch::RecordBatch;

mod memory;
mod parquet_dir;
mod row;

pub use self::memory::MemoryStore;
pub use self::parquet_dir::ParquetStore;
pub use self::row::TableRow;

/// The storage-engine seam used by the catalog and the star builders.
///
/// A single writer is assumed; concurrent runs against one store are not
/// supported.
pub trait TableStore {
    /// Atomically create or replace `name` with `batch`. On error the previous
    /// version, if any, is left intact.
    fn replace_table(&self, name: &str, batch: &RecordBatch) -> Result<()>;

    /// `None` when the table does not exist.
    fn read_table(&self, name: &str) -> Result<Option<RecordBatch>>;

    /// Sorted table names.
    fn list_tables(&self) -> Result<Vec<String>>;

    fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == name))
    }

    /// Replace a fixed table from typed rows.
    fn replace_rows<R: TableRow>(&self, rows: &[R]) -> Result<RecordBatch>
    where
        Self: Sized,
    {
        let batch = R::to_batch(rows)?;
        self.replace_table(R::TABLE, &batch)?;
        Ok(batch)
    }
}
