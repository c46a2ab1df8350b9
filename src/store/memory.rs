// src/store/memory.rs
use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use std::{collections::BTreeMap, sync::RwLock};

use super::TableStore;

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, RecordBatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableStore for MemoryStore {
    fn replace_table(&self, name: &str, batch: &RecordBatch) -> Result<()> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(name.to_string(), batch.clone());
        Ok(())
    }

    fn read_table(&self, name: &str) -> Result<Option<RecordBatch>> {
        let guard = self
            .tables
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(name).cloned())
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let guard = self
            .tables
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.keys().cloned().collect())
    }
}
