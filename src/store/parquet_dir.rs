// src/store/parquet_dir.rs
use anyhow::{Context, Result};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use glob::glob;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

use super::TableStore;

/// One `<name>.parquet` file per table under `root`.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    /// Open a store at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating store directory {:?}", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.parquet", name))
    }
}

impl TableStore for ParquetStore {
    #[tracing::instrument(level = "debug", skip(self, batch), fields(rows = batch.num_rows()))]
    fn replace_table(&self, name: &str, batch: &RecordBatch) -> Result<()> {
        let final_path = self.table_path(name);

        // 1) temp file in the same directory so the rename stays on one filesystem
        let tmp = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("creating temp file in {:?}", &self.root))?;
        let file = tmp
            .reopen()
            .with_context(|| format!("opening temp file for `{}`", name))?;

        // 2) write
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
            .context("creating ArrowWriter")?;
        writer
            .write(batch)
            .with_context(|| format!("writing table `{}`", name))?;
        writer
            .close()
            .with_context(|| format!("closing writer for `{}`", name))?;

        // 3) swap in
        tmp.persist(&final_path).with_context(|| {
            format!("failed to move temp file to `{}`", final_path.display())
        })?;
        debug!(path = %final_path.display(), "table replaced");
        Ok(())
    }

    fn read_table(&self, name: &str) -> Result<Option<RecordBatch>> {
        let path = self.table_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path).with_context(|| format!("opening {:?}", &path))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of {:?}", &path))?;
        let schema = builder.schema().clone();
        let reader = builder.build().context("building parquet reader")?;
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("reading batches of {:?}", &path))?;
        let batch = concat_batches(&schema, &batches).context("concatenating batches")?;
        Ok(Some(batch))
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let pattern = format!("{}/*.parquet", self.root.display());
        let mut names = Vec::new();
        for entry in glob(&pattern).context("invalid glob pattern for ParquetStore")? {
            let path = entry.context("reading store directory entry")?;
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn batch(names: Vec<Option<&str>>, areas: Vec<Option<f64>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("nil", DataType::Utf8, true),
            Field::new("area_km2", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(names)),
                Arc::new(Float64Array::from(areas)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_read_and_replace() -> Result<()> {
        let dir = tempdir()?;
        let store = ParquetStore::new(dir.path().join("store"))?;
        assert!(store.read_table("dim_nil")?.is_none());

        store.replace_table("dim_nil", &batch(vec![Some("Brera"), None], vec![Some(1.5), None]))?;
        let got = store.read_table("dim_nil")?.unwrap();
        assert_eq!(got.num_rows(), 2);
        assert!(got.column(0).is_null(1));

        store.replace_table("dim_nil", &batch(vec![Some("Duomo")], vec![Some(0.9)]))?;
        let got = store.read_table("dim_nil")?.unwrap();
        assert_eq!(got.num_rows(), 1);
        let names = got.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "Duomo");

        store.replace_table("dim_tempo", &batch(vec![], vec![]))?;
        assert_eq!(store.list_tables()?, vec!["dim_nil".to_string(), "dim_tempo".to_string()]);
        Ok(())
    }
}
