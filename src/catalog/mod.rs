// src/catalog/mod.rs
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::{fs, path::Path};
use tracing::{info, warn};

mod discover;
mod entry;
mod export;

pub use discover::{discover_artifacts, CATALOG_CSV, CATALOG_JSON};
pub use entry::{entries_from_batch, merge_entries, CatalogEntry, CATALOG_TABLE};
pub use export::{clean_export_path, write_batch_csv, write_catalog_exports};

use crate::config::PipelineConfig;
use crate::load::{load_and_clean, LoadError, StagedTable};
use crate::process::utils::sanitize_table_name;
use crate::store::TableStore;

/// An artifact that did not make it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct FailedArtifact {
    pub table_name: String,
    pub source_path: String,
    pub error: String,
}

/// Outcome of one catalog pass: one entry per processed artifact.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogRun {
    pub entries: Vec<CatalogEntry>,
    pub staged: Vec<String>,
    pub failed: Vec<FailedArtifact>,
}

impl CatalogRun {
    fn record(&mut self, entry: CatalogEntry) {
        if entry.is_failure() {
            self.failed.push(FailedArtifact {
                table_name: entry.table_name.clone(),
                source_path: entry.source_path.clone(),
                error: entry.error.clone(),
            });
        } else {
            self.staged.push(entry.table_name.clone());
        }
        self.entries.push(entry);
    }
}

/// Identity of an artifact before it is loaded.
struct Artifact<'a> {
    path: &'a Path,
    filename: String,
    category: String,
    category_name: String,
    description: String,
    table_name: String,
}

impl<'a> Artifact<'a> {
    fn new(config: &PipelineConfig, path: &'a Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = config.dataset_for(&filename);
        let category = meta.map(|d| d.category.clone()).unwrap_or_else(|| {
            path.parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let category_name = meta
            .and_then(|d| d.category_name.clone())
            .unwrap_or_else(|| category.clone());
        let description = meta.map(|d| d.description.clone()).unwrap_or_default();
        let table_name = sanitize_table_name(&category, &filename);
        Self {
            path,
            filename,
            category,
            category_name,
            description,
            table_name,
        }
    }

    fn entry(&self, processed_at: &str, outcome: Result<&StagedTable, String>) -> CatalogEntry {
        let size_bytes = fs::metadata(self.path).map(|m| m.len()).unwrap_or(0);
        let file_size_kb = ((size_bytes as f64 / 1024.0) * 1000.0).round() / 1000.0;
        let base = CatalogEntry {
            table_name: self.table_name.clone(),
            filename: self.filename.clone(),
            category: self.category.clone(),
            category_name: self.category_name.clone(),
            description: self.description.clone(),
            format: "unknown".into(),
            rows: 0,
            columns: 0,
            column_names: Vec::new(),
            column_mapping: Default::default(),
            source_path: self.path.display().to_string(),
            file_size_kb,
            processed_at: processed_at.to_string(),
            error: String::new(),
        };
        match outcome {
            Ok(staged) => CatalogEntry {
                format: staged.format.as_str().into(),
                rows: staged.batch.num_rows() as i64,
                columns: staged.batch.num_columns() as i64,
                column_names: staged
                    .batch
                    .schema_ref()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect(),
                column_mapping: staged.column_mapping.iter().cloned().collect(),
                ..base
            },
            Err(error) => CatalogEntry { error, ..base },
        }
    }
}

/// Discover, load, clean and persist every artifact, then replace the
/// catalog table.
///
/// 1) discover artifacts under `input_dir` (sorted)
/// 2) per artifact: load + clean into a `Result<StagedTable, LoadError>`
/// 3) persist successes as full-replace tables, optionally mirror a cleaned CSV
/// 4) record exactly one catalog entry per artifact, failures included
/// 5) merge with the stored catalog by table name and replace it
/// 6) export the run's catalog as JSON + CSV
#[tracing::instrument(level = "info", skip(config, store, now))]
pub fn build_catalog<S: TableStore>(
    config: &PipelineConfig,
    store: &S,
    now: DateTime<Utc>,
) -> Result<CatalogRun> {
    let processed_at = now.to_rfc3339_opts(SecondsFormat::Secs, false);

    // 1) discover
    let files = discover_artifacts(&config.input_dir)?;
    if files.is_empty() {
        warn!(dir = %config.input_dir.display(), "no datasets found");
    }

    let mut run = CatalogRun::default();
    for path in &files {
        let artifact = Artifact::new(config, path);
        if !config.categories.is_empty() && !config.categories.contains(&artifact.category) {
            continue;
        }

        // 2) load
        let outcome: Result<StagedTable, LoadError> = load_and_clean(path, &artifact.table_name);

        // 3) + 4) persist and record
        let entry = match outcome {
            Ok(staged) => match persist(config, store, path, &staged) {
                Ok(()) => {
                    info!(
                        table = %staged.name,
                        format = staged.format.as_str(),
                        rows = staged.batch.num_rows(),
                        columns = staged.batch.num_columns(),
                        "artifact staged"
                    );
                    artifact.entry(&processed_at, Ok(&staged))
                }
                Err(e) => {
                    warn!(table = %staged.name, error = %format!("{:#}", e), "persisting failed");
                    artifact.entry(&processed_at, Err(format!("{:#}", e)))
                }
            },
            Err(e) => {
                warn!(file = %artifact.filename, error = %e, "artifact failed");
                artifact.entry(&processed_at, Err(e.to_string()))
            }
        };
        run.record(entry);
    }

    if run.entries.is_empty() {
        warn!("no datasets processed");
        return Ok(run);
    }

    // 5) merge + replace
    let existing = match store.read_table(CATALOG_TABLE)? {
        Some(batch) => entries_from_batch(&batch).unwrap_or_else(|e| {
            warn!(error = %format!("{:#}", e), "stored catalog unreadable, starting fresh");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let merged = merge_entries(existing, &run.entries);
    store
        .replace_rows(&merged)
        .context("replacing dataset catalog")?;

    // 6) export
    let (json_path, _) = write_catalog_exports(&run.entries, config.catalog_export_dir())?;
    info!(
        staged = run.staged.len(),
        failed = run.failed.len(),
        catalog = %json_path.display(),
        "catalog built"
    );
    Ok(run)
}

fn persist<S: TableStore>(config: &PipelineConfig, store: &S, path: &Path, staged: &StagedTable) -> Result<()> {
    store
        .replace_table(&staged.name, &staged.batch)
        .with_context(|| format!("storing `{}`", staged.name))?;
    if config.export_clean {
        let out = clean_export_path(&config.input_dir, &config.clean_dir, path);
        if let Err(e) = write_batch_csv(&staged.batch, &out) {
            warn!(path = %out.display(), error = %format!("{:#}", e), "clean export failed");
        }
    }
    Ok(())
}
