// src/pipeline.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    time::Instant,
};
use tracing::info;

use crate::catalog::{build_catalog, CatalogRun};
use crate::config::PipelineConfig;
use crate::star::{build_star_schema, StarSchemaReport};
use crate::store::TableStore;
use crate::validate::{validate_store, ValidationReport};

pub const REPORT_FILE: &str = "star_schema_report.json";

/// Wall-clock time per step, in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepTimings {
    pub catalog_ms: u64,
    pub star_schema_ms: u64,
    pub validation_ms: u64,
}

/// Everything one run did, written next to the other reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub catalog: CatalogRun,
    pub star_schema: StarSchemaReport,
    pub validation: ValidationReport,
    pub timings: StepTimings,
}

/// One full run against `store`.
///
/// 1) catalog: stage every artifact under `input_dir`
/// 2) star schema: rebuild dimensions and facts from the staged tables
/// 3) validation: quality checks over the star and staged tables
#[tracing::instrument(level = "info", skip_all)]
pub fn run<S: TableStore>(config: &PipelineConfig, store: &S) -> Result<RunReport> {
    run_at(config, store, Utc::now())
}

/// `run` with a fixed clock.
pub fn run_at<S: TableStore>(config: &PipelineConfig, store: &S, now: DateTime<Utc>) -> Result<RunReport> {
    let mut timings = StepTimings::default();

    // 1) catalog
    let t0 = Instant::now();
    let catalog = build_catalog(config, store, now).context("building dataset catalog")?;
    timings.catalog_ms = t0.elapsed().as_millis() as u64;

    // 2) star schema
    let t1 = Instant::now();
    let as_of_years: Vec<i64> = config.as_of_years().collect();
    let star_schema = build_star_schema(&config.star, &as_of_years, store, i64::from(now.year()))
        .context("building star schema")?;
    timings.star_schema_ms = t1.elapsed().as_millis() as u64;

    // 3) validation
    let t2 = Instant::now();
    let validation = validate_store(store, &catalog.staged).context("validating tables")?;
    timings.validation_ms = t2.elapsed().as_millis() as u64;

    info!(
        staged = catalog.staged.len(),
        failed = catalog.failed.len(),
        dim_nil = star_schema.dim_nil_rows,
        dim_tempo = star_schema.dim_tempo_rows,
        catalog_ms = timings.catalog_ms,
        star_schema_ms = timings.star_schema_ms,
        quality_score = validation.quality_score,
        "run complete"
    );
    Ok(RunReport {
        started_at: now.to_rfc3339_opts(SecondsFormat::Secs, false),
        catalog,
        star_schema,
        validation,
        timings,
    })
}

/// Write `report` as pretty JSON into `reports_dir`.
pub fn write_report(config: &PipelineConfig, report: &RunReport) -> Result<PathBuf> {
    fs::create_dir_all(&config.reports_dir)
        .with_context(|| format!("creating {}", config.reports_dir.display()))?;
    let path = config.reports_dir.join(REPORT_FILE);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{entries_from_batch, CatalogEntry, CATALOG_TABLE};
    use crate::star::{DIM_PLACE_TABLE, DIM_TIME_TABLE, FACT_DEMOGRAPHICS_TABLE, FACT_HOUSING_TABLE, FACT_SERVICES_TABLE};
    use crate::store::ParquetStore;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use chrono::TimeZone;
    use std::path::Path;
    use tempfile::tempdir;
    use tracing_subscriber::{fmt, EnvFilter};

    fn init_tracing() {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }

    fn seed(config: &PipelineConfig) {
        write(
            &config.input_dir,
            "00_base_geografica/nil_confini_pgt_2030.csv",
            "ID_NIL;NIL;Shape_Area\n;Brera;2000000\n;Duomo;0\n",
        );
        write(
            &config.input_dir,
            "01_struttura_demografica/caratteristiche_demografiche_quartieri_2011_2021.csv",
            "Quartiere;Anno;Totale;Stranieri\nBRERA;2020;12.345;1.234\nDuomo;2020;500;50\nAtlantide;2020;10;1\n",
        );
    }

    /// Boundaries and demographics plus one source for each other fact table.
    fn seed_all(config: &PipelineConfig) {
        seed(config);
        write(
            &config.input_dir,
            "03_stock_abitativo/nuovi_fabbricati_residenziali_2010_2023.csv",
            "NIL;Anno Ritiro;Numero Abitazioni;Superficie Utile Abitabile\nBrera;2019;4;320,5\nDuomo;2020;2;80\n",
        );
        write(
            &config.input_dir,
            "05_servizi_essenziali/mercati_comunali_coperti.csv",
            "NIL;Tipo\nDuomo;coperto\n",
        );
        write(
            &config.input_dir,
            "04_qualita_ambientale/indice_verde_urbano_nil_2024.csv",
            "NIL;Value\nBrera;0,45\n",
        );
    }

    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<T>()
            .unwrap()
    }

    #[test]
    fn end_to_end_from_raw_files() -> Result<()> {
        init_tracing();
        let dir = tempdir()?;
        let config = PipelineConfig::rooted_at(dir.path());
        seed(&config);
        let store = ParquetStore::new(&config.store_dir)?;
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let report = run_at(&config, &store, now)?;
        assert_eq!(report.catalog.staged.len(), 2);
        assert!(report.catalog.failed.is_empty());
        assert!(report.star_schema.ids_synthesized);
        assert_eq!(report.star_schema.years, vec![2020]);

        let dim = store.read_table(DIM_PLACE_TABLE)?.unwrap();
        assert_eq!(column::<Int64Array>(&dim, "id_nil").values().to_vec(), vec![1, 2]);
        assert_eq!(column::<StringArray>(&dim, "nil_norm").value(0), "BRERA");

        let tempo = store.read_table(DIM_TIME_TABLE)?.unwrap();
        assert_eq!(tempo.num_rows(), 2);

        let demo = store.read_table(FACT_DEMOGRAPHICS_TABLE)?.unwrap();
        assert_eq!(demo.num_rows(), 2);
        assert_eq!(column::<Int64Array>(&demo, "id_nil").values().to_vec(), vec![1, 2]);
        assert_eq!(column::<Int64Array>(&demo, "id_tempo").value(0), 2020);
        let total = column::<Float64Array>(&demo, "popolazione_totale");
        assert_eq!(total.value(0), 12345.0);
        let density = column::<Float64Array>(&demo, "densita_abitanti_km2");
        assert!((density.value(0) - 6172.5).abs() < 1e-9);
        assert!(density.is_null(1));
        let pct = column::<Float64Array>(&demo, "pct_stranieri");
        assert!((pct.value(1) - 10.0).abs() < 1e-9);

        let demo_report = &report.star_schema.facts[0];
        assert_eq!(demo_report.join_misses, 1);
        assert_eq!(demo_report.unmatched_names, vec!["ATLANTIDE".to_string()]);

        // sources that were never staged still yield (empty) fact tables
        assert_eq!(store.read_table(FACT_HOUSING_TABLE)?.unwrap().num_rows(), 0);
        assert_eq!(store.read_table(FACT_SERVICES_TABLE)?.unwrap().num_rows(), 0);

        // the two unstaged fact tables are empty, hence invalid
        assert_eq!(report.validation.tables.len(), 7);
        assert_eq!(report.validation.validation_failed, 2);
        assert!(!report.validation.table(FACT_HOUSING_TABLE).unwrap().is_valid);
        let staged_demo = report
            .validation
            .table("ds_01_struttura_demografica_caratteristiche_demografiche_quartieri_2011_2021")
            .unwrap();
        assert_eq!(staged_demo.unique_nils, Some(3));
        assert!(staged_demo
            .issues
            .iter()
            .all(|i| !i.message.contains("names not in dim_nil")));

        let path = write_report(&config, &report)?;
        assert!(path.is_file());
        Ok(())
    }

    #[test]
    fn reruns_are_deterministic() -> Result<()> {
        init_tracing();
        let dir = tempdir()?;
        let config = PipelineConfig::rooted_at(dir.path());
        seed_all(&config);
        let store = ParquetStore::new(&config.store_dir)?;
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let snapshot = |store: &ParquetStore| -> Result<Vec<(String, Option<RecordBatch>)>> {
            store
                .list_tables()?
                .into_iter()
                .filter(|t| t != CATALOG_TABLE)
                .map(|t| {
                    let batch = store.read_table(&t)?;
                    Ok((t, batch))
                })
                .collect()
        };
        let catalog = |store: &ParquetStore| -> Result<Vec<CatalogEntry>> {
            let batch = store.read_table(CATALOG_TABLE)?.unwrap();
            let mut entries = entries_from_batch(&batch)?;
            for e in &mut entries {
                e.processed_at.clear();
            }
            Ok(entries)
        };

        let report = run_at(&config, &store, now)?;
        assert_eq!(report.catalog.staged.len(), 5);
        assert_eq!(report.star_schema.years, vec![2019, 2020, 2024]);
        let first = snapshot(&store)?;
        let first_catalog = catalog(&store)?;
        let names: Vec<&str> = first.iter().map(|(t, _)| t.as_str()).collect();
        for table in [DIM_PLACE_TABLE, DIM_TIME_TABLE, FACT_DEMOGRAPHICS_TABLE, FACT_HOUSING_TABLE, FACT_SERVICES_TABLE] {
            assert!(names.contains(&table), "{} missing", table);
        }
        assert!(first.iter().all(|(_, b)| b.is_some()));
        assert!(store.read_table(FACT_HOUSING_TABLE)?.unwrap().num_rows() > 0);
        assert!(store.read_table(FACT_SERVICES_TABLE)?.unwrap().num_rows() > 0);

        run_at(&config, &store, now + chrono::Duration::hours(1))?;
        assert_eq!(first, snapshot(&store)?);
        assert_eq!(first_catalog, catalog(&store)?);
        Ok(())
    }
}
