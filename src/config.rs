// src/config.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::process::year::{MAX_YEAR, MIN_YEAR};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.yaml";

/// Everything a run needs, loaded once at start and passed down by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_clean_dir")]
    pub clean_dir: PathBuf,
    #[serde(default)]
    pub export_clean: bool,
    /// Where the catalog JSON/CSV exports go; the input root when unset.
    #[serde(default)]
    pub catalog_export_dir: Option<PathBuf>,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Only these categories are processed; empty means all.
    #[serde(default)]
    pub categories: Vec<String>,
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub star: StarConfig,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data_raw")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data_store")
}

fn default_clean_dir() -> PathBuf {
    PathBuf::from("data_raw/cleaned")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// One known upstream dataset, as described by the fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub category: String,
    /// Display label of the category, e.g. "Struttura demografica".
    #[serde(default)]
    pub category_name: Option<String>,
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub as_of_year: Option<i64>,
    #[serde(default)]
    pub description: String,
}

/// Source bindings for the star schema. Defaults are the staged table names
/// the Milan open-data catalog produces.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StarConfig {
    pub boundaries: BoundariesConfig,
    pub year_sources: Vec<YearSource>,
    pub demographics: DemographicsConfig,
    pub housing: HousingConfig,
    pub services: ServicesConfig,
}

impl Default for StarConfig {
    fn default() -> Self {
        let year_sources = [
            ("ds_01_struttura_demografica_caratteristiche_demografiche_quartieri_2011_2021", "anno"),
            ("ds_01_struttura_demografica_popolazione_iscrizioni_quartiere_2004_2019", "anno_evento"),
            ("ds_01_struttura_demografica_popolazione_cancellazioni_quartiere_2004_2019", "anno_evento"),
            ("ds_01_struttura_demografica_popolazione_iscrizioni_quartiere_2020_2023", "anno_evento"),
            ("ds_01_struttura_demografica_popolazione_cancellazioni_quartiere_2020_2023", "anno_evento"),
            ("ds_03_stock_abitativo_nuovi_fabbricati_residenziali_2010_2023", "anno_ritiro"),
            ("ds_06_istruzione_famiglie_edifici_scolastici_2020_2021", "annoscolastico"),
        ]
        .into_iter()
        .map(|(table, column)| YearSource {
            table: table.to_string(),
            column: column.to_string(),
        })
        .collect();

        Self {
            boundaries: BoundariesConfig::default(),
            year_sources,
            demographics: DemographicsConfig::default(),
            housing: HousingConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct YearSource {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoundariesConfig {
    pub table: String,
    pub id_column: String,
    pub name_column: String,
    pub shape_area_column: String,
    pub shape_length_column: String,
    pub geometry_column: String,
}

impl Default for BoundariesConfig {
    fn default() -> Self {
        Self {
            table: "ds_00_base_geografica_nil_confini_pgt_2030".into(),
            id_column: "id_nil".into(),
            name_column: "nil".into(),
            shape_area_column: "shape_area".into(),
            shape_length_column: "shape_length".into(),
            geometry_column: "geometry".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemographicsConfig {
    pub table: String,
    pub name_column: String,
    pub year_column: String,
    pub total_column: String,
    pub foreign_column: String,
    pub families_column: String,
    pub single_families_column: String,
    pub births_column: String,
    pub deaths_column: String,
    pub immigrants_column: String,
    pub emigrants_column: String,
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            table: "ds_01_struttura_demografica_caratteristiche_demografiche_quartieri_2011_2021".into(),
            name_column: "quartiere".into(),
            year_column: "anno".into(),
            total_column: "totale".into(),
            foreign_column: "stranieri".into(),
            families_column: "famiglie_registrate_in_anagrafe".into(),
            single_families_column: "famiglie_unipersonali_registrate_in_anagrafe".into(),
            births_column: "nati_vivi".into(),
            deaths_column: "morti".into(),
            immigrants_column: "immigrati".into(),
            emigrants_column: "emigrati".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HousingConfig {
    pub table: String,
    pub name_column: String,
    pub year_column: String,
    pub dwellings_column: String,
    pub floor_area_column: String,
    pub volume_column: String,
}

impl Default for HousingConfig {
    fn default() -> Self {
        Self {
            table: "ds_03_stock_abitativo_nuovi_fabbricati_residenziali_2010_2023".into(),
            name_column: "nil".into(),
            year_column: "anno_ritiro".into(),
            dwellings_column: "numero_abitazioni".into(),
            floor_area_column: "superficie_utile_abitabile".into(),
            volume_column: "volume_totale_v_p".into(),
        }
    }
}

/// A service source: rows are tallied per place, or averaged over
/// `value_column` when one is set. Without `year_column` every row belongs
/// to the snapshot year.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSource {
    pub table: String,
    #[serde(default = "default_service_name_column")]
    pub name_column: String,
    #[serde(default)]
    pub year_column: Option<String>,
    #[serde(default)]
    pub value_column: Option<String>,
}

fn default_service_name_column() -> String {
    "nil".into()
}

impl ServiceSource {
    fn new(table: &str, year_column: Option<&str>, value_column: Option<&str>) -> Self {
        Self {
            table: table.into(),
            name_column: default_service_name_column(),
            year_column: year_column.map(Into::into),
            value_column: value_column.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub snapshot_year: i64,
    pub schools: ServiceSource,
    pub covered_markets: ServiceSource,
    pub weekly_markets: ServiceSource,
    pub green: ServiceSource,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            snapshot_year: 2024,
            schools: ServiceSource::new(
                "ds_06_istruzione_famiglie_edifici_scolastici_2020_2021",
                Some("annoscolastico"),
                None,
            ),
            covered_markets: ServiceSource::new("ds_05_servizi_essenziali_mercati_comunali_coperti", None, None),
            weekly_markets: ServiceSource::new(
                "ds_05_servizi_essenziali_mercati_settimanali_scoperti",
                None,
                None,
            ),
            green: ServiceSource::new(
                "ds_04_qualita_ambientale_indice_verde_urbano_nil_2024",
                None,
                Some("value"),
            ),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a YAML config. A missing or malformed file is fatal.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(text).context("invalid pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.star.boundaries.table.trim().is_empty() {
            bail!("star.boundaries.table must not be empty");
        }
        let in_range = |y: i64| (MIN_YEAR..=MAX_YEAR).contains(&y);
        if !in_range(self.star.services.snapshot_year) {
            bail!(
                "star.services.snapshot_year {} outside {}..={}",
                self.star.services.snapshot_year,
                MIN_YEAR,
                MAX_YEAR
            );
        }
        for ds in &self.datasets {
            if let Some(y) = ds.as_of_year.filter(|y| !in_range(*y)) {
                bail!("dataset {}: as_of_year {} out of range", ds.id, y);
            }
        }
        Ok(())
    }

    pub fn dataset_for(&self, filename: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.filename == filename)
    }

    pub fn as_of_years(&self) -> impl Iterator<Item = i64> + '_ {
        self.datasets.iter().filter_map(|d| d.as_of_year)
    }

    pub fn catalog_export_dir(&self) -> &Path {
        self.catalog_export_dir.as_deref().unwrap_or(&self.input_dir)
    }

    /// Config rooted at `root` for tests and ad-hoc runs.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            input_dir: root.join(default_input_dir()),
            store_dir: root.join(default_store_dir()),
            clean_dir: root.join(default_clean_dir()),
            export_clean: false,
            catalog_export_dir: None,
            reports_dir: root.join(default_reports_dir()),
            categories: Vec::new(),
            datasets: Vec::new(),
            star: StarConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_takes_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_yaml_str(
            r#"
datasets:
  - category: 04_qualita_ambientale
    id: verde
    filename: indice_verde_urbano_nil_2024.csv
    as_of_year: 2024
"#,
        )?;
        assert_eq!(cfg.input_dir, PathBuf::from("data_raw"));
        assert_eq!(cfg.catalog_export_dir(), Path::new("data_raw"));
        assert_eq!(cfg.star.year_sources.len(), 7);
        assert_eq!(cfg.star.services.snapshot_year, 2024);
        assert_eq!(cfg.star.services.green.value_column.as_deref(), Some("value"));
        assert_eq!(cfg.as_of_years().collect::<Vec<_>>(), vec![2024]);
        assert!(cfg.dataset_for("indice_verde_urbano_nil_2024.csv").is_some());
        Ok(())
    }

    #[test]
    fn partial_star_section_keeps_other_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_yaml_str(
            r#"
datasets: []
star:
  boundaries:
    table: nil_confini
  services:
    snapshot_year: 2023
"#,
        )?;
        assert_eq!(cfg.star.boundaries.table, "nil_confini");
        assert_eq!(cfg.star.boundaries.name_column, "nil");
        assert_eq!(cfg.star.services.snapshot_year, 2023);
        assert_eq!(cfg.star.housing.year_column, "anno_ritiro");
        Ok(())
    }

    #[test]
    fn shipped_config_feeds_every_star_source() -> Result<()> {
        use crate::process::utils::sanitize_table_name;

        let cfg = PipelineConfig::from_yaml_str(include_str!("../config/pipeline.yaml"))?;
        let staged: Vec<String> = cfg
            .datasets
            .iter()
            .map(|d| sanitize_table_name(&d.category, &d.filename))
            .collect();
        let star = &cfg.star;
        let sources = [
            &star.boundaries.table,
            &star.demographics.table,
            &star.housing.table,
            &star.services.schools.table,
            &star.services.covered_markets.table,
            &star.services.weekly_markets.table,
            &star.services.green.table,
        ]
        .into_iter()
        .chain(star.year_sources.iter().map(|y| &y.table));
        for table in sources {
            assert!(staged.contains(table), "{} is never staged", table);
        }
        Ok(())
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(PipelineConfig::from_yaml_str("input_dir: x\n").is_err());
        assert!(PipelineConfig::from_yaml_str("datasets: []\nstar:\n  services:\n    snapshot_year: 3000\n").is_err());
        assert!(PipelineConfig::from_path(Path::new("/nonexistent/pipeline.yaml")).is_err());
    }
}
