// src/catalog/discover.rs
use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CATALOG_JSON: &str = "catalogo_dataset_nil.json";
pub const CATALOG_CSV: &str = "catalogo_dataset_nil.csv";

const EXTENSIONS: [&str; 3] = ["csv", "geojson", "json"];
const EXCLUDED_DIR: &str = "cleaned";
const EXCLUDED_FILES: [&str; 4] = ["metadata_download.json", "download.log", CATALOG_JSON, CATALOG_CSV];

/// All loadable artifacts under `input_dir`, in sorted path order.
///
/// Skips anything inside a `cleaned` directory, fetcher metadata and our own
/// catalog exports. A missing input root yields an empty list.
pub fn discover_artifacts(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        warn!(dir = %input_dir.display(), "input directory does not exist");
        return Ok(Vec::new());
    }
    let pattern = format!("{}/**/*", input_dir.display());
    let mut files = Vec::new();
    for entry in glob(&pattern).context("invalid glob pattern for discovery")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "cannot read glob entry");
                continue;
            }
        };
        if !path.is_file() || !is_candidate(input_dir, &path) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    debug!(count = files.len(), "artifacts discovered");
    Ok(files)
}

fn is_candidate(root: &Path, path: &Path) -> bool {
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !ext_ok {
        return false;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if EXCLUDED_FILES.contains(&name) {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    !relative
        .components()
        .any(|c| c.as_os_str() == EXCLUDED_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_artifacts_and_skips_exclusions() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        for rel in [
            "01_demo/b.csv",
            "01_demo/a.JSON",
            "00_geo/nil.geojson",
            "01_demo/notes.txt",
            "cleaned/01_demo/b.csv",
            "metadata_download.json",
            "download.log",
            "catalogo_dataset_nil.json",
        ] {
            let p = root.join(rel);
            fs::create_dir_all(p.parent().unwrap())?;
            fs::write(&p, "x")?;
        }

        let found: Vec<String> = discover_artifacts(root)?
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["00_geo/nil.geojson", "01_demo/a.JSON", "01_demo/b.csv"]);
        Ok(())
    }

    #[test]
    fn missing_root_is_empty() -> Result<()> {
        assert!(discover_artifacts(Path::new("/nonexistent/data_raw"))?.is_empty());
        Ok(())
    }
}
