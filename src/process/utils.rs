use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::{HashMap, HashSet},
    path::Path,
};
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Column/table slug: strip accents, lowercase, non-alphanumerics → `_`.
/// Never returns an empty string.
pub fn slug(raw: &str) -> String {
    let ascii: String = raw.nfkd().filter(char::is_ascii).collect();
    let lower = ascii.trim().to_lowercase();
    let replaced = NON_ALNUM.replace_all(&lower, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "col".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Slug every header and suffix collisions (`_2`, `_3`, ...).
/// A suffixed name never collides with a header that already carries it.
/// Returns the new names in order plus the original → new mapping.
pub fn dedupe_columns(headers: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(headers.len());
    let mut mapping = Vec::with_capacity(headers.len());
    for original in headers {
        let base = slug(original);
        let name = if used.contains(&base) {
            let n = next_suffix.entry(base.clone()).or_insert(2);
            loop {
                let candidate = format!("{}_{}", base, n);
                *n += 1;
                if !used.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            base
        };
        used.insert(name.clone());
        mapping.push((original.clone(), name.clone()));
        names.push(name);
    }
    (names, mapping)
}

/// Staged table name for an artifact: `ds_<category>_<file stem>`, slugged.
pub fn sanitize_table_name(category: &str, file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    slug(&format!("ds_{}_{}", category, stem))
}

/// Trim a cell; blank-only cells are null.
pub fn clean_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(slug("Anno Evento"), "anno_evento");
        assert_eq!(slug("Città  (totale)"), "citta_totale");
        assert_eq!(slug("_geometry"), "geometry");
        assert_eq!(slug("***"), "col");
        assert_eq!(slug("\u{feff}NIL"), "nil");
    }

    #[test]
    fn collisions_are_suffixed() {
        let headers: Vec<String> = ["NIL", "nil", "N.I.L.", "Nil "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (names, mapping) = dedupe_columns(&headers);
        assert_eq!(names, vec!["nil", "nil_2", "n_i_l", "nil_3"]);
        assert_eq!(mapping[1], ("nil".to_string(), "nil_2".to_string()));
    }

    #[test]
    fn suffixes_skip_names_already_taken() {
        let headers: Vec<String> = ["a_2", "a", "a"].iter().map(|s| s.to_string()).collect();
        let (names, _) = dedupe_columns(&headers);
        assert_eq!(names, vec!["a_2", "a", "a_3"]);

        let headers: Vec<String> = ["x", "x", "x_2"].iter().map(|s| s.to_string()).collect();
        let (names, _) = dedupe_columns(&headers);
        assert_eq!(names, vec!["x", "x_2", "x_2_2"]);
    }

    #[test]
    fn table_names() {
        assert_eq!(
            sanitize_table_name("00_base_geografica", "nil_confini_pgt_2030.geojson"),
            "ds_00_base_geografica_nil_confini_pgt_2030"
        );
        assert_eq!(sanitize_table_name("01 Demografia", "Popolazione-2020.csv"), "ds_01_demografia_popolazione_2020");
    }

    #[test]
    fn cells() {
        assert_eq!(clean_cell("  x "), Some("x".to_string()));
        assert_eq!(clean_cell(" \t "), None);
    }
}
