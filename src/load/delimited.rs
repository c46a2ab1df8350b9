// src/load/delimited.rs
use csv::ReaderBuilder;
use encoding_rs::{UTF_8, WINDOWS_1252};
use std::{borrow::Cow, collections::BTreeMap, fs, path::Path};
use tracing::{debug, warn};

use super::error::LoadError;
use crate::process::raw_table::RawTable;

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 20;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encodings tried in order; the first that yields a table wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Latin1,
    Cp1252,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Utf8Bom,
        TextEncoding::Latin1,
        TextEncoding::Cp1252,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8-sig",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Cp1252 => "cp1252",
        }
    }

    /// Strict decode; `None` when the bytes are not valid in this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            // a BOM is left for the utf-8-sig step
            TextEncoding::Utf8 if bytes.starts_with(UTF8_BOM) => None,
            TextEncoding::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
            TextEncoding::Utf8Bom => bytes
                .strip_prefix(UTF8_BOM)
                .and_then(|rest| UTF_8.decode_without_bom_handling_and_without_replacement(rest)),
            TextEncoding::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
            TextEncoding::Cp1252 => WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes),
        }
    }
}

/// Read a delimited text file, falling back through [`TextEncoding::ALL`].
pub fn read_delimited(path: &Path) -> Result<RawTable, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_delimited_bytes(&bytes)
}

/// Decode errors surface as [`LoadError::Encoding`] only when no encoding
/// applied; once some encoding decoded, its parse error is returned as is.
pub fn read_delimited_bytes(bytes: &[u8]) -> Result<RawTable, LoadError> {
    let mut last_error = String::from("no encoding attempted");
    let mut last_parse: Option<LoadError> = None;
    for enc in TextEncoding::ALL {
        let Some(text) = enc.decode(bytes) else {
            debug!(encoding = enc.label(), "decode failed");
            last_error = format!("invalid {}", enc.label());
            continue;
        };
        match parse_delimited(&text) {
            Ok(table) => {
                debug!(encoding = enc.label(), rows = table.num_rows, "decoded");
                return Ok(table);
            }
            Err(e) => {
                debug!(encoding = enc.label(), error = %e, "parse failed");
                last_parse = Some(e);
            }
        }
    }
    Err(last_parse.unwrap_or(LoadError::Encoding(last_error)))
}

/// Parse already-decoded text. Rows longer than the header are malformed
/// and skipped; shorter rows are padded with nulls.
pub fn parse_delimited(text: &str) -> Result<RawTable, LoadError> {
    let delimiter = sniff_delimiter(text);
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::Empty("no header row".into()));
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        match result {
            Ok(record) if record.len() <= headers.len() => {
                rows.push(record.iter().map(|f| Some(f.to_string())).collect());
            }
            Ok(record) => {
                debug!(record = idx, fields = record.len(), "too many fields, skipped");
                skipped += 1;
            }
            Err(e) => {
                debug!(record = idx, error = %e, "malformed record, skipped");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, "skipped malformed rows");
    }

    Ok(RawTable::from_rows(headers, rows))
}

/// Pick the delimiter whose non-zero per-line count is most consistent over
/// the first lines. Ties go to the larger count, then to candidate order.
pub fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best: Option<((usize, usize), u8)> = None;
    for d in DELIMITERS {
        let mut freq: BTreeMap<usize, usize> = BTreeMap::new();
        for line in &lines {
            let n = count_unquoted(line, d);
            if n > 0 {
                *freq.entry(n).or_default() += 1;
            }
        }
        let Some((modal, lines_at_modal)) = freq
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        else {
            continue;
        };
        let score = (lines_at_modal, modal);
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, d));
        }
    }
    best.map(|(_, d)| d).unwrap_or(b',')
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut n = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_semicolons_with_decimal_commas() {
        let text = "nil;anno;totale\nBrera;2020;12,5\nDuomo;2021;3,25\n";
        assert_eq!(sniff_delimiter(text), b';');
    }

    #[test]
    fn sniffs_tabs_and_ignores_quoted_commas() {
        let text = "a\tb\n\"x, y\"\t1\n\"z, w\"\t2\n";
        assert_eq!(sniff_delimiter(text), b'\t');
        assert_eq!(sniff_delimiter("single\nvalue\n"), b',');
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() -> anyhow::Result<()> {
        let text = "a,b\n1,2\n3,4,5\n6\n";
        let t = parse_delimited(text)?;
        assert_eq!(t.num_rows, 2);
        assert_eq!(t.columns[0].cells, vec![Some("1".to_string()), Some("6".to_string())]);
        assert_eq!(t.columns[1].cells, vec![Some("2".to_string()), None]);
        Ok(())
    }

    #[test]
    fn encoding_fallbacks() -> anyhow::Result<()> {
        // "Città" in latin-1
        let latin = b"nome;valore\nCitt\xe0;1\n";
        let t = read_delimited_bytes(latin)?;
        assert_eq!(t.columns[0].cells[0].as_deref(), Some("Città"));

        let bom = b"\xEF\xBB\xBFnil,anno\nBrera,2020\n";
        assert_eq!(TextEncoding::Utf8.decode(bom), None);
        let t = read_delimited_bytes(bom)?;
        assert_eq!(t.headers(), vec!["nil", "anno"]);
        Ok(())
    }

    #[test]
    fn empty_input_is_an_empty_error() {
        assert!(matches!(read_delimited_bytes(b""), Err(LoadError::Empty(_))));
        assert!(matches!(read_delimited_bytes(b" , \n1,2\n"), Err(LoadError::Empty(_))));
    }

    #[test]
    fn invalid_utf8_falls_through_to_single_byte_encodings() -> anyhow::Result<()> {
        // 0x81 is undefined in cp1252 but latin-1 takes any byte
        let t = read_delimited_bytes(b"a,b\n\x81,2\n")?;
        assert_eq!(t.columns[0].cells[0].as_deref(), Some("\u{81}"));
        Ok(())
    }
}
