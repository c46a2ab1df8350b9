use std::path::PathBuf;
use thiserror::Error;

/// Why one artifact could not be turned into a staged table.
///
/// These never abort a batch: the catalog records the message and moves on.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("no encoding produced a readable table (last error: {0})")]
    Encoding(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty dataset: {0}")]
    Empty(String),

    #[error("arrow: {0}")]
    Arrow(String),
}
