// src/star/error.rs
use thiserror::Error;

/// Structural problems that abort a star-schema build.
#[derive(Debug, Error)]
pub enum StarError {
    #[error("boundaries table `{0}` not found in store")]
    MissingBoundaries(String),

    #[error("column `{column}` not found in `{table}`")]
    MissingColumn { table: String, column: String },
}
