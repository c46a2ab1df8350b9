// src/process/mod.rs
//! Raw cell text to typed Arrow columns: naming, trimming, inference and
//! conversion.

pub mod clean;
pub mod convert;
pub mod date_parser;
pub mod infer;
pub mod names;
pub mod numeric;
pub mod raw_table;
pub mod scalar;
pub mod schema;
pub mod trimming;
pub mod utils;
pub mod year;
