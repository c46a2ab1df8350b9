// src/lib.rs
pub mod catalog;
pub mod config;
pub mod load;
pub mod pipeline;
pub mod process;
pub mod star;
pub mod store;
pub mod validate;
