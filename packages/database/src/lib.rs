#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for ingested entity tables.
//!
//! Each run hands a complete [`poke_etl_source_models::Table`] to a
//! [`table_sink::TableSink`], which replaces the destination relation in a
//! single transaction.

pub mod paths;
pub mod table_sink;

use poke_etl_source_models::SchemaError;

/// Errors that can occur while writing tables.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row does not fit the table schema.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}
