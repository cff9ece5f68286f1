#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for ingesting PokeAPI entities into `DuckDB` tables.
//!
//! One run of [`sync_entity`] fetches every id in a range through a
//! [`RecordFetcher`], assembles the rows with a [`TableBuilder`], and
//! full-replaces the destination table.

pub mod builder;
pub mod config;

use std::sync::Arc;
use std::time::Instant;

use poke_etl_database::SinkError;
use poke_etl_database::table_sink::{TableSink, describe_schema};
use poke_etl_ingest_models::{AppConfig, SyncReport};
use poke_etl_source::SourceError;
use poke_etl_source::client::{EntityClient, HttpEntityClient};
use poke_etl_source::entity_def::EntityDefinition;
use poke_etl_source::fetcher::RecordFetcher;
use poke_etl_source::progress::ProgressCallback;
use poke_etl_source_models::{CellValue, IdRange, NormalizedRecord, SchemaError};

pub use builder::TableBuilder;
pub use config::ConfigError;

/// Environment variable listing entity ids for `sync-all`.
pub const ENTITIES_ENV: &str = "POKE_ETL_ENTITIES";

/// Errors that can occur during ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching or normalizing an entity failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Writing the table failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A record did not fit the table schema.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No entity definition has this id.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

/// Returns all configured entity definitions from the TOML registry.
#[must_use]
pub fn all_entities() -> Vec<EntityDefinition> {
    poke_etl_source::registry::all_entities()
}

/// Looks up an entity definition by id.
///
/// # Errors
///
/// Returns [`IngestError::UnknownEntity`] if no definition matches.
pub fn find_entity(id: &str) -> Result<EntityDefinition, IngestError> {
    poke_etl_source::registry::find_entity(id)
        .ok_or_else(|| IngestError::UnknownEntity(id.to_string()))
}

/// Returns the entities to sync, filtered by the `--entities` CLI flag or
/// the `POKE_ETL_ENTITIES` environment variable. If neither is set, all
/// entities are returned.
#[must_use]
pub fn enabled_entities(cli_filter: Option<String>) -> Vec<EntityDefinition> {
    let filter = cli_filter.or_else(|| std::env::var(ENTITIES_ENV).ok());
    filter_entities(all_entities(), filter.as_deref())
}

fn filter_entities(all: Vec<EntityDefinition>, filter: Option<&str>) -> Vec<EntityDefinition> {
    let Some(filter_str) = filter else {
        return all;
    };

    let ids: Vec<&str> = filter_str.split(',').map(str::trim).collect();

    let available = all.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    let filtered: Vec<EntityDefinition> = all
        .into_iter()
        .filter(|e| ids.contains(&e.id.as_str()))
        .collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching entities found for filter {ids:?}. Available: {}",
            available.join(", ")
        );
    }

    filtered
}

/// Creates the HTTP client described by `[api]`.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the client cannot be built.
pub fn http_client(config: &AppConfig) -> Result<Arc<dyn EntityClient>, IngestError> {
    let client = HttpEntityClient::new(&config::http_options(&config.api))?;
    Ok(Arc::new(client))
}

/// Renders a record as a JSON object keyed by column name, in column
/// order.
#[must_use]
pub fn record_json(record: &NormalizedRecord) -> serde_json::Value {
    let columns = record
        .cells
        .iter()
        .map(|cell| (cell.column.clone(), cell_json(&cell.value)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(columns)
}

fn cell_json(value: &CellValue) -> serde_json::Value {
    match value {
        CellValue::Null => serde_json::Value::Null,
        CellValue::Integer(n) => (*n).into(),
        CellValue::Bool(b) => (*b).into(),
        CellValue::Text(s) => s.as_str().into(),
        CellValue::TextList(items) => items
            .iter()
            .map(|s| serde_json::Value::from(s.as_str()))
            .collect(),
    }
}

/// Fetches every id in `range` for one entity and full-replaces its table.
///
/// Nothing is written if the build fails. Pass `sink = None` for a dry
/// run that builds the table but leaves storage untouched.
///
/// # Errors
///
/// Returns [`IngestError`] if the build fails under the configured failure
/// policy or the sink rejects the table.
#[allow(clippy::future_not_send)]
pub async fn sync_entity(
    config: &AppConfig,
    client: Arc<dyn EntityClient>,
    definition: EntityDefinition,
    range: IdRange,
    sink: Option<&dyn TableSink>,
    progress: Arc<dyn ProgressCallback>,
) -> Result<SyncReport, IngestError> {
    let start = Instant::now();
    let entity = definition.id.clone();
    log::info!("Syncing entity: {} ({entity})", definition.name);

    let fetcher = RecordFetcher::new(client, definition, config.ingest.slot_policy)?;
    let table_name = fetcher.schema().table.clone();
    let outcome = TableBuilder::new(fetcher, &config.ingest)
        .with_progress(progress)
        .build(range)
        .await?;

    let rows = match sink {
        Some(sink) => sink.replace(&outcome.table)?,
        None => {
            log::info!(
                "{entity}: dry run, not writing {} rows to {table_name} ({})",
                outcome.table.len(),
                describe_schema(outcome.table.schema())
            );
            u64::try_from(outcome.table.len()).unwrap_or(u64::MAX)
        }
    };

    let duration = start.elapsed();
    log::info!(
        "Sync complete for {entity}: {rows} rows into {table_name}, {} skipped, took {:.1}s",
        outcome.failures.len(),
        duration.as_secs_f64()
    );

    Ok(SyncReport {
        entity,
        table: table_name,
        range,
        rows,
        failures: outcome.failures,
        dry_run: sink.is_none(),
        duration,
    })
}
