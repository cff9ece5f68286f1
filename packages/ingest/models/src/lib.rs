#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion configuration and result types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use poke_etl_source_models::{IdRange, SlotPolicy, Table};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default `DuckDB` file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/pokemon.duckdb";

/// Default target schema.
pub const DEFAULT_DB_SCHEMA: &str = "pokemon-schema";

/// Complete application configuration, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Upstream API settings.
    pub api: ApiConfig,
    /// Destination database settings.
    pub database: DatabaseConfig,
    /// Table build settings.
    pub ingest: IngestSettings,
    /// Per-entity id range overrides, keyed by entity id.
    pub ranges: BTreeMap<String, IdRange>,
}

/// Upstream API settings (`[api]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// API root, e.g. `https://pokeapi.co/api/v2`.
    pub base_url: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub retry_base_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pokeapi.co/api/v2".to_string(),
            user_agent: "poke-etl/0.1".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

impl ApiConfig {
    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the initial retry delay.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Destination database settings (`[database]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `DuckDB` file path.
    pub path: PathBuf,
    /// Schema holding the entity tables.
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            schema: DEFAULT_DB_SCHEMA.to_string(),
        }
    }
}

/// What the table builder does when one entity fails.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the build and return the error. Nothing is written.
    #[default]
    Abort,
    /// Log the failure, omit the row, and keep going.
    Skip,
}

/// Table build settings (`[ingest]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    /// Maximum in-flight requests. `1` is strictly sequential.
    pub concurrency: usize,
    /// Per-entity failure handling.
    pub on_error: FailurePolicy,
    /// Handling of list elements that find no slot.
    pub slot_policy: SlotPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            on_error: FailurePolicy::default(),
            slot_policy: SlotPolicy::default(),
        }
    }
}

/// An entity id that was skipped during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailure {
    /// Entity id.
    pub id: u32,
    /// Rendered error.
    pub error: String,
}

/// Result of building one table.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Rows in ascending id order.
    pub table: Table,
    /// Ids omitted under [`FailurePolicy::Skip`], in ascending order.
    pub failures: Vec<BuildFailure>,
    /// Wall-clock build time.
    pub duration: Duration,
}

/// Result of one `sync` of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Entity definition id.
    pub entity: String,
    /// Destination table.
    pub table: String,
    /// Ids requested.
    pub range: IdRange,
    /// Rows written to the sink (rows built, for a dry run).
    pub rows: u64,
    /// Ids skipped under [`FailurePolicy::Skip`].
    pub failures: Vec<BuildFailure>,
    /// Whether the sink was left untouched.
    pub dry_run: bool,
    /// Wall-clock time for build and write.
    pub duration: Duration,
}
