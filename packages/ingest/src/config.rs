//! Loads `poke_etl.toml` into an [`AppConfig`].
//!
//! A missing file means "all defaults". `POKE_ETL_DATABASE`, when set,
//! replaces `database.path`.

use std::path::{Path, PathBuf};

use poke_etl_ingest_models::{ApiConfig, AppConfig};
use poke_etl_source::client::HttpClientOptions;
use poke_etl_source::entity_def::EntityDefinition;
use poke_etl_source::retry::RetryPolicy;
use poke_etl_source_models::{IdRange, RangeError};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "poke_etl.toml";

/// Environment variable overriding `database.path`.
pub const DATABASE_ENV: &str = "POKE_ETL_DATABASE";

/// Errors raised while loading or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// An id range is unusable.
    #[error("Invalid range for {entity}: {source}")]
    InvalidRange {
        /// Entity definition id.
        entity: String,
        /// What is wrong with the range.
        #[source]
        source: RangeError,
    },

    /// A setting has an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reads and validates the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed, or a
/// setting is invalid.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(text) => parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No config at {}, using defaults", path.display());
            AppConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    apply_env_overrides(&mut config, std::env::var(DATABASE_ENV).ok());
    validate(&config)?;

    Ok(config)
}

/// Parses config TOML. Absent sections and keys take their defaults.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or has unknown keys.
pub fn parse(text: &str) -> Result<AppConfig, toml::de::Error> {
    toml::de::from_str(text)
}

/// Applies the `POKE_ETL_DATABASE` override.
pub fn apply_env_overrides(config: &mut AppConfig, database_path: Option<String>) {
    if let Some(path) = database_path.filter(|p| !p.is_empty()) {
        log::debug!("{DATABASE_ENV} overrides database.path with {path}");
        config.database.path = PathBuf::from(path);
    }
}

/// Checks settings that serde cannot.
///
/// # Errors
///
/// Returns [`ConfigError`] describing the first invalid setting.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.ingest.concurrency == 0 {
        return Err(ConfigError::Invalid(
            "ingest.concurrency must be at least 1".to_string(),
        ));
    }
    if config.api.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "api.timeout_secs must be at least 1".to_string(),
        ));
    }
    if config.database.schema.is_empty() {
        return Err(ConfigError::Invalid(
            "database.schema must not be empty".to_string(),
        ));
    }

    let known = poke_etl_source::registry::all_entities();
    for (entity, range) in &config.ranges {
        if !known.iter().any(|e| &e.id == entity) {
            return Err(ConfigError::Invalid(format!(
                "[ranges.{entity}] names no known entity"
            )));
        }
        range
            .validate()
            .map_err(|source| ConfigError::InvalidRange {
                entity: entity.clone(),
                source,
            })?;
    }

    Ok(())
}

/// Builds HTTP client options from `[api]`.
#[must_use]
pub fn http_options(api: &ApiConfig) -> HttpClientOptions {
    HttpClientOptions {
        base_url: api.base_url.clone(),
        user_agent: api.user_agent.clone(),
        timeout: api.timeout(),
        retry: RetryPolicy {
            max_retries: api.max_retries,
            base_delay: api.retry_base_delay(),
        },
    }
}

/// Resolves the id range for one run.
///
/// Precedence per bound: command line, then `[ranges.<entity>]`, then the
/// entity's built-in default.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRange`] if the resolved range is invalid.
pub fn range_for(
    config: &AppConfig,
    definition: &EntityDefinition,
    start: Option<u32>,
    end: Option<u32>,
) -> Result<IdRange, ConfigError> {
    let base = config
        .ranges
        .get(&definition.id)
        .copied()
        .unwrap_or(definition.default_range);

    IdRange::new(start.unwrap_or(base.start), end.unwrap_or(base.end)).map_err(|source| {
        ConfigError::InvalidRange {
            entity: definition.id.clone(),
            source,
        }
    })
}
