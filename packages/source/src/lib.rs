#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! PokeAPI entity definitions, HTTP fetching, and record normalization.
//!
//! Each entity kind (Pokémon, types) is described by an
//! [`entity_def::EntityDefinition`] loaded from embedded TOML. A single
//! generic [`fetcher::RecordFetcher`] turns one remote JSON entity into one
//! fixed-schema [`poke_etl_source_models::NormalizedRecord`].

pub mod client;
pub mod entity_def;
pub mod fetcher;
pub mod progress;
pub mod registry;
pub mod retry;

use poke_etl_source_models::SlotRole;

/// Transport-level failures while retrieving an entity.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transient failures persisted through every retry.
    #[error("HTTP {status} from {url} after {retries} retries")]
    RetriesExhausted {
        /// Requested URL.
        url: String,
        /// Last HTTP status code seen.
        status: u16,
        /// Number of retries attempted.
        retries: u32,
    },
}

impl FetchError {
    /// Returns the HTTP status code, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } | Self::RetriesExhausted { status, .. } => Some(*status),
        }
    }
}

/// The response body does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Body is not valid JSON.
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required field is absent or null.
    #[error("Missing field: {path}")]
    MissingField {
        /// Dot-separated path of the field.
        path: String,
    },

    /// A field holds a JSON value of the wrong type.
    #[error("Field {path} should be {expected}")]
    UnexpectedType {
        /// Dot-separated path of the field.
        path: String,
        /// Human-readable expected type.
        expected: String,
    },

    /// The returned entity is not the one requested.
    #[error("Requested id {requested}, response has id {returned}")]
    IdMismatch {
        /// Id that was requested.
        requested: u32,
        /// Id found in the body.
        returned: i64,
    },

    /// A list element matched no output slot.
    #[error("{list}[{index}] has no slot: {reason}")]
    UnassignedSlot {
        /// Path of the source list.
        list: String,
        /// Element index within the list.
        index: usize,
        /// Why no slot applied.
        reason: String,
    },

    /// Two list elements claimed the same role.
    #[error("{list}[{index}] claims slot {role}, which is already taken")]
    DuplicateSlot {
        /// Path of the source list.
        list: String,
        /// Element index within the list.
        index: usize,
        /// Contested role.
        role: SlotRole,
    },

    /// A template column has unbalanced braces.
    #[error("Malformed template: {template}")]
    MalformedTemplate {
        /// The template text.
        template: String,
    },
}

/// Errors that can occur while fetching and normalizing entities.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The entity could not be retrieved.
    #[error("Fetch failed for id {id}: {source}")]
    Fetch {
        /// Requested entity id.
        id: u32,
        /// Underlying transport error.
        #[source]
        source: FetchError,
    },

    /// The entity was retrieved but could not be normalized.
    #[error("Parse failed for id {id}: {source}")]
    Parse {
        /// Requested entity id.
        id: u32,
        /// Underlying shape error.
        #[source]
        source: ParseError,
    },

    /// An entity definition is unusable.
    #[error("Invalid entity definition {entity}: {message}")]
    Definition {
        /// Entity definition id.
        entity: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

impl SourceError {
    /// Returns the entity id this error concerns, if any.
    #[must_use]
    pub const fn entity_id(&self) -> Option<u32> {
        match self {
            Self::Fetch { id, .. } | Self::Parse { id, .. } => Some(*id),
            Self::Definition { .. } | Self::Client(_) => None,
        }
    }
}
