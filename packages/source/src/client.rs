//! Entity clients: where raw entity bodies come from.
//!
//! [`HttpEntityClient`] talks to the PokeAPI over HTTP. With the `testing`
//! feature, `MemoryEntityClient` serves canned bodies in its place.

#[cfg(any(test, feature = "testing"))]
use std::collections::BTreeMap;
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::retry::{self, RetryPolicy};
use crate::{FetchError, SourceError};

/// Default PokeAPI base URL.
pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "poke-etl/0.1";

/// Source of raw entity bodies.
#[async_trait]
pub trait EntityClient: Send + Sync {
    /// Returns the raw response body for `resource/id`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure or a non-success status.
    async fn get(&self, resource: &str, id: u32) -> Result<String, FetchError>;
}

/// Builds `{base_url}/{resource}/{id}`, tolerating a trailing slash on
/// the base URL.
#[must_use]
pub fn entity_url(base_url: &str, resource: &str, id: u32) -> String {
    format!("{}/{resource}/{id}", base_url.trim_end_matches('/'))
}

/// Settings for [`HttpEntityClient`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// API root, e.g. `https://pokeapi.co/api/v2`.
    pub base_url: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry settings for transient failures.
    pub retry: RetryPolicy,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// PokeAPI client over `reqwest`.
pub struct HttpEntityClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpEntityClient {
    /// Creates a client with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Client`] if the TLS backend or client
    /// configuration fails to initialize.
    pub fn new(options: &HttpClientOptions) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: options.base_url.clone(),
            retry: options.retry,
        })
    }
}

#[async_trait]
impl EntityClient for HttpEntityClient {
    async fn get(&self, resource: &str, id: u32) -> Result<String, FetchError> {
        let url = entity_url(&self.base_url, resource, id);
        log::debug!("GET {url}");
        retry::send_text(&self.retry, || self.client.get(&url)).await
    }
}

/// In-memory client keyed by `(resource, id)`.
///
/// Unknown keys answer like a 404. Every call is counted so callers can
/// check how often an entity was requested.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct MemoryEntityClient {
    bodies: BTreeMap<(String, u32), String>,
    requests: Mutex<Vec<(String, u32)>>,
}

#[cfg(any(test, feature = "testing"))]
impl MemoryEntityClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a JSON body for `resource/id`.
    #[must_use]
    pub fn with_json(mut self, resource: &str, id: u32, body: &serde_json::Value) -> Self {
        self.bodies
            .insert((resource.to_string(), id), body.to_string());
        self
    }

    /// Registers a raw (possibly malformed) body for `resource/id`.
    #[must_use]
    pub fn with_body(mut self, resource: &str, id: u32, body: &str) -> Self {
        self.bodies
            .insert((resource.to_string(), id), body.to_string());
        self
    }

    /// Returns every `(resource, id)` requested so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl EntityClient for MemoryEntityClient {
    async fn get(&self, resource: &str, id: u32) -> Result<String, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((resource.to_string(), id));
        }

        self.bodies
            .get(&(resource.to_string(), id))
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: format!("memory://{resource}/{id}"),
                status: 404,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_entity_url() {
        assert_eq!(
            entity_url("https://pokeapi.co/api/v2", "pokemon", 25),
            "https://pokeapi.co/api/v2/pokemon/25"
        );
        assert_eq!(
            entity_url("https://pokeapi.co/api/v2/", "type", 10),
            "https://pokeapi.co/api/v2/type/10"
        );
    }

    #[tokio::test]
    async fn memory_client_serves_registered_bodies() {
        let client = MemoryEntityClient::new().with_json(
            "pokemon",
            1,
            &serde_json::json!({"id": 1, "name": "bulbasaur"}),
        );

        let body = client.get("pokemon", 1).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["name"], "bulbasaur");

        let err = client.get("pokemon", 2).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            client.requests(),
            vec![("pokemon".to_string(), 1), ("pokemon".to_string(), 2)]
        );
    }
}
