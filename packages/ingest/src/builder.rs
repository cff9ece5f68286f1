//! Builds a complete table by fetching every id in a range.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt as _;
use poke_etl_ingest_models::{BuildFailure, BuildOutcome, FailurePolicy, IngestSettings};
use poke_etl_source::fetcher::RecordFetcher;
use poke_etl_source::progress::{IdOutcome, ProgressCallback, null_progress};
use poke_etl_source_models::{IdRange, Table};

use crate::IngestError;
use crate::config::ConfigError;

/// Fetches an id range into one [`Table`].
pub struct TableBuilder {
    fetcher: RecordFetcher,
    concurrency: usize,
    on_error: FailurePolicy,
    progress: Arc<dyn ProgressCallback>,
}

impl TableBuilder {
    /// Creates a builder using the `[ingest]` settings.
    #[must_use]
    pub fn new(fetcher: RecordFetcher, settings: &IngestSettings) -> Self {
        Self {
            fetcher,
            concurrency: settings.concurrency.max(1),
            on_error: settings.on_error,
            progress: null_progress(),
        }
    }

    /// Reports per-id progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetches ids `range.start..range.end` and assembles the rows in
    /// ascending id order.
    ///
    /// With `concurrency > 1` up to that many requests are in flight, but
    /// rows are still appended in id order.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the range is invalid, or on the first
    /// failed id under [`FailurePolicy::Abort`].
    pub async fn build(&self, range: IdRange) -> Result<BuildOutcome, IngestError> {
        let entity = &self.fetcher.definition().id;

        range
            .validate()
            .map_err(|source| ConfigError::InvalidRange {
                entity: entity.clone(),
                source,
            })?;

        let start = Instant::now();
        let mut table = Table::new(self.fetcher.schema().clone());
        let mut failures = Vec::new();

        log::info!(
            "{entity}: fetching ids {range} ({} ids, concurrency {})",
            range.len(),
            self.concurrency
        );
        self.progress.begin(entity, range);

        let mut results = futures::stream::iter(range.ids())
            .map(|id| async move { (id, self.fetcher.fetch(id).await) })
            .buffered(self.concurrency);

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(record) => {
                    table.push(record)?;
                    self.progress.settled(id, IdOutcome::Row);
                }
                Err(e) => match self.on_error {
                    FailurePolicy::Abort => {
                        self.progress.finish(Some(id));
                        return Err(e.into());
                    }
                    FailurePolicy::Skip => {
                        log::warn!("{entity}: skipping id {id}: {e}");
                        failures.push(BuildFailure {
                            id,
                            error: e.to_string(),
                        });
                        self.progress.settled(id, IdOutcome::Skipped);
                    }
                },
            }
        }

        let duration = start.elapsed();
        self.progress.finish(None);
        log::info!(
            "{entity}: built {} rows ({} skipped) in {:.1}s",
            table.len(),
            failures.len(),
            duration.as_secs_f64()
        );

        Ok(BuildOutcome {
            table,
            failures,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use poke_etl_source::client::{EntityClient, MemoryEntityClient};
    use poke_etl_source::registry::find_entity;
    use poke_etl_source::{FetchError, SourceError};
    use poke_etl_source_models::{CellValue, SlotPolicy};

    use super::*;

    fn pokemon_body(id: u32) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("mon{id}"),
            "height": id * 2,
            "weight": id * 10,
            "types": [{"slot": 1, "type": {"name": "normal"}}],
            "abilities": [
                {"ability": {"name": "run-away"}, "is_hidden": false, "slot": 1}
            ]
        })
    }

    fn client_with(ids: impl IntoIterator<Item = u32>) -> MemoryEntityClient {
        ids.into_iter().fold(MemoryEntityClient::new(), |client, id| {
            client.with_json("pokemon", id, &pokemon_body(id))
        })
    }

    fn builder(client: Arc<dyn EntityClient>, settings: &IngestSettings) -> TableBuilder {
        let fetcher =
            RecordFetcher::new(client, find_entity("pokemon").unwrap(), SlotPolicy::Warn).unwrap();
        TableBuilder::new(fetcher, settings)
    }

    fn range(start: u32, end: u32) -> IdRange {
        IdRange::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn builds_rows_in_ascending_id_order() {
        let builder = builder(Arc::new(client_with(1..=5)), &IngestSettings::default());

        let outcome = builder.build(range(2, 5)).await.unwrap();

        assert_eq!(outcome.table.ids(), vec![2, 3, 4]);
        assert!(outcome.failures.is_empty());
        let second = &outcome.table.rows()[1];
        assert_eq!(second.get("name").and_then(CellValue::as_str), Some("mon3"));
        assert_eq!(second.get("type_2"), Some(&CellValue::Null));
    }

    #[tokio::test]
    async fn empty_range_keeps_full_schema() {
        let client = Arc::new(MemoryEntityClient::new());
        let builder = builder(client.clone(), &IngestSettings::default());

        let outcome = builder.build(range(7, 7)).await.unwrap();

        assert!(outcome.table.is_empty());
        assert_eq!(outcome.table.schema().len(), 13);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn rebuilding_unchanged_source_is_idempotent() {
        let builder = builder(Arc::new(client_with(1..=3)), &IngestSettings::default());

        let first = builder.build(range(1, 4)).await.unwrap();
        let second = builder.build(range(1, 4)).await.unwrap();

        assert_eq!(first.table, second.table);
    }

    #[tokio::test]
    async fn abort_returns_first_failure() {
        let client = Arc::new(client_with([1, 3]));
        let builder = builder(client.clone(), &IngestSettings::default());

        let err = builder.build(range(1, 4)).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Source(SourceError::Fetch {
                id: 2,
                source: FetchError::Status { status: 404, .. }
            })
        ));
        assert_eq!(
            client.requests(),
            vec![("pokemon".to_string(), 1), ("pokemon".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn skip_omits_failed_rows() {
        let settings = IngestSettings {
            on_error: FailurePolicy::Skip,
            ..IngestSettings::default()
        };
        let builder = builder(Arc::new(client_with([1, 3])), &settings);

        let outcome = builder.build(range(1, 4)).await.unwrap();

        assert_eq!(outcome.table.ids(), vec![1, 3]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, 2);
        assert!(outcome.failures[0].error.contains("404"));
    }

    /// Answers later ids sooner, so unordered collection would reverse rows.
    struct ReversedLatencyClient(MemoryEntityClient);

    #[async_trait]
    impl EntityClient for ReversedLatencyClient {
        async fn get(&self, resource: &str, id: u32) -> Result<String, FetchError> {
            tokio::time::sleep(Duration::from_millis(u64::from(20 - id) * 2)).await;
            self.0.get(resource, id).await
        }
    }

    #[tokio::test]
    async fn concurrent_build_preserves_id_order() {
        let settings = IngestSettings {
            concurrency: 4,
            ..IngestSettings::default()
        };
        let client = Arc::new(ReversedLatencyClient(client_with(1..=10)));
        let builder = builder(client, &settings);

        let outcome = builder.build(range(1, 11)).await.unwrap();

        assert_eq!(outcome.table.ids(), (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn concurrent_and_sequential_builds_match() {
        let client: Arc<dyn EntityClient> = Arc::new(client_with(1..=8));
        let sequential = builder(client.clone(), &IngestSettings::default());
        let concurrent = builder(
            client,
            &IngestSettings {
                concurrency: 3,
                ..IngestSettings::default()
            },
        );

        let a = sequential.build(range(1, 9)).await.unwrap();
        let b = concurrent.build(range(1, 9)).await.unwrap();

        assert_eq!(a.table, b.table);
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Begin(String, IdRange),
        Settled(u32, IdOutcome),
        Finish(Option<u32>),
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<Event>>);

    impl RecordingProgress {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl ProgressCallback for RecordingProgress {
        fn begin(&self, entity: &str, range: IdRange) {
            self.0
                .lock()
                .unwrap()
                .push(Event::Begin(entity.to_string(), range));
        }

        fn settled(&self, id: u32, outcome: IdOutcome) {
            self.0.lock().unwrap().push(Event::Settled(id, outcome));
        }

        fn finish(&self, failed_at: Option<u32>) {
            self.0.lock().unwrap().push(Event::Finish(failed_at));
        }
    }

    #[tokio::test]
    async fn reports_each_id_as_it_settles() {
        let progress = Arc::new(RecordingProgress::default());
        let settings = IngestSettings {
            on_error: FailurePolicy::Skip,
            ..IngestSettings::default()
        };
        let builder = builder(Arc::new(client_with([1, 3])), &settings)
            .with_progress(progress.clone());

        builder.build(range(1, 4)).await.unwrap();

        assert_eq!(
            progress.take(),
            vec![
                Event::Begin("pokemon".to_string(), range(1, 4)),
                Event::Settled(1, IdOutcome::Row),
                Event::Settled(2, IdOutcome::Skipped),
                Event::Settled(3, IdOutcome::Row),
                Event::Finish(None),
            ]
        );
    }

    #[tokio::test]
    async fn reports_the_id_that_aborted() {
        let progress = Arc::new(RecordingProgress::default());
        let builder = builder(Arc::new(client_with([1, 3])), &IngestSettings::default())
            .with_progress(progress.clone());

        builder.build(range(1, 4)).await.unwrap_err();

        assert_eq!(
            progress.take(),
            vec![
                Event::Begin("pokemon".to_string(), range(1, 4)),
                Event::Settled(1, IdOutcome::Row),
                Event::Finish(Some(2)),
            ]
        );
    }

    #[tokio::test]
    async fn rejects_invalid_range() {
        let builder = builder(Arc::new(MemoryEntityClient::new()), &IngestSettings::default());

        let err = builder
            .build(IdRange { start: 5, end: 2 })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Config(ConfigError::InvalidRange { .. })
        ));
    }
}
