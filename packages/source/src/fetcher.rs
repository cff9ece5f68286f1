//! Fetches one entity and normalizes it into a record.

use std::sync::Arc;

use poke_etl_source_models::{NormalizedRecord, SlotPolicy, TableSchema};

use crate::client::EntityClient;
use crate::entity_def::EntityDefinition;
use crate::{ParseError, SourceError};

/// Turns entity ids into [`NormalizedRecord`]s for one entity definition.
///
/// Cheap to clone; clones share the client and definition.
#[derive(Clone)]
pub struct RecordFetcher {
    client: Arc<dyn EntityClient>,
    definition: Arc<EntityDefinition>,
    schema: Arc<TableSchema>,
    slot_policy: SlotPolicy,
}

impl RecordFetcher {
    /// Creates a fetcher after validating the definition.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] if the definition is unusable.
    pub fn new(
        client: Arc<dyn EntityClient>,
        definition: EntityDefinition,
        slot_policy: SlotPolicy,
    ) -> Result<Self, SourceError> {
        definition.validate()?;
        let schema = definition
            .schema()
            .map_err(|e| SourceError::Definition {
                entity: definition.id.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            definition: Arc::new(definition),
            schema: Arc::new(schema),
            slot_policy,
        })
    }

    /// Returns the output table layout.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the entity definition.
    #[must_use]
    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    /// Fetches entity `id` and projects it into a record.
    ///
    /// The returned record always has `record.id == id` and one cell per
    /// schema column.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] if the body could not be retrieved and
    /// [`SourceError::Parse`] if it does not have the expected shape.
    pub async fn fetch(&self, id: u32) -> Result<NormalizedRecord, SourceError> {
        let body = self
            .client
            .get(&self.definition.resource, id)
            .await
            .map_err(|source| SourceError::Fetch { id, source })?;

        self.parse(id, &body)
            .map_err(|source| SourceError::Parse { id, source })
    }

    fn parse(&self, id: u32, body: &str) -> Result<NormalizedRecord, ParseError> {
        let raw: serde_json::Value = serde_json::from_str(body)?;
        let record = self.definition.normalize(&raw, id, self.slot_policy)?;
        log::trace!(
            "{} {id}: {} ({} columns)",
            self.definition.id,
            record.name,
            record.cells.len()
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use poke_etl_source_models::CellValue;

    use super::*;
    use crate::FetchError;
    use crate::client::MemoryEntityClient;
    use crate::registry::find_entity;

    fn bulbasaur() -> serde_json::Value {
        serde_json::from_str(include_str!("../fixtures/bulbasaur.json")).unwrap()
    }

    fn fetcher(client: MemoryEntityClient, entity: &str) -> RecordFetcher {
        RecordFetcher::new(
            Arc::new(client),
            find_entity(entity).unwrap(),
            SlotPolicy::Warn,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_bulbasaur_end_to_end() {
        let client = MemoryEntityClient::new().with_json("pokemon", 1, &bulbasaur());
        let fetcher = fetcher(client, "pokemon");

        let record = fetcher.fetch(1).await.unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.name, "bulbasaur");
        assert_eq!(record.get("height"), Some(&CellValue::Integer(7)));
        assert_eq!(record.get("weight"), Some(&CellValue::Integer(69)));
        assert_eq!(record.get("type_1").and_then(CellValue::as_str), Some("grass"));
        assert_eq!(record.get("type_2").and_then(CellValue::as_str), Some("poison"));
        assert_eq!(
            record.get("ability_1").and_then(CellValue::as_str),
            Some("overgrow")
        );
        assert_eq!(record.get("ability_2"), Some(&CellValue::Null));
        assert_eq!(
            record.get("hidden_ability").and_then(CellValue::as_str),
            Some("chlorophyll")
        );
        assert_eq!(
            record.get("hidden_ability_url").and_then(CellValue::as_str),
            Some("https://pokeapi.co/api/v2/ability/34/")
        );
        record.check_against(fetcher.schema()).unwrap();
    }

    #[tokio::test]
    async fn fetches_type_with_damage_list() {
        let body: serde_json::Value =
            serde_json::from_str(include_str!("../fixtures/type_fire.json")).unwrap();
        let client = MemoryEntityClient::new().with_json("type", 10, &body);
        let fetcher = fetcher(client, "type");

        let record = fetcher.fetch(10).await.unwrap();

        assert_eq!(record.name, "fire");
        assert_eq!(
            record.get("double_damage_to"),
            Some(&CellValue::TextList(vec![
                "bug".to_string(),
                "steel".to_string(),
                "grass".to_string(),
                "ice".to_string(),
            ]))
        );
    }

    #[tokio::test]
    async fn requests_the_definition_resource() {
        let client = Arc::new(MemoryEntityClient::new().with_json("pokemon", 1, &bulbasaur()));
        let fetcher = RecordFetcher::new(
            client.clone(),
            find_entity("pokemon").unwrap(),
            SlotPolicy::Warn,
        )
        .unwrap();

        fetcher.fetch(1).await.unwrap();

        assert_eq!(client.requests(), vec![("pokemon".to_string(), 1)]);
    }

    #[tokio::test]
    async fn missing_entity_is_a_fetch_error() {
        let fetcher = fetcher(MemoryEntityClient::new(), "pokemon");

        let err = fetcher.fetch(7).await.unwrap_err();

        assert_eq!(err.entity_id(), Some(7));
        assert!(matches!(
            err,
            SourceError::Fetch {
                source: FetchError::Status { status: 404, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let client = MemoryEntityClient::new().with_body("pokemon", 3, "{\"id\": 3,");
        let fetcher = fetcher(client, "pokemon");

        let err = fetcher.fetch(3).await.unwrap_err();

        assert!(matches!(
            err,
            SourceError::Parse {
                id: 3,
                source: ParseError::InvalidJson(_)
            }
        ));
    }

    #[tokio::test]
    async fn wrong_entity_in_body_is_rejected() {
        let client = MemoryEntityClient::new().with_json("pokemon", 2, &bulbasaur());
        let fetcher = fetcher(client, "pokemon");

        let err = fetcher.fetch(2).await.unwrap_err();

        assert!(matches!(
            err,
            SourceError::Parse {
                source: ParseError::IdMismatch {
                    requested: 2,
                    returned: 1
                },
                ..
            }
        ));
    }

    #[test]
    fn rejects_invalid_definition() {
        let mut definition = find_entity("pokemon").unwrap();
        definition.default_range.start = 0;

        let result = RecordFetcher::new(
            Arc::new(MemoryEntityClient::new()),
            definition,
            SlotPolicy::Warn,
        );

        assert!(matches!(result, Err(SourceError::Definition { .. })));
    }
}
