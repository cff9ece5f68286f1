//! Entity registry: loads all entity definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/entities/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a new entity kind is as
//! simple as creating a new TOML file and adding it to the list below.

use crate::entity_def::{EntityDefinition, parse_entity_toml};

/// TOML configs embedded at compile time.
const ENTITY_TOMLS: &[(&str, &str)] = &[
    ("pokemon", include_str!("../entities/pokemon.toml")),
    ("type", include_str!("../entities/type.toml")),
];

/// Total number of configured entities (used in tests).
#[cfg(test)]
const EXPECTED_ENTITY_COUNT: usize = 2;

/// Returns all configured entity definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_entities() -> Vec<EntityDefinition> {
    ENTITY_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_entity_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up one entity definition by id.
#[must_use]
pub fn find_entity(id: &str) -> Option<EntityDefinition> {
    all_entities().into_iter().find(|e| e.id == id)
}
