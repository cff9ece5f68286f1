#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the PokeAPI ingestion tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poke_etl_cli_utils::{BuildBar, DEFAULT_LOG_FILTER, EntitiesBar};
use poke_etl_database::table_sink::{DuckDbSink, TableSink};
use poke_etl_ingest::config::{self, DEFAULT_CONFIG_PATH};
use poke_etl_ingest::{
    all_entities, enabled_entities, find_entity, http_client, record_json, sync_entity,
};
use poke_etl_source::entity_def::EntityDefinition;
use poke_etl_source::fetcher::RecordFetcher;

#[derive(Parser)]
#[command(name = "poke_etl_ingest", about = "PokeAPI ingestion tool")]
struct Cli {
    /// Path to the TOML config file (missing file means defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all configured entity definitions
    Entities,
    /// Fetch one entity and print its normalized record as JSON
    Show {
        /// Entity identifier (e.g., "pokemon")
        entity: String,
        /// Remote id
        id: u32,
    },
    /// Build and full-replace one entity table
    Sync {
        /// Entity identifier (e.g., "pokemon")
        entity: String,
        /// First id (inclusive). Defaults to the configured range.
        #[arg(long)]
        start: Option<u32>,
        /// Last id (exclusive). Defaults to the configured range.
        #[arg(long)]
        end: Option<u32>,
        /// Build the table but do not write it
        #[arg(long)]
        dry_run: bool,
    },
    /// Sync every configured entity
    SyncAll {
        /// Comma-separated list of entity IDs to sync (overrides `POKE_ETL_ENTITIES` env var)
        #[arg(long)]
        entities: Option<String>,
        /// Build the tables but do not write them
        #[arg(long)]
        dry_run: bool,
    },
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = poke_etl_cli_utils::init_logger(DEFAULT_LOG_FILTER);
    let cli = Cli::parse();
    let config = config::load(&cli.config)?;

    match cli.command {
        Commands::Entities => {
            let entities = all_entities();
            println!("{:<10} {:<10} {:<12} NAME", "ID", "TABLE", "RANGE");
            println!("{}", "-".repeat(50));
            for entity in &entities {
                let range = config::range_for(&config, entity, None, None)?;
                println!(
                    "{:<10} {:<10} {:<12} {}",
                    entity.id(),
                    entity.table,
                    range.to_string(),
                    entity.name()
                );
            }
        }
        Commands::Show { entity, id } => {
            let definition = find_entity(&entity)?;
            let fetcher =
                RecordFetcher::new(http_client(&config)?, definition, config.ingest.slot_policy)?;
            let record = fetcher.fetch(id).await?;
            println!("{}", serde_json::to_string_pretty(&record_json(&record))?);
        }
        Commands::Sync {
            entity,
            start,
            end,
            dry_run,
        } => {
            let definition = find_entity(&entity)?;
            let range = config::range_for(&config, &definition, start, end)?;
            let sink = open_sink(&config, dry_run)?;
            let progress = BuildBar::new(&multi, definition.name());

            sync_entity(
                &config,
                http_client(&config)?,
                definition,
                range,
                sink.as_ref().map(|s| s as &dyn TableSink),
                progress,
            )
            .await?;
        }
        Commands::SyncAll { entities, dry_run } => {
            let entities = enabled_entities(entities);
            log::info!(
                "Syncing {} entit{}: {}",
                entities.len(),
                if entities.len() == 1 { "y" } else { "ies" },
                entities
                    .iter()
                    .map(EntityDefinition::id)
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let client = http_client(&config)?;
            let sink = open_sink(&config, dry_run)?;
            let steps = EntitiesBar::new(&multi, entities.len());
            let mut failed = Vec::new();

            for definition in entities {
                let id = definition.id.clone();
                let result = match config::range_for(&config, &definition, None, None) {
                    Ok(range) => {
                        let progress = BuildBar::new(&multi, definition.name());
                        sync_entity(
                            &config,
                            client.clone(),
                            definition,
                            range,
                            sink.as_ref().map(|s| s as &dyn TableSink),
                            progress,
                        )
                        .await
                        .map(|_| ())
                    }
                    Err(e) => Err(e.into()),
                };

                steps.synced(&id, result.is_ok());
                if let Err(e) = result {
                    log::error!("Failed to sync {id}: {e}");
                    failed.push(id);
                }
            }

            steps.finish(&failed);

            if !failed.is_empty() {
                return Err(format!("Failed to sync: {}", failed.join(", ")).into());
            }
        }
    }

    Ok(())
}

/// Opens the configured database, or `None` for a dry run.
fn open_sink(
    config: &poke_etl_ingest_models::AppConfig,
    dry_run: bool,
) -> Result<Option<DuckDbSink>, poke_etl_database::SinkError> {
    if dry_run {
        log::info!("Dry run: {} will not be modified", config.database.path.display());
        return Ok(None);
    }
    DuckDbSink::open(&config.database.path, &config.database.schema).map(Some)
}
