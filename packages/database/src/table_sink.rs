//! Full-replace table storage in `DuckDB`.
//!
//! Each entity table lives at `"{schema}"."{table}"` in a single `DuckDB`
//! file. Every write drops and recreates the relation with the exact
//! column layout of the incoming [`Table`], then inserts all rows. A
//! `_meta` table in the same schema tracks row counts and sync times per
//! table.

use std::path::Path;

use duckdb::Connection;
use poke_etl_source_models::{CellValue, ColumnKind, NormalizedRecord, Table, TableSchema};

use crate::SinkError;

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 1_000;

/// Name of the per-schema metadata table.
const META_TABLE: &str = "_meta";

/// Destination for complete entity tables.
pub trait TableSink {
    /// Replaces the stored table with `table`. Prior contents are
    /// discarded; on error the prior contents are left untouched.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if any row does not fit the schema or the
    /// write fails.
    fn replace(&self, table: &Table) -> Result<u64, SinkError>;
}

/// Wraps an identifier in double quotes, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps a column kind to its `DuckDB` type.
const fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Text => "VARCHAR",
        ColumnKind::Bool => "BOOLEAN",
        ColumnKind::TextList => "VARCHAR[]",
    }
}

/// `DuckDB` sink writing into one named schema.
pub struct DuckDbSink {
    conn: Connection,
    schema: String,
}

impl DuckDbSink {
    /// Opens (or creates) the database file and ensures the schema and
    /// metadata table exist.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the directory, connection, or schema
    /// creation fails.
    pub fn open(path: &Path, schema: &str) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn, schema)
    }

    /// Opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the connection or schema creation fails.
    pub fn in_memory(schema: &str) -> Result<Self, SinkError> {
        Self::with_connection(Connection::open_in_memory()?, schema)
    }

    fn with_connection(conn: Connection, schema: &str) -> Result<Self, SinkError> {
        let sink = Self {
            conn,
            schema: schema.to_string(),
        };
        sink.create_schema()?;
        Ok(sink)
    }

    fn create_schema(&self) -> Result<(), SinkError> {
        let schema = quote_ident(&self.schema);
        self.conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};

            CREATE TABLE IF NOT EXISTS {schema}.{meta} (
                table_name TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (table_name, key)
            );",
            meta = quote_ident(META_TABLE),
        ))?;
        Ok(())
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the target schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// Returns the number of rows stored in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the query fails (including when the table
    /// does not exist).
    pub fn row_count(&self, table: &str) -> Result<u64, SinkError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM {}", self.qualified(table)))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Returns the column names of `table` in declaration order. Empty if
    /// the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the query fails.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, SinkError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )?;
        let rows = stmt.query_map(duckdb::params![self.schema, table], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    /// Gets a metadata value recorded for `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the query fails.
    pub fn get_meta(&self, table: &str, key: &str) -> Result<Option<String>, SinkError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT value FROM {} WHERE table_name = ? AND key = ?",
            self.qualified(META_TABLE)
        ))?;
        match stmt.query_row(duckdb::params![table, key], |row| row.get(0)) {
            Ok(v) => Ok(Some(v)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SinkError::DuckDb(e)),
        }
    }

    fn set_meta(&self, table: &str, key: &str, value: &str) -> Result<(), SinkError> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (table_name, key, value) VALUES (?, ?, ?)
                 ON CONFLICT (table_name, key) DO UPDATE SET value = EXCLUDED.value",
                self.qualified(META_TABLE)
            ),
            duckdb::params![table, key, value],
        )?;
        Ok(())
    }

    fn create_table(&self, schema: &TableSchema) -> Result<(), SinkError> {
        let columns = schema
            .columns()
            .iter()
            .map(|c| {
                let not_null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{not_null}", quote_ident(&c.name), sql_type(c.kind))
            })
            .collect::<Vec<_>>()
            .join(", ");

        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {} ({columns})",
            self.qualified(&schema.table)
        ))?;
        Ok(())
    }

    fn insert_rows(
        &self,
        schema: &TableSchema,
        rows: &[NormalizedRecord],
    ) -> Result<u64, SinkError> {
        let column_list = schema
            .column_names()
            .into_iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");

        let mut total_inserted = 0u64;

        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut sql = format!(
                "INSERT INTO {} ({column_list}) VALUES ",
                self.qualified(&schema.table)
            );

            for (i, record) in chunk.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('(');
                for (j, cell) in record.cells.iter().enumerate() {
                    if j > 0 {
                        sql.push_str(", ");
                    }
                    push_placeholder(&mut sql, &cell.value);
                }
                sql.push(')');
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mut param_idx = 1usize;

            for record in chunk {
                for cell in &record.cells {
                    match &cell.value {
                        CellValue::Null => {
                            stmt.raw_bind_parameter(param_idx, Option::<&str>::None)?;
                            param_idx += 1;
                        }
                        CellValue::Integer(n) => {
                            stmt.raw_bind_parameter(param_idx, *n)?;
                            param_idx += 1;
                        }
                        CellValue::Bool(b) => {
                            stmt.raw_bind_parameter(param_idx, *b)?;
                            param_idx += 1;
                        }
                        CellValue::Text(s) => {
                            stmt.raw_bind_parameter(param_idx, s.as_str())?;
                            param_idx += 1;
                        }
                        CellValue::TextList(items) => {
                            for item in items {
                                stmt.raw_bind_parameter(param_idx, item.as_str())?;
                                param_idx += 1;
                            }
                        }
                    }
                }
            }

            let rows = stmt.raw_execute()?;
            total_inserted += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total_inserted)
    }

    fn write(&self, table: &Table) -> Result<u64, SinkError> {
        let schema = table.schema();
        self.create_table(schema)?;
        let inserted = self.insert_rows(schema, table.rows())?;

        self.set_meta(&schema.table, "row_count", &inserted.to_string())?;
        self.set_meta(
            &schema.table,
            "last_synced_at",
            &chrono::Utc::now().to_rfc3339(),
        )?;

        Ok(inserted)
    }
}

/// Appends the value placeholder for one cell. Lists expand to one
/// parameter per element.
fn push_placeholder(sql: &mut String, value: &CellValue) {
    match value {
        CellValue::TextList(items) if items.is_empty() => sql.push_str("[]::VARCHAR[]"),
        CellValue::TextList(items) => {
            sql.push_str("list_value(");
            for i in 0..items.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str("?::VARCHAR");
            }
            sql.push(')');
        }
        _ => sql.push('?'),
    }
}

impl TableSink for DuckDbSink {
    fn replace(&self, table: &Table) -> Result<u64, SinkError> {
        // Rows are checked on `Table::push`; re-check in case the table was
        // deserialized from elsewhere.
        for row in table.rows() {
            row.check_against(table.schema())?;
        }

        self.conn.execute_batch("BEGIN TRANSACTION")?;

        match self.write(table) {
            Ok(inserted) => {
                self.conn.execute_batch("COMMIT")?;
                log::info!(
                    "Replaced {}.{} with {inserted} rows",
                    self.schema,
                    table.schema().table
                );
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::error!("Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

/// Renders a schema as the column list used in `CREATE TABLE`, for logging.
#[must_use]
pub fn describe_schema(schema: &TableSchema) -> String {
    schema
        .columns()
        .iter()
        .map(|c| {
            let not_null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{not_null}", c.name, sql_type(c.kind))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use poke_etl_source_models::{Cell, ColumnDef};

    use super::*;

    const SCHEMA: &str = "pokemon-schema";

    fn types_schema() -> TableSchema {
        TableSchema::new(
            "types",
            vec![
                ColumnDef::new("type_id", ColumnKind::Integer, false),
                ColumnDef::new("name", ColumnKind::Text, false),
                ColumnDef::new("is_legacy", ColumnKind::Bool, true),
                ColumnDef::new("double_damage_to", ColumnKind::TextList, false),
            ],
        )
        .unwrap()
    }

    fn type_row(id: i64, name: &str, targets: &[&str]) -> NormalizedRecord {
        NormalizedRecord {
            id,
            name: name.to_string(),
            cells: vec![
                Cell {
                    column: "type_id".to_string(),
                    value: CellValue::Integer(id),
                },
                Cell {
                    column: "name".to_string(),
                    value: CellValue::Text(name.to_string()),
                },
                Cell {
                    column: "is_legacy".to_string(),
                    value: CellValue::Null,
                },
                Cell {
                    column: "double_damage_to".to_string(),
                    value: CellValue::TextList(targets.iter().map(|s| (*s).to_string()).collect()),
                },
            ],
        }
    }

    fn table(rows: Vec<NormalizedRecord>) -> Table {
        let mut table = Table::new(types_schema());
        for row in rows {
            table.push(row).unwrap();
        }
        table
    }

    fn names(sink: &DuckDbSink) -> Vec<String> {
        let mut stmt = sink
            .connection()
            .prepare("SELECT name FROM \"pokemon-schema\".\"types\" ORDER BY type_id")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn writes_rows_with_lists_and_nulls() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        let inserted = sink
            .replace(&table(vec![
                type_row(10, "fire", &["grass", "ice"]),
                type_row(1, "normal", &[]),
            ]))
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(sink.row_count("types").unwrap(), 2);

        let mut stmt = sink
            .connection()
            .prepare(
                "SELECT array_to_string(double_damage_to, ','), len(double_damage_to), is_legacy IS NULL
                 FROM \"pokemon-schema\".\"types\" ORDER BY type_id",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![
                (String::new(), 0, true),
                ("grass,ice".to_string(), 2, true),
            ]
        );
    }

    #[test]
    fn second_replace_discards_first_rows() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        sink.replace(&table(vec![
            type_row(1, "normal", &[]),
            type_row(2, "fighting", &["normal"]),
        ]))
        .unwrap();
        sink.replace(&table(vec![type_row(10, "fire", &["grass"])]))
            .unwrap();

        assert_eq!(names(&sink), vec!["fire".to_string()]);
        assert_eq!(sink.get_meta("types", "row_count").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn empty_table_still_creates_all_columns() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        sink.replace(&table(Vec::new())).unwrap();

        assert_eq!(sink.row_count("types").unwrap(), 0);
        assert_eq!(
            sink.column_names("types").unwrap(),
            vec!["type_id", "name", "is_legacy", "double_damage_to"]
        );
    }

    #[test]
    fn records_sync_metadata() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        assert_eq!(sink.get_meta("types", "last_synced_at").unwrap(), None);

        sink.replace(&table(vec![type_row(1, "normal", &[])])).unwrap();

        let synced = sink.get_meta("types", "last_synced_at").unwrap().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&synced).is_ok());
    }

    #[test]
    fn writes_more_rows_than_one_chunk() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        let rows = (1..=2_500)
            .map(|id| type_row(id, &format!("t{id}"), &["x"]))
            .collect();

        assert_eq!(sink.replace(&table(rows)).unwrap(), 2_500);
        assert_eq!(sink.row_count("types").unwrap(), 2_500);
    }

    #[test]
    fn mismatched_row_leaves_previous_table() {
        let sink = DuckDbSink::in_memory(SCHEMA).unwrap();
        sink.replace(&table(vec![type_row(1, "normal", &[])])).unwrap();

        let bad: Table = serde_json::from_value(serde_json::json!({
            "schema": types_schema(),
            "rows": [{"id": 2, "name": "x", "cells": []}],
        }))
        .unwrap();

        assert!(matches!(sink.replace(&bad), Err(SinkError::Schema(_))));
        assert_eq!(names(&sink), vec!["normal".to_string()]);
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("pokemon-schema"), "\"pokemon-schema\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn describes_schema() {
        assert_eq!(
            describe_schema(&types_schema()),
            "type_id BIGINT NOT NULL, name VARCHAR NOT NULL, is_legacy BOOLEAN, double_damage_to VARCHAR[] NOT NULL"
        );
    }
}
