#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Column, record, and table types for normalized entity rows.
//!
//! Every entity definition (Pokémon, types, ...) produces
//! [`NormalizedRecord`]s whose cells line up one-to-one with a
//! [`TableSchema`]. Absent values are stored as [`CellValue::Null`] rather
//! than omitted, so positional column alignment always holds.

pub mod range;
pub mod slots;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use range::{IdRange, RangeError};
pub use slots::{PositionalSlots, RoleSlots, SlotPolicy, SlotRole};

/// Errors raised when a record does not fit a table schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two columns share a name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A column has an empty name.
    #[error("Column name must not be empty")]
    EmptyColumnName,

    /// The record's columns differ from the schema's columns.
    #[error("Record {id} has columns {actual:?}, expected {expected:?}")]
    ColumnMismatch {
        /// Record identifier.
        id: i64,
        /// Column names in schema order.
        expected: Vec<String>,
        /// Column names found on the record.
        actual: Vec<String>,
    },

    /// A cell holds a value of the wrong kind.
    #[error("Record {id}: column {column} expects {expected}, got {actual}")]
    KindMismatch {
        /// Record identifier.
        id: i64,
        /// Column name.
        column: String,
        /// Declared column kind.
        expected: ColumnKind,
        /// Kind of the value found.
        actual: ColumnKind,
    },

    /// A non-nullable column holds a null.
    #[error("Record {id}: column {column} is not nullable")]
    UnexpectedNull {
        /// Record identifier.
        id: i64,
        /// Column name.
        column: String,
    },
}

/// The storage kind of a column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Boolean flag.
    Bool,
    /// Ordered list of text values.
    TextList,
}

/// A single cell value.
///
/// Serializes untagged, so a record renders as plain JSON
/// (`null`, `7`, `"grass"`, `["fire"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Explicit absent marker.
    Null,
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
    /// List of text values.
    TextList(Vec<String>),
}

impl CellValue {
    /// Returns the kind of this value, or `None` for [`CellValue::Null`].
    #[must_use]
    pub const fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Bool(_) => Some(ColumnKind::Bool),
            Self::Text(_) => Some(ColumnKind::Text),
            Self::TextList(_) => Some(ColumnKind::TextList),
        }
    }

    /// Returns `true` for the absent marker.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this is a text cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer cell.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// Definition of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as written to the sink.
    pub name: String,
    /// Storage kind.
    pub kind: ColumnKind,
    /// Whether the column accepts [`CellValue::Null`].
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

/// Ordered column layout of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Destination relation name (e.g., `"pokemon"`).
    pub table: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Creates a schema, validating that column names are non-empty and
    /// unique.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on an empty or duplicate column name.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        for (i, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(SchemaError::EmptyColumnName);
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self {
            table: table.into(),
            columns,
        })
    }

    /// Returns the columns in output order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the column names in output order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the index of the named column.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A named value within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Column name.
    pub column: String,
    /// Cell value.
    pub value: CellValue,
}

/// One fixed-schema row derived from a remote entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Natural key assigned by the remote source.
    pub id: i64,
    /// Entity name (e.g., `"bulbasaur"`).
    pub name: String,
    /// Cells in schema order.
    pub cells: Vec<Cell>,
}

impl NormalizedRecord {
    /// Returns the value of the named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.value)
    }

    /// Returns the column names in record order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.column.as_str()).collect()
    }

    /// Checks that this record has exactly the schema's columns, in order,
    /// with compatible kinds and nullability.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] describing the first mismatch.
    pub fn check_against(&self, schema: &TableSchema) -> Result<(), SchemaError> {
        if self.column_names() != schema.column_names() {
            return Err(SchemaError::ColumnMismatch {
                id: self.id,
                expected: schema.column_names().into_iter().map(String::from).collect(),
                actual: self.column_names().into_iter().map(String::from).collect(),
            });
        }

        for (cell, column) in self.cells.iter().zip(schema.columns()) {
            match cell.value.kind() {
                None if !column.nullable => {
                    return Err(SchemaError::UnexpectedNull {
                        id: self.id,
                        column: column.name.clone(),
                    });
                }
                Some(kind) if kind != column.kind => {
                    return Err(SchemaError::KindMismatch {
                        id: self.id,
                        column: column.name.clone(),
                        expected: column.kind,
                        actual: kind,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// An ordered set of records sharing one schema.
///
/// Built fresh on every run and handed whole to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: Vec<NormalizedRecord>,
}

impl Table {
    /// Creates an empty table with the given schema.
    #[must_use]
    pub const fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Appends a record after checking it against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the record does not match the schema.
    pub fn push(&mut self, record: NormalizedRecord) -> Result<(), SchemaError> {
        record.check_against(&self.schema)?;
        self.rows.push(record);
        Ok(())
    }

    /// Returns the table schema.
    #[must_use]
    pub const fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[NormalizedRecord] {
        &self.rows
    }

    /// Returns the row ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.id).collect()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
