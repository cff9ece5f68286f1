//! Config-driven entity definition.
//!
//! [`EntityDefinition`] captures everything unique about one remote
//! resource (URL path, key fields, output columns) in a serializable config
//! struct. A single generic implementation projects any raw entity into a
//! fixed-schema [`NormalizedRecord`], so adding an entity kind means adding
//! a TOML file rather than code.

use poke_etl_source_models::{
    Cell, CellValue, ColumnDef, ColumnKind, IdRange, NormalizedRecord, PositionalSlots, RoleSlots,
    SchemaError, SlotPolicy, SlotRole, TableSchema,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{ParseError, SourceError};

// ── Top-level entity definition ──────────────────────────────────────────

/// A complete, config-driven entity definition.
///
/// Loaded from TOML files at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityDefinition {
    /// Unique identifier (e.g., `"pokemon"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// API resource path segment (`/api/v2/{resource}/{id}`).
    pub resource: String,
    /// Destination table name.
    pub table: String,
    /// Dot-path of the integer natural key in the response body.
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Dot-path of the entity name in the response body.
    #[serde(default = "default_name_field")]
    pub name_field: String,
    /// Id range covering the catalog at the time of writing.
    pub default_range: IdRange,
    /// Output columns, in order.
    pub columns: Vec<ColumnSpec>,
}

fn default_key_field() -> String {
    "id".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_hidden_flag() -> String {
    "is_hidden".to_string()
}

fn default_slot_field() -> String {
    "slot".to_string()
}

// ── Column projections ───────────────────────────────────────────────────

/// How one or more output columns are derived from the raw entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnSpec {
    /// A single field copied as-is.
    Scalar {
        /// Output column name.
        column: String,
        /// Dot-path of the source field.
        path: String,
        /// Expected value kind.
        kind: ColumnKind,
        /// Whether a missing or null field becomes a null cell instead of
        /// an error.
        #[serde(default)]
        nullable: bool,
    },
    /// A list projected into a fixed number of positional columns, in
    /// source order. Unfilled positions are null.
    PositionalSlots {
        /// Dot-path of the source list.
        list: String,
        /// Dot-path of the value within each element. Empty when the list
        /// holds plain strings.
        #[serde(default)]
        item_path: String,
        /// Output column names, one per position.
        columns: Vec<String>,
    },
    /// A list whose elements are routed to named columns by their role
    /// (hidden flag first, then slot number).
    RoleSlots {
        /// Dot-path of the source list.
        list: String,
        /// Boolean field marking the hidden element.
        #[serde(default = "default_hidden_flag")]
        hidden_flag: String,
        /// 1-based slot number field.
        #[serde(default = "default_slot_field")]
        slot_field: String,
        /// Values taken from each element, with their column per role.
        outputs: Vec<RoleOutput>,
    },
    /// A list collected into a single text-list column.
    List {
        /// Output column name.
        column: String,
        /// Dot-path of the source list.
        list: String,
        /// Dot-path of the value within each element.
        #[serde(default)]
        item_path: String,
    },
    /// Text built from `{field.path}` placeholders.
    Template {
        /// Output column name.
        column: String,
        /// Template text, e.g. `"https://host/{name}.png"`.
        template: String,
        /// Whether a missing placeholder field becomes a null cell.
        #[serde(default)]
        nullable: bool,
    },
}

/// One value extracted from each role-routed element.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleOutput {
    /// Dot-path of the value within the element.
    pub path: String,
    /// Whether elements lacking this value are still accepted.
    #[serde(default)]
    pub optional: bool,
    /// Column for the first primary slot.
    pub primary_1: String,
    /// Column for the second primary slot.
    pub primary_2: String,
    /// Column for the hidden slot.
    pub hidden: String,
}

impl RoleOutput {
    /// Returns the output column for `role`.
    #[must_use]
    pub fn column(&self, role: SlotRole) -> &str {
        match role {
            SlotRole::Primary1 => &self.primary_1,
            SlotRole::Primary2 => &self.primary_2,
            SlotRole::Hidden => &self.hidden,
        }
    }
}

// ── JSON helpers ─────────────────────────────────────────────────────────

/// Follows a dot-separated path. An empty path is the value itself.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Like [`lookup`], but treats JSON `null` as absent.
fn present<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    lookup(value, path).filter(|v| !v.is_null())
}

/// Path label for an element field, e.g. `abilities[1].ability.name`.
fn item_label(list: &str, index: usize, item_path: &str) -> String {
    if item_path.is_empty() {
        format!("{list}[{index}]")
    } else {
        format!("{list}[{index}].{item_path}")
    }
}

fn unexpected(path: &str, expected: &str) -> ParseError {
    ParseError::UnexpectedType {
        path: path.to_string(),
        expected: expected.to_string(),
    }
}

fn missing(path: &str) -> ParseError {
    ParseError::MissingField {
        path: path.to_string(),
    }
}

/// Converts a JSON value into a cell of the requested kind.
fn to_cell(value: &Value, kind: ColumnKind, path: &str) -> Result<CellValue, ParseError> {
    match kind {
        ColumnKind::Integer => value
            .as_i64()
            .map(CellValue::Integer)
            .ok_or_else(|| unexpected(path, "an integer")),
        ColumnKind::Text => value
            .as_str()
            .map(|s| CellValue::Text(s.to_string()))
            .ok_or_else(|| unexpected(path, "a string")),
        ColumnKind::Bool => value
            .as_bool()
            .map(CellValue::Bool)
            .ok_or_else(|| unexpected(path, "a boolean")),
        ColumnKind::TextList => {
            let items = value
                .as_array()
                .ok_or_else(|| unexpected(path, "an array"))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| unexpected(&item_label(path, i, ""), "a string"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(CellValue::TextList)
        }
    }
}

/// Returns the elements of a required list field.
fn list_items<'a>(raw: &'a Value, list: &str) -> Result<&'a [Value], ParseError> {
    present(raw, list)
        .ok_or_else(|| missing(list))?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| unexpected(list, "an array"))
}

/// Reads a text value from a list element. `Ok(None)` when absent.
fn item_text(
    item: &Value,
    list: &str,
    index: usize,
    item_path: &str,
) -> Result<Option<String>, ParseError> {
    present(item, item_path).map_or(Ok(None), |value| {
        value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| unexpected(&item_label(list, index, item_path), "a string"))
    })
}

/// Reads a required text value from a list element.
fn required_item_text(
    item: &Value,
    list: &str,
    index: usize,
    item_path: &str,
) -> Result<String, ParseError> {
    item_text(item, list, index, item_path)?
        .ok_or_else(|| missing(&item_label(list, index, item_path)))
}

/// Applies the slot policy to an element that found no slot.
fn unassigned(
    policy: SlotPolicy,
    list: &str,
    index: usize,
    reason: String,
) -> Result<(), ParseError> {
    match policy {
        SlotPolicy::Warn => {
            log::warn!("Dropping {list}[{index}]: {reason}");
            Ok(())
        }
        SlotPolicy::Reject => Err(ParseError::UnassignedSlot {
            list: list.to_string(),
            index,
            reason,
        }),
    }
}

// ── Templates ────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum TemplatePart<'a> {
    Literal(&'a str),
    Field(&'a str),
}

/// Splits `"a/{name}.png"` into literal and field parts.
fn split_template(template: &str) -> Result<Vec<TemplatePart<'_>>, ParseError> {
    let malformed = || ParseError::MalformedTemplate {
        template: template.to_string(),
    };

    let mut parts = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(malformed());
        }
        if open > 0 {
            parts.push(TemplatePart::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(malformed)?;
        let field = &after[..close];
        if field.is_empty() || field.contains('{') {
            return Err(malformed());
        }
        parts.push(TemplatePart::Field(field));
        rest = &after[close + 1..];
    }

    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest));
    }

    Ok(parts)
}

/// Renders a template against the raw entity. `Ok(None)` when a
/// placeholder field is absent.
fn render_template(raw: &Value, template: &str) -> Result<Option<String>, ParseError> {
    let mut out = String::with_capacity(template.len());

    for part in split_template(template)? {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Field(path) => match present(raw, path) {
                None => return Ok(None),
                Some(Value::String(s)) => out.push_str(s),
                Some(Value::Number(n)) => out.push_str(&n.to_string()),
                Some(_) => return Err(unexpected(path, "a string or number")),
            },
        }
    }

    Ok(Some(out))
}

// ── Projection ───────────────────────────────────────────────────────────

fn text_cells(columns: impl IntoIterator<Item = (String, Option<String>)>) -> Vec<Cell> {
    columns
        .into_iter()
        .map(|(column, value)| Cell {
            column,
            value: value.into(),
        })
        .collect()
}

impl ColumnSpec {
    /// Appends this projection's output columns to `out`.
    fn schema_columns(&self, out: &mut Vec<ColumnDef>) {
        match self {
            Self::Scalar {
                column,
                kind,
                nullable,
                ..
            } => out.push(ColumnDef::new(column.clone(), *kind, *nullable)),
            Self::PositionalSlots { columns, .. } => {
                out.extend(
                    columns
                        .iter()
                        .map(|c| ColumnDef::new(c.clone(), ColumnKind::Text, true)),
                );
            }
            Self::RoleSlots { outputs, .. } => {
                for role in SlotRole::ALL {
                    out.extend(
                        outputs
                            .iter()
                            .map(|o| ColumnDef::new(o.column(role), ColumnKind::Text, true)),
                    );
                }
            }
            Self::List { column, .. } => {
                out.push(ColumnDef::new(column.clone(), ColumnKind::TextList, false));
            }
            Self::Template {
                column, nullable, ..
            } => out.push(ColumnDef::new(column.clone(), ColumnKind::Text, *nullable)),
        }
    }

    /// Projects the raw entity into this projection's cells.
    fn project(
        &self,
        raw: &Value,
        policy: SlotPolicy,
        out: &mut Vec<Cell>,
    ) -> Result<(), ParseError> {
        match self {
            Self::Scalar {
                column,
                path,
                kind,
                nullable,
            } => {
                let value = match present(raw, path) {
                    Some(value) => to_cell(value, *kind, path)?,
                    None if *nullable => CellValue::Null,
                    None => return Err(missing(path)),
                };
                out.push(Cell {
                    column: column.clone(),
                    value,
                });
            }
            Self::PositionalSlots {
                list,
                item_path,
                columns,
            } => {
                let mut slots = PositionalSlots::new(columns.len());
                for (index, item) in list_items(raw, list)?.iter().enumerate() {
                    let value = required_item_text(item, list, index, item_path)?;
                    if let Err(value) = slots.push(value) {
                        unassigned(
                            policy,
                            list,
                            index,
                            format!("all {} slots taken, {value:?} left over", columns.len()),
                        )?;
                    }
                }
                out.extend(text_cells(columns.iter().cloned().zip(slots.into_vec())));
            }
            Self::RoleSlots {
                list,
                hidden_flag,
                slot_field,
                outputs,
            } => {
                let slots = assign_roles(raw, list, hidden_flag, slot_field, outputs, policy)?;
                for role in SlotRole::ALL {
                    let values = slots.get(role);
                    out.extend(text_cells(outputs.iter().enumerate().map(|(i, o)| {
                        let value = values.and_then(|v| v.get(i).cloned().flatten());
                        (o.column(role).to_string(), value)
                    })));
                }
            }
            Self::List {
                column,
                list,
                item_path,
            } => {
                let values = list_items(raw, list)?
                    .iter()
                    .enumerate()
                    .map(|(index, item)| required_item_text(item, list, index, item_path))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(Cell {
                    column: column.clone(),
                    value: CellValue::TextList(values),
                });
            }
            Self::Template {
                column,
                template,
                nullable,
            } => {
                let value = match render_template(raw, template)? {
                    Some(text) => CellValue::Text(text),
                    None if *nullable => CellValue::Null,
                    None => {
                        return Err(ParseError::MissingField {
                            path: format!("{column} (template {template})"),
                        });
                    }
                };
                out.push(Cell {
                    column: column.clone(),
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Routes each list element to a role. Each occupied role holds one value
/// per output, in output order.
fn assign_roles(
    raw: &Value,
    list: &str,
    hidden_flag: &str,
    slot_field: &str,
    outputs: &[RoleOutput],
    policy: SlotPolicy,
) -> Result<RoleSlots<Vec<Option<String>>>, ParseError> {
    let mut slots = RoleSlots::new();

    for (index, item) in list_items(raw, list)?.iter().enumerate() {
        let is_hidden = match present(item, hidden_flag) {
            Some(v) => v
                .as_bool()
                .ok_or_else(|| unexpected(&item_label(list, index, hidden_flag), "a boolean"))?,
            None => false,
        };
        let slot = match present(item, slot_field) {
            Some(v) => Some(
                v.as_i64()
                    .ok_or_else(|| unexpected(&item_label(list, index, slot_field), "an integer"))?,
            ),
            None => None,
        };

        let Some(role) = SlotRole::assign(is_hidden, slot) else {
            let slot = slot.map_or_else(|| "none".to_string(), |s| s.to_string());
            unassigned(
                policy,
                list,
                index,
                format!("not hidden and slot {slot} is not 1 or 2"),
            )?;
            continue;
        };

        let values = outputs
            .iter()
            .map(|o| {
                if o.optional {
                    item_text(item, list, index, &o.path)
                } else {
                    required_item_text(item, list, index, &o.path).map(Some)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if policy == SlotPolicy::Reject && slots.get(role).is_some() {
            return Err(ParseError::DuplicateSlot {
                list: list.to_string(),
                index,
                role,
            });
        }
        if let Some(displaced) = slots.replace(role, values) {
            log::warn!("{list}[{index}] takes slot {role}, displacing {displaced:?}");
        }
    }

    Ok(slots)
}

// ── Definition methods ───────────────────────────────────────────────────

impl EntityDefinition {
    /// Returns the unique definition identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the output table layout.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if two projections produce the same column.
    pub fn schema(&self) -> Result<TableSchema, SchemaError> {
        let mut columns = Vec::new();
        for spec in &self.columns {
            spec.schema_columns(&mut columns);
        }
        TableSchema::new(self.table.clone(), columns)
    }

    /// Checks that the definition is usable: required names are set, the
    /// default range is valid, column names are unique, and templates
    /// parse.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] describing the first problem.
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |message: String| SourceError::Definition {
            entity: self.id.clone(),
            message,
        };

        for (label, value) in [
            ("id", &self.id),
            ("resource", &self.resource),
            ("table", &self.table),
            ("key_field", &self.key_field),
            ("name_field", &self.name_field),
        ] {
            if value.is_empty() {
                return Err(invalid(format!("{label} must not be empty")));
            }
        }

        self.default_range
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        for spec in &self.columns {
            match spec {
                ColumnSpec::PositionalSlots { list, columns, .. } if columns.is_empty() => {
                    return Err(invalid(format!("positional slots for {list} have no columns")));
                }
                ColumnSpec::RoleSlots { list, outputs, .. } if outputs.is_empty() => {
                    return Err(invalid(format!("role slots for {list} have no outputs")));
                }
                ColumnSpec::Template { template, .. } => {
                    split_template(template).map_err(|e| invalid(e.to_string()))?;
                }
                _ => {}
            }
        }

        let schema = self.schema().map_err(|e| invalid(e.to_string()))?;
        if schema.is_empty() {
            return Err(invalid("no columns defined".to_string()));
        }

        Ok(())
    }

    /// Projects one raw entity into a record.
    ///
    /// `requested_id` must match the entity's key field.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if a required field is missing or mistyped,
    /// the id does not match, or `policy` is [`SlotPolicy::Reject`] and a
    /// list element finds no slot.
    pub fn normalize(
        &self,
        raw: &Value,
        requested_id: u32,
        policy: SlotPolicy,
    ) -> Result<NormalizedRecord, ParseError> {
        let id = present(raw, &self.key_field)
            .ok_or_else(|| missing(&self.key_field))?
            .as_i64()
            .ok_or_else(|| unexpected(&self.key_field, "an integer"))?;

        if id != i64::from(requested_id) {
            return Err(ParseError::IdMismatch {
                requested: requested_id,
                returned: id,
            });
        }

        let name = present(raw, &self.name_field)
            .ok_or_else(|| missing(&self.name_field))?
            .as_str()
            .ok_or_else(|| unexpected(&self.name_field, "a string"))?
            .to_string();

        let mut cells = Vec::new();
        for spec in &self.columns {
            spec.project(raw, policy, &mut cells)?;
        }

        Ok(NormalizedRecord { id, name, cells })
    }
}

/// Parses an [`EntityDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_entity_toml(toml_str: &str) -> Result<EntityDefinition, toml::de::Error> {
    toml::de::from_str(toml_str)
}
