// ABOUTME: Child table descriptions and value normalization for reconciliation
// ABOUTME: Coerces request values to the column's storage kind before any comparison or bind
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::{validate_identifier, SqlRow, SqlValue};
use crate::errors::{AppError, AppResult};

/// Storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Integer column (`"5"`, `5.0` and `true` all normalize to an integer)
    Integer,
    /// Floating point column
    Real,
    /// Text column (numbers are rendered as text)
    Text,
}

impl ColumnKind {
    /// Coerce `value` into this kind. `NULL` stays `NULL`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming `column` when the value has no
    /// lossless representation in this kind.
    pub fn normalize(self, column: &str, value: &SqlValue) -> AppResult<SqlValue> {
        let coerced = match (self, value) {
            (_, SqlValue::Null) => Some(SqlValue::Null),
            (Self::Integer, SqlValue::Integer(v)) => Some(SqlValue::Integer(*v)),
            (Self::Integer, SqlValue::Real(v)) => real_to_integer(*v),
            (Self::Integer, SqlValue::Text(s)) => {
                let trimmed = s.trim();
                trimmed.parse::<i64>().ok().map(SqlValue::Integer).or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(real_to_integer)
                })
            }
            (Self::Real, SqlValue::Integer(v)) => Some(SqlValue::Real(*v as f64)),
            (Self::Real, SqlValue::Real(v)) => Some(SqlValue::Real(*v)),
            (Self::Real, SqlValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(SqlValue::Real),
            (Self::Text, SqlValue::Text(s)) => Some(SqlValue::Text(s.clone())),
            (Self::Text, SqlValue::Integer(v)) => Some(SqlValue::Text(v.to_string())),
            (Self::Text, SqlValue::Real(v)) => Some(SqlValue::Text(v.to_string())),
        };
        coerced.ok_or_else(|| {
            AppError::invalid_input(format!(
                "Value {value} for column {column} is not a valid {self}"
            ))
        })
    }
}

#[allow(clippy::float_cmp)] // fract() of an integral float is exactly zero
fn real_to_integer(value: f64) -> Option<SqlValue> {
    let in_range = value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15;
    in_range.then(|| SqlValue::Integer(value as i64))
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Real => write!(f, "real"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: &'static str,
    /// Storage kind
    pub kind: ColumnKind,
}

impl Column {
    /// Integer column
    #[must_use]
    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }

    /// Real column
    #[must_use]
    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Real,
        }
    }

    /// Text column
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }
}

/// Layout of a child collection table owned by a parent row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildTable {
    /// Table name
    pub table: &'static str,
    /// Primary key column of the child row
    pub primary_key: &'static str,
    /// Column referencing the parent
    pub parent_column: &'static str,
    /// Secondary key identifying a child within its parent
    pub key: Column,
    /// Ordering column, when order matters for this child type
    pub position: Option<&'static str>,
    /// Payload columns callers may set
    pub payload: &'static [Column],
}

impl ChildTable {
    /// Check identifiers and key kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed identifier or a real-valued key.
    pub fn validate(&self) -> AppResult<()> {
        validate_identifier(self.table)?;
        validate_identifier(self.primary_key)?;
        validate_identifier(self.parent_column)?;
        validate_identifier(self.key.name)?;
        if let Some(position) = self.position {
            validate_identifier(position)?;
        }
        for column in self.payload {
            validate_identifier(column.name)?;
        }
        if self.key.kind == ColumnKind::Real {
            return Err(AppError::invalid_input(format!(
                "Key column {}.{} must be integer or text",
                self.table, self.key.name
            )));
        }
        Ok(())
    }

    /// Payload column by name
    #[must_use]
    pub fn payload_column(&self, name: &str) -> Option<&Column> {
        self.payload.iter().find(|column| column.name == name)
    }

    pub(super) fn select_sql(&self) -> String {
        let mut columns = vec![self.primary_key, self.key.name];
        columns.extend(self.position);
        columns.extend(self.payload.iter().map(|column| column.name));
        let order = self.position.map_or_else(
            || self.primary_key.to_owned(),
            |position| format!("{position}, {}", self.primary_key),
        );
        format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {order}",
            columns.join(", "),
            self.table,
            self.parent_column
        )
    }
}

/// Normalized secondary key, used for set membership and matching
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum NaturalKey {
    /// Integer key
    Integer(i64),
    /// Text key
    Text(String),
}

impl NaturalKey {
    /// Build a key from a raw value normalized to `column`'s kind
    ///
    /// # Errors
    ///
    /// `MissingRequiredField` for `NULL`, `InvalidInput` when coercion fails.
    pub fn from_value(column: &Column, value: &SqlValue) -> AppResult<Self> {
        match column.kind.normalize(column.name, value)? {
            SqlValue::Null => Err(AppError::missing_field(column.name)),
            SqlValue::Integer(v) => Ok(Self::Integer(v)),
            SqlValue::Text(s) => Ok(Self::Text(s)),
            SqlValue::Real(v) => Err(AppError::invalid_input(format!(
                "Real value {v} cannot key column {}",
                column.name
            ))),
        }
    }

    /// Bindable form
    #[must_use]
    pub fn to_value(&self) -> SqlValue {
        match self {
            Self::Integer(v) => SqlValue::Integer(*v),
            Self::Text(s) => SqlValue::Text(s.clone()),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One entry of a desired child list
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredChild {
    /// Secondary key, normalized against the table's key column
    pub key: SqlValue,
    /// Explicit position; defaults to the entry's index in the list
    pub position: Option<i64>,
    /// Payload values by column name
    pub fields: Vec<(String, SqlValue)>,
}

impl DesiredChild {
    /// Child identified by `key`
    pub fn new(key: impl Into<SqlValue>) -> Self {
        Self {
            key: key.into(),
            position: None,
            fields: Vec::new(),
        }
    }

    /// Set an explicit position
    #[must_use]
    pub const fn at_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    /// Set a payload value
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// A stored child row as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRow {
    /// Primary key
    pub id: i64,
    /// Normalized secondary key
    pub key: NaturalKey,
    /// Stored position, when the table has one
    pub position: Option<i64>,
    /// Payload columns in table order
    pub fields: SqlRow,
}

impl ChildRow {
    pub(super) fn decode(table: &ChildTable, row: &SqlRow) -> AppResult<Self> {
        let id = row.get_i64(table.primary_key).ok_or_else(|| {
            AppError::database(format!(
                "{}.{} is not an integer",
                table.table, table.primary_key
            ))
        })?;
        let key = NaturalKey::from_value(
            &table.key,
            row.get(table.key.name).unwrap_or(&SqlValue::Null),
        )?;
        let position = table.position.and_then(|column| row.get_i64(column));
        let fields = table
            .payload
            .iter()
            .map(|column| {
                let stored = row.get(column.name).unwrap_or(&SqlValue::Null);
                let value = column
                    .kind
                    .normalize(column.name, stored)
                    .unwrap_or_else(|_| stored.clone());
                (column.name.to_owned(), value)
            })
            .collect();
        Ok(Self {
            id,
            key,
            position,
            fields: SqlRow::new(fields),
        })
    }

    /// JSON object with id, key, position and payload
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), Value::from(self.id));
        object.insert(
            "key".into(),
            serde_json::to_value(&self.key).unwrap_or(Value::Null),
        );
        if let Some(position) = self.position {
            object.insert("position".into(), Value::from(position));
        }
        for (name, value) in self.fields.iter() {
            object.insert(name.to_owned(), value.to_json());
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_normalization() {
        let kind = ColumnKind::Integer;
        assert_eq!(kind.normalize("c", &"5".into()).unwrap(), SqlValue::Integer(5));
        assert_eq!(kind.normalize("c", &" 7 ".into()).unwrap(), SqlValue::Integer(7));
        assert_eq!(kind.normalize("c", &SqlValue::Real(3.0)).unwrap(), SqlValue::Integer(3));
        assert_eq!(kind.normalize("c", &true.into()).unwrap(), SqlValue::Integer(1));
        assert!(kind.normalize("c", &SqlValue::Real(2.5)).is_err());
        assert!(kind.normalize("c", &"five".into()).is_err());
    }

    #[test]
    fn test_real_and_text_normalization() {
        assert_eq!(
            ColumnKind::Real.normalize("c", &"2.5".into()).unwrap(),
            SqlValue::Real(2.5)
        );
        assert_eq!(
            ColumnKind::Real.normalize("c", &SqlValue::Integer(2)).unwrap(),
            SqlValue::Real(2.0)
        );
        assert_eq!(
            ColumnKind::Text.normalize("c", &SqlValue::Integer(5)).unwrap(),
            SqlValue::Text("5".into())
        );
        assert_eq!(
            ColumnKind::Text.normalize("c", &SqlValue::Null).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_natural_key_matches_across_types() {
        let column = Column::integer("way_id");
        let from_text = NaturalKey::from_value(&column, &"5".into()).unwrap();
        let from_int = NaturalKey::from_value(&column, &SqlValue::Integer(5)).unwrap();
        assert_eq!(from_text, from_int);

        let err = NaturalKey::from_value(&column, &SqlValue::Null).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_table_validation() {
        const PAYLOAD: &[Column] = &[Column::text("note")];
        let table = ChildTable {
            table: "children",
            primary_key: "id",
            parent_column: "parent_id",
            key: Column::integer("item_id"),
            position: Some("position"),
            payload: PAYLOAD,
        };
        assert!(table.validate().is_ok());
        assert_eq!(
            table.select_sql(),
            "SELECT id, item_id, position, note FROM children WHERE parent_id = ? ORDER BY position, id"
        );

        let bad_key = ChildTable {
            key: Column::real("weight"),
            ..table
        };
        assert!(bad_key.validate().is_err());

        let bad_name = ChildTable {
            table: "children; --",
            ..table
        };
        assert!(bad_name.validate().is_err());
    }
}
