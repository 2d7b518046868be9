// ABOUTME: Transactional child-collection reconciliation against a desired ordered list
// ABOUTME: Deletes absent keys, updates changed rows in place, inserts new rows, reports counts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Reconciliation Engine
//!
//! Synchronizes the children of one parent row with a caller-supplied list.
//! The engine runs inside a transaction owned by the caller: it never begins,
//! commits or rolls back, and every store error is returned as-is so the
//! caller's [`StoreTransaction::finish`](crate::database::StoreTransaction::finish)
//! rolls the whole call back.
//!
//! Callers reconciling the same parent concurrently must serialize on the
//! parent row first, see [`lock_row`](crate::database::lock_row).
//!
//! After `reconcile(parent, list)` the keys stored under `parent` are exactly
//! the keys of `list`. Rows whose key survives keep their primary key, and a
//! second call with the same list changes nothing.

mod table;

pub use table::{ChildRow, ChildTable, Column, ColumnKind, DesiredChild, NaturalKey};

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::database::{placeholders, SqlExecutor, SqlValue};
use crate::errors::{AppError, AppResult};
use crate::models::FieldChange;

/// What a reconciliation changed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciliationResult {
    /// Rows deleted because their key was absent from the desired list
    pub deleted: u64,
    /// Rows updated in place
    pub updated: u64,
    /// Rows inserted
    pub inserted: u64,
    /// Rows matched and already up to date
    pub unchanged: u64,
    /// Children before the call, ordered by position then primary key
    pub previous: Vec<ChildRow>,
    /// Children after the call, ordered by position then primary key
    pub rows: Vec<ChildRow>,
}

impl ReconciliationResult {
    /// Whether the store already matched the desired list
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.deleted == 0 && self.updated == 0 && self.inserted == 0
    }

    /// Keys of the final rows in order
    #[must_use]
    pub fn keys(&self) -> Vec<NaturalKey> {
        self.rows.iter().map(|row| row.key.clone()).collect()
    }

    /// Final rows as a JSON array
    #[must_use]
    pub fn rows_json(&self) -> Value {
        rows_json(&self.rows)
    }

    /// Before/after audit record for the whole collection
    #[must_use]
    pub fn change(&self, field_name: &str) -> FieldChange {
        FieldChange::new(
            field_name,
            rows_json(&self.previous),
            rows_json(&self.rows),
        )
    }

    /// Response body summary
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "deleted": self.deleted,
            "updated": self.updated,
            "inserted": self.inserted,
            "unchanged": self.unchanged,
            "rows": rows_json(&self.rows),
        })
    }
}

fn rows_json(rows: &[ChildRow]) -> Value {
    Value::Array(rows.iter().map(ChildRow::to_json).collect())
}

/// A desired child after normalization
struct PlannedChild {
    key: NaturalKey,
    position: Option<i64>,
    fields: Vec<(&'static str, SqlValue)>,
}

/// Synchronize the children of `parent_key` in `table` with `desired`.
///
/// 1. Normalize and validate the desired list (no SQL runs if this fails).
/// 2. Delete children whose key is not desired; an empty list deletes all.
/// 3. In input order, update matching children in place when anything
///    differs, otherwise insert. Position defaults to the list index.
///
/// # Errors
///
/// - `MissingRequiredField` for a `NULL` parent or child key
/// - `InvalidInput` for duplicate keys, unknown payload columns, values that
///   do not fit their column, or an invalid table description
/// - `ResourceAlreadyExists` when an update hits a row that vanished
/// - any store error, unchanged
pub async fn reconcile<E>(
    exec: &mut E,
    table: &ChildTable,
    parent_key: &SqlValue,
    desired: &[DesiredChild],
) -> AppResult<ReconciliationResult>
where
    E: SqlExecutor + ?Sized,
{
    table.validate()?;
    if parent_key.is_null() {
        return Err(AppError::missing_field(table.parent_column));
    }
    let planned = plan(table, desired)?;

    let select_sql = table.select_sql();
    let previous = load_rows(exec, table, &select_sql, parent_key).await?;
    let mut result = ReconciliationResult {
        previous,
        ..ReconciliationResult::default()
    };

    result.deleted = delete_absent(exec, table, parent_key, &planned).await?;

    let existing: BTreeMap<&NaturalKey, &ChildRow> =
        result.previous.iter().map(|row| (&row.key, row)).collect();

    for child in &planned {
        match existing.get(&child.key) {
            Some(row) => {
                if update_in_place(exec, table, row, child).await? {
                    result.updated += 1;
                } else {
                    result.unchanged += 1;
                }
            }
            None => {
                insert_child(exec, table, parent_key, child).await?;
                result.inserted += 1;
            }
        }
    }

    result.rows = load_rows(exec, table, &select_sql, parent_key).await?;

    info!(
        table = table.table,
        parent = %parent_key,
        deleted = result.deleted,
        updated = result.updated,
        inserted = result.inserted,
        unchanged = result.unchanged,
        "Child collection reconciled"
    );
    Ok(result)
}

fn plan(table: &ChildTable, desired: &[DesiredChild]) -> AppResult<Vec<PlannedChild>> {
    let mut seen = BTreeSet::new();
    let mut planned = Vec::with_capacity(desired.len());

    for (index, child) in desired.iter().enumerate() {
        let key = NaturalKey::from_value(&table.key, &child.key)?;
        if !seen.insert(key.clone()) {
            return Err(AppError::invalid_input(format!(
                "Duplicate {} {key} in desired list",
                table.key.name
            )));
        }

        let mut fields = Vec::with_capacity(child.fields.len());
        for (name, value) in &child.fields {
            let column = table.payload_column(name).ok_or_else(|| {
                AppError::invalid_input(format!("Unknown column {name} for {}", table.table))
            })?;
            if fields.iter().any(|(existing, _)| *existing == column.name) {
                return Err(AppError::invalid_input(format!(
                    "Column {name} given twice for {} {key}",
                    table.key.name
                )));
            }
            fields.push((column.name, column.kind.normalize(column.name, value)?));
        }

        let position = table.position.map(|_| {
            child
                .position
                .unwrap_or_else(|| i64::try_from(index).unwrap_or(i64::MAX))
        });

        planned.push(PlannedChild {
            key,
            position,
            fields,
        });
    }
    Ok(planned)
}

async fn load_rows<E>(
    exec: &mut E,
    table: &ChildTable,
    select_sql: &str,
    parent_key: &SqlValue,
) -> AppResult<Vec<ChildRow>>
where
    E: SqlExecutor + ?Sized,
{
    let rows = exec.query(select_sql, std::slice::from_ref(parent_key)).await?;
    rows.iter().map(|row| ChildRow::decode(table, row)).collect()
}

async fn delete_absent<E>(
    exec: &mut E,
    table: &ChildTable,
    parent_key: &SqlValue,
    planned: &[PlannedChild],
) -> AppResult<u64>
where
    E: SqlExecutor + ?Sized,
{
    // `IN ()` is not valid SQL, so an empty list is a full delete
    if planned.is_empty() {
        let sql = format!("DELETE FROM {} WHERE {} = ?", table.table, table.parent_column);
        return exec.execute(&sql, std::slice::from_ref(parent_key)).await;
    }

    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND {} NOT IN ({})",
        table.table,
        table.parent_column,
        table.key.name,
        placeholders(planned.len())
    );
    let mut params = Vec::with_capacity(planned.len() + 1);
    params.push(parent_key.clone());
    params.extend(planned.iter().map(|child| child.key.to_value()));
    exec.execute(&sql, &params).await
}

/// Returns whether an `UPDATE` was issued
async fn update_in_place<E>(
    exec: &mut E,
    table: &ChildTable,
    row: &ChildRow,
    child: &PlannedChild,
) -> AppResult<bool>
where
    E: SqlExecutor + ?Sized,
{
    let mut assignments = Vec::new();
    let mut params = Vec::new();

    if let (Some(column), Some(position)) = (table.position, child.position) {
        if row.position != Some(position) {
            assignments.push(format!("{column} = ?"));
            params.push(SqlValue::Integer(position));
        }
    }
    for (name, value) in &child.fields {
        if row.fields.get(name) != Some(value) {
            assignments.push(format!("{name} = ?"));
            params.push(value.clone());
        }
    }

    if assignments.is_empty() {
        return Ok(false);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table.table,
        assignments.join(", "),
        table.primary_key
    );
    params.push(SqlValue::Integer(row.id));
    let affected = exec.execute(&sql, &params).await?;
    if affected == 0 {
        return Err(AppError::conflict(format!(
            "{} row {} changed during reconciliation",
            table.table, row.id
        )));
    }
    debug!(table = table.table, id = row.id, key = %row.key, "Child updated in place");
    Ok(true)
}

async fn insert_child<E>(
    exec: &mut E,
    table: &ChildTable,
    parent_key: &SqlValue,
    child: &PlannedChild,
) -> AppResult<i64>
where
    E: SqlExecutor + ?Sized,
{
    let mut columns = vec![table.parent_column, table.key.name];
    let mut params = vec![parent_key.clone(), child.key.to_value()];

    if let (Some(column), Some(position)) = (table.position, child.position) {
        columns.push(column);
        params.push(SqlValue::Integer(position));
    }
    for (name, value) in &child.fields {
        columns.push(*name);
        params.push(value.clone());
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.table,
        columns.join(", "),
        placeholders(params.len())
    );
    let id = exec.insert(&sql, &params).await?;
    debug!(table = table.table, id, key = %child.key, "Child inserted");
    Ok(id)
}
