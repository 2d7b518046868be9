// ABOUTME: Executor seam for parameterized SQL used by handlers and the reconciliation engine
// ABOUTME: Defines SqlExecutor, identifier validation, and the parent row lock helper
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use async_trait::async_trait;
use tracing::debug;

use super::values::{SqlRow, SqlValue};
use crate::errors::{AppError, AppResult};

/// Statement execution inside an open transaction.
///
/// All values travel through `params` and are bound to `?` placeholders in
/// order. SQL text never contains caller-supplied values.
#[async_trait]
pub trait SqlExecutor: Send {
    /// Execute a statement and return the number of affected rows
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64>;

    /// Run a query and decode every returned row
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<SqlRow>>;

    /// Execute an `INSERT` and return the new row id
    async fn insert(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<i64>;
}

/// Check that `name` is a plain SQL identifier.
///
/// Table and column names are the only non-parameter parts of generated SQL.
///
/// # Errors
///
/// Returns `InvalidInput` when the name is empty or contains anything other
/// than ASCII letters, digits and underscores, or starts with a digit.
pub fn validate_identifier(name: &str) -> AppResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(AppError::invalid_input(format!("Invalid SQL identifier: {name:?}")))
    }
}

/// `?, ?, ?` with `count` placeholders
#[must_use]
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Take the write lock on a parent row inside the current transaction.
///
/// Issues a no-op `UPDATE` so that concurrent writers of the same parent
/// serialize on the row, and so that a missing parent is detected before any
/// child mutation.
///
/// # Errors
///
/// Returns `ResourceNotFound` when no row matches, `InvalidInput` for bad
/// identifiers, or the store error.
pub async fn lock_row<E>(exec: &mut E, table: &str, key_column: &str, id: &SqlValue) -> AppResult<()>
where
    E: SqlExecutor + ?Sized,
{
    validate_identifier(table)?;
    validate_identifier(key_column)?;
    let sql = format!("UPDATE {table} SET {key_column} = {key_column} WHERE {key_column} = ?");
    let affected = exec.execute(&sql, std::slice::from_ref(id)).await?;
    if affected == 0 {
        return Err(AppError::not_found(format!("{table} {id}")));
    }
    debug!(table, %id, "Parent row locked");
    Ok(())
}

/// [`lock_row`] restricted to rows owned by `scope_id`.
///
/// A row that exists under another scope is reported as missing, so callers
/// cannot discover ids outside their allow-list.
///
/// # Errors
///
/// Returns `ResourceNotFound` when no row matches both keys, `InvalidInput`
/// for bad identifiers, or the store error.
pub async fn lock_scoped_row<E>(
    exec: &mut E,
    table: &str,
    key_column: &str,
    id: &SqlValue,
    scope_column: &str,
    scope_id: &SqlValue,
) -> AppResult<()>
where
    E: SqlExecutor + ?Sized,
{
    validate_identifier(table)?;
    validate_identifier(key_column)?;
    validate_identifier(scope_column)?;
    let sql = format!(
        "UPDATE {table} SET {key_column} = {key_column} WHERE {key_column} = ? AND {scope_column} = ?"
    );
    let affected = exec.execute(&sql, &[id.clone(), scope_id.clone()]).await?;
    if affected == 0 {
        return Err(AppError::not_found(format!("{table} {id}")));
    }
    debug!(table, %id, %scope_id, "Scoped row locked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("bus_route_stops").is_ok());
        assert!(validate_identifier("_tmp1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("stops; DROP TABLE x").is_err());
        assert!(validate_identifier("name\"").is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
