// ABOUTME: Transaction guard with commit-on-success and rollback on every other exit path
// ABOUTME: Implements SqlExecutor over a SQLite transaction with positional parameter binding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Transaction management with an RAII guard.
//!
//! `StoreTransaction` wraps a `SQLx` transaction:
//! - `finish(outcome)` commits when the outcome is `Ok` and rolls back when it is `Err`
//! - dropping the guard without committing rolls the transaction back
//! - `commit`/`rollback` consume the guard, so a finished transaction cannot be reused
//!
//! ```text
//! let mut tx = store.begin().await?;
//! let outcome = replace_stops(&mut tx, route_id, &stops).await;
//! tx.finish(outcome).await?;
//! ```

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, warn};

use super::executor::SqlExecutor;
use super::values::{decode_row, SqlRow, SqlValue};
use crate::errors::{AppError, AppResult};

/// RAII guard over an open store transaction
pub struct StoreTransaction {
    transaction: Option<Transaction<'static, Sqlite>>,
    committed: bool,
}

impl StoreTransaction {
    /// Wrap an open `SQLx` transaction
    #[must_use]
    pub fn new(transaction: Transaction<'static, Sqlite>) -> Self {
        debug!("StoreTransaction opened - rolls back unless committed");
        Self {
            transaction: Some(transaction),
            committed: false,
        }
    }

    /// Commit the transaction and consume the guard
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already consumed or the commit fails
    pub async fn commit(mut self) -> AppResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed - cannot commit"))?;
        transaction
            .commit()
            .await
            .map_err(|e| AppError::database(format!("Transaction commit failed: {e}")))?;
        self.committed = true;
        debug!("StoreTransaction committed");
        Ok(())
    }

    /// Roll the transaction back and consume the guard
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already consumed or the rollback fails
    pub async fn rollback(mut self) -> AppResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed - cannot rollback"))?;
        transaction
            .rollback()
            .await
            .map_err(|e| AppError::database(format!("Transaction rollback failed: {e}")))?;
        debug!("StoreTransaction rolled back");
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the outcome back.
    ///
    /// A rollback failure is logged; the original error is what the caller sees.
    ///
    /// # Errors
    ///
    /// Returns the outcome's error, or the commit error when committing fails
    pub async fn finish<T>(self, outcome: AppResult<T>) -> AppResult<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback().await {
                    warn!(
                        error = %rollback_error,
                        original_error = %error,
                        "Rollback failed after handler error"
                    );
                }
                Err(error)
            }
        }
    }

    /// Whether the transaction has been committed
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Underlying connection, for typed `sqlx` queries inside the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already committed or rolled back
    pub fn executor(&mut self) -> AppResult<&mut SqliteConnection> {
        self.transaction.as_deref_mut().ok_or_else(|| {
            AppError::internal("Transaction already consumed - guard used after commit/rollback")
        })
    }
}

fn bind_params<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
        })
}

#[async_trait]
impl SqlExecutor for StoreTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        let result = bind_params(sql, params).execute(self.executor()?).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<SqlRow>> {
        let rows = bind_params(sql, params).fetch_all(self.executor()?).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn insert(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<i64> {
        let result = bind_params(sql, params).execute(self.executor()?).await?;
        Ok(result.last_insert_rowid())
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if self.transaction.is_some() && !self.committed {
            warn!("StoreTransaction dropped without commit - rolling back");
        }
    }
}
