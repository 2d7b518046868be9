// ABOUTME: Relational data store wrapper: pool lifecycle, schema, and transactions
// ABOUTME: All handler SQL runs through StoreTransaction with positional parameter binding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Data Store
//!
//! Thin wrapper around a `SQLx` SQLite pool. Handlers open one transaction
//! per invocation with [`DataStore::begin`], run parameterized statements
//! through [`SqlExecutor`] or typed `sqlx` queries on
//! [`StoreTransaction::executor`], and end it with
//! [`StoreTransaction::finish`].

mod executor;
mod schema;
mod transaction;
mod values;

pub use executor::{lock_row, lock_scoped_row, placeholders, validate_identifier, SqlExecutor};
pub use transaction::StoreTransaction;
pub use values::{SqlRow, SqlValue};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::database::DatabaseConfig;
use crate::errors::{AppError, AppResult};

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled relational store shared by all invocations of a process
#[derive(Clone)]
pub struct DataStore {
    pool: SqlitePool,
}

impl DataStore {
    /// Open a pool for `config`
    ///
    /// In-memory databases are limited to a single connection so every
    /// statement sees the same database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the connection options are invalid or the
    /// pool cannot connect
    pub async fn open(config: &DatabaseConfig, max_connections: u32) -> AppResult<Self> {
        let url = config.connection_url();
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| AppError::database(format!("Invalid database URL {url}: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let max_connections = if config.is_memory() {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(
            database = %config.database,
            max_connections,
            "Data store opened"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool, for read-only queries outside a transaction
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if any DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        schema::migrate(&self.pool).await
    }

    /// Begin a transaction
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if no connection is available or `BEGIN` fails
    pub async fn begin(&self) -> AppResult<StoreTransaction> {
        let transaction = self.pool.begin().await?;
        Ok(StoreTransaction::new(transaction))
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Data store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> DataStore {
        let store = DataStore::open(&DatabaseConfig::memory(), 4).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = memory_store().await;
        assert!(store.migrate().await.is_ok());
    }

    #[tokio::test]
    async fn test_finish_commits_ok_and_rolls_back_err() {
        let store = memory_store().await;

        let mut tx = store.begin().await.unwrap();
        let outcome = tx
            .insert("INSERT INTO projects (name) VALUES (?)", &[SqlValue::from("kept")])
            .await;
        tx.finish(outcome).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert("INSERT INTO projects (name) VALUES (?)", &[SqlValue::from("dropped")])
            .await
            .unwrap();
        let failed: AppResult<()> = Err(AppError::invalid_input("boom"));
        assert!(tx.finish(failed).await.is_err());

        let mut tx = store.begin().await.unwrap();
        let rows = tx.query("SELECT name FROM projects ORDER BY id", &[]).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&SqlValue::from("kept")));
    }

    #[tokio::test]
    async fn test_lock_row_reports_missing_parent() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        let err = lock_row(&mut tx, "bus_routes", "id", &SqlValue::Integer(99))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
        tx.rollback().await.unwrap();
    }
}
