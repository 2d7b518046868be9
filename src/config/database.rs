// ABOUTME: Database connection settings and the providers that resolve them per environment
// ABOUTME: Environment-variable provider with encrypted password support and a static provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Database configuration resolution.
//!
//! [`ConfigProvider::database_config`] is called once at process start; the
//! result is injected into the data store rather than cached globally.

use std::env;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::secrets::SecretKey;
use crate::constants::{defaults, env_config};
use crate::errors::{AppError, AppResult};

/// Connection settings for the relational store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// Database user
    pub user: String,
    /// Database password (decrypted)
    pub password: String,
    /// Database name; for SQLite the file path or `:memory:`
    pub database: String,
    /// Connection charset
    pub charset: String,
}

impl DatabaseConfig {
    /// SQLite database stored at `path`
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            host: "localhost".into(),
            user: String::new(),
            password: String::new(),
            database: path.into(),
            charset: defaults::DB_CHARSET.into(),
        }
    }

    /// Private in-memory database
    #[must_use]
    pub fn memory() -> Self {
        Self::sqlite(":memory:")
    }

    /// Whether this points at an in-memory database
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.database == ":memory:"
    }

    /// `SQLx` connection URL
    #[must_use]
    pub fn connection_url(&self) -> String {
        if self.is_memory() {
            "sqlite::memory:".to_owned()
        } else {
            format!("sqlite:{}", self.database)
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .finish()
    }
}

/// Resolves database settings for a named environment
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Settings for `environment`
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when a required secret is not found, `ConfigInvalid`
    /// when it cannot be decrypted
    async fn database_config(&self, environment: &str) -> AppResult<DatabaseConfig>;
}

/// Reads `<ENV>_DB_*` variables, falling back to `DB_*`.
///
/// A password of the form `enc:<base64>` is decrypted with the key in
/// `DB_SECRET_KEY`, using the environment name as associated data.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    fn lookup(environment: &str, field: &str) -> Option<String> {
        let scoped = format!(
            "{}_{}{field}",
            env_prefix(environment),
            env_config::DB_PREFIX
        );
        env::var(&scoped)
            .or_else(|_| env::var(format!("{}{field}", env_config::DB_PREFIX)))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn require(environment: &str, field: &str) -> AppResult<String> {
        Self::lookup(environment, field).ok_or_else(|| {
            AppError::config_missing(format!(
                "Secret not found: {}{field} for environment {environment}",
                env_config::DB_PREFIX
            ))
        })
    }

    fn resolve_password(environment: &str) -> AppResult<String> {
        let Some(raw) = Self::lookup(environment, "PASSWORD") else {
            return Ok(String::new());
        };
        let Some(sealed) = raw.strip_prefix(env_config::ENCRYPTED_VALUE_PREFIX) else {
            return Ok(raw);
        };
        let key = env::var(env_config::DB_SECRET_KEY).map_err(|_| {
            AppError::config_missing(format!(
                "Secret not found: {} is required to decrypt the database password",
                env_config::DB_SECRET_KEY
            ))
        })?;
        let password = SecretKey::from_base64(&key)?.decrypt(sealed, environment)?;
        debug!(environment, "Database password decrypted");
        Ok(password)
    }
}

#[async_trait]
impl ConfigProvider for EnvConfigProvider {
    async fn database_config(&self, environment: &str) -> AppResult<DatabaseConfig> {
        let config = DatabaseConfig {
            host: Self::lookup(environment, "HOST").unwrap_or_else(|| "localhost".into()),
            user: Self::lookup(environment, "USER").unwrap_or_default(),
            password: Self::resolve_password(environment)?,
            database: Self::require(environment, "DATABASE")?,
            charset: Self::lookup(environment, "CHARSET")
                .unwrap_or_else(|| defaults::DB_CHARSET.into()),
        };
        info!(environment, database = %config.database, "Database configuration resolved");
        Ok(config)
    }
}

/// Fixed settings, for tests and local runs
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: DatabaseConfig,
}

impl StaticConfigProvider {
    /// Always resolve to `config`
    #[must_use]
    pub const fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn database_config(&self, _environment: &str) -> AppResult<DatabaseConfig> {
        Ok(self.config.clone())
    }
}

/// `production` -> `PRODUCTION`, `qa-1` -> `QA_1`
fn env_prefix(environment: &str) -> String {
    environment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
