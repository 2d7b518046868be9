// ABOUTME: Application context for dependency injection into every handler
// ABOUTME: Holds config, data store, audit logger, object store and task invoker built once per process
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditDispatcher, AuditLogger};
use crate::config::{ConfigProvider, ServerConfig};
use crate::database::DataStore;
use crate::errors::AppResult;
use crate::external::{FsObjectStore, HttpTaskInvoker, LoggingInvoker, ObjectStore, TaskInvoker};
use crate::invocation::CorsPolicy;

/// Process-lifetime dependencies shared by all invocations
///
/// # Dependencies
/// - `config`: settings resolved at startup
/// - `store`: pooled relational store
/// - `audit`: fire-and-forget audit channel
/// - `object_store`: blob storage for uploaded assets
/// - `invoker`: sibling function invocation
#[derive(Clone)]
pub struct AppContext {
    config: Arc<ServerConfig>,
    store: DataStore,
    audit: AuditLogger,
    object_store: Arc<dyn ObjectStore>,
    invoker: Arc<dyn TaskInvoker>,
    cors: CorsPolicy,
}

impl AppContext {
    /// Assemble a context from already-built parts
    #[must_use]
    pub fn new(
        config: Arc<ServerConfig>,
        store: DataStore,
        audit: AuditLogger,
        object_store: Arc<dyn ObjectStore>,
        invoker: Arc<dyn TaskInvoker>,
    ) -> Self {
        let cors = CorsPolicy::new(config.cors_allowed_origin.clone());
        Self {
            config,
            store,
            audit,
            object_store,
            invoker,
            cors,
        }
    }

    /// Build the production context: resolve database settings, open and
    /// migrate the store, and wire the audit channel to the invoker.
    ///
    /// The returned dispatcher must be spawned for audit entries to leave
    /// the process.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from `provider` or store errors from
    /// opening and migrating the database
    pub async fn bootstrap(
        config: ServerConfig,
        provider: &dyn ConfigProvider,
    ) -> AppResult<(Self, AuditDispatcher)> {
        let database = provider.database_config(&config.environment).await?;
        let store = DataStore::open(&database, config.db_max_connections).await?;
        store.migrate().await?;

        let invoker: Arc<dyn TaskInvoker> = match &config.function_invoke_url {
            Some(url) => Arc::new(HttpTaskInvoker::new(url.clone())?),
            None => Arc::new(LoggingInvoker),
        };
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(config.object_store_root.clone()));

        let (audit, receiver) = AuditLogger::channel();
        let dispatcher =
            AuditDispatcher::new(receiver, invoker.clone(), config.functions.audit_log.clone());

        info!(
            environment = %config.environment,
            object_store = %config.object_store_root.display(),
            "Application context ready"
        );
        Ok((
            Self::new(Arc::new(config), store, audit, object_store, invoker),
            dispatcher,
        ))
    }

    /// Server configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Relational store
    #[must_use]
    pub const fn store(&self) -> &DataStore {
        &self.store
    }

    /// Audit logger
    #[must_use]
    pub const fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Object store
    #[must_use]
    pub fn object_store(&self) -> &dyn ObjectStore {
        self.object_store.as_ref()
    }

    /// Sibling function invoker
    #[must_use]
    pub fn invoker(&self) -> &dyn TaskInvoker {
        self.invoker.as_ref()
    }

    /// Shared handle to the invoker, for draining after the context is gone
    #[must_use]
    pub fn invoker_handle(&self) -> Arc<dyn TaskInvoker> {
        Arc::clone(&self.invoker)
    }

    /// CORS policy applied to every response
    #[must_use]
    pub const fn cors(&self) -> &CorsPolicy {
        &self.cors
    }
}
