// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: In-memory store, seed helpers, recording invoker, and fault-injecting doubles
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `event_admin`

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{json, Value};

use event_admin::audit::{AuditLogger, AuditReceiver};
use event_admin::config::{DatabaseConfig, ServerConfig};
use event_admin::context::AppContext;
use event_admin::database::{DataStore, SqlExecutor, SqlRow, SqlValue};
use event_admin::errors::{AppError, AppResult};
use event_admin::external::{InvocationMode, MemoryObjectStore, ObjectStore, StoredObject, TaskInvoker};
use event_admin::models::AuditEntry;
use event_admin::permissions::ScopeClaims;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Migrated in-memory store
pub async fn create_test_store() -> DataStore {
    init_test_logging();
    let store = DataStore::open(&DatabaseConfig::memory(), 1).await.unwrap();
    store.migrate().await.unwrap();
    store
}

async fn insert(store: &DataStore, sql: &str, params: &[SqlValue]) -> i64 {
    let mut tx = store.begin().await.unwrap();
    let id = tx.insert(sql, params).await.unwrap();
    tx.commit().await.unwrap();
    id
}

/// Query outside any handler transaction
pub async fn query(store: &DataStore, sql: &str, params: &[SqlValue]) -> Vec<SqlRow> {
    let mut tx = store.begin().await.unwrap();
    let rows = tx.query(sql, params).await.unwrap();
    tx.rollback().await.unwrap();
    rows
}

pub async fn seed_project(store: &DataStore, name: &str) -> i64 {
    insert(store, "INSERT INTO projects (name) VALUES (?)", &[SqlValue::from(name)]).await
}

pub async fn seed_way(store: &DataStore, project_id: i64, name: &str) -> i64 {
    insert(
        store,
        "INSERT INTO bus_ways (project_id, name) VALUES (?, ?)",
        &[SqlValue::Integer(project_id), SqlValue::from(name)],
    )
    .await
}

pub async fn seed_route(store: &DataStore, project_id: i64, name: &str) -> i64 {
    insert(
        store,
        "INSERT INTO bus_routes (project_id, name) VALUES (?, ?)",
        &[SqlValue::Integer(project_id), SqlValue::from(name)],
    )
    .await
}

pub async fn seed_stop(store: &DataStore, route_id: i64, way_id: i64, position: i64) -> i64 {
    insert(
        store,
        "INSERT INTO bus_route_stops (route_id, way_id, position) VALUES (?, ?, ?)",
        &[
            SqlValue::Integer(route_id),
            SqlValue::Integer(way_id),
            SqlValue::Integer(position),
        ],
    )
    .await
}

pub async fn seed_event(store: &DataStore, project_id: i64, name: &str) -> i64 {
    insert(
        store,
        "INSERT INTO events (project_id, name) VALUES (?, ?)",
        &[SqlValue::Integer(project_id), SqlValue::from(name)],
    )
    .await
}

pub async fn seed_timetable(store: &DataStore, project_id: i64, name: &str) -> i64 {
    insert(
        store,
        "INSERT INTO bus_timetables (project_id, name) VALUES (?, ?)",
        &[SqlValue::Integer(project_id), SqlValue::from(name)],
    )
    .await
}

pub async fn seed_app(store: &DataStore, project_id: i64, name: &str, domain: Option<&str>) -> i64 {
    insert(
        store,
        "INSERT INTO apps (project_id, name, domain) VALUES (?, ?, ?)",
        &[
            SqlValue::Integer(project_id),
            SqlValue::from(name),
            SqlValue::from(domain),
        ],
    )
    .await
}

pub async fn seed_history(store: &DataStore, app_id: i64, snapshot: &Value) -> i64 {
    insert(
        store,
        "INSERT INTO app_page_history (app_id, snapshot) VALUES (?, ?)",
        &[SqlValue::Integer(app_id), SqlValue::from(snapshot.to_string())],
    )
    .await
}

/// `(way_id, position)` of a route's stops, ordered
pub async fn route_stops(store: &DataStore, route_id: i64) -> Vec<(i64, i64)> {
    query(
        store,
        "SELECT way_id, position FROM bus_route_stops WHERE route_id = ? ORDER BY position, id",
        &[SqlValue::Integer(route_id)],
    )
    .await
    .iter()
    .map(|row| (row.get_i64("way_id").unwrap(), row.get_i64("position").unwrap()))
    .collect()
}

/// Claims allowing exactly the given projects and events
pub fn claims(project_ids: &[i64], event_ids: &[i64]) -> ScopeClaims {
    ScopeClaims {
        user_id: Some("user-1".into()),
        role_id: Some(1),
        project_ids: Some(project_ids.iter().copied().collect::<BTreeSet<_>>()),
        event_ids: Some(event_ids.iter().copied().collect::<BTreeSet<_>>()),
    }
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub function: String,
    pub payload: Value,
    pub mode: InvocationMode,
}

/// Invoker double that records calls and can fail a named function
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<RecordedCall>>,
    failing_function: Option<String>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(function: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_function: Some(function.to_owned()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, function: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.function == function)
            .collect()
    }
}

#[async_trait]
impl TaskInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        function: &str,
        payload: Value,
        mode: InvocationMode,
    ) -> AppResult<Option<Value>> {
        self.calls.lock().unwrap().push(RecordedCall {
            function: function.to_owned(),
            payload,
            mode,
        });
        if self.failing_function.as_deref() == Some(function) {
            let error = AppError::external_service(function, "injected failure");
            return match mode {
                InvocationMode::WaitForResult => Err(error),
                InvocationMode::FireAndForget => Ok(None),
            };
        }
        Ok(match mode {
            InvocationMode::FireAndForget => None,
            InvocationMode::WaitForResult => Some(json!({ "status": "ok" })),
        })
    }
}

/// Executor wrapper that fails the `fail_at`-th `INSERT` (1-based)
pub struct FailingExecutor<'a, E: SqlExecutor + ?Sized> {
    inner: &'a mut E,
    fail_at: usize,
    inserts: usize,
}

impl<'a, E: SqlExecutor + ?Sized> FailingExecutor<'a, E> {
    pub fn new(inner: &'a mut E, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            inserts: 0,
        }
    }
}

#[async_trait]
impl<E: SqlExecutor + ?Sized> SqlExecutor for FailingExecutor<'_, E> {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        self.inner.execute(sql, params).await
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<SqlRow>> {
        self.inner.query(sql, params).await
    }

    async fn insert(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<i64> {
        self.inserts += 1;
        if self.inserts == self.fail_at {
            return Err(AppError::conflict("Injected constraint violation"));
        }
        self.inner.insert(sql, params).await
    }
}

/// Object store whose writes always fail
#[derive(Debug, Default)]
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, _bytes: Vec<u8>, _content_type: &str) -> AppResult<String> {
        Err(AppError::storage(format!("Injected write failure for {bucket}/{key}")))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> AppResult<StoredObject> {
        Err(AppError::not_found(format!("Object {bucket}/{key}")))
    }

    async fn delete_object(&self, _bucket: &str, _key: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Everything a handler test needs
pub struct TestHarness {
    pub ctx: AppContext,
    pub audit: AuditReceiver,
    pub invoker: Arc<RecordingInvoker>,
    pub objects: Arc<dyn ObjectStore>,
}

impl TestHarness {
    /// Entries emitted so far
    pub fn drain_audit(&mut self) -> Vec<AuditEntry> {
        let mut entries = Vec::new();
        while let Ok(entry) = self.audit.try_recv() {
            entries.push(entry);
        }
        entries
    }

    pub fn store(&self) -> &DataStore {
        self.ctx.store()
    }
}

pub async fn test_harness() -> TestHarness {
    harness_with(Arc::new(RecordingInvoker::new()), Arc::new(MemoryObjectStore::new())).await
}

pub async fn harness_with(invoker: Arc<RecordingInvoker>, objects: Arc<dyn ObjectStore>) -> TestHarness {
    let store = create_test_store().await;
    let (audit_logger, audit) = AuditLogger::channel();
    let config = ServerConfig {
        cors_allowed_origin: "https://admin.example.com".into(),
        ..ServerConfig::default()
    };
    let ctx = AppContext::new(
        Arc::new(config),
        store,
        audit_logger,
        objects.clone(),
        invoker.clone(),
    );
    TestHarness {
        ctx,
        audit,
        invoker,
        objects,
    }
}
