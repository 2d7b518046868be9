// ABOUTME: Integration tests for process bootstrap and audit delivery
// ABOUTME: Builds the production context against a temporary database file and a local function endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use common::{init_test_logging, RecordingInvoker};
use event_admin::audit::{AuditDispatcher, AuditLogger};
use event_admin::config::{DatabaseConfig, ServerConfig, StaticConfigProvider};
use event_admin::context::AppContext;
use event_admin::external::{HttpTaskInvoker, InvocationMode, TaskInvoker};
use event_admin::handlers::dispatch;
use event_admin::invocation::InvocationRequest;
use event_admin::models::AuditDraft;

#[tokio::test]
async fn test_bootstrap_migrates_file_database() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("admin.db");
    let config = ServerConfig {
        object_store_root: dir.path().join("objects"),
        ..ServerConfig::default()
    };
    let provider = StaticConfigProvider::new(DatabaseConfig::sqlite(db_path.display().to_string()));

    let (ctx, dispatcher) = AppContext::bootstrap(config, &provider).await.unwrap();
    let audit = dispatcher.spawn();

    let request = InvocationRequest::new().with_json(&json!({ "projectId": 1, "name": "Loop" }));
    let response = dispatch(&ctx, "create_route", request).await;
    assert_eq!(response.status_code, 404, "no project 1 in a fresh database");

    ctx.store().close().await;
    drop(ctx);
    let forwarded = tokio::time::timeout(Duration::from_secs(5), audit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forwarded, 1);
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_dispatcher_forwards_entries_to_audit_function() {
    let invoker = Arc::new(RecordingInvoker::new());
    let (logger, receiver) = AuditLogger::channel();
    let handle = AuditDispatcher::new(receiver, invoker.clone(), "write-audit-log").spawn();

    logger.emit(AuditDraft::new("app:3", "update_domain").with_scope(Some(9)).failed(500));
    drop(logger);
    assert_eq!(handle.await.unwrap(), 1);

    let calls = invoker.calls_to("write-audit-log");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].mode, InvocationMode::WaitForResult);
    assert_eq!(calls[0].payload["target"], "app:3");
    assert_eq!(calls[0].payload["result"], "failure");
    assert_eq!(calls[0].payload["scopeId"], 9);
}

type Received = Arc<Mutex<Vec<(String, Value)>>>;

/// Local function endpoint recording every POSTed payload by function name
async fn spawn_function_sink() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/:function", post(record_invocation))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

async fn record_invocation(
    State(received): State<Received>,
    Path(function): Path<String>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    received.lock().unwrap().push((function, payload));
    Json(json!({ "status": "ok" }))
}

fn received_by(received: &Received, function: &str) -> Vec<Value> {
    received
        .lock()
        .unwrap()
        .iter()
        .filter(|(name, _)| name == function)
        .map(|(_, payload)| payload.clone())
        .collect()
}

#[tokio::test]
async fn test_audit_entries_reach_writer_before_dispatcher_stops() {
    init_test_logging();
    let (base_url, received) = spawn_function_sink().await;
    let invoker = Arc::new(HttpTaskInvoker::new(base_url).unwrap());
    let (logger, receiver) = AuditLogger::channel();
    let handle = AuditDispatcher::new(receiver, invoker, "write-audit-log").spawn();

    for id in 0..5 {
        logger.emit(AuditDraft::new(format!("bus_route:{id}"), "delete_route").failed(404));
    }
    drop(logger);

    assert_eq!(handle.await.unwrap(), 5);
    let delivered = received_by(&received, "write-audit-log");
    assert_eq!(delivered.len(), 5);
    assert_eq!(delivered[0]["action"], "delete_route");
}

#[tokio::test]
async fn test_bootstrapped_context_delivers_audit_and_pending_invocations() {
    init_test_logging();
    let (base_url, received) = spawn_function_sink().await;
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        object_store_root: dir.path().join("objects"),
        function_invoke_url: Some(base_url),
        ..ServerConfig::default()
    };
    let provider = StaticConfigProvider::new(DatabaseConfig::sqlite(
        dir.path().join("admin.db").display().to_string(),
    ));

    let (ctx, dispatcher) = AppContext::bootstrap(config, &provider).await.unwrap();
    let audit = dispatcher.spawn();

    let request = InvocationRequest::new().with_json(&json!({ "projectId": 1, "name": "Loop" }));
    assert_eq!(dispatch(&ctx, "create_route", request).await.status_code, 404);
    ctx.invoker()
        .invoke(
            "trigger-app-deploy",
            json!({ "appId": 4, "reason": "restore_pages" }),
            InvocationMode::FireAndForget,
        )
        .await
        .unwrap();

    let invoker = ctx.invoker_handle();
    drop(ctx);
    assert_eq!(audit.await.unwrap(), 1);
    invoker.drain().await;

    assert_eq!(received_by(&received, "write-audit-log").len(), 1);
    let deploys = received_by(&received, "trigger-app-deploy");
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0]["appId"], 4);
}
