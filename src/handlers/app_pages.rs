// ABOUTME: Rebuilds an app's page layout from a saved history snapshot
// ABOUTME: Reconciles app_pages against the snapshot, then fires the deploy trigger after commit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_scoped_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::external::InvocationMode;
use crate::invocation::{InvocationRequest, Reply};
use crate::reconcile::{reconcile, ChildTable, Column, DesiredChild, ReconciliationResult};

/// Pages of an app, keyed by their page key
pub const APP_PAGES: ChildTable = ChildTable {
    table: "app_pages",
    primary_key: "id",
    parent_column: "app_id",
    key: Column::text("page_key"),
    position: Some("position"),
    payload: &[Column::text("title"), Column::text("layout")],
};

/// A page as stored in a history snapshot
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Page key, unique per app
    pub page_key: Value,
    /// Explicit position
    #[serde(default)]
    pub position: Option<i64>,
    /// Page title
    #[serde(default)]
    pub title: Option<String>,
    /// Layout document; stored as JSON text
    #[serde(default)]
    pub layout: Value,
}

impl PageSnapshot {
    fn to_desired(&self) -> DesiredChild {
        let child = DesiredChild::new(SqlValue::from_json(&self.page_key))
            .with_field("title", self.title.clone())
            .with_field("layout", SqlValue::from_json(&self.layout));
        match self.position {
            Some(position) => child.at_position(position),
            None => child,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Pages(Vec<PageSnapshot>),
    Wrapped { pages: Vec<PageSnapshot> },
}

impl Snapshot {
    fn into_pages(self) -> Vec<PageSnapshot> {
        match self {
            Self::Pages(pages) | Self::Wrapped { pages } => pages,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreBody {
    project_id: Option<i64>,
    history_id: Option<i64>,
}

/// `POST /apps/{appId}/pages/restore`
///
/// # Errors
///
/// 400 without a history id, 403 outside the caller's projects, 404 for an
/// unknown app or snapshot, 500 for an unreadable snapshot
pub async fn restore_app_pages(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let app_id = request.path_i64("appId")?;
    let body: RestoreBody = request.json_body()?;
    let draft = audit_draft(request, format!("app:{app_id}"), "restore_pages")
        .with_scope(body.project_id);

    let outcome = async {
        let project_id = request.claims().require_project(body.project_id)?;
        let history_id = body
            .history_id
            .ok_or_else(|| AppError::missing_field("historyId"))?;

        let mut tx = ctx.store().begin().await?;
        let work = restore_pages(&mut tx, project_id, app_id, history_id).await;
        let result = tx.finish(work).await?;

        trigger_deploy(ctx, project_id, app_id, history_id).await;

        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({
                "appId": app_id,
                "historyId": history_id,
                "pages": result.to_json(),
            })),
            Some(result.change("pages")),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn restore_pages(
    tx: &mut StoreTransaction,
    project_id: i64,
    app_id: i64,
    history_id: i64,
) -> AppResult<ReconciliationResult> {
    let app = SqlValue::Integer(app_id);
    lock_scoped_row(tx, "apps", "id", &app, "project_id", &SqlValue::Integer(project_id)).await?;

    let rows = tx
        .query(
            "SELECT snapshot FROM app_page_history WHERE id = ? AND app_id = ?",
            &[SqlValue::Integer(history_id), app.clone()],
        )
        .await?;
    let snapshot = rows
        .first()
        .and_then(|row| row.get("snapshot"))
        .and_then(SqlValue::as_str)
        .ok_or_else(|| AppError::not_found(format!("Page history {history_id} of app {app_id}")))?;

    let pages = serde_json::from_str::<Snapshot>(snapshot)
        .map_err(|e| {
            AppError::serialization(format!("Page history {history_id} is unreadable: {e}"))
        })?
        .into_pages();
    let desired: Vec<DesiredChild> = pages.iter().map(PageSnapshot::to_desired).collect();

    reconcile(tx, &APP_PAGES, &app, &desired).await
}

async fn trigger_deploy(ctx: &AppContext, project_id: i64, app_id: i64, history_id: i64) {
    let payload = json!({
        "projectId": project_id,
        "appId": app_id,
        "historyId": history_id,
        "reason": "restore_pages",
    });
    if let Err(e) = ctx
        .invoker()
        .invoke(&ctx.config().functions.deploy, payload, InvocationMode::FireAndForget)
        .await
    {
        warn!(app_id, error = %e, "Deploy trigger failed after page restore");
    }
}
