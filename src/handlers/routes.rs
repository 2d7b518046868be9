// ABOUTME: Bus route read, create and delete handlers
// ABOUTME: Duplicate names in a project are conflicts; deleting a missing route is not found
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use super::route_stops::{replace_stops, StopSpec};
use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::invocation::{InvocationRequest, Reply};
use crate::models::FieldChange;

/// Stored bus route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusRoute {
    /// Route ID
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Route name, unique per project
    pub name: String,
}

/// Stored stop of a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusRouteStop {
    /// Stop ID
    pub id: i64,
    /// Served way
    pub way_id: i64,
    /// Zero-based order
    pub position: i64,
    /// Scheduled time
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRouteBody {
    project_id: Option<i64>,
    name: Option<String>,
    #[serde(default)]
    stops: Option<Vec<StopSpec>>,
}

async fn find_route(
    tx: &mut StoreTransaction,
    project_id: i64,
    route_id: i64,
) -> AppResult<Option<BusRoute>> {
    let route = sqlx::query_as::<_, BusRoute>(
        "SELECT id, project_id, name FROM bus_routes WHERE id = ? AND project_id = ?",
    )
    .bind(route_id)
    .bind(project_id)
    .fetch_optional(tx.executor()?)
    .await?;
    Ok(route)
}

/// `GET /routes/{routeId}`: the route and its ordered stops
///
/// # Errors
///
/// 403 outside the caller's projects, 404 when the route is not in the project
pub async fn get_route(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let route_id = request.path_i64("routeId")?;
    let project_id = request
        .claims()
        .require_project(request.query_i64("projectId")?)?;

    let mut tx = ctx.store().begin().await?;
    let work = load_route_with_stops(&mut tx, project_id, route_id).await;
    let (route, stops) = tx.finish(work).await?;

    Ok(Reply::ok(json!({ "route": route, "stops": stops })))
}

async fn load_route_with_stops(
    tx: &mut StoreTransaction,
    project_id: i64,
    route_id: i64,
) -> AppResult<(BusRoute, Vec<BusRouteStop>)> {
    let route = find_route(tx, project_id, route_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Route {route_id}")))?;
    let stops = sqlx::query_as::<_, BusRouteStop>(
        "SELECT id, way_id, position, scheduled_time FROM bus_route_stops
         WHERE route_id = ? ORDER BY position, id",
    )
    .bind(route_id)
    .fetch_all(tx.executor()?)
    .await?;
    Ok((route, stops))
}

/// `POST /routes`: create a route, optionally with stops
///
/// # Errors
///
/// 400 without a name, 403 outside the caller's projects, 404 for an unknown
/// project, 409 when the name is taken in the project
pub async fn create_route(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let body: CreateRouteBody = request.json_body()?;
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::missing_field("name"))?
        .to_owned();
    let draft = audit_draft(request, format!("bus_route:{name}"), "create_route")
        .with_scope(body.project_id);

    let outcome = async {
        let project_id = request.claims().require_project(body.project_id)?;

        let mut tx = ctx.store().begin().await?;
        let work = insert_route(&mut tx, project_id, &name, body.stops.as_deref()).await;
        let (route, stops) = tx.finish(work).await?;

        Ok::<_, AppError>(Mutation::new(
            Reply::created(json!({ "route": route, "stops": stops })),
            Some(FieldChange::new("name", Value::Null, Value::from(name.as_str()))),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn insert_route(
    tx: &mut StoreTransaction,
    project_id: i64,
    name: &str,
    stops: Option<&[StopSpec]>,
) -> AppResult<(BusRoute, Value)> {
    lock_row(tx, "projects", "id", &SqlValue::Integer(project_id)).await?;

    let existing = tx
        .query(
            "SELECT id FROM bus_routes WHERE project_id = ? AND name = ?",
            &[SqlValue::Integer(project_id), SqlValue::from(name)],
        )
        .await?;
    if !existing.is_empty() {
        return Err(AppError::conflict(format!(
            "Route {name:?} already exists in project {project_id}"
        )));
    }

    let id = tx
        .insert(
            "INSERT INTO bus_routes (project_id, name) VALUES (?, ?)",
            &[SqlValue::Integer(project_id), SqlValue::from(name)],
        )
        .await?;

    let stops = match stops {
        Some(stops) => replace_stops(tx, project_id, id, stops).await?.rows_json(),
        None => Value::Array(Vec::new()),
    };

    Ok((
        BusRoute {
            id,
            project_id,
            name: name.to_owned(),
        },
        stops,
    ))
}

/// `DELETE /routes/{routeId}`; stops cascade
///
/// # Errors
///
/// 403 outside the caller's projects, 404 when nothing was deleted
pub async fn delete_route(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let route_id = request.path_i64("routeId")?;
    let requested_project = request.query_i64("projectId")?;
    let draft = audit_draft(request, format!("bus_route:{route_id}"), "delete_route")
        .with_scope(requested_project);

    let outcome = async {
        let project_id = request.claims().require_project(requested_project)?;

        let mut tx = ctx.store().begin().await?;
        let work = remove_route(&mut tx, project_id, route_id).await;
        let route = tx.finish(work).await?;

        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({ "deleted": true, "routeId": route_id })),
            Some(FieldChange::new(
                "route",
                serde_json::to_value(&route)?,
                Value::Null,
            )),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn remove_route(tx: &mut StoreTransaction, project_id: i64, route_id: i64) -> AppResult<BusRoute> {
    let before = find_route(tx, project_id, route_id).await?;
    let affected = tx
        .execute(
            "DELETE FROM bus_routes WHERE id = ? AND project_id = ?",
            &[SqlValue::Integer(route_id), SqlValue::Integer(project_id)],
        )
        .await?;
    match before {
        Some(route) if affected > 0 => Ok(route),
        _ => Err(AppError::not_found(format!("Route {route_id}"))),
    }
}
