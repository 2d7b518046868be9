// ABOUTME: Replaces the ordered stop list of a bus route in one transaction
// ABOUTME: Locks the route, checks referenced ways, then reconciles bus_route_stops
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_scoped_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::invocation::{InvocationRequest, Reply};
use crate::reconcile::{reconcile, ChildTable, Column, DesiredChild, NaturalKey, ReconciliationResult};

/// Stops of a bus route, keyed by the way they serve
pub const ROUTE_STOPS: ChildTable = ChildTable {
    table: "bus_route_stops",
    primary_key: "id",
    parent_column: "route_id",
    key: Column::integer("way_id"),
    position: Some("position"),
    payload: &[Column::text("scheduled_time")],
};

/// One desired stop
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSpec {
    /// Way served by the stop; numbers and numeric strings are both accepted
    pub way_id: Value,
    /// Explicit position
    #[serde(default)]
    pub position: Option<i64>,
    /// Scheduled time, `HH:MM`
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

impl StopSpec {
    fn to_desired(&self) -> DesiredChild {
        let child = DesiredChild::new(SqlValue::from_json(&self.way_id))
            .with_field("scheduled_time", self.scheduled_time.clone());
        match self.position {
            Some(position) => child.at_position(position),
            None => child,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutStopsBody {
    project_id: Option<i64>,
    #[serde(default)]
    stops: Option<Vec<StopSpec>>,
}

/// `PUT /routes/{routeId}/stops`
///
/// # Errors
///
/// 400 for a missing `stops` list or unknown ways, 403 outside the caller's
/// projects, 404 when the route is not in the project
pub async fn put_route_stops(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let route_id = request.path_i64("routeId")?;
    let body: PutStopsBody = request.json_body()?;
    let draft = audit_draft(request, format!("bus_route:{route_id}"), "replace_stops")
        .with_scope(body.project_id);

    let outcome = async {
        let project_id = request.claims().require_project(body.project_id)?;
        let stops = body.stops.as_deref().ok_or_else(|| AppError::missing_field("stops"))?;

        let mut tx = ctx.store().begin().await?;
        let work = replace_stops(&mut tx, project_id, route_id, stops).await;
        let result = tx.finish(work).await?;

        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({ "routeId": route_id, "stops": result.to_json() })),
            Some(result.change("stops")),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

/// Lock the route and reconcile its stops inside `tx`
pub(crate) async fn replace_stops(
    tx: &mut StoreTransaction,
    project_id: i64,
    route_id: i64,
    stops: &[StopSpec],
) -> AppResult<ReconciliationResult> {
    lock_scoped_row(
        tx,
        "bus_routes",
        "id",
        &SqlValue::Integer(route_id),
        "project_id",
        &SqlValue::Integer(project_id),
    )
    .await?;

    let desired: Vec<DesiredChild> = stops.iter().map(StopSpec::to_desired).collect();
    ensure_ways_in_project(tx, project_id, &desired).await?;

    reconcile(tx, &ROUTE_STOPS, &SqlValue::Integer(route_id), &desired).await
}

async fn ensure_ways_in_project(
    tx: &mut StoreTransaction,
    project_id: i64,
    desired: &[DesiredChild],
) -> AppResult<()> {
    if desired.is_empty() {
        return Ok(());
    }
    let rows = tx
        .query(
            "SELECT id FROM bus_ways WHERE project_id = ?",
            &[SqlValue::Integer(project_id)],
        )
        .await?;
    let known: BTreeSet<i64> = rows.iter().filter_map(|row| row.get_i64("id")).collect();

    for child in desired {
        if let NaturalKey::Integer(way_id) = NaturalKey::from_value(&ROUTE_STOPS.key, &child.key)? {
            if !known.contains(&way_id) {
                return Err(AppError::invalid_input(format!(
                    "Way {way_id} does not belong to project {project_id}"
                )));
            }
        }
    }
    Ok(())
}
