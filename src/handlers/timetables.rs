// ABOUTME: Reconciles which bus timetables an event offers, and in what order
// ABOUTME: Event-scoped: the caller's event allow-list gates the call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::invocation::{InvocationRequest, Reply};
use crate::reconcile::{reconcile, ChildTable, Column, DesiredChild, NaturalKey, ReconciliationResult};

/// Timetables attached to an event
pub const EVENT_TIMETABLES: ChildTable = ChildTable {
    table: "event_bus_timetables",
    primary_key: "id",
    parent_column: "event_id",
    key: Column::integer("timetable_id"),
    position: Some("position"),
    payload: &[],
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimetableSpec {
    timetable_id: Value,
    #[serde(default)]
    position: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutTimetablesBody {
    #[serde(default)]
    timetables: Option<Vec<TimetableSpec>>,
}

/// `PUT /events/{eventId}/timetables`
///
/// # Errors
///
/// 400 for a missing list or timetables from another project, 403 outside the
/// caller's events, 404 for an unknown event
pub async fn put_event_timetables(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let event_id = request.path_i64("eventId")?;
    let body: PutTimetablesBody = request.json_body()?;
    let draft = audit_draft(request, format!("event:{event_id}"), "replace_timetables")
        .with_scope(Some(event_id));

    let outcome = async {
        request.claims().require_event(Some(event_id))?;
        let specs = body
            .timetables
            .as_deref()
            .ok_or_else(|| AppError::missing_field("timetables"))?;
        let desired: Vec<DesiredChild> = specs
            .iter()
            .map(|spec| {
                let child = DesiredChild::new(SqlValue::from_json(&spec.timetable_id));
                match spec.position {
                    Some(position) => child.at_position(position),
                    None => child,
                }
            })
            .collect();

        let mut tx = ctx.store().begin().await?;
        let work = replace_timetables(&mut tx, event_id, &desired).await;
        let result = tx.finish(work).await?;

        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({ "eventId": event_id, "timetables": result.to_json() })),
            Some(result.change("timetables")),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn replace_timetables(
    tx: &mut StoreTransaction,
    event_id: i64,
    desired: &[DesiredChild],
) -> AppResult<ReconciliationResult> {
    let event = SqlValue::Integer(event_id);
    lock_row(tx, "events", "id", &event).await?;

    if !desired.is_empty() {
        let rows = tx
            .query(
                "SELECT t.id FROM bus_timetables t
                 JOIN events e ON e.project_id = t.project_id
                 WHERE e.id = ?",
                std::slice::from_ref(&event),
            )
            .await?;
        let available: BTreeSet<i64> = rows.iter().filter_map(|row| row.get_i64("id")).collect();
        for child in desired {
            if let NaturalKey::Integer(id) = NaturalKey::from_value(&EVENT_TIMETABLES.key, &child.key)? {
                if !available.contains(&id) {
                    return Err(AppError::invalid_input(format!(
                        "Timetable {id} is not available to event {event_id}"
                    )));
                }
            }
        }
    }

    reconcile(tx, &EVENT_TIMETABLES, &event, desired).await
}
