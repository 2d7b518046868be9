// ABOUTME: Request handlers for the admin console and the name-based dispatcher
// ABOUTME: Each mutating handler authorizes, runs in one transaction, then emits an audit entry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Request Handlers
//!
//! Every mutating handler follows the same shape:
//!
//! 1. parse and validate the envelope
//! 2. check the caller's scope claims (403 before any store access)
//! 3. begin a transaction, do the work, then commit on success or roll back
//!    on failure through [`StoreTransaction::finish`](crate::database::StoreTransaction::finish)
//! 4. emit one audit entry, outside the transaction
//! 5. build the response with CORS headers

/// Custom app domain updates with DNS provisioning
pub mod app_domains;
/// App page restoration from history snapshots
pub mod app_pages;
/// Event image upload and download
pub mod event_images;
/// Bus route stop replacement
pub mod route_stops;
/// Bus route CRUD
pub mod routes;
/// Event to bus timetable mapping
pub mod timetables;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::AppContext;
use crate::errors::{AppError, AppResult};
use crate::invocation::{InvocationRequest, InvocationResponse, Reply};
use crate::models::{AuditDraft, FieldChange};

/// Names accepted by [`dispatch`]
pub const HANDLER_NAMES: &[&str] = &[
    "get_route",
    "create_route",
    "delete_route",
    "put_route_stops",
    "put_event_timetables",
    "restore_app_pages",
    "upload_event_image",
    "get_event_image",
    "update_app_domain",
];

/// Run the handler registered under `name`.
///
/// Never fails: errors become error responses, and every response carries
/// the context's CORS headers.
pub async fn dispatch(ctx: &AppContext, name: &str, request: InvocationRequest) -> InvocationResponse {
    let request_id = request
        .request_id()
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);
    let span = info_span!("handler", handler = name, request_id = %request_id);

    async {
        let result = route(ctx, name, &request)
            .await
            .map_err(|e| e.with_request_id(request_id.clone()));
        match &result {
            Ok(reply) => info!(status = reply.status(), "Handler completed"),
            Err(e) => warn!(status = e.http_status(), error = %e, "Handler failed"),
        }
        InvocationResponse::from_result(result, ctx.cors())
    }
    .instrument(span)
    .await
}

async fn route(ctx: &AppContext, name: &str, request: &InvocationRequest) -> AppResult<Reply> {
    match name {
        "get_route" => routes::get_route(ctx, request).await,
        "create_route" => routes::create_route(ctx, request).await,
        "delete_route" => routes::delete_route(ctx, request).await,
        "put_route_stops" => route_stops::put_route_stops(ctx, request).await,
        "put_event_timetables" => timetables::put_event_timetables(ctx, request).await,
        "restore_app_pages" => app_pages::restore_app_pages(ctx, request).await,
        "upload_event_image" => event_images::upload_event_image(ctx, request).await,
        "get_event_image" => event_images::get_event_image(ctx, request).await,
        "update_app_domain" => app_domains::update_app_domain(ctx, request).await,
        other => Err(AppError::not_found(format!("Handler {other}"))),
    }
}

/// Successful mutation: the reply and the change worth auditing
pub(crate) struct Mutation {
    reply: Reply,
    change: Option<FieldChange>,
}

impl Mutation {
    pub(crate) const fn new(reply: Reply, change: Option<FieldChange>) -> Self {
        Self { reply, change }
    }
}

/// Audit context for `action` on `target`, attributed to the caller
pub(crate) fn audit_draft(request: &InvocationRequest, target: String, action: &str) -> AuditDraft {
    AuditDraft::new(target, action).with_caller(request.actor_id(), request.source_ip())
}

/// Emit the audit entry for a finished mutation and unwrap its reply
pub(crate) fn audited(ctx: &AppContext, draft: AuditDraft, outcome: AppResult<Mutation>) -> AppResult<Reply> {
    match outcome {
        Ok(Mutation { reply, change }) => {
            ctx.audit().emit(draft.succeeded(reply.status(), change));
            Ok(reply)
        }
        Err(error) => {
            ctx.audit().emit(draft.failed(error.http_status()));
            Err(error)
        }
    }
}
