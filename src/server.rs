// ABOUTME: Local HTTP server exposing every handler under its REST path
// ABOUTME: Translates axum requests into invocation envelopes and envelopes back into responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Development server
//!
//! Gateway stand-in for running the functions locally. The authorizer
//! context is read from the `x-authorizer-claims` header as JSON, so the
//! same scope checks apply as behind the real gateway.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, RawPathParams, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::constants::headers;
use crate::context::AppContext;
use crate::errors::{AppError, AppResult};
use crate::handlers;
use crate::invocation::{CorsPolicy, InvocationRequest, InvocationResponse};
use crate::permissions::ScopeClaims;

/// Build an axum handler that dispatches to the named function
macro_rules! function {
    ($name:literal) => {
        |State(ctx): State<AppContext>,
         path: RawPathParams,
         Query(query): Query<HashMap<String, String>>,
         connect: Option<ConnectInfo<SocketAddr>>,
         request_headers: HeaderMap,
         body: Bytes| async move {
            invoke(&ctx, $name, &path, query, connect, &request_headers, body).await
        }
    };
}

/// Router with every handler mounted, CORS preflight, and request tracing
pub fn router(ctx: AppContext) -> Router {
    let cors = cors_layer(ctx.config());
    Router::new()
        .route("/health", get(health))
        .route("/routes", post(function!("create_route")))
        .route(
            "/routes/:routeId",
            get(function!("get_route")).delete(function!("delete_route")),
        )
        .route("/routes/:routeId/stops", put(function!("put_route_stops")))
        .route(
            "/events/:eventId/timetables",
            put(function!("put_event_timetables")),
        )
        .route(
            "/events/:eventId/image",
            get(function!("get_event_image")).post(function!("upload_event_image")),
        )
        .route(
            "/apps/:appId/pages/restore",
            post(function!("restore_app_pages")),
        )
        .route("/apps/:appId/domain", put(function!("update_app_domain")))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Preflight handling for the configured console origin.
///
/// A wildcard origin never allows credentials.
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static(headers::AUTHORIZER_CLAIMS),
            HeaderName::from_static(headers::REQUEST_ID),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]);

    let origin = config.cors_allowed_origin.trim();
    match HeaderValue::from_str(origin) {
        Ok(value) if CorsPolicy::new(origin).allows_credentials() => layer
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true),
        _ => layer.allow_origin(AllowOrigin::any()),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn not_found(State(ctx): State<AppContext>) -> Response {
    into_http(&InvocationResponse::error(
        &AppError::not_found("Route"),
        ctx.cors(),
    ))
}

async fn invoke(
    ctx: &AppContext,
    name: &'static str,
    path: &RawPathParams,
    query: HashMap<String, String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    request_headers: &HeaderMap,
    body: Bytes,
) -> Response {
    match envelope(path, query, connect, request_headers, body) {
        Ok(request) => into_http(&handlers::dispatch(ctx, name, request).await),
        Err(e) => {
            warn!(handler = name, error = %e, "Rejected malformed request");
            into_http(&InvocationResponse::error(&e, ctx.cors()))
        }
    }
}

/// Build the invocation envelope the gateway would have sent
fn envelope(
    path: &RawPathParams,
    query: HashMap<String, String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    request_headers: &HeaderMap,
    body: Bytes,
) -> AppResult<InvocationRequest> {
    let mut request = InvocationRequest::new();
    for (name, value) in path {
        request = request.with_path(name, value);
    }
    if !query.is_empty() {
        request.query_string_parameters = Some(query);
    }

    if let Some(raw) = header_str(request_headers, headers::AUTHORIZER_CLAIMS) {
        let claims: ScopeClaims = serde_json::from_str(raw).map_err(|e| {
            AppError::invalid_input(format!("Invalid {} header: {e}", headers::AUTHORIZER_CLAIMS))
        })?;
        request = request.with_claims(claims);
    }
    if let Some(request_id) = header_str(request_headers, headers::REQUEST_ID) {
        request = request.with_request_id(request_id);
    }

    let forwarded = header_str(request_headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_owned());
    if let Some(ip) = forwarded.or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string())) {
        request = request.with_source_ip(ip);
    }

    if !body.is_empty() {
        match String::from_utf8(body.to_vec()) {
            Ok(text) => request.body = Some(text),
            Err(_) => {
                request.body = Some(general_purpose::STANDARD.encode(&body));
                request.is_base64_encoded = true;
            }
        }
    }
    Ok(request)
}

fn header_str<'a>(request_headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request_headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
}

/// Convert an envelope into an HTTP response
fn into_http(envelope: &InvocationResponse) -> Response {
    let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match envelope.body_bytes() {
        Ok(bytes) => bytes,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let response_headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response_headers.insert(name, value);
        }
    }
    response
}

/// Serve `ctx` on `port` until Ctrl-C
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails
pub async fn serve(ctx: AppContext, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(port, "Development server listening");
    axum::serve(
        listener,
        router(ctx).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler failed");
        }
    })
    .await?;
    info!("Development server stopped");
    Ok(())
}
