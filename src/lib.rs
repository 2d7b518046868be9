// ABOUTME: Main library entry point for the event admin console functions
// ABOUTME: Transactional CRUD handlers built around a generic child-collection reconciliation engine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

#![deny(unsafe_code)]

//! # Event Admin
//!
//! Serverless-style handlers for an event and reservation admin console.
//! Each handler receives an [`InvocationRequest`](invocation::InvocationRequest),
//! checks the caller's scope claims, runs its work in one store transaction
//! and answers with an [`InvocationResponse`](invocation::InvocationResponse)
//! that always carries CORS headers.
//!
//! ## Architecture
//!
//! - **Reconcile**: converges a parent's child rows to a desired list,
//!   keeping ids of surviving rows
//! - **Database**: pooled store, transactions, parameterized execution
//! - **Audit**: fire-and-forget audit entries forwarded to a writer function
//! - **External**: object store and sibling function invocation
//! - **Handlers**: the request handlers and the name-based dispatcher
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use event_admin::config::{EnvConfigProvider, ServerConfig};
//! use event_admin::context::AppContext;
//! use event_admin::handlers;
//! use event_admin::invocation::InvocationRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let (ctx, dispatcher) = AppContext::bootstrap(config, &EnvConfigProvider).await?;
//!     dispatcher.spawn();
//!
//!     let request = InvocationRequest::new().with_path("routeId", 7).with_query("projectId", 1);
//!     let response = handlers::dispatch(&ctx, "get_route", request).await;
//!     println!("{}", response.status_code);
//!     Ok(())
//! }
//! ```

pub use event_admin_core::{constants, errors, models, permissions};

/// Fire-and-forget audit logging
pub mod audit;

/// Environment, database and secret configuration
pub mod config;

/// Process-lifetime dependencies shared by handlers
pub mod context;

/// Relational data store
pub mod database;

/// Object store and sibling function invocation
pub mod external;

/// Request handlers and dispatcher
pub mod handlers;

/// Invocation request and response envelopes
pub mod invocation;

/// Tracing subscriber setup
pub mod logging;

/// Child-collection reconciliation engine
pub mod reconcile;

/// Local development HTTP server
pub mod server;
