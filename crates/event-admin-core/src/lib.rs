// ABOUTME: Core types for the event admin console functions
// ABOUTME: Foundation crate with error handling, scope claims, audit models, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

#![deny(unsafe_code)]

//! # Event Admin Core
//!
//! Shared types for the event admin console functions. This crate changes
//! rarely so the handler crate recompiles independently of it.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode` and the JSON error body returned to callers
//! - **constants**: header names, default function names and environment keys
//! - **models**: audit entries and field-level changes
//! - **permissions**: scope claims and the allow-list authorization check

/// Unified error handling with standard error codes and HTTP status mapping
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Audit models shared by handlers and the audit dispatcher
pub mod models;

/// Scope claims and allow-list authorization
pub mod permissions;
