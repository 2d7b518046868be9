// ABOUTME: Boundary collaborators: object storage and sibling function invocation
// ABOUTME: Trait seams with filesystem, in-memory, HTTP and logging implementations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! External collaborators
//!
//! Handlers only see the [`ObjectStore`] and [`TaskInvoker`] traits; the
//! concrete implementations are chosen once when the application context is
//! built.

/// Sibling function invocation
pub mod invoker;
/// Blob storage
pub mod object_store;

pub use invoker::{HttpTaskInvoker, InvocationMode, LoggingInvoker, TaskInvoker};
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectStore, StoredObject};
