// ABOUTME: Audit entry and field change models
// ABOUTME: Serialized onto the audit channel and forwarded to the audit log writer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::audit::{RESULT_FAILURE, RESULT_SUCCESS};

/// A single field-level change captured around a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    /// Name of the changed field or collection
    pub field_name: String,
    /// Value before the mutation
    pub before_value: Value,
    /// Value after the mutation
    pub after_value: Value,
}

impl FieldChange {
    /// Create a change record
    pub fn new(field_name: impl Into<String>, before_value: Value, after_value: Value) -> Self {
        Self {
            field_name: field_name.into(),
            before_value,
            after_value,
        }
    }

    /// Whether the before and after values differ
    #[must_use]
    pub fn is_effective(&self) -> bool {
        self.before_value != self.after_value
    }
}

/// One audit record: who did what to which target, and how it ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Target resource (for example `bus_route:12`)
    pub target: String,
    /// Action performed (for example `replace_stops`)
    pub action: String,
    /// `success` or `failure`
    pub result: String,
    /// HTTP status returned to the caller
    pub status_code: u16,
    /// Caller IP address
    pub ip_address: Option<String>,
    /// Caller user ID from the claims
    pub actor_id: Option<String>,
    /// Project or event the action was scoped to
    pub scope_id: Option<i64>,
    /// Field-level change, when the action produced one
    #[serde(flatten)]
    pub change: Option<FieldChange>,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Whether the audited action succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result == RESULT_SUCCESS
    }
}

/// Audit context captured before the transactional work starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    /// Target resource
    pub target: String,
    /// Action performed
    pub action: String,
    /// Caller IP address
    pub ip_address: Option<String>,
    /// Caller user ID
    pub actor_id: Option<String>,
    /// Scope the action is bound to
    pub scope_id: Option<i64>,
}

impl AuditDraft {
    /// Start a draft for `action` on `target`
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            ip_address: None,
            actor_id: None,
            scope_id: None,
        }
    }

    /// Record the caller identity
    #[must_use]
    pub fn with_caller(mut self, actor_id: Option<String>, ip_address: Option<String>) -> Self {
        self.actor_id = actor_id;
        self.ip_address = ip_address;
        self
    }

    /// Record the scope
    #[must_use]
    pub fn with_scope(mut self, scope_id: Option<i64>) -> Self {
        self.scope_id = scope_id;
        self
    }

    /// Resolve into a successful entry
    #[must_use]
    pub fn succeeded(self, status_code: u16, change: Option<FieldChange>) -> AuditEntry {
        self.finish(RESULT_SUCCESS, status_code, change)
    }

    /// Resolve into a failed entry
    #[must_use]
    pub fn failed(self, status_code: u16) -> AuditEntry {
        self.finish(RESULT_FAILURE, status_code, None)
    }

    fn finish(self, result: &str, status_code: u16, change: Option<FieldChange>) -> AuditEntry {
        AuditEntry {
            target: self.target,
            action: self.action,
            result: result.to_owned(),
            status_code,
            ip_address: self.ip_address,
            actor_id: self.actor_id,
            scope_id: self.scope_id,
            change,
            recorded_at: Utc::now(),
        }
    }
}
