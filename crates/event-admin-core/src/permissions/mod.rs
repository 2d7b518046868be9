// ABOUTME: Scope claims carried by the authorizer context and the allow-list check
// ABOUTME: Decides whether a caller may act on a requested project or event id
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Scope Authorization
//!
//! Callers arrive with a pre-validated claims bag. The bag may restrict the
//! project and event ids the caller can act on. An absent or empty allow-list
//! means the claim imposes no restriction; a populated one is a membership test.

use std::collections::BTreeSet;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Allow-list membership test.
///
/// Returns `false` when no scope id was requested. Otherwise returns `true`
/// when the claim is absent or empty, and a membership result when it is populated.
#[must_use]
pub fn is_authorized(claim_scope_ids: Option<&BTreeSet<i64>>, requested_scope_id: Option<i64>) -> bool {
    let Some(requested) = requested_scope_id else {
        return false;
    };
    match claim_scope_ids {
        Some(allowed) if !allowed.is_empty() => allowed.contains(&requested),
        _ => true,
    }
}

/// Claims extracted from the authorizer context of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeClaims {
    /// Caller user ID
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub user_id: Option<String>,
    /// Caller role
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub role_id: Option<i64>,
    /// Projects the caller may act on
    #[serde(default, deserialize_with = "deserialize_id_list")]
    pub project_ids: Option<BTreeSet<i64>>,
    /// Events the caller may act on
    #[serde(default, deserialize_with = "deserialize_id_list")]
    pub event_ids: Option<BTreeSet<i64>>,
}

impl ScopeClaims {
    /// Require that `project_id` is present and allowed
    ///
    /// # Errors
    ///
    /// Returns `MissingRequiredField` when no project id was supplied and
    /// `PermissionDenied` when the id is outside the caller's allow-list.
    pub fn require_project(&self, project_id: Option<i64>) -> AppResult<i64> {
        Self::require("projectId", self.project_ids.as_ref(), project_id)
    }

    /// Require that `event_id` is present and allowed
    ///
    /// # Errors
    ///
    /// Returns `MissingRequiredField` when no event id was supplied and
    /// `PermissionDenied` when the id is outside the caller's allow-list.
    pub fn require_event(&self, event_id: Option<i64>) -> AppResult<i64> {
        Self::require("eventId", self.event_ids.as_ref(), event_id)
    }

    fn require(field: &str, allowed: Option<&BTreeSet<i64>>, requested: Option<i64>) -> AppResult<i64> {
        let Some(id) = requested else {
            return Err(AppError::missing_field(field));
        };
        if is_authorized(allowed, Some(id)) {
            Ok(id)
        } else {
            tracing::warn!(field, requested = id, "Scope not in caller allow-list");
            Err(AppError::permission_denied(format!(
                "{field} {id} is outside the caller's scope"
            )))
        }
    }
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => parse_id(&v)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid id: {v}"))),
    }
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Accepts a JSON array, a JSON-encoded array string, or a comma-separated string
fn deserialize_id_list<'de, D>(deserializer: D) -> Result<Option<BTreeSet<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str::<Vec<Value>>(trimmed).map_err(de::Error::custom)?
            } else {
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::String(part.to_owned()))
                    .collect()
            }
        }
        Some(number @ Value::Number(_)) => vec![number],
        Some(other) => return Err(de::Error::custom(format!("invalid id list: {other}"))),
    };

    items
        .iter()
        .map(|item| parse_id(item).ok_or_else(|| de::Error::custom(format!("invalid id: {item}"))))
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}
