// ABOUTME: Custom domain updates for apps
// ABOUTME: DNS provisioning runs inside the transaction so a provisioning failure rolls the update back
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_scoped_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::external::{InvocationMode, TaskInvoker};
use crate::invocation::{InvocationRequest, Reply};
use crate::models::FieldChange;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainBody {
    project_id: Option<i64>,
    domain: Option<String>,
}

/// Normalize and validate a host name: lowercase, at least two labels, each
/// label alphanumeric with inner hyphens
///
/// # Errors
///
/// Returns `InvalidInput` for anything that is not a plain DNS host name
pub fn normalize_domain(raw: &str) -> AppResult<String> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();
    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if domain.len() <= MAX_DOMAIN_LEN && labels.len() >= 2 && labels.iter().all(valid_label) {
        Ok(domain)
    } else {
        Err(AppError::invalid_input(format!("Invalid domain {raw:?}")))
    }
}

/// `PUT /apps/{appId}/domain`
///
/// # Errors
///
/// 400 for a malformed domain, 403 outside the caller's projects, 404 for an
/// unknown app, 409 when another app owns the domain, 500 when DNS
/// provisioning fails
pub async fn update_app_domain(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let app_id = request.path_i64("appId")?;
    let body: DomainBody = request.json_body()?;
    let draft =
        audit_draft(request, format!("app:{app_id}"), "update_domain").with_scope(body.project_id);

    let outcome = async {
        let project_id = request.claims().require_project(body.project_id)?;
        let domain = normalize_domain(
            body.domain
                .as_deref()
                .ok_or_else(|| AppError::missing_field("domain"))?,
        )?;

        let mut tx = ctx.store().begin().await?;
        let work = assign_domain(
            &mut tx,
            ctx.invoker(),
            &ctx.config().functions.dns,
            project_id,
            app_id,
            &domain,
        )
        .await;
        let (previous, dns) = tx.finish(work).await?;

        let change = (previous.as_deref() != Some(domain.as_str())).then(|| {
            FieldChange::new(
                "domain",
                previous.clone().map_or(Value::Null, Value::from),
                Value::from(domain.as_str()),
            )
        });
        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({
                "appId": app_id,
                "domain": domain,
                "previousDomain": previous,
                "dns": dns,
            })),
            change,
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn assign_domain(
    tx: &mut StoreTransaction,
    invoker: &dyn TaskInvoker,
    dns_function: &str,
    project_id: i64,
    app_id: i64,
    domain: &str,
) -> AppResult<(Option<String>, Value)> {
    let app = SqlValue::Integer(app_id);
    lock_scoped_row(tx, "apps", "id", &app, "project_id", &SqlValue::Integer(project_id)).await?;

    let rows = tx
        .query("SELECT domain FROM apps WHERE id = ?", std::slice::from_ref(&app))
        .await?;
    let previous = rows
        .first()
        .and_then(|row| row.get("domain"))
        .and_then(SqlValue::as_str)
        .map(ToOwned::to_owned);
    if previous.as_deref() == Some(domain) {
        return Ok((previous, Value::Null));
    }

    tx.execute(
        "UPDATE apps SET domain = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        &[SqlValue::from(domain), app],
    )
    .await?;

    let payload = json!({
        "projectId": project_id,
        "appId": app_id,
        "domain": domain,
        "previousDomain": previous,
    });
    let dns = invoker
        .invoke(dns_function, payload, InvocationMode::WaitForResult)
        .await?
        .unwrap_or(Value::Null);

    info!(app_id, domain, "App domain provisioned");
    Ok((previous, dns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("Fest.Example.COM").unwrap(), "fest.example.com");
        assert_eq!(normalize_domain(" a-b.example.org. ").unwrap(), "a-b.example.org");

        for bad in ["", "localhost", "-a.example.com", "a_b.example.com", "a..com", "exa mple.com"] {
            assert!(normalize_domain(bad).is_err(), "{bad} should be rejected");
        }
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(normalize_domain(&long_label).is_err());
    }
}
