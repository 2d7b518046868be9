// ABOUTME: Event cover image upload and download through the object store
// ABOUTME: Upload writes the object inside the event transaction; the replaced object is removed after commit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{audit_draft, audited, Mutation};
use crate::context::AppContext;
use crate::database::{lock_row, SqlExecutor, SqlValue, StoreTransaction};
use crate::errors::{AppError, AppResult};
use crate::external::ObjectStore;
use crate::invocation::{InvocationRequest, Reply};
use crate::models::FieldChange;

/// Largest accepted decoded image
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Option<String>,
}

/// Validated upload
struct ImageUpload {
    key: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl ImageUpload {
    fn parse(event_id: i64, body: UploadBody) -> AppResult<Self> {
        let file_name = body
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::missing_field("fileName"))?;
        let content_type = body
            .content_type
            .ok_or_else(|| AppError::missing_field("contentType"))?;
        if !content_type.starts_with("image/") {
            return Err(AppError::invalid_input(format!(
                "Unsupported content type {content_type}"
            )));
        }
        let data = body.data.ok_or_else(|| AppError::missing_field("data"))?;
        let bytes = general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| AppError::invalid_input(format!("Image data is not valid base64: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::invalid_input("Image data is empty"));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::invalid_input(format!(
                "Image is {} bytes, limit is {MAX_IMAGE_BYTES}",
                bytes.len()
            )));
        }

        Ok(Self {
            key: format!("events/{event_id}/{}-{file_name}", Uuid::new_v4()),
            content_type,
            bytes,
        })
    }
}

/// Keep a file name safe to embed in an object key
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    base.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_owned()
}

/// `POST /events/{eventId}/image`
///
/// Body: `{ fileName, contentType, data }` with `data` base64 encoded.
///
/// # Errors
///
/// 400 for a malformed upload, 403 outside the caller's events, 404 for an
/// unknown event, 500 when the object store rejects the write
pub async fn upload_event_image(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let event_id = request.path_i64("eventId")?;
    let body: UploadBody = request.json_body()?;
    let draft =
        audit_draft(request, format!("event:{event_id}"), "upload_image").with_scope(Some(event_id));

    let outcome = async {
        request.claims().require_event(Some(event_id))?;
        let upload = ImageUpload::parse(event_id, body)?;
        let bucket = ctx.config().asset_bucket.as_str();

        let mut tx = ctx.store().begin().await?;
        let work = attach_image(&mut tx, ctx.object_store(), bucket, event_id, upload).await;
        let (previous, key, locator) = tx.finish(work).await?;

        if let Some(old_key) = previous.as_deref().filter(|old| *old != key) {
            if let Err(e) = ctx.object_store().delete_object(bucket, old_key).await {
                warn!(event_id, key = old_key, error = %e, "Replaced event image not deleted");
            }
        }

        Ok::<_, AppError>(Mutation::new(
            Reply::ok(json!({ "eventId": event_id, "imageKey": key, "locator": locator })),
            Some(FieldChange::new(
                "image_key",
                previous.map_or(Value::Null, Value::from),
                Value::from(key),
            )),
        ))
    }
    .await;

    audited(ctx, draft, outcome)
}

async fn attach_image(
    tx: &mut StoreTransaction,
    objects: &dyn ObjectStore,
    bucket: &str,
    event_id: i64,
    upload: ImageUpload,
) -> AppResult<(Option<String>, String, String)> {
    let event = SqlValue::Integer(event_id);
    lock_row(tx, "events", "id", &event).await?;
    let previous = current_image_key(tx, event_id).await?;

    let ImageUpload {
        key,
        content_type,
        bytes,
    } = upload;
    let locator = objects.put_object(bucket, &key, bytes, &content_type).await?;

    let updated = tx
        .execute(
            "UPDATE events SET image_key = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            &[SqlValue::from(key.as_str()), event],
        )
        .await;
    if let Err(e) = updated {
        if let Err(cleanup) = objects.delete_object(bucket, &key).await {
            warn!(event_id, key = %key, error = %cleanup, "Orphaned event image not deleted");
        }
        return Err(e);
    }

    debug!(event_id, key = %key, "Event image attached");
    Ok((previous, key, locator))
}

async fn current_image_key(tx: &mut StoreTransaction, event_id: i64) -> AppResult<Option<String>> {
    let rows = tx
        .query(
            "SELECT image_key FROM events WHERE id = ?",
            &[SqlValue::Integer(event_id)],
        )
        .await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("image_key"))
        .and_then(SqlValue::as_str)
        .map(ToOwned::to_owned))
}

/// `GET /events/{eventId}/image`: the stored image bytes
///
/// # Errors
///
/// 403 outside the caller's events, 404 when the event or its image is missing
pub async fn get_event_image(ctx: &AppContext, request: &InvocationRequest) -> AppResult<Reply> {
    let event_id = request.path_i64("eventId")?;
    request.claims().require_event(Some(event_id))?;

    let image_key: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_key FROM events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(ctx.store().pool())
            .await?;
    let key = image_key
        .ok_or_else(|| AppError::not_found(format!("Event {event_id}")))?
        .ok_or_else(|| AppError::not_found(format!("Image of event {event_id}")))?;

    let object = ctx
        .object_store()
        .get_object(&ctx.config().asset_bucket, &key)
        .await?;
    Ok(Reply::Binary {
        content_type: object.content_type,
        bytes: object.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("cover.png"), "cover.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("C:\\pics\\a.gif"), "a.gif");
    }

    #[test]
    fn test_upload_validation() {
        let body = |content_type: &str, data: &str| UploadBody {
            file_name: Some("a.png".into()),
            content_type: Some(content_type.into()),
            data: Some(data.into()),
        };

        let ok = ImageUpload::parse(7, body("image/png", "aGVsbG8=")).unwrap();
        assert!(ok.key.starts_with("events/7/"));
        assert!(ok.key.ends_with("-a.png"));
        assert_eq!(ok.bytes, b"hello");

        let err = ImageUpload::parse(7, body("text/plain", "aGVsbG8=")).err().unwrap();
        assert_eq!(err.http_status(), 400);
        let err = ImageUpload::parse(7, body("image/png", "not base64!")).err().unwrap();
        assert_eq!(err.http_status(), 400);
        let err = ImageUpload::parse(7, body("image/png", "")).err().unwrap();
        assert_eq!(err.http_status(), 400);
    }
}
