// ABOUTME: HTTP-style invocation envelope shared by every handler
// ABOUTME: Parses path, query, body and authorizer context; builds CORS-carrying responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::headers;
use crate::errors::{AppError, AppResult, ErrorResponse};
use crate::permissions::ScopeClaims;

/// Caller identity attached by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Caller IP address
    #[serde(default)]
    pub source_ip: Option<String>,
}

/// Gateway request context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Gateway request ID
    #[serde(default)]
    pub request_id: Option<String>,
    /// Pre-validated claims
    #[serde(default)]
    pub authorizer: Option<ScopeClaims>,
    /// Caller identity
    #[serde(default)]
    pub identity: Identity,
}

/// One handler invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// Path parameters (`routeId`, `eventId`, ...)
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    /// Query string parameters
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// Raw body
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64 encoded
    #[serde(default)]
    pub is_base64_encoded: bool,
    /// Gateway context
    #[serde(default)]
    pub request_context: RequestContext,
}

impl InvocationRequest {
    /// Empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path parameter
    #[must_use]
    pub fn with_path(mut self, name: &str, value: impl ToString) -> Self {
        self.path_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.to_owned(), value.to_string());
        self
    }

    /// Add a query parameter
    #[must_use]
    pub fn with_query(mut self, name: &str, value: impl ToString) -> Self {
        self.query_string_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.to_owned(), value.to_string());
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self.is_base64_encoded = false;
        self
    }

    /// Set the caller claims
    #[must_use]
    pub fn with_claims(mut self, claims: ScopeClaims) -> Self {
        self.request_context.authorizer = Some(claims);
        self
    }

    /// Set the caller IP
    #[must_use]
    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.request_context.identity.source_ip = Some(ip.into());
        self
    }

    /// Set the request ID
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_context.request_id = Some(request_id.into());
        self
    }

    /// Path parameter by name
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&str> {
        self.path_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    /// Query parameter by name
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    /// Required integer path parameter
    ///
    /// # Errors
    ///
    /// `MissingRequiredField` when absent, `InvalidInput` when not an integer
    pub fn path_i64(&self, name: &str) -> AppResult<i64> {
        let raw = self
            .path(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::missing_field(name))?;
        raw.trim()
            .parse()
            .map_err(|_| AppError::invalid_input(format!("{name} must be an integer, got {raw:?}")))
    }

    /// Optional integer query parameter
    ///
    /// # Errors
    ///
    /// `InvalidInput` when present but not an integer
    pub fn query_i64(&self, name: &str) -> AppResult<Option<i64>> {
        match self.query(name).map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                AppError::invalid_input(format!("{name} must be an integer, got {raw:?}"))
            }),
        }
    }

    /// Decoded body bytes
    ///
    /// # Errors
    ///
    /// `MissingRequiredField` when there is no body, `InvalidInput` for bad base64
    pub fn body_bytes(&self) -> AppResult<Vec<u8>> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| AppError::missing_field("body"))?;
        if self.is_base64_encoded {
            BASE64
                .decode(body.trim())
                .map_err(|e| AppError::invalid_input(format!("Body is not valid base64: {e}")))
        } else {
            Ok(body.as_bytes().to_vec())
        }
    }

    /// Body parsed as JSON into `T`
    ///
    /// # Errors
    ///
    /// `MissingRequiredField` when there is no body, `InvalidInput` when it
    /// does not parse
    pub fn json_body<T: DeserializeOwned>(&self) -> AppResult<T> {
        let bytes = self.body_bytes()?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::invalid_input(format!("Invalid request body: {e}")))
    }

    /// Caller claims; an absent authorizer means no claims
    #[must_use]
    pub fn claims(&self) -> ScopeClaims {
        self.request_context.authorizer.clone().unwrap_or_default()
    }

    /// Caller user ID
    #[must_use]
    pub fn actor_id(&self) -> Option<String> {
        self.request_context
            .authorizer
            .as_ref()
            .and_then(|claims| claims.user_id.clone())
    }

    /// Caller IP
    #[must_use]
    pub fn source_ip(&self) -> Option<String> {
        self.request_context.identity.source_ip.clone()
    }

    /// Gateway request ID
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_context.request_id.as_deref()
    }
}

/// CORS headers attached to every response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    allow_origin: String,
}

impl CorsPolicy {
    /// Policy allowing `allow_origin`
    pub fn new(allow_origin: impl Into<String>) -> Self {
        Self {
            allow_origin: allow_origin.into(),
        }
    }

    /// Credentials are only allowed for an explicit origin; browsers reject
    /// them alongside `*`
    #[must_use]
    pub fn allows_credentials(&self) -> bool {
        let origin = self.allow_origin.trim();
        !origin.is_empty() && origin != "*"
    }

    /// Header map with CORS and JSON content type
    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([
            (headers::ALLOW_ORIGIN.to_owned(), self.allow_origin.clone()),
            (
                headers::ALLOW_HEADERS.to_owned(),
                headers::DEFAULT_ALLOWED_HEADERS.to_owned(),
            ),
            (
                headers::ALLOW_METHODS.to_owned(),
                headers::DEFAULT_ALLOWED_METHODS.to_owned(),
            ),
            (headers::CONTENT_TYPE.to_owned(), headers::JSON.to_owned()),
        ]);
        if self.allows_credentials() {
            map.insert(headers::ALLOW_CREDENTIALS.to_owned(), "true".to_owned());
        }
        map
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::new("*")
    }
}

/// Successful handler output, before CORS and encoding are applied
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// JSON body
    Json {
        /// HTTP status
        status: u16,
        /// Body value
        body: Value,
    },
    /// Binary body, base64 encoded in the envelope
    Binary {
        /// MIME type
        content_type: String,
        /// Raw bytes
        bytes: Vec<u8>,
    },
}

impl Reply {
    /// 200 with a JSON body
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self::Json { status: 200, body }
    }

    /// 201 with a JSON body
    #[must_use]
    pub const fn created(body: Value) -> Self {
        Self::Json { status: 201, body }
    }

    /// HTTP status of this reply
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Json { status, .. } => *status,
            Self::Binary { .. } => 200,
        }
    }
}

/// Handler response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// HTTP status
    pub status_code: u16,
    /// Response headers, always including CORS
    pub headers: BTreeMap<String, String>,
    /// JSON string, or base64 when `is_base64_encoded`
    pub body: String,
    /// Whether `body` is base64 encoded
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl InvocationResponse {
    /// JSON response
    #[must_use]
    pub fn json(status_code: u16, body: &Value, cors: &CorsPolicy) -> Self {
        Self {
            status_code,
            headers: cors.headers(),
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }

    /// Error response carrying an [`ErrorResponse`] body
    #[must_use]
    pub fn error(error: &AppError, cors: &CorsPolicy) -> Self {
        let body = serde_json::to_value(ErrorResponse::from(error)).unwrap_or_else(|_| {
            serde_json::json!({ "error": { "message": error.message } })
        });
        Self::json(error.http_status(), &body, cors)
    }

    /// Response for a handler outcome
    #[must_use]
    pub fn from_result(result: AppResult<Reply>, cors: &CorsPolicy) -> Self {
        match result {
            Ok(Reply::Json { status, body }) => Self::json(status, &body, cors),
            Ok(Reply::Binary {
                content_type,
                bytes,
            }) => {
                let mut response_headers = cors.headers();
                response_headers.insert(headers::CONTENT_TYPE.to_owned(), content_type);
                Self {
                    status_code: 200,
                    headers: response_headers,
                    body: BASE64.encode(bytes),
                    is_base64_encoded: true,
                }
            }
            Err(error) => Self::error(&error, cors),
        }
    }

    /// Header value by name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Body parsed as JSON
    ///
    /// # Errors
    ///
    /// `SerializationError` when the body is not JSON
    pub fn body_json(&self) -> AppResult<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Body bytes, decoding base64 when flagged
    ///
    /// # Errors
    ///
    /// `SerializationError` for invalid base64
    pub fn body_bytes(&self) -> AppResult<Vec<u8>> {
        if self.is_base64_encoded {
            BASE64
                .decode(&self.body)
                .map_err(|e| AppError::serialization(format!("Invalid base64 body: {e}")))
        } else {
            Ok(self.body.as_bytes().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_gateway_event() {
        let event = json!({
            "pathParameters": {"routeId": "12"},
            "queryStringParameters": null,
            "body": "{\"name\":\"Loop\"}",
            "requestContext": {
                "requestId": "req-9",
                "authorizer": {"userId": "u-1", "projectIds": "[1,2]"},
                "identity": {"sourceIp": "10.1.1.1"}
            }
        });
        let request: InvocationRequest = serde_json::from_value(event).unwrap();

        assert_eq!(request.path_i64("routeId").unwrap(), 12);
        assert_eq!(request.request_id(), Some("req-9"));
        assert_eq!(request.source_ip().as_deref(), Some("10.1.1.1"));
        assert_eq!(request.actor_id().as_deref(), Some("u-1"));
        assert!(request.claims().project_ids.unwrap().contains(&2));

        let body: Value = request.json_body().unwrap();
        assert_eq!(body["name"], "Loop");
    }

    #[test]
    fn test_path_i64_errors() {
        let request = InvocationRequest::new().with_path("routeId", "abc");
        assert_eq!(request.path_i64("routeId").unwrap_err().http_status(), 400);
        assert_eq!(request.path_i64("eventId").unwrap_err().http_status(), 400);
    }

    #[test]
    fn test_error_response_keeps_cors() {
        let cors = CorsPolicy::new("https://admin.example.com");
        let response = InvocationResponse::from_result(Err(AppError::not_found("Route 4")), &cors);

        assert_eq!(response.status_code, 404);
        assert_eq!(
            response.header(headers::ALLOW_ORIGIN),
            Some("https://admin.example.com")
        );
        assert_eq!(response.body_json().unwrap()["error"]["code"], "RESOURCE_NOT_FOUND");
    }

    #[test]
    fn test_binary_reply_is_base64() {
        let response = InvocationResponse::from_result(
            Ok(Reply::Binary {
                content_type: "image/png".into(),
                bytes: vec![0, 159, 146],
            }),
            &CorsPolicy::default(),
        );
        assert!(response.is_base64_encoded);
        assert_eq!(response.header(headers::CONTENT_TYPE), Some("image/png"));
        assert_eq!(response.body_bytes().unwrap(), vec![0, 159, 146]);
    }

    #[test]
    fn test_credentials_only_for_explicit_origin() {
        let wildcard = InvocationResponse::json(200, &Value::Null, &CorsPolicy::default());
        assert_eq!(wildcard.header(headers::ALLOW_ORIGIN), Some("*"));
        assert_eq!(wildcard.header(headers::ALLOW_CREDENTIALS), None);

        let console = InvocationResponse::json(
            200,
            &Value::Null,
            &CorsPolicy::new("https://admin.example.com"),
        );
        assert_eq!(console.header(headers::ALLOW_CREDENTIALS), Some("true"));
    }
}
