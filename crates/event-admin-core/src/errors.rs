// ABOUTME: Unified error taxonomy with HTTP status mapping for every handler
// ABOUTME: Defines ErrorCode, AppError, AppResult and the serialized ErrorResponse body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! # Unified Error Handling System
//!
//! Every handler failure is an [`AppError`] carrying an [`ErrorCode`]. The code
//! decides the HTTP status; the message and optional details travel to the
//! caller inside an [`ErrorResponse`]. Store errors keep their original text so
//! operators of the admin console can diagnose them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authorization (1000-1999)
    /// Requested scope is not in the caller's allow-list
    PermissionDenied = 1004,

    // Validation (3000-3999)
    /// Malformed or inconsistent input
    InvalidInput = 3000,
    /// A required field or path parameter is missing
    MissingRequiredField = 3001,

    // Resource Management (4000-4999)
    /// Target row or object does not exist
    ResourceNotFound = 4000,
    /// A natural or unique key is already taken
    ResourceAlreadyExists = 4001,

    // External Services (5000-5999)
    /// Sibling function or remote service failed
    ExternalServiceError = 5000,

    // Configuration (6000-6999)
    /// Required configuration or secret is absent
    ConfigMissing = 6001,
    /// Configuration present but unusable (bad value, decryption failure)
    ConfigInvalid = 6002,

    // Internal Errors (9000-9999)
    /// Unexpected failure
    InternalError = 9000,
    /// Backing store failure inside a transaction
    DatabaseError = 9001,
    /// Object store failure
    StorageError = 9002,
    /// JSON encoding or decoding failure
    SerializationError = 9003,
}

impl ErrorCode {
    /// HTTP status code returned for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::MissingRequiredField => 400,
            Self::PermissionDenied => 403,
            Self::ResourceNotFound => 404,
            Self::ResourceAlreadyExists => 409,
            Self::ExternalServiceError
            | Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::InternalError
            | Self::DatabaseError
            | Self::StorageError
            | Self::SerializationError => 500,
        }
    }

    /// User-facing description of this error class
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::PermissionDenied => "You do not have permission to act on this scope",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceAlreadyExists => "A resource with this identifier already exists",
            Self::ExternalServiceError => "An external service encountered an error",
            Self::ConfigMissing => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::InternalError => "An internal error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::StorageError => "Storage operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether a failure with this code happened before any mutation could be attempted
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        self.http_status() < 500
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// Additional structured details
    pub details: Option<serde_json::Value>,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
            details: None,
            source: None,
        }
    }

    /// Attach a request ID
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Missing required field
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {field}"),
        )
    }

    /// Caller is not allowed to act on the requested scope
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Unique key conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Object storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// External service error
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// Configuration missing
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigMissing, message)
    }

    /// Configuration invalid
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// HTTP error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Request ID, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Extra diagnostic details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message.clone(),
                request_id: error.request_id.clone(),
                details: error.details.clone(),
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string()).with_source(error)
    }
}

#[cfg(feature = "database-errors")]
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::not_found("Row");
        }
        let unique_violation = match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                Some(db_error.message().to_owned())
            }
            _ => None,
        };
        match unique_violation {
            Some(message) => {
                Self::conflict(format!("Unique constraint violated: {message}")).with_source(error)
            }
            None => Self::database(error.to_string()).with_source(error),
        }
    }
}
