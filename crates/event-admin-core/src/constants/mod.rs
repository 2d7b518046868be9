// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Header names, environment keys, and default sibling function names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Constants grouped by domain.

/// Response header names and values
pub mod headers {
    /// CORS origin header
    pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
    /// CORS allowed request headers
    pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
    /// CORS allowed methods
    pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
    /// CORS credentials flag
    pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
    /// Content type header
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// JSON content type
    pub const JSON: &str = "application/json";
    /// Request headers the console sends
    pub const DEFAULT_ALLOWED_HEADERS: &str = "Content-Type,Authorization,X-Requested-With";
    /// Methods the console uses
    pub const DEFAULT_ALLOWED_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
    /// Header carrying authorizer claims on the local dev server
    pub const AUTHORIZER_CLAIMS: &str = "x-authorizer-claims";
    /// Request ID header
    pub const REQUEST_ID: &str = "x-request-id";
}

/// Environment variable names
pub mod env_config {
    /// Deployment environment name
    pub const APP_ENV: &str = "APP_ENV";
    /// HTTP port for the local server
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// Allowed CORS origin
    pub const CORS_ALLOWED_ORIGIN: &str = "CORS_ALLOWED_ORIGIN";
    /// Bucket for uploaded assets
    pub const ASSET_BUCKET: &str = "ASSET_BUCKET";
    /// Root directory of the filesystem object store
    pub const OBJECT_STORE_ROOT: &str = "OBJECT_STORE_ROOT";
    /// Base URL used to invoke sibling functions
    pub const FUNCTION_INVOKE_URL: &str = "FUNCTION_INVOKE_URL";
    /// Audit log writer function name
    pub const AUDIT_LOG_FUNCTION: &str = "AUDIT_LOG_FUNCTION";
    /// Deploy trigger function name
    pub const DEPLOY_FUNCTION: &str = "DEPLOY_FUNCTION";
    /// DNS provisioning function name
    pub const DNS_FUNCTION: &str = "DNS_FUNCTION";
    /// Maximum pooled database connections
    pub const DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";
    /// Base64 AES-256 key for encrypted database secrets
    pub const DB_SECRET_KEY: &str = "DB_SECRET_KEY";
    /// Prefix for database settings
    pub const DB_PREFIX: &str = "DB_";
    /// Marker prefix for encrypted secret values
    pub const ENCRYPTED_VALUE_PREFIX: &str = "enc:";
}

/// Defaults
pub mod defaults {
    /// Default environment name
    pub const ENVIRONMENT: &str = "development";
    /// Default HTTP port
    pub const HTTP_PORT: u16 = 8080;
    /// Default asset bucket
    pub const ASSET_BUCKET: &str = "event-admin-assets";
    /// Default object store root
    pub const OBJECT_STORE_ROOT: &str = "./data/objects";
    /// Default audit log writer function
    pub const AUDIT_LOG_FUNCTION: &str = "write-audit-log";
    /// Default deploy trigger function
    pub const DEPLOY_FUNCTION: &str = "trigger-app-deploy";
    /// Default DNS provisioning function
    pub const DNS_FUNCTION: &str = "provision-app-domain";
    /// Default pool size
    pub const DB_MAX_CONNECTIONS: u32 = 5;
    /// Default database charset
    pub const DB_CHARSET: &str = "utf8mb4";
}

/// Audit result labels
pub mod audit {
    /// Successful operation
    pub const RESULT_SUCCESS: &str = "success";
    /// Failed operation
    pub const RESULT_FAILURE: &str = "failure";
}
