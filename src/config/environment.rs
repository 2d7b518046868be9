// ABOUTME: Process-level configuration loaded once from environment variables at startup
// ABOUTME: Passed explicitly into the application context instead of living in a global cache
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{defaults, env_config};

/// Names of the sibling functions invoked for side effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNames {
    /// Audit log writer (fire-and-forget)
    pub audit_log: String,
    /// App deploy trigger (fire-and-forget)
    pub deploy: String,
    /// DNS provisioning (wait-for-result)
    pub dns: String,
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self {
            audit_log: defaults::AUDIT_LOG_FUNCTION.into(),
            deploy: defaults::DEPLOY_FUNCTION.into(),
            dns: defaults::DNS_FUNCTION.into(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deployment environment name, used to resolve database settings
    pub environment: String,
    /// Port of the local HTTP server
    pub http_port: u16,
    /// Value of `Access-Control-Allow-Origin`
    pub cors_allowed_origin: String,
    /// Bucket holding uploaded assets
    pub asset_bucket: String,
    /// Root directory of the filesystem object store
    pub object_store_root: PathBuf,
    /// Base URL for sibling function invocation; `None` logs invocations only
    pub function_invoke_url: Option<String>,
    /// Sibling function names
    pub functions: FunctionNames,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: defaults::ENVIRONMENT.into(),
            http_port: defaults::HTTP_PORT,
            cors_allowed_origin: "*".into(),
            asset_bucket: defaults::ASSET_BUCKET.into(),
            object_store_root: PathBuf::from(defaults::OBJECT_STORE_ROOT),
            function_invoke_url: None,
            functions: FunctionNames::default(),
            db_max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let config = Self {
            environment: env_var_or(env_config::APP_ENV, defaults::ENVIRONMENT),
            http_port: env_var_or(env_config::HTTP_PORT, &defaults::HTTP_PORT.to_string())
                .parse()
                .context("Invalid HTTP_PORT value")?,
            cors_allowed_origin: env_var_or(env_config::CORS_ALLOWED_ORIGIN, "*"),
            asset_bucket: env_var_or(env_config::ASSET_BUCKET, defaults::ASSET_BUCKET),
            object_store_root: PathBuf::from(env_var_or(
                env_config::OBJECT_STORE_ROOT,
                defaults::OBJECT_STORE_ROOT,
            )),
            function_invoke_url: env::var(env_config::FUNCTION_INVOKE_URL)
                .ok()
                .map(|url| url.trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty()),
            functions: FunctionNames {
                audit_log: env_var_or(env_config::AUDIT_LOG_FUNCTION, defaults::AUDIT_LOG_FUNCTION),
                deploy: env_var_or(env_config::DEPLOY_FUNCTION, defaults::DEPLOY_FUNCTION),
                dns: env_var_or(env_config::DNS_FUNCTION, defaults::DNS_FUNCTION),
            },
            db_max_connections: env_var_or(
                env_config::DB_MAX_CONNECTIONS,
                &defaults::DB_MAX_CONNECTIONS.to_string(),
            )
            .parse()
            .context("Invalid DB_MAX_CONNECTIONS value")?,
        };

        info!(
            environment = %config.environment,
            http_port = config.http_port,
            invoke_url = config.function_invoke_url.as_deref().unwrap_or("<log only>"),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        for key in [
            env_config::APP_ENV,
            env_config::HTTP_PORT,
            env_config::FUNCTION_INVOKE_URL,
            env_config::DB_MAX_CONNECTIONS,
        ] {
            env::remove_var(key);
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.environment, defaults::ENVIRONMENT);
        assert_eq!(config.http_port, defaults::HTTP_PORT);
        assert!(config.function_invoke_url.is_none());
        assert_eq!(config.functions, FunctionNames::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var(env_config::APP_ENV, "staging");
        env::set_var(env_config::HTTP_PORT, "9090");
        env::set_var(env_config::FUNCTION_INVOKE_URL, "http://localhost:9000/");

        let config = ServerConfig::from_env();

        env::remove_var(env_config::APP_ENV);
        env::remove_var(env_config::HTTP_PORT);
        env::remove_var(env_config::FUNCTION_INVOKE_URL);

        let config = config.unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.http_port, 9090);
        assert_eq!(
            config.function_invoke_url.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_port() {
        env::set_var(env_config::HTTP_PORT, "not-a-port");
        let result = ServerConfig::from_env();
        env::remove_var(env_config::HTTP_PORT);
        assert!(result.is_err());
    }
}
