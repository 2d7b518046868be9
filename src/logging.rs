// ABOUTME: Logging configuration and structured logging setup for the admin console functions
// ABOUTME: Builds the tracing subscriber from RUST_LOG and LOG_FORMAT with dependency noise reduction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Structured logging configuration

use std::env;
use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::constants::{defaults, env_config};

/// Service name reported in startup logs
pub const SERVICE_NAME: &str = "event-admin";

/// Targets that are too chatty at the application level
const NOISE_DIRECTIVES: &[&str] = &[
    "hyper=warn",
    "hyper::proto=warn",
    "reqwest=warn",
    "sqlx=warn",
    "sqlx::query=warn",
    "tower_http=info",
];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full `RUST_LOG` filter
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Emit span open/close events
    pub include_spans: bool,
    /// Service version
    pub service_version: String,
    /// Deployment environment
    pub environment: String,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `JSON` lines, one object per event
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single line output without targets
    Compact,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; unknown values fall back to pretty
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            include_spans: false,
            service_version: env!("CARGO_PKG_VERSION").to_owned(),
            environment: defaults::ENVIRONMENT.into(),
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    ///
    /// Production environments log as JSON with source locations unless
    /// `LOG_FORMAT` says otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        let environment =
            env::var(env_config::APP_ENV).unwrap_or_else(|_| defaults::ENVIRONMENT.into());
        let is_production = environment == "production";

        let format = env::var("LOG_FORMAT").map_or(
            if is_production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            |value| LogFormat::parse(&value),
        );

        Self {
            level: env::var("RUST_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "info".into()),
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_spans: env::var("LOG_INCLUDE_SPANS").is_ok(),
            service_version: env!("CARGO_PKG_VERSION").to_owned(),
            environment,
        }
    }

    /// Filter for this configuration.
    ///
    /// A plain level gets the noise reduction directives and applies to the
    /// crate itself. Anything else is a full `RUST_LOG` filter and is used
    /// as given.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let Ok(level) = self.level.trim().parse::<LevelFilter>() else {
            return EnvFilter::new(&self.level);
        };
        let mut filter = EnvFilter::default().add_directive(level.into());
        for directive in NOISE_DIRECTIVES.iter().filter_map(|d| d.parse::<Directive>().ok()) {
            filter = filter.add_directive(directive);
        }
        match format!("event_admin={level}").parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed
    pub fn init(&self) -> Result<()> {
        let registry = tracing_subscriber::registry().with(self.env_filter());
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match self.format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stdout)
                    .with_span_events(span_events)
                    .json();
                registry.with(layer).try_init()?;
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stdout)
                    .with_span_events(span_events);
                registry.with(layer).try_init()?;
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(io::stdout)
                    .with_span_events(FmtSpan::NONE);
                registry.with(layer).try_init()?;
            }
        }

        info!(
            service.name = SERVICE_NAME,
            service.version = %self.service_version,
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "Event admin starting up"
        );
        Ok(())
    }
}

/// Initialize logging from environment
///
/// # Errors
///
/// Returns an error if logging initialization fails
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" COMPACT "), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_noise_directives_parse() {
        for directive in NOISE_DIRECTIVES {
            assert!(directive.parse::<Directive>().is_ok(), "{directive}");
        }
    }

    #[test]
    fn test_plain_level_adds_noise_and_crate_directives() {
        let config = LoggingConfig {
            level: "debug".into(),
            ..LoggingConfig::default()
        };
        let filter = config.env_filter().to_string();
        assert!(filter.contains("event_admin=debug"), "{filter}");
        assert!(filter.contains("sqlx=warn"), "{filter}");
    }

    #[test]
    fn test_composite_filter_is_used_verbatim() {
        let config = LoggingConfig {
            level: "warn,sqlx=debug".into(),
            ..LoggingConfig::default()
        };
        let filter = config.env_filter().to_string();
        assert!(filter.contains("sqlx=debug"), "{filter}");
        assert!(!filter.contains("sqlx=warn"), "{filter}");
        assert!(!filter.contains("event_admin"), "{filter}");
        assert!(!filter.contains("info"), "{filter}");
    }
}
