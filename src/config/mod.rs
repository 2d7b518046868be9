// ABOUTME: Configuration module: process settings, database settings, and secret decryption
// ABOUTME: Everything here is resolved once at startup and injected into the application context
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Configuration for the event admin functions
//!
//! - **Environment**: [`ServerConfig`] read from environment variables
//! - **Database**: [`ConfigProvider`] resolving [`DatabaseConfig`] per environment
//! - **Secrets**: AES-256-GCM protected values in the environment

/// Database connection settings and providers
pub mod database;
/// Process configuration from environment variables
pub mod environment;
/// Encrypted configuration values
pub mod secrets;

pub use database::{ConfigProvider, DatabaseConfig, EnvConfigProvider, StaticConfigProvider};
pub use environment::{FunctionNames, ServerConfig};
pub use secrets::SecretKey;
