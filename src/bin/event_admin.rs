// ABOUTME: Command-line entry point for the event admin console functions
// ABOUTME: Runs migrations, single handler invocations, the local server, and secret tooling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

//! Usage:
//! ```bash
//! # Create the schema
//! event-admin migrate
//!
//! # Invoke one handler with a gateway event read from a file or stdin
//! event-admin invoke --handler put_route_stops --event event.json
//! cat event.json | event-admin invoke --handler get_route --event -
//!
//! # Serve every handler over HTTP
//! event-admin serve --port 8080
//!
//! # Encrypt a database password for an environment
//! event-admin encrypt-secret --environment staging --value hunter2
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use event_admin::config::{EnvConfigProvider, SecretKey, ServerConfig};
use event_admin::constants::env_config;
use event_admin::context::AppContext;
use event_admin::handlers;
use event_admin::invocation::InvocationRequest;
use event_admin::{logging, server};

/// Upper bound on draining queued audit entries and pending invocations before exit
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "event-admin",
    about = "Event admin console functions",
    long_about = "Run the event admin console handlers locally: migrate the schema, invoke a single handler, or serve them all over HTTP."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the database schema
    Migrate,

    /// Invoke one handler with a gateway event
    Invoke {
        /// Handler name, e.g. `put_route_stops`
        #[arg(long)]
        handler: String,

        /// Event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },

    /// Serve every handler over HTTP
    Serve {
        /// Listen port (defaults to HTTP_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print a new base64 key for DB_SECRET_KEY
    GenerateKey,

    /// Encrypt a database secret with DB_SECRET_KEY for one environment
    EncryptSecret {
        /// Environment the secret belongs to
        #[arg(long)]
        environment: String,

        /// Plaintext value
        #[arg(long)]
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_from_env()?;

    match args.command {
        Command::Migrate => migrate().await,
        Command::Invoke { handler, event } => invoke(&handler, &event).await,
        Command::Serve { port } => serve(port).await,
        Command::GenerateKey => {
            println!("{}", SecretKey::generate().to_base64());
            Ok(())
        }
        Command::EncryptSecret { environment, value } => {
            let encoded = std::env::var(env_config::DB_SECRET_KEY)
                .with_context(|| format!("{} is not set", env_config::DB_SECRET_KEY))?;
            let key = SecretKey::from_base64(&encoded)?;
            let ciphertext = key.encrypt(&value, &environment)?;
            println!("{}{ciphertext}", env_config::ENCRYPTED_VALUE_PREFIX);
            Ok(())
        }
    }
}

async fn migrate() -> Result<()> {
    let config = ServerConfig::from_env()?;
    let (ctx, _dispatcher) = AppContext::bootstrap(config, &EnvConfigProvider).await?;
    ctx.store().close().await;
    info!("Migration complete");
    Ok(())
}

async fn invoke(handler: &str, event: &str) -> Result<()> {
    if !handlers::HANDLER_NAMES.contains(&handler) {
        anyhow::bail!(
            "Unknown handler {handler}; expected one of {}",
            handlers::HANDLER_NAMES.join(", ")
        );
    }
    let raw = read_event(event).await?;
    let request: InvocationRequest =
        serde_json::from_str(&raw).context("Event is not a valid invocation request")?;

    let config = ServerConfig::from_env()?;
    let (ctx, dispatcher) = AppContext::bootstrap(config, &EnvConfigProvider).await?;
    let audit = dispatcher.spawn();

    let response = handlers::dispatch(&ctx, handler, request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let store = ctx.store().clone();
    let invoker = ctx.invoker_handle();
    drop(ctx);
    match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit).await {
        Ok(Ok(forwarded)) => info!(forwarded, "Audit entries forwarded"),
        Ok(Err(e)) => warn!(error = %e, "Audit dispatcher task failed"),
        Err(_) => warn!("Audit dispatcher did not drain in time"),
    }
    if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, invoker.drain()).await.is_err() {
        warn!("Pending function invocations did not finish in time");
    }
    store.close().await;
    Ok(())
}

async fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        Ok(raw)
    } else {
        let path = PathBuf::from(source);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Cannot read event file {}", path.display()))
    }
}

async fn serve(port: Option<u16>) -> Result<()> {
    let config = ServerConfig::from_env()?;
    let port = port.unwrap_or(config.http_port);
    let (ctx, dispatcher) = AppContext::bootstrap(config, &EnvConfigProvider).await?;
    let _audit = dispatcher.spawn();
    server::serve(ctx, port).await
}
