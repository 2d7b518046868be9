// ABOUTME: Schema creation for projects, bus routes, events, timetables, and apps
// ABOUTME: Idempotent CREATE TABLE IF NOT EXISTS migrations run at startup and in tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use sqlx::SqlitePool;
use tracing::info;

use crate::errors::AppResult;

/// Create every table and index the handlers use
pub(super) async fn migrate(pool: &SqlitePool) -> AppResult<()> {
    migrate_projects(pool).await?;
    migrate_routes(pool).await?;
    migrate_events(pool).await?;
    migrate_apps(pool).await?;
    info!("Database schema up to date");
    Ok(())
}

async fn migrate_projects(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        ",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn migrate_routes(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS bus_ways (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS bus_routes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, name)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS bus_route_stops (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_id INTEGER NOT NULL REFERENCES bus_routes(id) ON DELETE CASCADE,
            way_id INTEGER NOT NULL REFERENCES bus_ways(id),
            position INTEGER NOT NULL DEFAULT 0,
            scheduled_time TEXT,
            UNIQUE (route_id, way_id)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bus_route_stops_route ON bus_route_stops(route_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn migrate_events(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            image_key TEXT,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS bus_timetables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS event_bus_timetables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            timetable_id INTEGER NOT NULL REFERENCES bus_timetables(id),
            position INTEGER NOT NULL DEFAULT 0,
            UNIQUE (event_id, timetable_id)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_event_bus_timetables_event ON event_bus_timetables(event_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn migrate_apps(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS apps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            domain TEXT UNIQUE,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS app_pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_id INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
            page_key TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            title TEXT,
            layout TEXT,
            UNIQUE (app_id, page_key)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS app_page_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_id INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
            snapshot TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_app_pages_app ON app_pages(app_id)")
        .execute(pool)
        .await?;

    Ok(())
}
