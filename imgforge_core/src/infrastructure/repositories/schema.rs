// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema helpers shared by `infrastructure::catalog`.
//!
//! Migrations are a versioned, numbered sequence of `.sql` files under
//! `migrations/` (SPEC_FULL.md Catalog expansion), run via `sqlx::migrate!`
//! so integration tests and the running process always see a consistent
//! schema. The initial step (`0001_init.sql`) creates `configurations`,
//! `executions`, `generated_images`, and `secrets`; later numbered steps are
//! where the spec's "relaxing NOT NULL on foreign keys" / "adding
//! `label`/`settings_snapshot` columns" migrations land, per REDESIGN FLAGS.

use sqlx::migrate::MigrateDatabase;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Runs pending migrations against the provided SQLite pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("ensuring database schema is up to date");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database schema is up to date");
    Ok(())
}

/// Creates a new SQLite database file if it doesn't exist.
///
/// `SqlitePool::connect` fails if the file is absent unless the connect
/// options set `create_if_missing`; this is the explicit alternative used
/// at `DataPaths`-resolved startup.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!("database does not exist, creating: {database_url}");
        sqlx::Sqlite::create_database(database_url).await?;
        info!("created new SQLite database: {database_url}");
    } else {
        debug!("database already exists: {database_url}");
    }
    Ok(())
}

/// Combines database creation and schema migration into one call, for
/// application startup (`SqliteCatalog::open`).
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn create_database_if_missing_is_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        create_database_if_missing(&db_url).await.unwrap();
    }

    #[tokio::test]
    async fn initialize_database_creates_spec_tables() {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        drop(temp);

        let pool = initialize_database(&db_url).await.unwrap();

        for table in ["configurations", "executions", "generated_images", "secrets"] {
            let count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 1, "{table} table should exist");
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        let pool = SqlitePool::connect(&db_url).await.unwrap();

        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
