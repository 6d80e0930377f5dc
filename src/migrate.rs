//! Schema setup.
//!
//! Every table is created with `IF NOT EXISTS`, so running `init` (or any
//! command that calls [`ensure_schema`]) against an existing database is a
//! no-op.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::fieldmap::Projection;
use crate::ingest::raw_table_sql;
use crate::models::EntityKind;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every raw, typed and bookkeeping table.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for kind in EntityKind::SYNC_ORDER {
        create_kind_tables(pool, kind).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            entity_kinds TEXT NOT NULL,
            documents INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Report joins
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_post_id ON tickets(post_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_kind_tables(pool: &SqlitePool, kind: EntityKind) -> Result<()> {
    sqlx::query(&raw_table_sql(kind))
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create {}", kind.raw_table()))?;
    sqlx::query(&Projection::for_kind(kind).create_table_sql(kind.typed_table()))
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create {}", kind.typed_table()))?;
    Ok(())
}

/// Drop and recreate both tables of one kind.
pub async fn reset_kind(pool: &SqlitePool, kind: EntityKind) -> Result<()> {
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", kind.raw_table()))
        .execute(pool)
        .await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", kind.typed_table()))
        .execute(pool)
        .await?;
    // Recreates the dropped tables and their indexes.
    ensure_schema(pool).await
}

pub async fn run_reset(config: &Config, kind: EntityKind) -> Result<()> {
    let pool = db::connect(config).await?;
    reset_kind(&pool, kind).await?;
    pool.close().await;

    println!(
        "Reset {}: dropped and recreated {} and {}",
        kind,
        kind.raw_table(),
        kind.typed_table()
    );
    Ok(())
}
