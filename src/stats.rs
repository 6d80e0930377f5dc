//! Database statistics.
//!
//! Raw and typed row counts per entity kind plus the most recent sync run.
//! A typed count below its raw count means the kind was ingested but not
//! (fully) projected yet.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCounts {
    pub kind: EntityKind,
    pub raw: i64,
    pub typed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSyncRun {
    pub finished_at: i64,
    pub entity_kinds: String,
    pub documents: i64,
}

pub async fn kind_counts(pool: &SqlitePool) -> Result<Vec<KindCounts>> {
    let mut counts = Vec::new();
    for kind in EntityKind::SYNC_ORDER {
        let raw: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", kind.raw_table()))
            .fetch_one(pool)
            .await?;
        let typed: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", kind.typed_table()))
                .fetch_one(pool)
                .await?;
        counts.push(KindCounts { kind, raw, typed });
    }
    Ok(counts)
}

pub async fn last_sync_run(pool: &SqlitePool) -> Result<Option<LastSyncRun>> {
    let row = sqlx::query(
        "SELECT finished_at, entity_kinds, documents FROM sync_runs ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| LastSyncRun {
        finished_at: row.get("finished_at"),
        entity_kinds: row.get("entity_kinds"),
        documents: row.get("documents"),
    }))
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let counts = kind_counts(&pool).await?;
    let last = last_sync_run(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Forum Sync Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  {:<18} {:>10} {:>10}", "KIND", "RAW", "TYPED");
    println!("  {}", "-".repeat(40));
    for c in &counts {
        println!("  {:<18} {:>10} {:>10}", c.kind.as_str(), c.raw, c.typed);
    }
    println!();

    match last {
        Some(run) => println!(
            "  Last sync:   {} ({}; {} documents)",
            describe_sync_time(run.finished_at, chrono::Utc::now().timestamp()),
            run.entity_kinds,
            run.documents
        ),
        None => println!("  Last sync:   never"),
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Local finish time of a sync run plus its age in whole hours or days,
/// e.g. `2018-03-01 09:30 (5h ago)`.
fn describe_sync_time(finished_at: i64, now: i64) -> String {
    let when = chrono::DateTime::from_timestamp(finished_at, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| finished_at.to_string());

    let age = now - finished_at;
    if age < 3600 {
        format!("{} (within the hour)", when)
    } else if age < 86400 {
        format!("{} ({}h ago)", when, age / 3600)
    } else {
        format!("{} ({}d ago)", when, age / 86400)
    }
}
