//! Sync orchestration.
//!
//! For each requested kind, in parent-before-child order: ingest every page
//! file (one transaction per page), then project the raw table into the
//! typed table. A successful run is recorded in `sync_runs`. Any error stops
//! the run at the failing page or kind; earlier committed pages stay.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::fetch;
use crate::fieldmap::Projection;
use crate::ingest::{ingest, IngestStats, SecondaryKeyFn};
use crate::migrate;
use crate::models::EntityKind;
use crate::pages;
use crate::project::{project, ProjectStats};

/// Outcome of syncing one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSummary {
    pub kind: EntityKind,
    pub pages: usize,
    pub ingested: IngestStats,
    pub projected: ProjectStats,
}

/// Ingest every page file of `kind`. Returns the page count and the
/// combined ingest stats.
pub async fn ingest_pages(
    pool: &SqlitePool,
    config: &Config,
    kind: EntityKind,
) -> Result<(usize, IngestStats)> {
    let pages = pages::discover(&config.pages.dir, kind)?;
    let mut stats = IngestStats::default();

    for page in &pages {
        let records = pages::load(kind, page)?;
        let key = page.secondary_key.clone();
        let from_file = move |_: &Value| key.clone();
        let secondary: Option<&SecondaryKeyFn<'_>> = match kind.secondary_key_column() {
            Some(_) => Some(&from_file),
            None => None,
        };

        let page_stats = ingest(pool, kind, &records, kind.id_field(), secondary)
            .await
            .with_context(|| format!("Failed to ingest {}", page.path.display()))?;
        stats.absorb(page_stats);
    }

    info!(
        kind = %kind,
        pages = pages.len(),
        inserted = stats.inserted,
        updated = stats.updated,
        "ingested pages"
    );
    Ok((pages.len(), stats))
}

pub async fn project_kind(
    pool: &SqlitePool,
    config: &Config,
    kind: EntityKind,
) -> Result<ProjectStats> {
    let projection = Projection::for_kind(kind);
    let stats = project(pool, kind, &projection, config.projection.policy())
        .await
        .with_context(|| format!("Failed to project {}", kind))?;

    info!(
        kind = %kind,
        inserted = stats.inserted,
        updated = stats.updated,
        "projected"
    );
    Ok(stats)
}

/// Ingest then project each kind in order, and record the run.
pub async fn sync_kinds(
    pool: &SqlitePool,
    config: &Config,
    kinds: &[EntityKind],
) -> Result<Vec<KindSummary>> {
    let started_at = chrono::Utc::now().timestamp();
    let mut summaries = Vec::with_capacity(kinds.len());

    for &kind in ordered(kinds).iter() {
        let (pages, ingested) = ingest_pages(pool, config, kind).await?;
        let projected = project_kind(pool, config, kind).await?;
        summaries.push(KindSummary {
            kind,
            pages,
            ingested,
            projected,
        });
    }

    let documents: u64 = summaries.iter().map(|s| s.ingested.total()).sum();
    record_sync_run(pool, started_at, kinds, documents).await?;
    Ok(summaries)
}

/// `kinds` sorted into sync order, duplicates removed.
fn ordered(kinds: &[EntityKind]) -> Vec<EntityKind> {
    EntityKind::SYNC_ORDER
        .iter()
        .copied()
        .filter(|k| kinds.contains(k))
        .collect()
}

pub async fn record_sync_run(
    pool: &SqlitePool,
    started_at: i64,
    kinds: &[EntityKind],
    documents: u64,
) -> Result<()> {
    let names: Vec<&str> = ordered(kinds).iter().map(|k| k.as_str()).collect();
    sqlx::query(
        "INSERT INTO sync_runs (started_at, finished_at, entity_kinds, documents) VALUES (?, ?, ?, ?)",
    )
    .bind(started_at)
    .bind(chrono::Utc::now().timestamp())
    .bind(names.join(","))
    .bind(documents as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn run_sync(config: &Config, kinds: &[EntityKind], fetch_first: bool) -> Result<()> {
    if fetch_first {
        fetch::run_fetch(config, kinds).await?;
    }

    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let summaries = sync_kinds(&pool, config, kinds).await?;

    for s in &summaries {
        println!("sync {}", s.kind);
        println!("  pages: {}", s.pages);
        println!(
            "  raw documents: {} inserted, {} updated",
            s.ingested.inserted, s.ingested.updated
        );
        println!(
            "  typed rows: {} inserted, {} updated",
            s.projected.inserted, s.projected.updated
        );
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

pub async fn run_ingest(config: &Config, kind: EntityKind) -> Result<()> {
    let pool = db::connect(config).await?;
    let (pages, stats) = ingest_pages(&pool, config, kind).await?;

    println!("ingest {}", kind);
    println!("  pages: {}", pages);
    println!("  inserted: {}", stats.inserted);
    println!("  updated: {}", stats.updated);

    pool.close().await;
    Ok(())
}

pub async fn run_project(config: &Config, kind: EntityKind) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = project_kind(&pool, config, kind).await?;

    println!("project {}", kind);
    println!("  inserted: {}", stats.inserted);
    println!("  updated: {}", stats.updated);

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &std::path::Path, name: &str, body: Value) {
        pages::write_page(dir, name, &body).unwrap();
    }

    #[tokio::test]
    async fn test_sync_child_kind_uses_file_key() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        write(
            &config.pages.dir,
            "ticket_comments_55.json",
            json!({"comments": [
                {"id": 1, "author_id": 9, "body": "hello", "public": true, "created_at": "2018-02-01T10:00:00Z"}
            ]}),
        );

        let pool = db::open_in_memory().await.unwrap();
        migrate::ensure_schema(&pool).await.unwrap();
        let summaries = sync_kinds(&pool, &config, &[EntityKind::TicketComments])
            .await
            .unwrap();
        assert_eq!(summaries[0].pages, 1);
        assert_eq!(summaries[0].projected.inserted, 1);

        let tickets_id: String =
            sqlx::query_scalar("SELECT tickets_id FROM ticket_comments WHERE id = '1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(tickets_id, "55");

        let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn test_failed_sync_records_no_run() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        write(
            &config.pages.dir,
            "posts_1.json",
            json!({"posts": [{"title": "no id"}]}),
        );

        let pool = db::open_in_memory().await.unwrap();
        migrate::ensure_schema(&pool).await.unwrap();
        assert!(sync_kinds(&pool, &config, &[EntityKind::Posts]).await.is_err());

        let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(runs, 0);
    }

    #[tokio::test]
    async fn test_later_page_wins_past_page_nine() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        write(
            &config.pages.dir,
            "posts_2.json",
            json!({"posts": [{"id": 1, "title": "from page 2"}]}),
        );
        write(
            &config.pages.dir,
            "posts_10.json",
            json!({"posts": [{"id": 1, "title": "from page 10"}]}),
        );

        let pool = db::open_in_memory().await.unwrap();
        let (pages, stats) = ingest_pages(&pool, &config, EntityKind::Posts)
            .await
            .unwrap();
        assert_eq!(pages, 2);
        assert_eq!((stats.inserted, stats.updated), (1, 1));

        let docs = crate::ingest::load_raw_documents(&pool, EntityKind::Posts)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document["title"], "from page 10");
    }

    #[test]
    fn test_ordered_dedups_and_sorts() {
        assert_eq!(
            ordered(&[EntityKind::Comments, EntityKind::Posts, EntityKind::Comments]),
            vec![EntityKind::Posts, EntityKind::Comments]
        );
    }
}
