//! Status report over the typed tables.
//!
//! Aggregates posts by status, topic and month, the ticket `isv_status`
//! distribution, and sorts open posts into follow-up buckets by how long
//! they have waited since their last activity. The result is rendered with
//! askama into `status_report_<YYYY-MM-DD>.md` and/or `.html`.

use anyhow::{Context, Result};
use askama::Template;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::migrate;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Html,
    Both,
}

impl std::str::FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md" | "markdown" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            "both" => Ok(ReportFormat::Both),
            other => anyhow::bail!("Unknown report format: '{}'. Must be md, html or both.", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRow {
    pub label: String,
    pub count: i64,
}

/// An open post with its follow-up state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPost {
    pub id: String,
    pub title: String,
    pub topic: String,
    /// Linked ticket `isv_status`, falling back to the post status.
    pub status: String,
    /// Whole days since the last post update or comment. `None` when the
    /// post carries no timestamps at all.
    pub days_since_activity: Option<i64>,
    pub last_responder: String,
}

impl OpenPost {
    pub fn days_display(&self) -> String {
        match self.days_since_activity {
            Some(days) => days.to_string(),
            None => "n/a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub generated_on: String,
    pub by_status: Vec<CountRow>,
    pub by_topic: Vec<CountRow>,
    pub by_month: Vec<CountRow>,
    pub isv_status: Vec<CountRow>,
    pub handled: Vec<OpenPost>,
    pub no_response: Vec<OpenPost>,
    pub pending: Vec<OpenPost>,
    pub partner_pending: Vec<OpenPost>,
}

#[derive(Template)]
#[template(path = "status_report.md")]
struct MarkdownReport<'a> {
    report: &'a StatusReport,
}

#[derive(Template)]
#[template(path = "status_report.html")]
struct HtmlReport<'a> {
    report: &'a StatusReport,
}

/// Raw open-post row before bucketing.
#[derive(Debug, Clone)]
pub struct OpenPostRow {
    pub id: String,
    pub title: Option<String>,
    pub topic: Option<String>,
    pub post_status: Option<String>,
    pub isv_status: Option<String>,
    pub updated_at: Option<i64>,
    pub last_comment_at: Option<i64>,
    pub last_responder: Option<String>,
}

impl OpenPostRow {
    fn last_activity(&self) -> Option<i64> {
        self.updated_at.max(self.last_comment_at)
    }

    fn into_open_post(self, now: i64) -> OpenPost {
        let days = self
            .last_activity()
            .map(|ts| (now - ts).max(0) / SECONDS_PER_DAY);
        OpenPost {
            status: self
                .isv_status
                .clone()
                .or_else(|| self.post_status.clone())
                .unwrap_or_default(),
            id: self.id,
            title: self.title.unwrap_or_default(),
            topic: self.topic.unwrap_or_default(),
            days_since_activity: days,
            last_responder: self.last_responder.unwrap_or_default(),
        }
    }
}

/// Sort open posts into the report's follow-up buckets. A post lands in
/// exactly one of `handled`/`no_response`, and additionally in a pending
/// bucket when its ticket says so.
pub fn classify(rows: Vec<OpenPostRow>, now: i64, report: &mut StatusReport) {
    for row in rows {
        let isv = row.isv_status.clone().unwrap_or_default();
        let post = row.into_open_post(now);

        match isv.as_str() {
            "InternalPending" | "ExternalPending" => report.pending.push(post.clone()),
            "PartnerPending" => report.partner_pending.push(post.clone()),
            _ => {}
        }

        if matches!(post.days_since_activity, Some(days) if days <= 1) {
            report.handled.push(post);
        } else {
            report.no_response.push(post);
        }
    }
}

async fn counts(pool: &SqlitePool, sql: &str) -> Result<Vec<CountRow>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| CountRow {
            label: row.get("label"),
            count: row.get("count"),
        })
        .collect())
}

pub async fn open_posts(pool: &SqlitePool) -> Result<Vec<OpenPostRow>> {
    let rows = sqlx::query(
        r#"
        SELECT
            p.id AS id,
            p.title AS title,
            t.name AS topic,
            p.status AS post_status,
            MAX(tk.isv_status) AS isv_status,
            p.updated_at_timestamp AS updated_at,
            lc.created_at_timestamp AS last_comment_at,
            u.name AS last_responder
        FROM posts p
        LEFT JOIN topics t ON t.id = p.topic_id
        LEFT JOIN tickets tk ON tk.post_id = p.id
        LEFT JOIN comments lc ON lc.id = (
            SELECT c.id FROM comments c
            WHERE c.post_id = p.id
            ORDER BY c.created_at_timestamp DESC, c.id DESC
            LIMIT 1
        )
        LEFT JOIN users u ON u.id = lc.author_id
        WHERE p.closed = 0 OR p.closed IS NULL
        GROUP BY p.id
        ORDER BY p.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| OpenPostRow {
            id: row.get("id"),
            title: row.get("title"),
            topic: row.get("topic"),
            post_status: row.get("post_status"),
            isv_status: row.get("isv_status"),
            updated_at: row.get("updated_at"),
            last_comment_at: row.get("last_comment_at"),
            last_responder: row.get("last_responder"),
        })
        .collect())
}

/// Run every report query against an existing schema.
pub async fn build_report(pool: &SqlitePool, now: chrono::DateTime<chrono::Local>) -> Result<StatusReport> {
    let mut report = StatusReport {
        generated_on: now.format("%Y-%m-%d").to_string(),
        ..Default::default()
    };

    report.by_status = counts(
        pool,
        "SELECT COALESCE(status, 'unknown') AS label, COUNT(*) AS count \
         FROM posts GROUP BY label ORDER BY count DESC, label",
    )
    .await?;
    report.by_topic = counts(
        pool,
        "SELECT COALESCE(t.name, p.topic_id, 'unknown') AS label, COUNT(*) AS count \
         FROM posts p LEFT JOIN topics t ON t.id = p.topic_id \
         GROUP BY label ORDER BY count DESC, label",
    )
    .await?;
    report.by_month = counts(
        pool,
        "SELECT substr(created_at_str, 1, 7) AS label, COUNT(*) AS count \
         FROM posts WHERE created_at_str IS NOT NULL \
         GROUP BY label ORDER BY label",
    )
    .await?;
    report.isv_status = counts(
        pool,
        "SELECT COALESCE(isv_status, 'unset') AS label, COUNT(*) AS count \
         FROM tickets GROUP BY label ORDER BY count DESC, label",
    )
    .await?;

    let rows = open_posts(pool).await?;
    classify(rows, now.timestamp(), &mut report);
    Ok(report)
}

pub fn render_markdown(report: &StatusReport) -> Result<String> {
    Ok(MarkdownReport { report }.render()?)
}

pub fn render_html(report: &StatusReport) -> Result<String> {
    Ok(HtmlReport { report }.render()?)
}

pub fn report_path(dir: &Path, report: &StatusReport, extension: &str) -> PathBuf {
    dir.join(format!("status_report_{}.{}", report.generated_on, extension))
}

pub async fn run_report(config: &Config, format: ReportFormat) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let report = build_report(&pool, chrono::Local::now()).await?;
    pool.close().await;

    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!("Failed to create output directory: {}", config.output.dir.display())
    })?;

    let mut outputs = Vec::new();
    if matches!(format, ReportFormat::Markdown | ReportFormat::Both) {
        outputs.push(("md", render_markdown(&report)?));
    }
    if matches!(format, ReportFormat::Html | ReportFormat::Both) {
        outputs.push(("html", render_html(&report)?));
    }

    for (ext, body) in outputs {
        let path = report_path(&config.output.dir, &report, ext);
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    println!(
        "  open posts: {} handled, {} without response",
        report.handled.len(),
        report.no_response.len()
    );
    Ok(())
}
