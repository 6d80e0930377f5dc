//! HTTP page fetcher.
//!
//! Downloads envelope pages from the help-center REST API and writes them
//! into the page directory, where the pipeline picks them up. List kinds
//! follow the `next_page` link up to `[api] max_pages`; each page becomes one
//! file, and numbered pages beyond the last one fetched are removed so a
//! shorter run never leaves older pages behind. Child kinds are fetched per
//! parent and all of a parent's pages are merged into one file named after
//! the parent ID.
//!
//! Requests are unauthenticated and never retried: a failed request aborts
//! the fetch, and pages already written stay on disk.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{ApiConfig, Config};
use crate::models::EntityKind;
use crate::pages;
use crate::timestamp;

pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    max_pages: u32,
    recent_days: i64,
    pages_dir: PathBuf,
}

impl Fetcher {
    pub fn new(api: &ApiConfig, pages_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            max_pages: api.max_pages,
            recent_days: api.recent_days,
            pages_dir,
        })
    }

    /// Fetch one kind. Returns the number of files written.
    pub async fn fetch_kind(&self, kind: EntityKind) -> Result<usize> {
        match kind {
            EntityKind::Comments => {
                let posts = self.parents_on_disk(EntityKind::Posts)?;
                let now = chrono::Local::now().timestamp();
                let ids = recent_ids(&posts, now, self.recent_days);
                self.fetch_children(kind, &ids).await
            }
            EntityKind::TicketComments => {
                let tickets = self.parents_on_disk(EntityKind::Tickets)?;
                let ids: Vec<String> = tickets.iter().filter_map(record_id).collect();
                self.fetch_children(kind, &ids).await
            }
            _ => self.fetch_list(kind).await,
        }
    }

    async fn fetch_list(&self, kind: EntityKind) -> Result<usize> {
        let mut url = Some(list_endpoint(&self.base_url, kind)?);
        let mut written = 0usize;

        while let Some(current) = url {
            if written as u32 >= self.max_pages {
                info!(kind = %kind, max_pages = self.max_pages, "page limit reached");
                break;
            }
            let body = self.get_json(&current).await?;
            url = next_page(&body);
            written += 1;
            pages::write_page(&self.pages_dir, &page_file_name(kind, written), &body)?;
        }

        let stale = pages::prune_pages_after(&self.pages_dir, kind, written as u64)?;
        if !stale.is_empty() {
            debug!(kind = %kind, removed = stale.len(), "removed stale pages");
        }

        info!(kind = %kind, pages = written, "fetched");
        Ok(written)
    }

    async fn fetch_children(&self, kind: EntityKind, parent_ids: &[String]) -> Result<usize> {
        let field = kind.envelope_fields()[0];

        for parent in parent_ids {
            let mut url = Some(child_endpoint(&self.base_url, kind, parent)?);
            let mut records: Vec<Value> = Vec::new();
            let mut fetched = 0u32;

            while let Some(current) = url {
                if fetched >= self.max_pages {
                    break;
                }
                let mut body = self.get_json(&current).await?;
                url = next_page(&body);
                fetched += 1;
                if let Some(Value::Array(items)) = body.get_mut(field).map(Value::take) {
                    records.extend(items);
                }
            }

            let count = records.len();
            let file_name = format!("{}{}.json", kind.file_prefix(), parent);
            pages::write_page(&self.pages_dir, &file_name, &json!({ field: records }))?;
            debug!(kind = %kind, parent = %parent, records = count, "fetched children");
        }

        info!(kind = %kind, parents = parent_ids.len(), "fetched");
        Ok(parent_ids.len())
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("GET {} returned {}: {}", url, status, body_text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Response from {} is not JSON", url))
    }

    fn parents_on_disk(&self, kind: EntityKind) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        for page in pages::discover(&self.pages_dir, kind)? {
            records.extend(pages::load(kind, &page)?);
        }
        Ok(records)
    }
}

pub fn list_endpoint(base_url: &str, kind: EntityKind) -> Result<String> {
    let path = match kind {
        EntityKind::Topics => "/api/v2/community/topics.json",
        EntityKind::Posts => "/api/v2/community/posts.json",
        EntityKind::Users => "/api/v2/users.json",
        EntityKind::Tickets => "/api/v2/tickets.json",
        other => bail!("{} is fetched per parent, not as a list", other),
    };
    Ok(format!("{}{}", base_url, path))
}

pub fn child_endpoint(base_url: &str, kind: EntityKind, parent_id: &str) -> Result<String> {
    match kind {
        EntityKind::Comments => Ok(format!(
            "{}/api/v2/community/posts/{}/comments.json",
            base_url, parent_id
        )),
        EntityKind::TicketComments => Ok(format!(
            "{}/api/v2/tickets/{}/comments.json",
            base_url, parent_id
        )),
        other => bail!("{} is not a child kind", other),
    }
}

/// `posts_3.json`, `topics_1.json`. The topics prefix has no underscore.
pub fn page_file_name(kind: EntityKind, page: usize) -> String {
    match kind {
        EntityKind::Topics => format!("topics_{}.json", page),
        _ => format!("{}{}.json", kind.file_prefix(), page),
    }
}

pub fn next_page(body: &Value) -> Option<String> {
    match body.get("next_page") {
        Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
        _ => None,
    }
}

fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(crate::ingest::natural_id)
}

/// IDs of records whose `updated_at` falls within the last `days` days.
/// Records without a readable `updated_at` are skipped.
pub fn recent_ids(records: &[Value], now: i64, days: i64) -> Vec<String> {
    let cutoff = now - days * 24 * 60 * 60;
    records
        .iter()
        .filter(|r| {
            r.get("updated_at")
                .and_then(Value::as_str)
                .and_then(|s| timestamp::normalize(s).ok())
                .is_some_and(|ts| ts.epoch >= cutoff)
        })
        .filter_map(record_id)
        .collect()
}

pub async fn run_fetch(config: &Config, kinds: &[EntityKind]) -> Result<()> {
    let api = config
        .api
        .as_ref()
        .context("No [api] section in config; nothing to fetch from")?;
    let fetcher = Fetcher::new(api, config.pages.dir.clone())?;

    for kind in EntityKind::SYNC_ORDER.iter().filter(|k| kinds.contains(k)) {
        let files = fetcher.fetch_kind(*kind).await?;
        println!("fetch {}", kind);
        println!("  files written: {}", files);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(
            list_endpoint("https://support.example.com", EntityKind::Posts).unwrap(),
            "https://support.example.com/api/v2/community/posts.json"
        );
        assert!(list_endpoint("https://support.example.com", EntityKind::Comments).is_err());
        assert_eq!(
            child_endpoint("https://support.example.com", EntityKind::Comments, "220794928").unwrap(),
            "https://support.example.com/api/v2/community/posts/220794928/comments.json"
        );
        assert_eq!(
            child_endpoint("https://support.example.com", EntityKind::TicketComments, "7").unwrap(),
            "https://support.example.com/api/v2/tickets/7/comments.json"
        );
        assert!(child_endpoint("https://support.example.com", EntityKind::Posts, "1").is_err());
    }

    #[test]
    fn test_page_file_names_match_globs() {
        for kind in [
            EntityKind::Topics,
            EntityKind::Users,
            EntityKind::Posts,
            EntityKind::Tickets,
        ] {
            let name = page_file_name(kind, 2);
            let matcher = globset::Glob::new(&kind.page_glob())
                .unwrap()
                .compile_matcher();
            assert!(matcher.is_match(&name), "{} vs {}", name, kind.page_glob());
        }
        assert_eq!(page_file_name(EntityKind::Posts, 3), "posts_3.json");
    }

    #[test]
    fn test_next_page() {
        assert_eq!(
            next_page(&json!({"next_page": "https://x/api?page=2"})),
            Some("https://x/api?page=2".into())
        );
        assert_eq!(next_page(&json!({"next_page": null})), None);
        assert_eq!(next_page(&json!({})), None);
    }

    #[test]
    fn test_recent_ids() {
        let now = timestamp::normalize("2018-06-10T00:00:00Z").unwrap().epoch;
        let records = vec![
            json!({"id": 1, "updated_at": "2018-06-08T00:00:00Z"}),
            json!({"id": 2, "updated_at": "2018-05-01T00:00:00Z"}),
            json!({"id": 3}),
            json!({"id": 4, "updated_at": "garbage"}),
        ];
        assert_eq!(recent_ids(&records, now, 5), vec!["1".to_string()]);
    }
}
