//! On-disk JSON page files.
//!
//! The fetcher writes one file per API page into the configured page
//! directory. Each file is an envelope object whose array field holds the
//! entities (`{"posts": [...], "next_page": ...}`). Child kinds encode their
//! parent's ID in the file name: `comments_<post_id>.json`,
//! `ticket_comments_<ticket_id>.json`.

use anyhow::{Context, Result};
use globset::Glob;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::EntityKind;

/// One page file of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub path: PathBuf,
    /// Parent ID parsed from the file name (child kinds only).
    pub secondary_key: Option<String>,
}

/// All page files of `kind` directly under `dir`, numbered pages first in
/// page order. A missing directory yields no pages.
pub fn discover(dir: &Path, kind: EntityKind) -> Result<Vec<Page>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let matcher = Glob::new(&kind.page_glob())
        .with_context(|| format!("Invalid page glob for {}", kind))?
        .compile_matcher();

    let mut pages = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !matcher.is_match(name.as_ref()) {
            continue;
        }
        let secondary_key = match kind.secondary_key_column() {
            Some(_) => secondary_key_from_file(kind, &name),
            None => None,
        };
        pages.push(Page {
            path: entry.path().to_path_buf(),
            secondary_key,
        });
    }

    // Numbered pages in fetch order (`posts_2` before `posts_10`), then the rest by name.
    pages.sort_by_cached_key(|page| {
        let name = page
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (page_number(kind, &name).map_or((1, 0), |n| (0, n)), name)
    });
    Ok(pages)
}

/// `posts_12.json` → `12`, `topics_3.json` → `3`. `None` if the part after
/// the kind's prefix is not a number.
pub fn page_number(kind: EntityKind, file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(kind.file_prefix())?
        .trim_start_matches('_')
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Delete numbered list pages of `kind` above `last`, left over from an
/// earlier fetch that returned more pages. List kinds only: child page
/// numbers are parent IDs. Returns the removed paths.
pub fn prune_pages_after(dir: &Path, kind: EntityKind, last: u64) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for page in discover(dir, kind)? {
        let name = page
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if page_number(kind, &name).is_some_and(|n| n > last) {
            std::fs::remove_file(&page.path)
                .with_context(|| format!("Failed to remove stale page: {}", page.path.display()))?;
            removed.push(page.path);
        }
    }
    Ok(removed)
}

/// `comments_220794928.json` → `220794928`.
pub fn secondary_key_from_file(kind: EntityKind, file_name: &str) -> Option<String> {
    let key = file_name
        .strip_prefix(kind.file_prefix())?
        .strip_suffix(".json")?;
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Decode a page file and return its entity records.
pub fn load(kind: EntityKind, page: &Page) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(&page.path)
        .with_context(|| format!("Failed to read page file: {}", page.path.display()))?;
    let envelope: Value = serde_json::from_str(&text)
        .with_context(|| format!("Page file is not valid JSON: {}", page.path.display()))?;
    unwrap_envelope(kind, envelope)
        .with_context(|| format!("Unexpected page shape: {}", page.path.display()))
}

/// Pull the entity array out of a decoded envelope.
pub fn unwrap_envelope(kind: EntityKind, envelope: Value) -> Result<Vec<Value>> {
    let Value::Object(mut map) = envelope else {
        anyhow::bail!("{} page is not a JSON object", kind);
    };

    let records = kind
        .envelope_fields()
        .iter()
        .find_map(|field| map.remove(*field))
        .with_context(|| {
            format!(
                "{} page has none of the fields: {}",
                kind,
                kind.envelope_fields().join(", ")
            )
        })?;

    let Value::Array(records) = records else {
        anyhow::bail!("{} page envelope is not an array", kind);
    };

    if kind == EntityKind::Users {
        return Ok(records.into_iter().filter(is_user_record).collect());
    }
    Ok(records)
}

// Search results mix users with other result types.
fn is_user_record(record: &Value) -> bool {
    match record.get("result_type") {
        Some(Value::String(t)) => t == "user",
        Some(_) => false,
        None => true,
    }
}

/// Write a page file, replacing any previous copy.
pub fn write_page(dir: &Path, file_name: &str, body: &Value) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create page directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    let text = serde_json::to_string_pretty(body)?;
    std::fs::write(&path, text)
        .with_context(|| format!("Failed to write page file: {}", path.display()))?;
    Ok(path)
}
