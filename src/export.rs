//! Spreadsheet export of raw documents.
//!
//! Writes one kind's raw documents either as a CSV sheet (one row per
//! document, columns taken from the first document's fields in document
//! order) or as a JSON array. CSV cells are prepared for spreadsheet import:
//! numeric ID columns are prefixed with `#` so they are not reformatted as
//! numbers, and long cells are cut at the spreadsheet cell limit.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::ingest::load_raw_documents;
use crate::models::EntityKind;

/// Maximum characters a spreadsheet cell accepts.
pub const MAX_CELL_CHARS: usize = 32767;

const ID_COLUMNS: &[&str] = &["id", "author_id", "topic_id", "post_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => anyhow::bail!("Unknown export format: '{}'. Must be csv or json.", other),
        }
    }
}

/// `<dir>/<kind>_<YYYY_MM_DD>.<ext>` for today's local date.
pub fn default_output_path(dir: &Path, kind: EntityKind, format: ExportFormat) -> PathBuf {
    let date = chrono::Local::now().format("%Y_%m_%d");
    dir.join(format!("{}_{}.{}", kind, date, format.extension()))
}

/// Render documents as a CSV sheet.
pub fn to_csv(documents: &[Value]) -> String {
    let header: Vec<String> = match documents.first() {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => return String::new(),
    };

    let mut out = String::new();
    push_line(&mut out, header.iter().map(String::as_str));

    for doc in documents {
        let cells: Vec<String> = header
            .iter()
            .map(|key| cell(key, doc.get(key.as_str())))
            .collect();
        push_line(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn cell(key: &str, value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let text = if ID_COLUMNS.contains(&key) && !text.is_empty() {
        format!("#{}", text)
    } else {
        text
    };
    truncate_chars(text, MAX_CELL_CHARS)
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text,
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, c) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        // minimal CSV escaping
        if c.contains(',') || c.contains('"') || c.contains('\n') || c.contains('\r') {
            out.push('"');
            out.push_str(&c.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(c);
        }
    }
    out.push('\n');
}

/// Export one kind. If `output` is `None` the file goes to `[output] dir`.
pub async fn run_export(
    config: &Config,
    kind: EntityKind,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let docs = load_raw_documents(&pool, kind)
        .await
        .with_context(|| format!("Failed to read {}", kind.raw_table()))?;
    pool.close().await;

    let documents: Vec<Value> = docs.into_iter().map(|d| d.document).collect();
    let body = match format {
        ExportFormat::Csv => to_csv(&documents),
        ExportFormat::Json => serde_json::to_string_pretty(&documents)?,
    };

    let path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output_path(&config.output.dir, kind, format),
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Exported {} {} to {}", documents.len(), kind, path.display());
    Ok(())
}
