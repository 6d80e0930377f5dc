//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/forum.sqlite"
//!
//! [pages]
//! dir = "./data/pages"
//!
//! [output]
//! dir = "./reports"
//!
//! [api]
//! base_url = "https://support.example.com"
//! timeout_secs = 30
//! max_pages = 50
//! recent_days = 5
//!
//! [projection]
//! on_missing_field = "fail"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::project::MissingFieldPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub pages: PagesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub projection: ProjectionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Directory holding the fetched JSON page files, one file per API page.
#[derive(Debug, Deserialize, Clone)]
pub struct PagesConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Only posts updated within this many days get their comments fetched.
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_pages() -> u32 {
    50
}
fn default_recent_days() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectionConfig {
    #[serde(default = "default_on_missing_field")]
    pub on_missing_field: String,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            on_missing_field: default_on_missing_field(),
        }
    }
}

fn default_on_missing_field() -> String {
    "fail".to_string()
}

impl ProjectionConfig {
    pub fn policy(&self) -> MissingFieldPolicy {
        match self.on_missing_field.as_str() {
            "null" => MissingFieldPolicy::Null,
            _ => MissingFieldPolicy::Fail,
        }
    }
}

impl Config {
    /// Config pointing everything under one directory. Used by tests and
    /// by callers embedding the library without a TOML file.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            db: DbConfig {
                path: root.join("forum.sqlite"),
            },
            pages: PagesConfig {
                dir: root.join("pages"),
            },
            output: OutputConfig {
                dir: root.join("reports"),
            },
            api: None,
            projection: ProjectionConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(api) = &config.api {
        if api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be >= 1");
        }
        if api.max_pages == 0 {
            anyhow::bail!("api.max_pages must be >= 1");
        }
        if api.recent_days < 0 {
            anyhow::bail!("api.recent_days must be >= 0");
        }
    }

    match config.projection.on_missing_field.as_str() {
        "fail" | "null" => {}
        other => anyhow::bail!(
            "Unknown projection.on_missing_field: '{}'. Must be fail or null.",
            other
        ),
    }

    Ok(config)
}
