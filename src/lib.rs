//! # Forum Sync
//!
//! Mirrors a help-center forum (topics, users, posts, comments, support
//! tickets and ticket comments) into a local SQLite database.
//!
//! Each entity kind lives in two tables: a raw-document table holding the
//! latest JSON document per natural ID, and a typed table with one column
//! per mapped field, derived from the raw table. Re-running any stage over
//! the same input converges to the same state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │  Fetch   │──▶│ JSON page │──▶│  Ingest  │──▶│ *_json    │
//! │ (HTTP)   │   │   files   │   │ (upsert) │   │ raw docs  │
//! └──────────┘   └───────────┘   └──────────┘   └─────┬─────┘
//!                                                     │ project
//!                          ┌──────────┐         ┌─────▼─────┐
//!                          │ Export / │◀────────│  typed    │
//!                          │ Report   │         │  tables   │
//!                          └──────────┘         └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! forumctl init
//! forumctl sync all --fetch
//! forumctl report --format both
//! forumctl export posts --format csv
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Entity kinds and core data types |
//! | [`error`] | Typed ingestion/projection errors |
//! | [`timestamp`] | Upstream timestamp normalization |
//! | [`fieldmap`] | Per-kind projection maps and coercions |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and per-kind reset |
//! | [`pages`] | JSON page file discovery and decoding |
//! | [`ingest`] | Raw-document upsert |
//! | [`project`] | Typed-table projection |
//! | [`fetch`] | HTTP page fetcher |
//! | [`pipeline`] | Sync orchestration |
//! | [`export`] | CSV / JSON sheet export |
//! | [`report`] | Markdown / HTML status report |
//! | [`stats`] | Row counts and last sync run |
//! | [`get`] | Single-entity inspection |

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetch;
pub mod fieldmap;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pages;
pub mod pipeline;
pub mod project;
pub mod report;
pub mod stats;
pub mod timestamp;
