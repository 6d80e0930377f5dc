//! Typed failures of the reconciliation core.
//!
//! Every variant aborts the current batch. Orchestration code wraps these
//! in `anyhow` and decides how the process exits.

use thiserror::Error;

use crate::models::EntityKind;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("timestamp '{0}' is too short for YYYY-MM-DDTHH:MM:SSZ")]
    TooShort(String),

    #[error("timestamp '{value}' does not parse as YYYY-MM-DD HH:MM:SS")]
    Parse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("timestamp '{0}' does not exist in the local time zone")]
    NonexistentLocalTime(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{kind}: record {index} has no usable `{field}` value")]
    MissingId {
        kind: EntityKind,
        index: usize,
        field: String,
    },

    #[error("{kind}: could not serialize document {id}")]
    Serialize {
        kind: EntityKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{kind} {id}: missing source field `{field}`")]
    MissingField {
        kind: EntityKind,
        id: String,
        field: String,
    },

    #[error("{kind} {id}: column `{column}` expects a boolean, found {found}")]
    Coercion {
        kind: EntityKind,
        id: String,
        column: String,
        found: String,
    },

    #[error("{kind} {id}: bad `{field}` timestamp")]
    Timestamp {
        kind: EntityKind,
        id: String,
        field: String,
        #[source]
        source: TimestampError,
    },

    #[error("{kind} {id}: stored document is not valid JSON")]
    Document {
        kind: EntityKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
