//! Document ingestor.
//!
//! Reconciles one page of freshly fetched entities into the kind's
//! raw-document table: one row per natural ID, holding the most recently
//! ingested document. Existing rows are overwritten, never merged.
//!
//! Every ID in the batch is validated before the first write, and the
//! writes run in a single transaction, so a bad record leaves the table
//! exactly as it was before the call.

use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::IngestError;
use crate::models::{EntityKind, RawDocument};

/// Derives a record's secondary key from context the record itself may not
/// carry (e.g. the page file it came from).
pub type SecondaryKeyFn<'a> = dyn Fn(&Value) -> Option<String> + 'a;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: u64,
    pub updated: u64,
}

impl IngestStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn absorb(&mut self, other: IngestStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

struct Staged {
    id: String,
    secondary_key: Option<String>,
    json: String,
}

/// Upsert `documents` into `kind`'s raw-document table, keyed by the
/// string form of `record[id_field]`.
pub async fn ingest(
    pool: &SqlitePool,
    kind: EntityKind,
    documents: &[Value],
    id_field: &str,
    secondary_key: Option<&SecondaryKeyFn<'_>>,
) -> Result<IngestStats, IngestError> {
    let mut staged = Vec::with_capacity(documents.len());
    for (index, record) in documents.iter().enumerate() {
        let id = record
            .get(id_field)
            .and_then(natural_id)
            .ok_or_else(|| IngestError::MissingId {
                kind,
                index,
                field: id_field.to_string(),
            })?;
        let json = serde_json::to_string(record).map_err(|source| IngestError::Serialize {
            kind,
            id: id.clone(),
            source,
        })?;
        staged.push(Staged {
            id,
            secondary_key: secondary_key.and_then(|f| f(record)),
            json,
        });
    }

    let table = kind.raw_table();
    let key_column = kind.secondary_key_column().filter(|_| secondary_key.is_some());

    let select_sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let (update_sql, insert_sql) = match key_column {
        Some(col) => (
            format!("UPDATE {} SET document = ?, {} = ? WHERE id = ?", table, col),
            format!("INSERT INTO {} (id, {}, document) VALUES (?, ?, ?)", table, col),
        ),
        None => (
            format!("UPDATE {} SET document = ? WHERE id = ?", table),
            format!("INSERT INTO {} (id, document) VALUES (?, ?)", table),
        ),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(&raw_table_sql(kind)).execute(&mut *tx).await?;

    let mut stats = IngestStats::default();
    for doc in staged {
        let exists = sqlx::query(&select_sql)
            .bind(&doc.id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        if exists {
            let query = sqlx::query(&update_sql).bind(&doc.json);
            let query = match key_column {
                Some(_) => query.bind(&doc.secondary_key),
                None => query,
            };
            query.bind(&doc.id).execute(&mut *tx).await?;
            stats.updated += 1;
        } else {
            let query = sqlx::query(&insert_sql).bind(&doc.id);
            let query = match key_column {
                Some(_) => query.bind(&doc.secondary_key),
                None => query,
            };
            query.bind(&doc.json).execute(&mut *tx).await?;
            stats.inserted += 1;
        }
    }

    tx.commit().await?;

    debug!(
        kind = %kind,
        inserted = stats.inserted,
        updated = stats.updated,
        "ingested batch"
    );
    Ok(stats)
}

/// Natural IDs are always stored as strings so integer and string IDs
/// cannot collide across kinds.
pub fn natural_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn raw_table_sql(kind: EntityKind) -> String {
    match kind.secondary_key_column() {
        Some(col) => format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, {} TEXT, document TEXT NOT NULL)",
            kind.raw_table(),
            col
        ),
        None => format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, document TEXT NOT NULL)",
            kind.raw_table()
        ),
    }
}

/// Read every raw document of `kind`, ordered by ID. Documents that fail to
/// decode are returned as an error naming the row.
pub async fn load_raw_documents(
    pool: &SqlitePool,
    kind: EntityKind,
) -> Result<Vec<RawDocument>, crate::error::ProjectError> {
    sqlx::query(&raw_table_sql(kind)).execute(pool).await?;

    let sql = match kind.secondary_key_column() {
        Some(col) => format!(
            "SELECT id, {} AS secondary_key, document FROM {} ORDER BY id",
            col,
            kind.raw_table()
        ),
        None => format!(
            "SELECT id, NULL AS secondary_key, document FROM {} ORDER BY id",
            kind.raw_table()
        ),
    };

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let secondary_key: Option<String> = row.get("secondary_key");
        let text: String = row.get("document");
        let document = serde_json::from_str(&text).map_err(|source| {
            crate::error::ProjectError::Document {
                kind,
                id: id.clone(),
                source,
            }
        })?;
        docs.push(RawDocument {
            id,
            secondary_key,
            document,
        });
    }
    Ok(docs)
}
