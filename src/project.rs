//! Relational projector.
//!
//! Derives one typed table from the current contents of one raw-document
//! table. Each raw document becomes exactly one typed row, upserted by
//! natural ID. Projection only inserts and overwrites; typed rows whose
//! raw document has since disappeared are left in place.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::ProjectError;
use crate::fieldmap::{coerce, lookup, FieldSource, Projection, SourceValue};
use crate::ingest::load_raw_documents;
use crate::models::{EntityKind, RawDocument, SqlValue};
use crate::timestamp;

/// What to do when a mapped source field is absent from a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingFieldPolicy {
    /// Abort the whole projection run.
    #[default]
    Fail,
    /// Write NULL into the column and continue.
    Null,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectStats {
    pub inserted: u64,
    pub updated: u64,
}

impl ProjectStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated
    }
}

pub async fn ensure_typed_table(
    pool: &SqlitePool,
    kind: EntityKind,
    projection: &Projection,
) -> Result<(), sqlx::Error> {
    sqlx::query(&projection.create_table_sql(kind.typed_table()))
        .execute(pool)
        .await?;
    Ok(())
}

/// Project every raw document of `kind` into its typed table.
pub async fn project(
    pool: &SqlitePool,
    kind: EntityKind,
    projection: &Projection,
    policy: MissingFieldPolicy,
) -> Result<ProjectStats, ProjectError> {
    let docs = load_raw_documents(pool, kind).await?;

    // Stage every row first: a bad document aborts before anything is written.
    let rows = docs
        .iter()
        .map(|doc| stage_row(kind, doc, projection, policy))
        .collect::<Result<Vec<_>, _>>()?;

    let table = kind.typed_table();
    let columns: Vec<String> = projection.columns().into_iter().map(|(c, _)| c).collect();

    let select_sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let update_sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        table,
        columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let insert_sql = format!(
        "INSERT INTO {} (id, {}) VALUES (?{})",
        table,
        columns.join(", "),
        ", ?".repeat(columns.len())
    );

    let mut tx = pool.begin().await?;
    sqlx::query(&projection.create_table_sql(table))
        .execute(&mut *tx)
        .await?;

    let mut stats = ProjectStats::default();
    for (doc, values) in docs.iter().zip(rows) {
        let exists = sqlx::query(&select_sql)
            .bind(&doc.id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        if exists {
            let mut query = sqlx::query(&update_sql);
            for value in values {
                query = bind_value(query, value);
            }
            query.bind(doc.id.clone()).execute(&mut *tx).await?;
            stats.updated += 1;
        } else {
            let mut query = sqlx::query(&insert_sql).bind(doc.id.clone());
            for value in values {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await?;
            stats.inserted += 1;
        }
    }

    tx.commit().await?;

    debug!(
        kind = %kind,
        inserted = stats.inserted,
        updated = stats.updated,
        "projected typed table"
    );
    Ok(stats)
}

/// Column values for one document, in [`Projection::columns`] order.
pub fn stage_row(
    kind: EntityKind,
    doc: &RawDocument,
    projection: &Projection,
    policy: MissingFieldPolicy,
) -> Result<Vec<SqlValue>, ProjectError> {
    let missing = |field: String| -> Result<(), ProjectError> {
        match policy {
            MissingFieldPolicy::Fail => Err(ProjectError::MissingField {
                kind,
                id: doc.id.clone(),
                field,
            }),
            MissingFieldPolicy::Null => Ok(()),
        }
    };

    let mut values = Vec::with_capacity(projection.fields.len() + projection.timestamps.len() * 2);

    for mapping in &projection.fields {
        match lookup(&doc.document, doc.secondary_key.as_deref(), &mapping.source) {
            Some(raw) => {
                let value = coerce(raw, mapping.coercion).map_err(|found| ProjectError::Coercion {
                    kind,
                    id: doc.id.clone(),
                    column: mapping.column.to_string(),
                    found,
                })?;
                values.push(value);
            }
            None => {
                missing(mapping.source.to_string())?;
                values.push(SqlValue::Null);
            }
        }
    }

    for mapping in &projection.timestamps {
        let raw = lookup(
            &doc.document,
            None,
            &FieldSource::Field(mapping.source),
        );
        match raw {
            Some(SourceValue::Json(serde_json::Value::String(s))) => {
                let ts = timestamp::normalize(s).map_err(|source| ProjectError::Timestamp {
                    kind,
                    id: doc.id.clone(),
                    field: mapping.source.to_string(),
                    source,
                })?;
                values.push(SqlValue::Integer(ts.epoch));
                values.push(SqlValue::Text(ts.text));
            }
            _ => {
                missing(mapping.source.to_string())?;
                values.push(SqlValue::Null);
                values.push(SqlValue::Null);
            }
        }
    }

    Ok(values)
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(n) => query.bind(n),
        SqlValue::Real(x) => query.bind(x),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Bool(b) => query.bind(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::ingest::ingest;
    use serde_json::json;
    use sqlx::Row;

    fn topic(id: i64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "url": format!("https://support.example.com/api/v2/community/topics/{}.json", id),
            "html_url": format!("https://support.example.com/hc/community/topics/{}", id),
            "name": name,
            "description": "",
            "position": 0,
            "follower_count": 3,
            "community_id": 11,
            "user_segment_id": null,
            "created_at": "2018-01-05T00:00:00Z",
            "updated_at": "2018-01-06T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_projects_and_overwrites() {
        let pool = db::open_in_memory().await.unwrap();
        let projection = Projection::for_kind(EntityKind::Topics);

        ingest(&pool, EntityKind::Topics, &[topic(1, "Java SDK")], "id", None)
            .await
            .unwrap();
        let first = project(&pool, EntityKind::Topics, &projection, MissingFieldPolicy::Fail)
            .await
            .unwrap();
        assert_eq!(first, ProjectStats { inserted: 1, updated: 0 });

        ingest(&pool, EntityKind::Topics, &[topic(1, ".NET SDK")], "id", None)
            .await
            .unwrap();
        let second = project(&pool, EntityKind::Topics, &projection, MissingFieldPolicy::Fail)
            .await
            .unwrap();
        assert_eq!(second, ProjectStats { inserted: 0, updated: 1 });

        let row = sqlx::query("SELECT name, community_id, user_segment_id, created_at_str FROM topics WHERE id = '1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("name"), ".NET SDK");
        assert_eq!(row.get::<String, _>("community_id"), "11");
        assert_eq!(row.get::<Option<String>, _>("user_segment_id"), None);
        assert_eq!(row.get::<String, _>("created_at_str"), "2018-01-05 00:00:00");
    }

    #[tokio::test]
    async fn test_typed_rows_outlive_their_raw_documents() {
        let pool = db::open_in_memory().await.unwrap();
        let projection = Projection::for_kind(EntityKind::Topics);

        ingest(&pool, EntityKind::Topics, &[topic(3, "Mobile")], "id", None)
            .await
            .unwrap();
        project(&pool, EntityKind::Topics, &projection, MissingFieldPolicy::Fail)
            .await
            .unwrap();

        sqlx::query("DELETE FROM topics_json")
            .execute(&pool)
            .await
            .unwrap();
        let stats = project(&pool, EntityKind::Topics, &projection, MissingFieldPolicy::Fail)
            .await
            .unwrap();
        assert_eq!(stats.total(), 0);

        let name: String = sqlx::query_scalar("SELECT name FROM topics WHERE id = '3'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Mobile");
    }

    #[tokio::test]
    async fn test_empty_raw_table_still_creates_typed_table() {
        let pool = db::open_in_memory().await.unwrap();
        let stats = project(
            &pool,
            EntityKind::Tickets,
            &Projection::for_kind(EntityKind::Tickets),
            MissingFieldPolicy::Fail,
        )
        .await
        .unwrap();
        assert_eq!(stats.total(), 0);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_missing_field_fails_by_default() {
        let pool = db::open_in_memory().await.unwrap();
        let mut doc = topic(2, "Cloud");
        doc.as_object_mut().unwrap().remove("position");
        ingest(&pool, EntityKind::Topics, &[doc], "id", None)
            .await
            .unwrap();

        let err = project(
            &pool,
            EntityKind::Topics,
            &Projection::for_kind(EntityKind::Topics),
            MissingFieldPolicy::Fail,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProjectError::MissingField { .. }));
        assert!(err.to_string().contains("position"));

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
            .fetch_one(&pool)
            .await
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_missing_field_null_policy() {
        let pool = db::open_in_memory().await.unwrap();
        let mut doc = topic(3, "Mobile");
        doc.as_object_mut().unwrap().remove("position");
        doc.as_object_mut().unwrap().remove("updated_at");
        ingest(&pool, EntityKind::Topics, &[doc], "id", None)
            .await
            .unwrap();

        project(
            &pool,
            EntityKind::Topics,
            &Projection::for_kind(EntityKind::Topics),
            MissingFieldPolicy::Null,
        )
        .await
        .unwrap();

        let row = sqlx::query("SELECT position, updated_at_timestamp, updated_at_str FROM topics WHERE id = '3'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<Option<String>, _>("position"), None);
        assert_eq!(row.get::<Option<i64>, _>("updated_at_timestamp"), None);
        assert_eq!(row.get::<Option<String>, _>("updated_at_str"), None);
    }

    #[tokio::test]
    async fn test_bad_boolean_is_coercion_error() {
        let pool = db::open_in_memory().await.unwrap();
        ingest(
            &pool,
            EntityKind::TicketComments,
            &[json!({
                "id": 1,
                "author_id": 2,
                "body": "x",
                "public": "yes",
                "created_at": "2018-01-05T00:00:00Z"
            })],
            "id",
            Some(&|_: &serde_json::Value| Some("10".to_string())),
        )
        .await
        .unwrap();

        let err = project(
            &pool,
            EntityKind::TicketComments,
            &Projection::for_kind(EntityKind::TicketComments),
            MissingFieldPolicy::Fail,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProjectError::Coercion { ref column, .. } if column == "public"));
    }

    #[tokio::test]
    async fn test_ticket_comment_reads_ticket_from_secondary_key() {
        let pool = db::open_in_memory().await.unwrap();
        ingest(
            &pool,
            EntityKind::TicketComments,
            &[json!({
                "id": 1,
                "author_id": 2,
                "body": "x",
                "public": true,
                "created_at": "2018-01-05T00:00:00Z"
            })],
            "id",
            Some(&|_: &serde_json::Value| Some("10".to_string())),
        )
        .await
        .unwrap();
        project(
            &pool,
            EntityKind::TicketComments,
            &Projection::for_kind(EntityKind::TicketComments),
            MissingFieldPolicy::Fail,
        )
        .await
        .unwrap();

        let tickets_id: String = sqlx::query_scalar("SELECT tickets_id FROM ticket_comments WHERE id = '1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(tickets_id, "10");
    }
}
