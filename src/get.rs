//! Inspect one entity by natural ID.
//!
//! Shows the raw document as stored and, if the kind has been projected
//! since, the matching typed row.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, ValueRef};

use crate::config::Config;
use crate::db;
use crate::ingest::raw_table_sql;
use crate::models::{EntityKind, SqlValue};

#[derive(Debug, Clone, Serialize)]
pub struct EntityResponse {
    pub kind: String,
    pub id: String,
    pub secondary_key: Option<String>,
    pub document: Value,
    /// Typed columns in table order, `None` if not projected yet.
    #[serde(skip)]
    pub typed: Option<Vec<(String, SqlValue)>>,
}

pub async fn get_entity(pool: &SqlitePool, kind: EntityKind, id: &str) -> Result<EntityResponse> {
    sqlx::query(&raw_table_sql(kind)).execute(pool).await?;

    let sql = match kind.secondary_key_column() {
        Some(col) => format!(
            "SELECT id, {} AS secondary_key, document FROM {} WHERE id = ?",
            col,
            kind.raw_table()
        ),
        None => format!(
            "SELECT id, NULL AS secondary_key, document FROM {} WHERE id = ?",
            kind.raw_table()
        ),
    };
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(pool).await? else {
        bail!("{} not found: {}", kind, id);
    };

    let text: String = row.get("document");
    let document: Value = serde_json::from_str(&text)?;

    let typed_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(kind.typed_table())
    .fetch_one(pool)
    .await?;

    let typed = if typed_exists {
        sqlx::query(&format!("SELECT * FROM {} WHERE id = ?", kind.typed_table()))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(|row| typed_columns(&row))
            .transpose()?
    } else {
        None
    };

    Ok(EntityResponse {
        kind: kind.to_string(),
        id: row.get("id"),
        secondary_key: row.get("secondary_key"),
        document,
        typed,
    })
}

fn typed_columns(row: &SqliteRow) -> Result<Vec<(String, SqlValue)>> {
    let mut out = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let i = column.ordinal();
        let value = if row.try_get_raw(i)?.is_null() {
            SqlValue::Null
        } else if let Ok(n) = row.try_get::<i64, _>(i) {
            SqlValue::Integer(n)
        } else if let Ok(x) = row.try_get::<f64, _>(i) {
            SqlValue::Real(x)
        } else {
            SqlValue::Text(row.try_get::<String, _>(i)?)
        };
        out.push((column.name().to_string(), value));
    }
    Ok(out)
}

/// CLI entry point. Prints the raw document and typed row to stdout.
pub async fn run_get(config: &Config, kind: EntityKind, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let entity = get_entity(&pool, kind, id).await;
    pool.close().await;
    let entity = entity?;

    println!("--- {} {} ---", entity.kind, entity.id);
    if let Some(ref key) = entity.secondary_key {
        println!("parent:       {}", key);
    }
    println!();
    println!("--- Raw document ---");
    println!("{}", serde_json::to_string_pretty(&entity.document)?);
    println!();

    match entity.typed {
        Some(columns) => {
            println!("--- Typed row ---");
            for (name, value) in columns {
                println!("{:<24} {}", name, value.display());
            }
        }
        None => println!("--- Typed row: not projected ---"),
    }

    Ok(())
}
