//! Per-kind projection maps.
//!
//! A [`Projection`] lists, in column order, where each typed column comes
//! from and how the JSON value is coerced on the way in. The built-in maps
//! mirror the typed tables the reports query.

use serde_json::Value;

use crate::models::{EntityKind, SqlValue};

/// Where a typed column's value is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Top-level document field.
    Field(&'static str),
    /// `custom_fields[position].value`.
    CustomField(usize),
    /// The raw row's secondary key (child kinds only).
    SecondaryKey,
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSource::Field(name) => write!(f, "{}", name),
            FieldSource::CustomField(position) => write!(f, "custom_fields[{}]", position),
            FieldSource::SecondaryKey => write!(f, "secondary key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Keep the JSON type: numbers stay numeric, strings stay text.
    Identity,
    /// Cast to text. Used for upstream IDs, which arrive as integers.
    Text,
    /// Pass a JSON boolean through.
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: FieldSource,
    pub column: &'static str,
    pub column_type: ColumnType,
    pub coercion: Coercion,
}

/// `source` → `<column>_timestamp` + `<column>_str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampMapping {
    pub source: &'static str,
    pub column: &'static str,
}

impl TimestampMapping {
    pub fn epoch_column(&self) -> String {
        format!("{}_timestamp", self.column)
    }

    pub fn text_column(&self) -> String {
        format!("{}_str", self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<FieldMapping>,
    pub timestamps: Vec<TimestampMapping>,
}

/// Ticket custom fields carry no stable names upstream, only stable
/// positions. Schema drift is fixed here and nowhere else.
pub const TICKET_CUSTOM_FIELDS: &[(usize, &str)] = &[(0, "post_id"), (1, "product"), (2, "isv_status")];

fn text(name: &'static str) -> FieldMapping {
    FieldMapping {
        source: FieldSource::Field(name),
        column: name,
        column_type: ColumnType::Text,
        coercion: Coercion::Identity,
    }
}

fn cast(name: &'static str) -> FieldMapping {
    FieldMapping {
        source: FieldSource::Field(name),
        column: name,
        column_type: ColumnType::Text,
        coercion: Coercion::Text,
    }
}

fn integer(name: &'static str) -> FieldMapping {
    FieldMapping {
        source: FieldSource::Field(name),
        column: name,
        column_type: ColumnType::Integer,
        coercion: Coercion::Identity,
    }
}

fn boolean(name: &'static str) -> FieldMapping {
    FieldMapping {
        source: FieldSource::Field(name),
        column: name,
        column_type: ColumnType::Boolean,
        coercion: Coercion::Bool,
    }
}

fn stamps(names: &[&'static str]) -> Vec<TimestampMapping> {
    names
        .iter()
        .map(|&n| TimestampMapping {
            source: n,
            column: n,
        })
        .collect()
}

impl Projection {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Posts => Projection {
                fields: vec![
                    text("url"),
                    text("title"),
                    boolean("closed"),
                    boolean("pinned"),
                    text("status"),
                    text("details"),
                    boolean("featured"),
                    text("html_url"),
                    cast("topic_id"),
                    integer("vote_sum"),
                    cast("author_id"),
                    integer("vote_count"),
                    integer("comment_count"),
                    integer("follower_count"),
                ],
                timestamps: stamps(&["created_at", "updated_at"]),
            },
            EntityKind::Comments => Projection {
                fields: vec![
                    text("url"),
                    text("body"),
                    cast("post_id"),
                    text("html_url"),
                    boolean("official"),
                    integer("vote_sum"),
                    cast("author_id"),
                    integer("vote_count"),
                ],
                timestamps: stamps(&["created_at", "updated_at"]),
            },
            EntityKind::Topics => Projection {
                fields: vec![
                    text("url"),
                    text("html_url"),
                    text("name"),
                    text("description"),
                    cast("position"),
                    cast("follower_count"),
                    cast("community_id"),
                    cast("user_segment_id"),
                ],
                timestamps: stamps(&["created_at", "updated_at"]),
            },
            EntityKind::Users => Projection {
                fields: vec![
                    text("url"),
                    text("name"),
                    cast("email"),
                    cast("time_zone"),
                    cast("phone"),
                    cast("shared_phone_number"),
                    cast("photo"),
                    cast("locale_id"),
                    cast("locale"),
                    cast("organization_id"),
                    text("role"),
                    boolean("verified"),
                ],
                timestamps: stamps(&["created_at", "updated_at"]),
            },
            EntityKind::Tickets => {
                let mut fields = vec![
                    text("url"),
                    cast("subject"),
                    cast("description"),
                    cast("status"),
                    cast("priority"),
                    FieldMapping {
                        source: FieldSource::Field("type"),
                        column: "ticket_type",
                        column_type: ColumnType::Text,
                        coercion: Coercion::Text,
                    },
                    cast("requester_id"),
                    cast("assignee_id"),
                    cast("organization_id"),
                ];
                fields.extend(TICKET_CUSTOM_FIELDS.iter().map(|&(position, column)| {
                    FieldMapping {
                        source: FieldSource::CustomField(position),
                        column,
                        column_type: ColumnType::Text,
                        coercion: Coercion::Text,
                    }
                }));
                Projection {
                    fields,
                    timestamps: stamps(&["created_at", "updated_at"]),
                }
            }
            EntityKind::TicketComments => Projection {
                fields: vec![
                    FieldMapping {
                        source: FieldSource::SecondaryKey,
                        column: "tickets_id",
                        column_type: ColumnType::Text,
                        coercion: Coercion::Text,
                    },
                    cast("author_id"),
                    cast("body"),
                    boolean("public"),
                ],
                timestamps: stamps(&["created_at"]),
            },
        }
    }

    /// Every typed column after `id`, in table-definition order.
    pub fn columns(&self) -> Vec<(String, ColumnType)> {
        let mut cols: Vec<(String, ColumnType)> = self
            .fields
            .iter()
            .map(|f| (f.column.to_string(), f.column_type))
            .collect();
        for ts in &self.timestamps {
            cols.push((ts.epoch_column(), ColumnType::Integer));
            cols.push((ts.text_column(), ColumnType::Text));
        }
        cols
    }

    pub fn create_table_sql(&self, table: &str) -> String {
        let mut defs = vec!["id TEXT PRIMARY KEY".to_string()];
        defs.extend(
            self.columns()
                .into_iter()
                .map(|(name, ty)| format!("{} {}", name, ty.sql())),
        );
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, defs.join(", "))
    }
}

/// Locate a mapping's raw value. `None` means the source is absent.
pub fn lookup<'a>(
    document: &'a Value,
    secondary_key: Option<&'a str>,
    source: &FieldSource,
) -> Option<SourceValue<'a>> {
    match source {
        FieldSource::Field(name) => document.get(*name).map(SourceValue::Json),
        FieldSource::CustomField(position) => document
            .get("custom_fields")
            .and_then(|fields| fields.get(*position))
            .and_then(|field| field.get("value"))
            .map(SourceValue::Json),
        FieldSource::SecondaryKey => secondary_key.map(SourceValue::Key),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SourceValue<'a> {
    Json(&'a Value),
    Key(&'a str),
}

/// Apply a coercion. `Err` carries a short description of the offending
/// value for the caller's error.
pub fn coerce(value: SourceValue<'_>, coercion: Coercion) -> Result<SqlValue, String> {
    let json = match value {
        SourceValue::Key(key) => return Ok(SqlValue::Text(key.to_string())),
        SourceValue::Json(json) => json,
    };

    if json.is_null() {
        return Ok(SqlValue::Null);
    }

    match coercion {
        Coercion::Identity => Ok(match json {
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }),
        Coercion::Text => Ok(SqlValue::Text(match json {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        Coercion::Bool => match json {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            other => Err(describe(other)),
        },
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}
