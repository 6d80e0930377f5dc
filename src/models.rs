//! Core data types shared by the ingestor, the projector and the sinks.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// One kind of upstream entity. Each kind owns a raw-document table and a
/// typed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Topics,
    Users,
    Posts,
    Comments,
    Tickets,
    TicketComments,
}

impl EntityKind {
    /// All kinds, parents before children.
    pub const SYNC_ORDER: [EntityKind; 6] = [
        EntityKind::Topics,
        EntityKind::Users,
        EntityKind::Posts,
        EntityKind::Comments,
        EntityKind::Tickets,
        EntityKind::TicketComments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Topics => "topics",
            EntityKind::Users => "users",
            EntityKind::Posts => "posts",
            EntityKind::Comments => "comments",
            EntityKind::Tickets => "tickets",
            EntityKind::TicketComments => "ticket_comments",
        }
    }

    pub fn raw_table(&self) -> &'static str {
        match self {
            EntityKind::Topics => "topics_json",
            EntityKind::Users => "users_json",
            EntityKind::Posts => "posts_json",
            EntityKind::Comments => "comments_json",
            EntityKind::Tickets => "tickets_json",
            EntityKind::TicketComments => "ticket_comments_json",
        }
    }

    pub fn typed_table(&self) -> &'static str {
        self.as_str()
    }

    /// Column holding the owning entity's ID on child kinds.
    pub fn secondary_key_column(&self) -> Option<&'static str> {
        match self {
            EntityKind::Comments => Some("post_id"),
            EntityKind::TicketComments => Some("ticket_id"),
            _ => None,
        }
    }

    /// Envelope array fields, tried in order.
    pub fn envelope_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Topics => &["topics"],
            EntityKind::Users => &["users", "results"],
            EntityKind::Posts => &["posts"],
            EntityKind::Comments | EntityKind::TicketComments => &["comments"],
            EntityKind::Tickets => &["tickets"],
        }
    }

    /// File name prefix of this kind's page files.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            EntityKind::Topics => "topics",
            EntityKind::Users => "users_",
            EntityKind::Posts => "posts_",
            EntityKind::Comments => "comments_",
            EntityKind::Tickets => "tickets_",
            EntityKind::TicketComments => "ticket_comments_",
        }
    }

    pub fn page_glob(&self) -> String {
        format!("{}*.json", self.file_prefix())
    }

    pub fn id_field(&self) -> &'static str {
        "id"
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topics" => Ok(EntityKind::Topics),
            "users" => Ok(EntityKind::Users),
            "posts" => Ok(EntityKind::Posts),
            "comments" => Ok(EntityKind::Comments),
            "tickets" => Ok(EntityKind::Tickets),
            "ticket_comments" | "ticket-comments" => Ok(EntityKind::TicketComments),
            other => anyhow::bail!(
                "Unknown entity kind: '{}'. Available: topics, users, posts, comments, tickets, ticket_comments",
                other
            ),
        }
    }
}

/// Parse `all` or a single kind into the kinds to process, in sync order.
pub fn parse_kinds(arg: &str) -> anyhow::Result<Vec<EntityKind>> {
    if arg == "all" {
        return Ok(EntityKind::SYNC_ORDER.to_vec());
    }
    Ok(vec![arg.parse()?])
}

/// One row of a raw-document table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub secondary_key: Option<String>,
    pub document: Value,
}

/// A value staged for one typed-table column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    /// Cell rendering used by the sheet export and `get`.
    pub fn display(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Integer(n) => n.to_string(),
            SqlValue::Real(x) => x.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bool(b) => b.to_string(),
        }
    }
}
