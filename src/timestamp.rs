//! Upstream timestamp normalization.
//!
//! The platform serializes times as `YYYY-MM-DDTHH:MM:SSZ`. The date is the
//! first ten characters, the time is character 11 up to (not including) the
//! last one. Both are rejoined with a space and read as a *local* wall-clock
//! time, which is how every stored `*_timestamp` column is derived.
//!
//! The slicing is positional. A value with fractional seconds or a numeric
//! offset leaves junk in the time part and fails the parse.

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::error::TimestampError;

const NORMALIZED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The pair stored in `<field>_timestamp` / `<field>_str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTimestamp {
    pub epoch: i64,
    pub text: String,
}

pub fn normalize(raw: &str) -> Result<NormalizedTimestamp, TimestampError> {
    let text = split_join(raw).ok_or_else(|| TimestampError::TooShort(raw.to_string()))?;

    let naive = NaiveDateTime::parse_from_str(&text, NORMALIZED_FORMAT).map_err(|source| {
        TimestampError::Parse {
            value: raw.to_string(),
            source,
        }
    })?;

    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| TimestampError::NonexistentLocalTime(raw.to_string()))?;

    Ok(NormalizedTimestamp {
        epoch: local.timestamp(),
        text,
    })
}

fn split_join(raw: &str) -> Option<String> {
    let date = raw.get(..10)?;
    let end = raw.len().checked_sub(1)?;
    if end < 11 {
        return None;
    }
    let time = raw.get(11..end)?;
    Some(format!("{} {}", date, time))
}
