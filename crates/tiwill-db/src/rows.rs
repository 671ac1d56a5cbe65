//! Row -> model conversion helpers. The DB stores ids and timestamps as
//! TEXT; everything is parsed back at the query layer so callers only ever
//! see typed models.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tiwill_types::models::NotificationKind;
use uuid::Uuid;

/// Fixed-width RFC 3339 so lexicographic TEXT ordering matches
/// chronological ordering.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse_uuid(s: &str, field: &str) -> Result<Uuid> {
    s.parse::<Uuid>()
        .with_context(|| format!("corrupt {}: {}", field, s))
}

pub fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .with_context(|| format!("corrupt {}: {}", field, s))
}

pub fn parse_opt_ts(s: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    s.map(|v| parse_ts(&v, field)).transpose()
}

pub fn kind_to_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Message => "message",
        NotificationKind::Reaction => "reaction",
        NotificationKind::Badge => "badge",
        NotificationKind::Level => "level",
    }
}

pub fn kind_from_str(s: &str) -> Result<NotificationKind> {
    match s {
        "message" => Ok(NotificationKind::Message),
        "reaction" => Ok(NotificationKind::Reaction),
        "badge" => Ok(NotificationKind::Badge),
        "level" => Ok(NotificationKind::Level),
        other => Err(anyhow!("unknown notification kind: {}", other)),
    }
}
