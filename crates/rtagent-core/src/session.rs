//! Chat session index entries and the grouping algorithm used to bucket them
//! into "today" / "recent" / "past" for history UIs.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// One row of the paginated session-index cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionEntry {
    /// Unique id of the chat session.
    pub session_id: String,
    /// Human-assigned or auto-generated display name.
    pub session_name: Option<String>,
    /// When the session was first created, as reported by the server.
    pub created_at: Option<String>,
    /// When the session last changed, as reported by the server.
    pub updated_at: Option<String>,
    /// Owning user id.
    pub user_id: Option<String>,
    /// Agent the session was started with.
    pub agent_key: Option<String>,
    /// Display name of the agent.
    pub agent_name: Option<String>,
}

impl ChatSessionEntry {
    /// The timestamp used for sorting and grouping: `updated_at`, falling
    /// back to `created_at`, falling back to the Unix epoch if both are
    /// missing or unparsable.
    #[must_use]
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.updated_at
            .as_deref()
            .and_then(parse_server_timestamp)
            .or_else(|| self.created_at.as_deref().and_then(parse_server_timestamp))
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
    }
}

/// Parses a server timestamp string, tolerating microsecond precision by
/// truncating to milliseconds if full-precision RFC 3339 parsing fails.
/// Returns `None` (never the epoch) on genuinely unparsable input; callers
/// that want an epoch fallback should use [`ChatSessionEntry::effective_timestamp`].
#[must_use]
pub fn parse_server_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Truncate sub-millisecond fractional digits (e.g. "...123456Z" -> "...123Z")
    // which some server builds emit and which RFC 3339 parsers reject.
    if let Some(truncated) = truncate_fractional_seconds(raw, 3) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&truncated) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    None
}

fn truncate_fractional_seconds(raw: &str, keep_digits: usize) -> Option<String> {
    let dot = raw.find('.')?;
    let after_dot = &raw[dot + 1..];
    let digit_count = after_dot.chars().take_while(char::is_ascii_digit).count();
    if digit_count <= keep_digits {
        return None;
    }
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..=dot]);
    out.push_str(&after_dot[..keep_digits]);
    out.push_str(&after_dot[digit_count..]);
    Some(out)
}

/// The three buckets a session-index entry is grouped into for history UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionGroup {
    /// Effective timestamp falls on the current calendar day (UTC).
    Today,
    /// Within the last 14 days, excluding today; also the defensive bucket
    /// for timestamps implausibly far in the future.
    Recent,
    /// Older than 14 days.
    Past,
}

/// Classifies `entry` relative to `now`.
///
/// Timestamps more than a year in the future are treated as clock-skew or
/// server bugs, not genuine future sessions, and are defensively folded into
/// [`SessionGroup::Recent`] rather than sorted to the top of every list.
#[must_use]
pub fn group_for(entry: &ChatSessionEntry, now: DateTime<Utc>) -> SessionGroup {
    let ts = entry.effective_timestamp();
    let far_future = now + ChronoDuration::days(365);
    if ts > far_future {
        return SessionGroup::Recent;
    }
    let start_of_today = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    if ts >= start_of_today {
        return SessionGroup::Today;
    }
    let fourteen_days_ago = now - ChronoDuration::days(14);
    if ts >= fourteen_days_ago {
        return SessionGroup::Recent;
    }
    SessionGroup::Past
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with(updated_at: &str) -> ChatSessionEntry {
        ChatSessionEntry {
            session_id: "s1".into(),
            session_name: None,
            created_at: None,
            updated_at: Some(updated_at.to_string()),
            user_id: None,
            agent_key: None,
            agent_name: None,
        }
    }

    #[test]
    fn entry_dated_today_groups_today() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = entry_with("2026-07-26T01:00:00Z");
        assert_eq!(group_for(&entry, now), SessionGroup::Today);
    }

    #[test]
    fn entry_seven_days_old_groups_recent() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = entry_with("2026-07-19T12:00:00Z");
        assert_eq!(group_for(&entry, now), SessionGroup::Recent);
    }

    #[test]
    fn entry_twenty_days_old_groups_past() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = entry_with("2026-07-06T12:00:00Z");
        assert_eq!(group_for(&entry, now), SessionGroup::Past);
    }

    #[test]
    fn entry_two_years_in_future_defensively_groups_recent() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = entry_with("2028-07-26T12:00:00Z");
        assert_eq!(group_for(&entry, now), SessionGroup::Recent);
    }

    #[test]
    fn missing_timestamp_falls_back_to_epoch_and_groups_past() {
        let now = DateTime::parse_from_rfc3339("2026-07-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = ChatSessionEntry {
            session_id: "s1".into(),
            session_name: None,
            created_at: None,
            updated_at: None,
            user_id: None,
            agent_key: None,
            agent_name: None,
        };
        assert_eq!(group_for(&entry, now), SessionGroup::Past);
    }

    #[test]
    fn microsecond_precision_timestamp_parses() {
        let parsed = parse_server_timestamp("2026-07-26T12:00:00.123456Z");
        assert!(parsed.is_some());
    }

    #[test]
    fn garbage_timestamp_is_unparsable() {
        assert!(parse_server_timestamp("not-a-date").is_none());
    }
}
