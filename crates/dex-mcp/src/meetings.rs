//! Normalization of the meeting shapes Granola's tools return.
//!
//! Depending on server version, list and detail results arrive as a bare
//! array, as `{"meetings": [...]}`, as JSON text of either, as a single
//! meeting object or as an object keyed by meeting id. Everything here turns
//! those into one flat shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title used when a meeting has none.
pub const UNTITLED: &str = "Untitled Meeting";

/// Separator between enhanced and private notes.
const NOTES_SEPARATOR: &str = "\n\n---\n\n";

/// One entry of a meeting list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub id: String,
    pub title: String,
    /// Start date as sent by the server (usually ISO-8601).
    pub date: String,
    pub attendees: Vec<String>,
}

impl MeetingSummary {
    /// Read a list entry; entries without an id are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = first_string(value, &["id", "meeting_id"])?;
        Some(Self {
            id,
            title: first_string(value, &["title", "name"]).unwrap_or_else(|| UNTITLED.to_string()),
            date: first_string(value, &["date", "created_at", "start_time"]).unwrap_or_default(),
            attendees: participant_names(value),
        })
    }
}

/// A meeting with its content, in one canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub notes: String,
    pub participants: Vec<String>,
    pub duration_minutes: Option<i64>,
}

impl Meeting {
    /// Convert one detail object, filling gaps from the known aliases.
    pub fn from_value(value: &Value) -> Self {
        let created_at =
            first_string(value, &["date", "created_at", "start_time"]).unwrap_or_default();
        let updated_at = first_string(value, &["updated_at", "end_time"]).unwrap_or_default();

        let duration_minutes = value
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|d| *d > 0.0)
            .map(|d| d.round() as i64)
            .or_else(|| minutes_between(&created_at, &updated_at));

        Self {
            id: first_string(value, &["id", "meeting_id"]).unwrap_or_default(),
            title: first_string(value, &["title", "name"]).unwrap_or_else(|| UNTITLED.to_string()),
            notes: notes_text(value),
            participants: participant_names(value),
            duration_minutes,
            created_at,
            updated_at,
        }
    }
}

/// Normalize a `list_meetings` result.
pub fn normalize_meeting_list(value: &Value) -> Vec<MeetingSummary> {
    let entries = match value {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => {
                return normalize_meeting_list(&parsed)
            }
            _ => return Vec::new(),
        },
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("meetings") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries.iter().filter_map(MeetingSummary::from_value).collect()
}

/// Normalize a `get_meetings` result into the individual meeting objects.
pub fn normalize_meeting_details(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("meetings") {
                return items.clone();
            }
            if first_string(value, &["id", "meeting_id"]).is_some() {
                return vec![value.clone()];
            }
            map.values().cloned().collect()
        }
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => normalize_meeting_details(&parsed),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Extract transcript text from a `get_meeting_transcript` result.
pub fn transcript_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => first_string(value, &["text", "transcript"]),
        _ => None,
    }
    .filter(|text| !text.is_empty())
}

/// The first alias holding a non-empty string (or a number).
fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn notes_text(value: &Value) -> String {
    let mut parts: Vec<&str> = ["enhanced_notes", "private_notes"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        if let Some(notes) = value.get("notes").and_then(Value::as_str) {
            parts.push(notes);
        }
    }

    parts.join(NOTES_SEPARATOR).trim().to_string()
}

fn participant_names(value: &Value) -> Vec<String> {
    let attendees = ["attendees", "participants"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))
        .and_then(Value::as_array);

    let mut names: Vec<String> = Vec::new();
    for attendee in attendees.into_iter().flatten() {
        let name = match attendee {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => first_string(attendee, &["name", "fullName", "display_name", "email"]),
            _ => None,
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn minutes_between(start: &str, end: &str) -> Option<i64> {
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;
    if end <= start {
        return None;
    }
    let seconds = (end - start).num_seconds() as f64;
    Some((seconds / 60.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_from_array() {
        let list = normalize_meeting_list(&json!([
            {"id": "m1", "title": "Standup", "date": "2024-05-01T09:00:00Z"},
            {"title": "no id, dropped"},
            {"meeting_id": "m2", "name": "Retro", "attendees": ["Ana", {"email": "bo@x.com"}]}
        ]));

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "m1");
        assert_eq!(list[0].date, "2024-05-01T09:00:00Z");
        assert_eq!(list[1].title, "Retro");
        assert_eq!(list[1].attendees, vec!["Ana", "bo@x.com"]);
    }

    #[test]
    fn test_list_from_wrapped_object_and_text() {
        let wrapped = json!({"meetings": [{"id": "m1"}]});
        assert_eq!(normalize_meeting_list(&wrapped)[0].title, UNTITLED);

        let text = json!("{\"meetings\": [{\"id\": \"m1\"}, {\"id\": \"m2\"}]}");
        assert_eq!(normalize_meeting_list(&text).len(), 2);

        let array_text = json!("[{\"id\": \"m3\"}]");
        assert_eq!(normalize_meeting_list(&array_text)[0].id, "m3");
    }

    #[test]
    fn test_list_from_unusable_shapes() {
        assert!(normalize_meeting_list(&json!("# Meetings\n- Standup")).is_empty());
        assert!(normalize_meeting_list(&json!({"items": []})).is_empty());
        assert!(normalize_meeting_list(&Value::Null).is_empty());
        assert!(normalize_meeting_list(&json!(42)).is_empty());
    }

    #[test]
    fn test_details_shapes() {
        let array = json!([{"id": "a"}, {"id": "b"}]);
        assert_eq!(normalize_meeting_details(&array).len(), 2);

        let wrapped = json!({"meetings": [{"id": "a"}]});
        assert_eq!(normalize_meeting_details(&wrapped), vec![json!({"id": "a"})]);

        let single = json!({"meeting_id": "a", "title": "Solo"});
        assert_eq!(normalize_meeting_details(&single), vec![single.clone()]);

        let keyed = json!({"a": {"title": "A"}, "b": {"title": "B"}});
        assert_eq!(normalize_meeting_details(&keyed).len(), 2);

        assert!(normalize_meeting_details(&Value::Null).is_empty());
    }

    #[test]
    fn test_meeting_from_full_detail() {
        let meeting = Meeting::from_value(&json!({
            "id": "m1",
            "title": "Quarterly review",
            "start_time": "2024-05-01T09:00:00Z",
            "end_time": "2024-05-01T09:45:30Z",
            "enhanced_notes": "## Summary\nWent well.",
            "private_notes": "Follow up with finance.",
            "notes": "ignored when enhanced notes exist",
            "participants": [
                {"name": "Ana"},
                {"fullName": "Bo Li"},
                {"display_name": "Cy"},
                "Ana",
                {"email": "dee@example.com"},
                {"role": "nobody"}
            ]
        }));

        assert_eq!(meeting.id, "m1");
        assert_eq!(meeting.created_at, "2024-05-01T09:00:00Z");
        assert_eq!(meeting.updated_at, "2024-05-01T09:45:30Z");
        assert_eq!(
            meeting.notes,
            "## Summary\nWent well.\n\n---\n\nFollow up with finance."
        );
        assert_eq!(
            meeting.participants,
            vec!["Ana", "Bo Li", "Cy", "dee@example.com"]
        );
        assert_eq!(meeting.duration_minutes, Some(46));
    }

    #[test]
    fn test_meeting_fallbacks() {
        let meeting = Meeting::from_value(&json!({
            "meeting_id": "m2",
            "name": "1:1",
            "notes": "  plain notes  ",
            "duration": 30
        }));

        assert_eq!(meeting.id, "m2");
        assert_eq!(meeting.title, "1:1");
        assert_eq!(meeting.notes, "plain notes");
        assert_eq!(meeting.duration_minutes, Some(30));
        assert!(meeting.participants.is_empty());
    }

    #[test]
    fn test_meeting_without_usable_duration() {
        let meeting = Meeting::from_value(&json!({
            "id": "m3",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T09:00:00Z"
        }));
        assert_eq!(meeting.title, UNTITLED);
        assert_eq!(meeting.duration_minutes, None);

        let meeting = Meeting::from_value(&json!({
            "id": "m4",
            "created_at": "yesterday",
            "updated_at": "2024-05-01T09:00:00Z"
        }));
        assert_eq!(meeting.duration_minutes, None);
    }

    #[test]
    fn test_naive_timestamps() {
        assert_eq!(
            minutes_between("2024-05-01 09:00:00", "2024-05-01 10:30:00"),
            Some(90)
        );
    }

    #[test]
    fn test_transcript_text() {
        assert_eq!(transcript_text(&json!("hello")), Some("hello".to_string()));
        assert_eq!(
            transcript_text(&json!({"text": "from text"})),
            Some("from text".to_string())
        );
        assert_eq!(
            transcript_text(&json!({"transcript": "from transcript"})),
            Some("from transcript".to_string())
        );
        assert_eq!(transcript_text(&json!({"other": 1})), None);
        assert_eq!(transcript_text(&json!("")), None);
        assert_eq!(transcript_text(&Value::Null), None);
    }
}
