use crate::format::{parse_timestamp, short_date, strip_html, truncate};
use crate::payload::{self, parse_list, parse_object, Announcement, CalendarEvent, CompleteClassData};
use crate::resource::{ResourceKey, ResourceMap};
use crate::types::DashboardAnnouncement;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub const DASHBOARD_ANNOUNCEMENT_LIMIT: usize = 5;
pub const MESSAGE_MAX_CHARS: usize = 100;

const UNTITLED: &str = "Untitled";
const UNDATED_LABEL: &str = "Recent";

/// Newest announcements across all courses, at most [`DASHBOARD_ANNOUNCEMENT_LIMIT`].
///
/// Reads the `announcements` resource when it holds a list (even an empty one).
/// Otherwise calendar events with a description stand in for announcements.
pub fn extract_announcements(map: &ResourceMap) -> Vec<DashboardAnnouncement> {
    let names = payload::course_name_index(map);
    let raw = match parse_list::<Announcement>(map, &ResourceKey::Announcements).present() {
        Some(list) => list,
        None => events_as_announcements(map),
    };

    let mut out = normalize(raw, &names, None);
    out.truncate(DASHBOARD_ANNOUNCEMENT_LIMIT);
    out
}

/// Every announcement embedded in one course's complete data, newest first.
pub fn extract_course_announcements(map: &ResourceMap, course_id: i64) -> Vec<DashboardAnnouncement> {
    let Some(data) =
        parse_object::<CompleteClassData>(map, &ResourceKey::course_detail(course_id)).present()
    else {
        return Vec::new();
    };
    let mut names = payload::course_name_index(map);
    if let Some(name) = data.course_name() {
        names.insert(course_id, name.to_string());
    }
    normalize(data.announcements, &names, Some(course_id))
}

fn events_as_announcements(map: &ResourceMap) -> Vec<Announcement> {
    parse_list::<CalendarEvent>(map, &ResourceKey::UpcomingEvents)
        .present()
        .unwrap_or_default()
        .into_iter()
        .filter(|event| event.description.as_deref().is_some_and(|d| !d.trim().is_empty()))
        .map(|event| Announcement {
            id: event.id,
            title: event.title,
            message: event.description,
            posted_at: event.start_at,
            course_id: event.context_code.as_deref().and_then(course_id_from_context),
            context_code: event.context_code,
            course_name: event.context_name,
            author: None,
        })
        .collect()
}

/// `course_123` → 123.
fn course_id_from_context(code: &str) -> Option<i64> {
    code.strip_prefix("course_")?.parse().ok()
}

fn normalize(
    raw: Vec<Announcement>,
    names: &HashMap<i64, String>,
    default_course: Option<i64>,
) -> Vec<DashboardAnnouncement> {
    let mut seen = HashSet::new();
    let mut items: Vec<(Option<DateTime<Utc>>, DashboardAnnouncement)> = raw
        .into_iter()
        .filter(|a| seen.insert(a.id))
        .map(|a| {
            let posted = a.posted_at.as_deref().and_then(parse_timestamp);
            (posted, to_view(a, posted, names, default_course))
        })
        .collect();

    // Newest first; undated entries keep their relative order at the end.
    items.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    items.into_iter().map(|(_, view)| view).collect()
}

fn to_view(
    a: Announcement,
    posted: Option<DateTime<Utc>>,
    names: &HashMap<i64, String>,
    default_course: Option<i64>,
) -> DashboardAnnouncement {
    let course_id = a
        .course_id
        .or_else(|| a.context_code.as_deref().and_then(course_id_from_context))
        .or(default_course);
    let course_name = a
        .course_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| course_id.and_then(|id| names.get(&id).cloned()))
        .unwrap_or_default();
    let message = a
        .message
        .map(|m| truncate(&strip_html(&m), MESSAGE_MAX_CHARS))
        .unwrap_or_default();

    DashboardAnnouncement {
        id: a.id,
        title: a
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string()),
        message,
        formatted_posted_at: posted
            .map(|dt| short_date(&dt))
            .unwrap_or_else(|| UNDATED_LABEL.to_string()),
        posted_at: a.posted_at,
        course_name,
        course_id,
        author: a.author.and_then(|author| author.label()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceEnvelope;
    use serde_json::{json, Value};

    fn map_of(entries: &[(&str, Value)]) -> ResourceMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), ResourceEnvelope::ok(v.clone())))
            .collect()
    }

    // ---- Dashboard announcements ----

    #[test]
    fn test_long_html_message_is_stripped_then_truncated() {
        let body = "a".repeat(150);
        let map = map_of(&[(
            "announcements",
            json!([{"id": 1, "title": "Welcome", "message": format!("<p>{body}</p>"), "posted_at": "2025-01-10T09:00:00Z"}]),
        )]);
        let out = extract_announcements(&map);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, format!("{}...", "a".repeat(97)));
        assert!(!out[0].message.contains('<'));
        assert_eq!(out[0].formatted_posted_at, "Jan 10");
    }

    #[test]
    fn test_sorted_newest_first_and_capped_at_five() {
        let items: Vec<Value> = (1..=7)
            .map(|i| json!({"id": i, "title": format!("A{i}"), "posted_at": format!("2025-02-0{i}T12:00:00Z")}))
            .collect();
        let map = map_of(&[("announcements", Value::Array(items))]);
        let out = extract_announcements(&map);
        let ids: Vec<i64> = out.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_undated_announcements_sort_last_and_read_recent() {
        let map = map_of(&[(
            "announcements",
            json!([
                {"id": 1, "title": "No date"},
                {"id": 2, "title": "Dated", "posted_at": "2025-02-01T00:00:00Z"},
                {"id": 3, "title": "Bad date", "posted_at": "soon"}
            ]),
        )]);
        let out = extract_announcements(&map);
        let ids: Vec<i64> = out.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(out[1].formatted_posted_at, "Recent");
        assert_eq!(out[2].posted_at.as_deref(), Some("soon"));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let map = map_of(&[(
            "announcements",
            json!([
                {"id": 9, "title": "First"},
                {"id": 9, "title": "Second"}
            ]),
        )]);
        let out = extract_announcements(&map);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "First");
    }

    #[test]
    fn test_course_name_resolved_from_context_code() {
        let map = map_of(&[
            ("courses", json!([{"id": 12, "name": "Biology"}])),
            (
                "announcements",
                json!([{"id": 1, "title": "Lab", "context_code": "course_12", "author": {"display_name": "Dr. Bee"}}]),
            ),
        ]);
        let out = extract_announcements(&map);
        assert_eq!(out[0].course_id, Some(12));
        assert_eq!(out[0].course_name, "Biology");
        assert_eq!(out[0].author.as_deref(), Some("Dr. Bee"));
    }

    #[test]
    fn test_missing_title_defaults() {
        let map = map_of(&[("announcements", json!([{"id": 1, "title": ""}]))]);
        assert_eq!(extract_announcements(&map)[0].title, "Untitled");
    }

    // ---- Calendar fallback ----

    #[test]
    fn test_events_used_when_announcements_failed() {
        let mut map = map_of(&[(
            "upcoming_events",
            json!([
                {"id": 1, "title": "Midterm", "description": "<b>Room 101</b>", "start_at": "2025-03-01T10:00:00Z", "context_name": "Physics"},
                {"id": 2, "title": "No description", "description": ""},
                {"id": 3, "title": "Null description", "description": null}
            ]),
        )]);
        map.insert("announcements".into(), ResourceEnvelope::failed("500 Internal Server Error"));
        let out = extract_announcements(&map);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Midterm");
        assert_eq!(out[0].message, "Room 101");
        assert_eq!(out[0].course_name, "Physics");
    }

    #[test]
    fn test_events_with_assignment_ids_are_kept() {
        let map = map_of(&[(
            "upcoming_events",
            json!([
                {"id": "assignment_42", "title": "Essay", "description": "<p>Read chapter 3</p>", "start_at": "2025-03-02T10:00:00Z"},
                {"id": 7, "title": "Exam", "description": "Room 1", "start_at": "2025-03-01T10:00:00Z"},
                {"id": "not-an-id", "title": "Broken", "description": "dropped"}
            ]),
        )]);
        let out = extract_announcements(&map);
        let titles: Vec<&str> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Essay", "Exam"]);
        assert_eq!(out[0].id, 42);
        assert_eq!(out[0].message, "Read chapter 3");
    }

    #[test]
    fn test_empty_announcement_list_does_not_fall_back() {
        let map = map_of(&[
            ("announcements", json!([])),
            ("upcoming_events", json!([{"id": 1, "title": "Event", "description": "text"}])),
        ]);
        assert!(extract_announcements(&map).is_empty());
    }

    #[test]
    fn test_nothing_available_is_empty() {
        assert!(extract_announcements(&ResourceMap::new()).is_empty());
    }

    // ---- Per-course announcements ----

    #[test]
    fn test_course_announcements_are_uncapped_and_tagged() {
        let items: Vec<Value> = (1..=8)
            .map(|i| json!({"id": i, "title": format!("Note {i}"), "posted_at": format!("2025-04-0{}T00:00:00Z", i.min(9))}))
            .collect();
        let map = map_of(&[(
            "complete_class_data_4",
            json!({"course_info": {"id": 4, "name": "Chemistry"}, "announcements": items}),
        )]);
        let out = extract_course_announcements(&map, 4);
        assert_eq!(out.len(), 8);
        assert_eq!(out[0].id, 8);
        assert!(out.iter().all(|a| a.course_id == Some(4) && a.course_name == "Chemistry"));
    }

    #[test]
    fn test_course_announcements_missing_detail_is_empty() {
        assert!(extract_course_announcements(&ResourceMap::new(), 4).is_empty());
    }
}
