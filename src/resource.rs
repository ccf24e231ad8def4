use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const COMPLETE_CLASS_DATA_PREFIX: &str = "complete_class_data_";
const CLASS_PROFESSORS_PREFIX: &str = "class_professors_";

/// Uniform outcome of one fetch attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResourceEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.data.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl<E: fmt::Display> From<Result<Value, E>> for ResourceEnvelope {
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(data) => ResourceEnvelope::ok(data),
            Err(e) => ResourceEnvelope::failed(e.to_string()),
        }
    }
}

pub type ResourceMap = BTreeMap<String, ResourceEnvelope>;

/// Names of the resources the dashboard knows how to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    Courses,
    Profile,
    Todo,
    UpcomingEvents,
    Enrollments,
    Grades,
    Announcements,
    AllClasses,
    UserProfile,
    CompleteClassData(i64),
    ClassProfessors(i64),
    Other(String),
}

impl ResourceKey {
    pub fn course_detail(course_id: i64) -> Self {
        ResourceKey::CompleteClassData(course_id)
    }

    pub fn class_professors(course_id: i64) -> Self {
        ResourceKey::ClassProfessors(course_id)
    }

    /// The course id embedded in a per-course key, if any.
    pub fn course_id(&self) -> Option<i64> {
        match self {
            ResourceKey::CompleteClassData(id) | ResourceKey::ClassProfessors(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_course_detail(&self) -> bool {
        matches!(self, ResourceKey::CompleteClassData(_))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Courses => f.write_str("courses"),
            ResourceKey::Profile => f.write_str("profile"),
            ResourceKey::Todo => f.write_str("todo"),
            ResourceKey::UpcomingEvents => f.write_str("upcoming_events"),
            ResourceKey::Enrollments => f.write_str("enrollments"),
            ResourceKey::Grades => f.write_str("grades"),
            ResourceKey::Announcements => f.write_str("announcements"),
            ResourceKey::AllClasses => f.write_str("all_classes"),
            ResourceKey::UserProfile => f.write_str("user_profile"),
            ResourceKey::CompleteClassData(id) => write!(f, "{COMPLETE_CLASS_DATA_PREFIX}{id}"),
            ResourceKey::ClassProfessors(id) => write!(f, "{CLASS_PROFESSORS_PREFIX}{id}"),
            ResourceKey::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s {
            "courses" => ResourceKey::Courses,
            "profile" => ResourceKey::Profile,
            "todo" => ResourceKey::Todo,
            "upcoming_events" => ResourceKey::UpcomingEvents,
            "enrollments" => ResourceKey::Enrollments,
            "grades" => ResourceKey::Grades,
            "announcements" => ResourceKey::Announcements,
            "all_classes" => ResourceKey::AllClasses,
            "user_profile" => ResourceKey::UserProfile,
            other => {
                if let Some(id) = parse_prefixed_id(other, COMPLETE_CLASS_DATA_PREFIX) {
                    ResourceKey::CompleteClassData(id)
                } else if let Some(id) = parse_prefixed_id(other, CLASS_PROFESSORS_PREFIX) {
                    ResourceKey::ClassProfessors(id)
                } else {
                    ResourceKey::Other(other.to_string())
                }
            }
        };
        Ok(key)
    }
}

fn parse_prefixed_id(key: &str, prefix: &str) -> Option<i64> {
    key.strip_prefix(prefix)?.parse::<i64>().ok()
}

/// Parse any map key into a course id, if it is a per-course key.
pub fn parse_course_id(key: &str) -> Option<i64> {
    key.parse::<ResourceKey>().ok().and_then(|k| k.course_id())
}

pub fn get<'a>(map: &'a ResourceMap, key: &ResourceKey) -> Option<&'a ResourceEnvelope> {
    map.get(&key.to_string())
}

/// Course ids that already have complete class data in the map.
pub fn course_detail_ids(map: &ResourceMap) -> Vec<i64> {
    map.keys()
        .filter_map(|k| match k.parse::<ResourceKey>() {
            Ok(ResourceKey::CompleteClassData(id)) => Some(id),
            _ => None,
        })
        .collect()
}

pub fn failed_keys(map: &ResourceMap) -> Vec<String> {
    map.iter()
        .filter(|(_, env)| env.is_failed())
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---- Key building / parsing ----

    #[test]
    fn test_course_detail_key_format() {
        assert_eq!(ResourceKey::course_detail(42).to_string(), "complete_class_data_42");
        assert_eq!(ResourceKey::class_professors(7).to_string(), "class_professors_7");
    }

    #[test]
    fn test_parse_course_id_from_detail_key() {
        assert_eq!(parse_course_id("complete_class_data_1234"), Some(1234));
        assert_eq!(parse_course_id("class_professors_99"), Some(99));
    }

    #[test]
    fn test_parse_course_id_rejects_non_numeric_suffix() {
        assert_eq!(parse_course_id("complete_class_data_abc"), None);
        assert_eq!(parse_course_id("complete_class_data_"), None);
        assert_eq!(
            "complete_class_data_abc".parse::<ResourceKey>().unwrap(),
            ResourceKey::Other("complete_class_data_abc".to_string())
        );
    }

    #[test]
    fn test_parse_course_id_for_global_keys_is_none() {
        assert_eq!(parse_course_id("courses"), None);
        assert_eq!(parse_course_id("grades"), None);
    }

    #[test]
    fn test_known_keys_round_trip_through_strings() {
        let keys = [
            ResourceKey::Courses,
            ResourceKey::Profile,
            ResourceKey::Todo,
            ResourceKey::UpcomingEvents,
            ResourceKey::Enrollments,
            ResourceKey::Grades,
            ResourceKey::Announcements,
            ResourceKey::AllClasses,
            ResourceKey::UserProfile,
            ResourceKey::CompleteClassData(5),
            ResourceKey::ClassProfessors(6),
        ];
        for key in keys {
            assert_eq!(key.to_string().parse::<ResourceKey>().unwrap(), key);
        }
    }

    // ---- Envelopes ----

    #[test]
    fn test_envelope_from_result() {
        let ok: ResourceEnvelope = Ok::<_, String>(json!([1, 2])).into();
        assert!(ok.is_ok());
        let failed: ResourceEnvelope = Err::<Value, _>("500 Internal Server Error".to_string()).into();
        assert!(failed.is_failed());
        assert!(failed.data.is_none());
        assert_eq!(failed.error.as_deref(), Some("500 Internal Server Error"));
    }

    #[test]
    fn test_pending_envelope_has_neither_field() {
        let env = ResourceEnvelope::pending();
        assert!(!env.is_ok());
        assert!(!env.is_failed());
    }

    #[test]
    fn test_envelope_deserializes_with_missing_fields() {
        let env: ResourceEnvelope = serde_json::from_str(r#"{"data": {"id": 1}}"#).unwrap();
        assert!(env.is_ok());
        let env: ResourceEnvelope = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert!(env.is_failed());
    }

    #[test]
    fn test_course_detail_ids_and_failed_keys() {
        let mut map = ResourceMap::new();
        map.insert("courses".into(), ResourceEnvelope::ok(json!([])));
        map.insert("complete_class_data_3".into(), ResourceEnvelope::ok(json!({})));
        map.insert("complete_class_data_1".into(), ResourceEnvelope::failed("404 Not Found"));
        map.insert("class_professors_3".into(), ResourceEnvelope::ok(json!([])));

        assert_eq!(course_detail_ids(&map), vec![1, 3]);
        assert_eq!(failed_keys(&map), vec!["complete_class_data_1".to_string()]);
    }
}
