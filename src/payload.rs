use crate::resource::{self, ResourceKey, ResourceMap};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of reading one resource out of the map.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Present(T),
    Absent,
    Failed(String),
    Malformed(String),
}

impl<T> Parsed<T> {
    pub fn present(self) -> Option<T> {
        match self {
            Parsed::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Parsed::Present(_))
    }
}

pub fn parse_object<T: DeserializeOwned>(map: &ResourceMap, key: &ResourceKey) -> Parsed<T> {
    match raw_data(map, key) {
        Ok(value) => match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => Parsed::Present(parsed),
            Err(e) => {
                log::debug!("Resource {key} is malformed: {e}");
                Parsed::Malformed(e.to_string())
            }
        },
        Err(other) => other,
    }
}

pub fn parse_list<T: DeserializeOwned>(map: &ResourceMap, key: &ResourceKey) -> Parsed<Vec<T>> {
    match raw_data(map, key) {
        Ok(Value::Array(items)) => Parsed::Present(parse_elements(items, key)),
        Ok(other) => {
            log::debug!("Resource {key} expected an array, got {}", json_kind(other));
            Parsed::Malformed(format!("expected array, got {}", json_kind(other)))
        }
        Err(other) => other,
    }
}

fn raw_data<'a, T>(map: &'a ResourceMap, key: &ResourceKey) -> Result<&'a Value, Parsed<T>> {
    let envelope = resource::get(map, key).ok_or(Parsed::Absent)?;
    if let Some(error) = &envelope.error {
        return Err(Parsed::Failed(error.clone()));
    }
    match &envelope.data {
        None | Some(Value::Null) => Err(Parsed::Absent),
        Some(value) => Ok(value),
    }
}

fn parse_elements<T: DeserializeOwned>(items: &[Value], key: &ResourceKey) -> Vec<T> {
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(v) => parsed.push(v),
            Err(e) => log::debug!("Dropping malformed element of {key}: {e}"),
        }
    }
    parsed
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Field-level deserializers that degrade to `None`/empty instead of failing.
pub(crate) mod lenient {
    use serde::de::{DeserializeOwned, Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    fn value_to_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Required id: integer or numeric string.
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        value_to_i64(&value).ok_or_else(|| D::Error::custom(format!("invalid id: {value}")))
    }

    /// Calendar event id: integer, numeric string, or a typed id such as `assignment_42`.
    pub fn event_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        value_to_i64(&value)
            .or_else(|| match &value {
                Value::String(s) => s.rsplit_once('_').and_then(|(_, digits)| digits.parse().ok()),
                _ => None,
            })
            .ok_or_else(|| D::Error::custom(format!("invalid event id: {value}")))
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value_to_i64(&value))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
            _ => None,
        }
        .filter(|f| f.is_finite()))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(d)?;
        Ok(serde_json::from_value(value).ok())
    }

    pub fn vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

// ---- Upstream shapes ----

/// A course from the LMS course list (`id`, `name`) or the backend's
/// `all_classes` list (`course_id`, `course_name`).
#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    #[serde(alias = "course_id", deserialize_with = "lenient::id")]
    pub id: i64,
    #[serde(default, alias = "course_name", deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub course_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub teachers: Vec<Teacher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Teacher {
    #[serde(default, deserialize_with = "lenient::string")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Grades {
    #[serde(default, deserialize_with = "lenient::string")]
    pub current_grade: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub current_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub final_grade: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub final_score: Option<f64>,
}

impl Grades {
    pub fn letter(&self) -> Option<&str> {
        self.current_grade
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    pub fn has_grade(&self) -> bool {
        self.letter().is_some() || self.current_score.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enrollment {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub course_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub grades: Option<Grades>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub short_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoItem {
    #[serde(default, deserialize_with = "lenient::opt")]
    pub assignment: Option<TodoAssignment>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub context_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoAssignment {
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub due_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub points_possible: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEvent {
    #[serde(deserialize_with = "lenient::event_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub start_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub context_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub context_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Announcement {
    #[serde(deserialize_with = "lenient::id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub posted_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub context_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub course_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub course_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Author {
    #[serde(default, deserialize_with = "lenient::string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
}

impl Author {
    pub fn label(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Professor {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseInfo {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentBuckets {
    #[serde(default, deserialize_with = "lenient::vec")]
    pub upcoming: Vec<CourseAssignment>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub past: Vec<CourseAssignment>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub missing: Vec<CourseAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseAssignment {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, alias = "due_at", deserialize_with = "lenient::string")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub points_possible: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub submission_status: Option<String>,
}

/// The per-course bundle served by the aggregation backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteClassData {
    #[serde(default, deserialize_with = "lenient::opt")]
    pub course_info: Option<CourseInfo>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub professors: Vec<Professor>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub grades: Option<Grades>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub assignments: Option<AssignmentBuckets>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub announcements: Vec<Announcement>,
}

impl CompleteClassData {
    pub fn course_name(&self) -> Option<&str> {
        self.course_info
            .as_ref()
            .and_then(|info| info.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

pub fn course_list(map: &ResourceMap) -> Vec<Course> {
    parse_list::<Course>(map, &ResourceKey::Courses)
        .present()
        .or_else(|| parse_list::<Course>(map, &ResourceKey::AllClasses).present())
        .unwrap_or_default()
}

pub fn complete_class_data(map: &ResourceMap) -> Vec<(i64, CompleteClassData)> {
    resource::course_detail_ids(map)
        .into_iter()
        .filter_map(|id| {
            parse_object::<CompleteClassData>(map, &ResourceKey::course_detail(id))
                .present()
                .map(|data| (id, data))
        })
        .collect()
}

/// Course id → display name, from the course list and any complete class data.
pub fn course_name_index(map: &ResourceMap) -> HashMap<i64, String> {
    let mut index = HashMap::new();
    for course in course_list(map) {
        if let Some(name) = course.name.filter(|n| !n.trim().is_empty()) {
            index.insert(course.id, name);
        }
    }
    for (id, data) in complete_class_data(map) {
        if let Some(name) = data.course_name() {
            index.entry(id).or_insert_with(|| name.to_string());
        }
    }
    index
}
