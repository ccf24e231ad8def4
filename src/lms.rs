use crate::error::DashboardError;
use crate::resource::{ResourceEnvelope, ResourceMap};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Fixed page size; a shorter page is the only end-of-list signal upstream gives.
pub const PAGE_SIZE: usize = 100;
pub const MAX_PAGES: u32 = 50;

/// Who is asking. The token is the bearer credential for both the LMS and the backend.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }

    pub fn bearer(&self) -> Result<&str, DashboardError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(DashboardError::Unauthenticated)
    }
}

// ---- LMS endpoint paths ----

pub fn courses_endpoint() -> String {
    "/api/v1/courses?enrollment_state=active&include[]=teachers".to_string()
}

pub fn profile_endpoint() -> String {
    "/api/v1/users/self/profile".to_string()
}

pub fn todo_endpoint() -> String {
    "/api/v1/users/self/todo".to_string()
}

pub fn upcoming_events_endpoint() -> String {
    "/api/v1/users/self/upcoming_events".to_string()
}

pub fn enrollments_endpoint() -> String {
    "/api/v1/users/self/enrollments".to_string()
}

pub fn grades_endpoint() -> String {
    "/api/v1/users/self/enrollments?include[]=grades".to_string()
}

fn build_page_url(base_url: &str, endpoint: &str, page: u32) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{base_url}{endpoint}{separator}per_page={PAGE_SIZE}&page={page}")
}

fn build_backend_url(base_url: &str, path: &str) -> String {
    format!("{base_url}/api/canvas/{}", path.trim_start_matches('/'))
}

fn http_client(timeout: Duration) -> Result<Client, DashboardError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DashboardError::Config(format!("Failed to build HTTP client: {e}")))
}

async fn read_json(endpoint: &str, resp: reqwest::Response) -> Result<Value, DashboardError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(DashboardError::Status {
            endpoint: endpoint.to_string(),
            status: status.to_string(),
        });
    }
    resp.json::<Value>()
        .await
        .map_err(|e| DashboardError::decode(endpoint, e))
}

/// Drive a page fetcher until a short page, an empty page, or a non-array body.
pub async fn collect_pages<F, Fut>(endpoint: &str, mut fetch_page: F) -> Result<Value, DashboardError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Value, DashboardError>>,
{
    let mut items: Vec<Value> = Vec::new();
    for page in 1..=MAX_PAGES {
        let batch = match fetch_page(page).await? {
            Value::Array(batch) => batch,
            other if page == 1 => {
                log::debug!("{endpoint} returned a non-array body; not paginating");
                return Ok(other);
            }
            _ => {
                log::debug!("{endpoint} page {page} is not an array; stopping");
                break;
            }
        };
        let count = batch.len();
        log::debug!("{endpoint} page {page}: {count} items");
        items.extend(batch);
        if count < PAGE_SIZE {
            return Ok(Value::Array(items));
        }
    }
    if items.len() >= PAGE_SIZE * MAX_PAGES as usize {
        log::warn!("{endpoint} still had full pages after {MAX_PAGES}; returning {} items", items.len());
    }
    Ok(Value::Array(items))
}

/// Authenticated access to the LMS REST API.
#[derive(Clone)]
pub struct LmsClient {
    client: Client,
    base_url: String,
}

impl LmsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DashboardError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: crate::config::normalize_base_url(base_url),
        })
    }

    async fn get_url(&self, session: &Session, endpoint: &str, url: &str) -> Result<Value, DashboardError> {
        let token = session.bearer()?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DashboardError::network(endpoint, e))?;
        read_json(endpoint, resp).await
    }

    pub async fn get_json(&self, session: &Session, endpoint: &str) -> Result<Value, DashboardError> {
        let url = format!("{}{endpoint}", self.base_url);
        self.get_url(session, endpoint, &url).await
    }

    pub async fn fetch_paginated(&self, session: &Session, endpoint: &str) -> Result<Value, DashboardError> {
        collect_pages(endpoint, |page| {
            let url = build_page_url(&self.base_url, endpoint, page);
            async move { self.get_url(session, endpoint, &url).await }
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct CourseDataResponse {
    course_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnnouncementsResponse {
    data: Option<Value>,
    error: Option<String>,
}

/// The secondary aggregation backend: purpose-built bundles keyed by user id.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DashboardError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: crate::config::normalize_base_url(base_url),
        })
    }

    async fn get(&self, session: &Session, path: &str) -> Result<Value, DashboardError> {
        let token = session.bearer()?;
        let url = build_backend_url(&self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("user_id", session.user_id.as_str())])
            .send()
            .await
            .map_err(|e| DashboardError::network(path, e))?;
        read_json(path, resp).await
    }

    pub async fn all_data(&self, session: &Session) -> Result<ResourceMap, DashboardError> {
        let body = self.get(session, "all-data").await?;
        serde_json::from_value::<ResourceMap>(body).map_err(|e| DashboardError::decode("all-data", e))
    }

    pub async fn course_data(&self, session: &Session, course_id: i64) -> Result<Value, DashboardError> {
        let path = format!("course-data/{course_id}");
        let body = self.get(session, &path).await?;
        let parsed: CourseDataResponse =
            serde_json::from_value(body).map_err(|e| DashboardError::decode(&path, e))?;
        parsed
            .course_data
            .filter(|v| !v.is_null())
            .ok_or_else(|| DashboardError::decode(&path, "response has no course_data"))
    }

    pub async fn announcements(&self, session: &Session) -> Result<ResourceEnvelope, DashboardError> {
        let body = self.get(session, "announcements").await?;
        let parsed: AnnouncementsResponse =
            serde_json::from_value(body).map_err(|e| DashboardError::decode("announcements", e))?;
        Ok(match (parsed.data, parsed.error) {
            (_, Some(error)) => ResourceEnvelope::failed(error),
            (Some(data), None) => ResourceEnvelope::ok(data),
            (None, None) => ResourceEnvelope::pending(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn page_of(len: usize, offset: usize) -> Value {
        Value::Array((0..len).map(|i| json!({"id": offset + i})).collect())
    }

    // ---- URL builders ----

    #[test]
    fn test_build_page_url_without_query() {
        assert_eq!(
            build_page_url("https://lms.edu", "/api/v1/users/self/enrollments", 2),
            "https://lms.edu/api/v1/users/self/enrollments?per_page=100&page=2"
        );
    }

    #[test]
    fn test_build_page_url_with_existing_query() {
        assert_eq!(
            build_page_url("https://lms.edu", &grades_endpoint(), 1),
            "https://lms.edu/api/v1/users/self/enrollments?include[]=grades&per_page=100&page=1"
        );
    }

    #[test]
    fn test_build_backend_url() {
        assert_eq!(
            build_backend_url("http://localhost:5000", "course-data/12"),
            "http://localhost:5000/api/canvas/course-data/12"
        );
        assert_eq!(
            build_backend_url("http://localhost:5000", "/all-data"),
            "http://localhost:5000/api/canvas/all-data"
        );
    }

    #[test]
    fn test_courses_endpoint_includes_teachers() {
        assert!(courses_endpoint().contains("include[]=teachers"));
    }

    // ---- Session ----

    #[test]
    fn test_session_without_token_is_unauthenticated() {
        let session = Session::new("u1", None);
        assert!(matches!(session.bearer(), Err(DashboardError::Unauthenticated)));
        let blank = Session::new("u1", Some("   ".to_string()));
        assert!(blank.bearer().is_err());
        let ok = Session::new("u1", Some("tok".to_string()));
        assert_eq!(ok.bearer().unwrap(), "tok");
    }

    // ---- Pagination ----

    #[tokio::test]
    async fn test_collect_pages_stops_on_short_page() {
        let calls = AtomicU32::new(0);
        let result = collect_pages("/x", |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match page {
                    1 => page_of(100, 0),
                    2 => page_of(100, 100),
                    _ => page_of(37, 200),
                })
            }
        })
        .await
        .unwrap();
        let items = result.as_array().unwrap();
        assert_eq!(items.len(), 237);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items[0]["id"], json!(0));
        assert_eq!(items[236]["id"], json!(236));
    }

    #[tokio::test]
    async fn test_collect_pages_empty_page_terminates() {
        let result = collect_pages("/x", |page| async move {
            Ok(if page == 1 { page_of(100, 0) } else { json!([]) })
        })
        .await
        .unwrap();
        assert_eq!(result.as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_collect_pages_error_aborts() {
        let result = collect_pages("/x", |page| async move {
            if page == 2 {
                Err(DashboardError::Status {
                    endpoint: "/x".into(),
                    status: "500 Internal Server Error".into(),
                })
            } else {
                Ok(page_of(100, 0))
            }
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_collect_pages_non_array_first_page_returned_as_is() {
        let result = collect_pages("/x", |_| async { Ok(json!({"errors": "nope"})) })
            .await
            .unwrap();
        assert_eq!(result, json!({"errors": "nope"}));
    }

    #[tokio::test]
    async fn test_collect_pages_respects_ceiling() {
        let calls = AtomicU32::new(0);
        let result = collect_pages("/x", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(page_of(100, 0)) }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_PAGES);
        assert_eq!(result.as_array().unwrap().len(), 100 * MAX_PAGES as usize);
    }
}
