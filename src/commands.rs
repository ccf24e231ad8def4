use crate::aggregator::Aggregator;
use crate::cache::{CacheManager, CacheScope, CacheStore};
use crate::config::{Config, DEFAULT_AUTO_REFRESH_MINUTES};
use crate::course_names;
use crate::dashboard;
use crate::error::DashboardError;
use crate::lms::{BackendClient, LmsClient, Session};
use crate::payload;
use crate::resource::ResourceMap;
use crate::types::{CourseDetail, CustomCourseName, Dashboard};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Everything a command needs, shared for the life of the process.
pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub cache: CacheManager,
    pub aggregator: Aggregator,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, store: Arc<dyn CacheStore>) -> Result<Self, DashboardError> {
        let lms = LmsClient::new(&config.lms_base_url, config.request_timeout)?;
        let backend = BackendClient::new(&config.backend_url, config.request_timeout)?;
        Ok(Self::with_aggregator(config, pool, store, Aggregator::new(lms, backend)))
    }

    pub fn with_aggregator(
        config: Config,
        pool: SqlitePool,
        store: Arc<dyn CacheStore>,
        aggregator: Aggregator,
    ) -> Self {
        let cache = CacheManager::new(store, config.cache_max_age_minutes, config.course_cache_max_age_minutes);
        Self {
            config,
            pool,
            cache,
            aggregator,
        }
    }

    /// Session for the configured user and token.
    pub fn session(&self) -> Session {
        Session::new(self.config.user_id.clone(), self.config.lms_api_token.clone())
    }
}

fn command_error(context: &str, err: impl std::fmt::Display) -> String {
    log::error!("{context}: {err}");
    format!("{context}: {err}")
}

/// The global resource map, from cache when fresh, otherwise freshly aggregated and
/// written back.
async fn global_map(state: &AppState, session: &Session) -> Result<(ResourceMap, bool), DashboardError> {
    if let Some(map) = state.cache.read(CacheScope::Global).await {
        return Ok((map, true));
    }
    let map = state.aggregator.fetch_all(session).await?;
    state.cache.write(CacheScope::Global, &map).await;
    Ok((map, false))
}

async fn custom_names(state: &AppState, session: &Session) -> std::collections::HashMap<i64, String> {
    course_names::name_map(&state.pool, &session.user_id)
        .await
        .unwrap_or_else(|e| {
            log::warn!("Custom course names unavailable: {e}");
            Default::default()
        })
}

pub async fn load_dashboard(state: &AppState, session: &Session, force_refresh: bool) -> Result<Dashboard, String> {
    session
        .bearer()
        .map_err(|e| command_error("Failed to load dashboard", e))?;

    if force_refresh {
        state.cache.invalidate_all().await;
    }

    let (mut map, from_cache) = global_map(state, session)
        .await
        .map_err(|e| command_error("Failed to load dashboard", e))?;
    state
        .aggregator
        .attach_course_details(session, &mut map, &state.cache)
        .await;

    let mut dashboard = dashboard::build_dashboard(&map, Utc::now(), &state.config.grading, from_cache);
    dashboard::apply_custom_names(&mut dashboard.courses, &custom_names(state, session).await);
    Ok(dashboard)
}

pub async fn refresh_dashboard(state: &AppState, session: &Session) -> Result<Dashboard, String> {
    load_dashboard(state, session, true).await
}

pub async fn get_course_detail(state: &AppState, session: &Session, course_id: i64) -> Result<CourseDetail, String> {
    session
        .bearer()
        .map_err(|e| command_error("Failed to load course", e))?;

    let (mut map, _) = global_map(state, session)
        .await
        .map_err(|e| command_error("Failed to load course", e))?;
    if !payload::course_list(&map).iter().any(|c| c.id == course_id) {
        return Err(command_error("Failed to load course", format!("course {course_id} not found")));
    }
    state
        .aggregator
        .attach_course_detail(session, &mut map, &state.cache, course_id)
        .await;

    let mut detail = dashboard::extract_course_detail(&map, course_id, Utc::now(), &state.config.grading)
        .ok_or_else(|| command_error("Failed to load course", format!("course {course_id} not found")))?;
    if let Some(name) = custom_names(state, session).await.remove(&course_id) {
        detail.name = name;
    }
    Ok(detail)
}

pub async fn save_course_name(
    state: &AppState,
    session: &Session,
    course_id: i64,
    custom_name: &str,
) -> Result<CustomCourseName, String> {
    course_names::save(&state.pool, &session.user_id, course_id, custom_name)
        .await
        .map_err(|e| command_error("Failed to save course name", e))
}

pub async fn delete_course_name(state: &AppState, session: &Session, course_id: i64) -> Result<bool, String> {
    course_names::delete(&state.pool, &session.user_id, course_id)
        .await
        .map_err(|e| command_error("Failed to delete course name", e))
}

pub async fn list_course_names(state: &AppState, session: &Session) -> Result<Vec<CustomCourseName>, String> {
    course_names::get_all(&state.pool, &session.user_id)
        .await
        .map_err(|e| command_error("Failed to list course names", e))
}

pub async fn clear_cache(state: &AppState) -> Result<(), String> {
    state.cache.invalidate_all().await;
    Ok(())
}

/// Reload the dashboard every `interval` in the background. The first reload happens
/// one full interval after the call. Abort the handle to stop.
pub fn spawn_auto_refresh(state: Arc<AppState>, session: Session, interval: Duration) -> JoinHandle<()> {
    let period = if interval.is_zero() {
        Duration::from_secs(DEFAULT_AUTO_REFRESH_MINUTES * 60)
    } else {
        interval
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            match refresh_dashboard(&state, &session).await {
                Ok(dashboard) => log::info!(
                    "Auto refresh loaded {} courses, {} failed resources",
                    dashboard.courses.len(),
                    dashboard.failed_resources.len()
                ),
                Err(e) => log::warn!("Auto refresh failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::database::init_memory_database;
    use crate::grading::GradingPolicy;
    use crate::resource::ResourceEnvelope;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            // Nothing listens here; tests that reach the network expect failures.
            lms_base_url: "http://127.0.0.1:9".to_string(),
            lms_api_token: Some("tok".to_string()),
            user_id: "u1".to_string(),
            backend_url: "http://127.0.0.1:9".to_string(),
            db_path: "unused.db".into(),
            cache_max_age_minutes: 30,
            course_cache_max_age_minutes: 30,
            request_timeout: Duration::from_secs(2),
            auto_refresh_interval: Duration::from_secs(60),
            grading: GradingPolicy::default(),
        }
    }

    async fn state_with_cached(map: &ResourceMap) -> AppState {
        let store = Arc::new(MemoryStore::new());
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(test_config(), pool, store).unwrap();
        state.cache.write(CacheScope::Global, map).await;
        state
    }

    fn cached_map() -> ResourceMap {
        let mut map = ResourceMap::new();
        map.insert(
            "courses".into(),
            ResourceEnvelope::ok(json!([{"id": 1, "name": "2025SP-CSC101", "course_code": "CSC101"}])),
        );
        map.insert(
            "complete_class_data_1".into(),
            ResourceEnvelope::ok(json!({"course_info": {"id": 1, "name": "2025SP-CSC101"}, "professors": [{"name": "Dr. Ada"}]})),
        );
        map.insert(
            "grades".into(),
            ResourceEnvelope::ok(json!([{"course_id": 1, "grades": {"current_grade": "B+"}}])),
        );
        map.insert("todo".into(), ResourceEnvelope::failed("500 Internal Server Error"));
        map
    }

    #[tokio::test]
    async fn test_load_dashboard_from_cache_with_custom_name() {
        let state = state_with_cached(&cached_map()).await;
        let session = state.session();
        save_course_name(&state, &session, 1, "Intro CS").await.unwrap();

        let dashboard = load_dashboard(&state, &session, false).await.unwrap();
        assert!(dashboard.from_cache);
        assert_eq!(dashboard.courses[0].name, "Intro CS");
        assert_eq!(dashboard.courses[0].instructor, "Dr. Ada");
        assert_eq!(dashboard.statistics.gpa, "3.30");
        assert_eq!(dashboard.failed_resources, vec!["todo".to_string()]);
    }

    #[tokio::test]
    async fn test_load_dashboard_without_token_fails() {
        let state = state_with_cached(&cached_map()).await;
        let session = Session::new("u1", None);
        let err = load_dashboard(&state, &session, false).await.unwrap_err();
        assert!(err.contains("No authenticated user found"));
    }

    #[tokio::test]
    async fn test_course_detail_uses_cached_detail_and_custom_name() {
        let state = state_with_cached(&cached_map()).await;
        let session = state.session();
        save_course_name(&state, &session, 1, "Intro CS").await.unwrap();

        let detail = get_course_detail(&state, &session, 1).await.unwrap();
        assert_eq!(detail.name, "Intro CS");
        assert_eq!(detail.code, "CSC101");
        assert_eq!(detail.current_grade.as_deref(), Some("B+"));
    }

    #[tokio::test]
    async fn test_course_detail_unknown_course_is_error() {
        let state = state_with_cached(&cached_map()).await;
        let err = get_course_detail(&state, &state.session(), 42).await.unwrap_err();
        assert!(err.contains("course 42 not found"));
        assert!(state.cache.read(CacheScope::Course(42)).await.is_none());
        assert!(state.cache.known_course_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_course_name_commands() {
        let state = state_with_cached(&cached_map()).await;
        let session = state.session();
        assert!(save_course_name(&state, &session, 1, "").await.is_err());
        save_course_name(&state, &session, 1, "Intro CS").await.unwrap();
        assert_eq!(list_course_names(&state, &session).await.unwrap().len(), 1);
        assert!(delete_course_name(&state, &session, 1).await.unwrap());
        assert!(list_course_names(&state, &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_miss() {
        let state = state_with_cached(&cached_map()).await;
        clear_cache(&state).await.unwrap();
        assert!(state.cache.read(CacheScope::Global).await.is_none());
    }
}
