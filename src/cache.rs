use crate::error::DashboardError;
use crate::resource::ResourceMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const DASHBOARD_SLOT: &str = "dashboard_data";
const COURSE_SLOT_PREFIX: &str = "course_data_";
const KNOWN_COURSES_SLOT: &str = "known_course_ids";
const MILLIS_PER_MINUTE: i64 = 60_000;

/// Key/value persistence behind the cache, with its own clock so tests can move time.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DashboardError>;
    async fn set(&self, key: &str, value: String) -> Result<(), DashboardError>;
    async fn delete(&self, key: &str) -> Result<(), DashboardError>;
    fn now_millis(&self) -> i64;
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    pinned_now: Mutex<Option<i64>>,
    quota_bytes: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pinned_now: Mutex::new(None),
            quota_bytes: None,
        }
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::new()
        }
    }

    pub fn set_now(&self, millis: i64) {
        if let Ok(mut guard) = self.pinned_now.lock() {
            *guard = Some(millis);
        }
    }

    pub fn advance(&self, millis: i64) {
        let now = self.now_millis();
        self.set_now(now + millis);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, DashboardError> {
        self.entries
            .lock()
            .map_err(|_| DashboardError::Store("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DashboardError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), DashboardError> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(DashboardError::Store(format!(
                    "quota exceeded writing {key} ({} bytes)",
                    value.len()
                )));
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DashboardError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        self.pinned_now
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Global,
    Course(i64),
}

impl CacheScope {
    fn slot(self) -> String {
        match self {
            CacheScope::Global => DASHBOARD_SLOT.to_string(),
            CacheScope::Course(id) => format!("{COURSE_SLOT_PREFIX}{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPayload {
    pub data: ResourceMap,
    pub timestamp: i64,
}

fn minutes_to_millis(minutes: i64) -> i64 {
    minutes.max(0).saturating_mul(MILLIS_PER_MINUTE)
}

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    global_max_age_ms: i64,
    course_max_age_ms: i64,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, global_max_age_minutes: i64, course_max_age_minutes: i64) -> Self {
        Self {
            store,
            global_max_age_ms: minutes_to_millis(global_max_age_minutes),
            course_max_age_ms: minutes_to_millis(course_max_age_minutes),
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.store.now_millis()
    }

    fn max_age_ms(&self, scope: CacheScope) -> i64 {
        match scope {
            CacheScope::Global => self.global_max_age_ms,
            CacheScope::Course(_) => self.course_max_age_ms,
        }
    }

    async fn load(&self, scope: CacheScope) -> Option<CachedPayload> {
        let slot = scope.slot();
        let raw = match self.store.get(&slot).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read of {slot} failed: {e}");
                return None;
            }
        };
        match serde_json::from_str::<CachedPayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                log::warn!("Ignoring malformed cache entry {slot}: {e}");
                None
            }
        }
    }

    fn is_fresh(&self, scope: CacheScope, payload: &CachedPayload) -> bool {
        self.now_millis().saturating_sub(payload.timestamp) <= self.max_age_ms(scope)
    }

    pub async fn read(&self, scope: CacheScope) -> Option<ResourceMap> {
        let payload = self.load(scope).await?;
        if self.is_fresh(scope, &payload) {
            log::debug!("Cache hit for {}", scope.slot());
            Some(payload.data)
        } else {
            log::debug!("Cache entry {} expired", scope.slot());
            None
        }
    }

    pub async fn is_expired(&self, scope: CacheScope) -> bool {
        match self.load(scope).await {
            Some(payload) => !self.is_fresh(scope, &payload),
            None => true,
        }
    }

    pub async fn write(&self, scope: CacheScope, data: &ResourceMap) {
        let slot = scope.slot();
        let payload = CachedPayload {
            data: data.clone(),
            timestamp: self.now_millis(),
        };
        let raw = match serde_json::to_string(&payload) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Could not serialize cache entry {slot}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&slot, raw).await {
            log::warn!("Cache write of {slot} failed: {e}");
            return;
        }
        if let CacheScope::Course(id) = scope {
            let mut known = self.known_course_ids().await;
            if !known.contains(&id) {
                known.push(id);
                self.save_known_course_ids(&known).await;
            }
        }
    }

    pub async fn invalidate(&self, scope: CacheScope) {
        self.delete_slot(&scope.slot()).await;
        if let CacheScope::Course(id) = scope {
            let mut known = self.known_course_ids().await;
            let before = known.len();
            known.retain(|k| *k != id);
            if known.len() != before {
                self.save_known_course_ids(&known).await;
            }
        }
    }

    pub async fn invalidate_all(&self) {
        self.delete_slot(DASHBOARD_SLOT).await;
        for id in self.known_course_ids().await {
            self.delete_slot(&CacheScope::Course(id).slot()).await;
        }
        self.delete_slot(KNOWN_COURSES_SLOT).await;
        log::info!("Cache cleared");
    }

    pub async fn known_course_ids(&self) -> Vec<i64> {
        match self.store.get(KNOWN_COURSES_SLOT).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed course index: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Course index read failed: {e}");
                Vec::new()
            }
        }
    }

    async fn save_known_course_ids(&self, ids: &[i64]) {
        let raw = match serde_json::to_string(ids) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Could not serialize course index: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(KNOWN_COURSES_SLOT, raw).await {
            log::warn!("Course index write failed: {e}");
        }
    }

    async fn delete_slot(&self, slot: &str) {
        if let Err(e) = self.store.delete(slot).await {
            log::warn!("Cache delete of {slot} failed: {e}");
        }
    }
}
