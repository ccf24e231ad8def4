use crate::cache::{CacheManager, CacheScope};
use crate::error::DashboardError;
use crate::lms::{self, BackendClient, LmsClient, Session};
use crate::payload::{self, Enrollment};
use crate::resource::{self, ResourceEnvelope, ResourceKey, ResourceMap};
use futures::future::join_all;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum ResourceRequest {
    Single { key: ResourceKey, endpoint: String },
    Paginated { key: ResourceKey, endpoint: String },
    Grades,
    BackendBundle,
}

/// The dashboard's fixed resource set.
pub fn default_requests() -> Vec<ResourceRequest> {
    vec![
        ResourceRequest::Paginated {
            key: ResourceKey::Courses,
            endpoint: lms::courses_endpoint(),
        },
        ResourceRequest::Single {
            key: ResourceKey::Profile,
            endpoint: lms::profile_endpoint(),
        },
        ResourceRequest::Single {
            key: ResourceKey::Todo,
            endpoint: lms::todo_endpoint(),
        },
        ResourceRequest::Single {
            key: ResourceKey::UpcomingEvents,
            endpoint: lms::upcoming_events_endpoint(),
        },
        ResourceRequest::Paginated {
            key: ResourceKey::Enrollments,
            endpoint: lms::enrollments_endpoint(),
        },
        ResourceRequest::Grades,
        ResourceRequest::BackendBundle,
    ]
}

#[derive(Clone)]
pub struct Aggregator {
    lms: LmsClient,
    backend: BackendClient,
    requests: Vec<ResourceRequest>,
}

impl Aggregator {
    pub fn new(lms: LmsClient, backend: BackendClient) -> Self {
        Self::with_requests(lms, backend, default_requests())
    }

    pub fn with_requests(lms: LmsClient, backend: BackendClient, requests: Vec<ResourceRequest>) -> Self {
        Self {
            lms,
            backend,
            requests,
        }
    }

    /// Fetch every configured resource concurrently and wait for all of them.
    pub async fn fetch_all(&self, session: &Session) -> Result<ResourceMap, DashboardError> {
        session.bearer()?;

        let outcomes = join_all(self.requests.iter().map(|req| self.run(session, req))).await;

        let mut map = ResourceMap::new();
        for (key, envelope) in outcomes.into_iter().flatten() {
            map.entry(key).or_insert(envelope);
        }

        let failed = resource::failed_keys(&map);
        if failed.is_empty() {
            log::info!("Aggregated {} resources", map.len());
        } else {
            log::warn!(
                "Aggregated {} resources, {} failed: {}",
                map.len(),
                failed.len(),
                failed.join(", ")
            );
        }
        Ok(map)
    }

    async fn run(&self, session: &Session, request: &ResourceRequest) -> Vec<(String, ResourceEnvelope)> {
        match request {
            ResourceRequest::Single { key, endpoint } => {
                let result = self.lms.get_json(session, endpoint).await;
                vec![(key.to_string(), ResourceEnvelope::from(result))]
            }
            ResourceRequest::Paginated { key, endpoint } => {
                let result = self.lms.fetch_paginated(session, endpoint).await;
                vec![(key.to_string(), ResourceEnvelope::from(result))]
            }
            ResourceRequest::Grades => {
                let result = self.fetch_grades(session).await;
                vec![(ResourceKey::Grades.to_string(), ResourceEnvelope::from(result))]
            }
            ResourceRequest::BackendBundle => self.fetch_bundle(session).await,
        }
    }

    async fn fetch_grades(&self, session: &Session) -> Result<Value, DashboardError> {
        let body = self.lms.fetch_paginated(session, &lms::grades_endpoint()).await?;
        Ok(filter_graded(body))
    }

    async fn fetch_bundle(&self, session: &Session) -> Vec<(String, ResourceEnvelope)> {
        match self.backend.all_data(session).await {
            Ok(bundle) => bundle.into_iter().collect(),
            Err(bundle_err) => {
                log::warn!("Backend bundle failed: {bundle_err}");
                let announcements = match self.backend.announcements(session).await {
                    Ok(envelope) if envelope.is_ok() => envelope,
                    Ok(_) | Err(_) => ResourceEnvelope::failed(bundle_err.to_string()),
                };
                vec![(ResourceKey::Announcements.to_string(), announcements)]
            }
        }
    }

    pub async fn fetch_course_detail(&self, session: &Session, course_id: i64) -> Result<Value, DashboardError> {
        self.backend.course_data(session, course_id).await
    }

    /// Make sure `map` holds complete class data for `course_id`.
    pub async fn attach_course_detail(
        &self,
        session: &Session,
        map: &mut ResourceMap,
        cache: &CacheManager,
        course_id: i64,
    ) {
        let key = ResourceKey::course_detail(course_id);
        let slot = key.to_string();
        if map.get(&slot).is_some_and(|env| env.is_ok()) {
            return;
        }

        if let Some(cached) = cache.read(CacheScope::Course(course_id)).await {
            if let Some(envelope) = resource::get(&cached, &key).filter(|env| env.is_ok()) {
                map.insert(slot, envelope.clone());
                return;
            }
        }

        match self.fetch_course_detail(session, course_id).await {
            Ok(data) => {
                let envelope = ResourceEnvelope::ok(data);
                let mut entry = ResourceMap::new();
                entry.insert(slot.clone(), envelope.clone());
                cache.write(CacheScope::Course(course_id), &entry).await;
                map.insert(slot, envelope);
            }
            Err(e) => {
                log::warn!("Course detail for {course_id} unavailable: {e}");
                map.insert(slot, ResourceEnvelope::failed(e.to_string()));
            }
        }
    }

    /// Attach detail for every course in the map's course list, one course at a time.
    pub async fn attach_course_details(&self, session: &Session, map: &mut ResourceMap, cache: &CacheManager) {
        let ids: Vec<i64> = payload::course_list(map).iter().map(|c| c.id).collect();
        for course_id in ids {
            self.attach_course_detail(session, map, cache, course_id).await;
        }
    }
}

fn filter_graded(body: Value) -> Value {
    match body {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|item| {
                    serde_json::from_value::<Enrollment>(item.clone())
                        .ok()
                        .and_then(|e| e.grades)
                        .is_some_and(|g| g.has_grade())
                })
                .collect(),
        ),
        other => other,
    }
}
