use crate::error::DashboardError;
use crate::grading::GradingPolicy;
use std::path::PathBuf;
use std::time::Duration;

const ENV_LMS_BASE_URL: &str = "LMS_BASE_URL";
const ENV_LMS_API_TOKEN: &str = "LMS_API_TOKEN";
const ENV_USER_ID: &str = "DASHBOARD_USER_ID";
const ENV_BACKEND_URL: &str = "BACKEND_URL";
const ENV_DB_PATH: &str = "DASHBOARD_DB_PATH";
const ENV_CACHE_MAX_AGE: &str = "CACHE_MAX_AGE_MINUTES";
const ENV_COURSE_CACHE_MAX_AGE: &str = "COURSE_CACHE_MAX_AGE_MINUTES";
const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";
const ENV_AUTO_REFRESH: &str = "AUTO_REFRESH_MINUTES";
const ENV_CREDITS_PER_COURSE: &str = "CREDITS_PER_COURSE";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const DEFAULT_USER_ID: &str = "self";
pub const DEFAULT_CACHE_MAX_AGE_MINUTES: i64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTO_REFRESH_MINUTES: u64 = 30;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub lms_base_url: String,
    pub lms_api_token: Option<String>,
    pub user_id: String,
    pub backend_url: String,
    pub db_path: PathBuf,
    pub cache_max_age_minutes: i64,
    pub course_cache_max_age_minutes: i64,
    pub request_timeout: Duration,
    pub auto_refresh_interval: Duration,
    pub grading: GradingPolicy,
}

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, DashboardError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| DashboardError::Config(format!("{name} must be a number, got '{value}'"))),
    }
}

/// A non-negative minute count that still fits once converted to milliseconds.
fn parse_minutes(name: &str, raw: Option<String>, default: i64) -> Result<i64, DashboardError> {
    let minutes = parse_number(name, raw, default)?;
    if minutes < 0 || minutes.checked_mul(60_000).is_none() {
        return Err(DashboardError::Config(format!("{name} is out of range: {minutes}")));
    }
    Ok(minutes)
}

/// Strip trailing slashes so endpoint paths can be appended verbatim.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, DashboardError> {
        Self::from_lookup(env_var)
    }

    /// Build a config from an arbitrary variable lookup. `from_env` delegates here so
    /// parsing can be tested without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DashboardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lms_base_url = lookup(ENV_LMS_BASE_URL)
            .map(|u| normalize_base_url(&u))
            .ok_or_else(|| DashboardError::Config(format!("{ENV_LMS_BASE_URL} is required")))?;

        let backend_url = lookup(ENV_BACKEND_URL)
            .map(|u| normalize_base_url(&u))
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let cache_max_age_minutes = parse_minutes(
            ENV_CACHE_MAX_AGE,
            lookup(ENV_CACHE_MAX_AGE),
            DEFAULT_CACHE_MAX_AGE_MINUTES,
        )?;
        let course_cache_max_age_minutes = parse_minutes(
            ENV_COURSE_CACHE_MAX_AGE,
            lookup(ENV_COURSE_CACHE_MAX_AGE),
            DEFAULT_CACHE_MAX_AGE_MINUTES,
        )?;
        let timeout_secs = parse_number(
            ENV_REQUEST_TIMEOUT,
            lookup(ENV_REQUEST_TIMEOUT),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let refresh_minutes = parse_number(
            ENV_AUTO_REFRESH,
            lookup(ENV_AUTO_REFRESH),
            DEFAULT_AUTO_REFRESH_MINUTES,
        )?;
        let refresh_secs = refresh_minutes
            .checked_mul(60)
            .ok_or_else(|| DashboardError::Config(format!("{ENV_AUTO_REFRESH} is out of range: {refresh_minutes}")))?;

        let mut grading = GradingPolicy::default();
        grading.credits_per_course = parse_number(
            ENV_CREDITS_PER_COURSE,
            lookup(ENV_CREDITS_PER_COURSE),
            grading.credits_per_course,
        )?;

        Ok(Self {
            lms_base_url,
            lms_api_token: lookup(ENV_LMS_API_TOKEN),
            user_id: lookup(ENV_USER_ID).unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            backend_url,
            db_path: lookup(ENV_DB_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("student_dashboard.db")),
            cache_max_age_minutes,
            course_cache_max_age_minutes,
            request_timeout: Duration::from_secs(timeout_secs),
            auto_refresh_interval: Duration::from_secs(refresh_secs),
            grading,
        })
    }
}
