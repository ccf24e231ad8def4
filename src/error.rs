use thiserror::Error;

/// Errors raised while talking to the LMS, the aggregation backend, or local storage.
///
/// Transport-level variants (`Status`, `Network`, `Decode`) are normally folded into a
/// resource envelope's `error` string by the aggregator; only `Unauthenticated` is
/// meant to reach the caller of a fetch.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// No usable session: missing or empty bearer token.
    #[error("No authenticated user found")]
    Unauthenticated,

    /// Upstream answered with a non-success HTTP status.
    #[error("{status}")]
    Status { endpoint: String, status: String },

    /// The request never produced a response (connect error, timeout, ...).
    #[error("Network error fetching {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// The response body could not be parsed as JSON.
    #[error("Failed to parse response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// The cache store rejected a read or write.
    #[error("Cache store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl DashboardError {
    pub(crate) fn network(endpoint: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        DashboardError::Network {
            endpoint: endpoint.to_string(),
            message,
        }
    }

    pub(crate) fn decode(endpoint: &str, err: impl std::fmt::Display) -> Self {
        DashboardError::Decode {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_displays_status_text_only() {
        let err = DashboardError::Status {
            endpoint: "/api/v1/courses".to_string(),
            status: "404 Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "404 Not Found");
    }

    #[test]
    fn test_unauthenticated_message() {
        assert_eq!(
            DashboardError::Unauthenticated.to_string(),
            "No authenticated user found"
        );
    }

    #[test]
    fn test_decode_error_names_endpoint() {
        let err = DashboardError::decode("/api/v1/users/self/profile", "expected value");
        assert!(err.to_string().contains("/api/v1/users/self/profile"));
        assert!(err.to_string().contains("expected value"));
    }
}
