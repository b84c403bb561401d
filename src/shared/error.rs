use axum::{http::StatusCode, response::IntoResponse, Json};
use std::sync::OnceLock;

static DEBUG_ERRORS: OnceLock<bool> = OnceLock::new();

/// Whether 5xx response bodies carry the underlying error detail. Off until
/// enabled at startup; the detail always reaches the logs either way.
pub fn set_debug_errors(enabled: bool) {
    let _ = DEBUG_ERRORS.set(enabled);
}

fn debug_errors() -> bool {
    DEBUG_ERRORS.get().copied().unwrap_or(false)
}

/// Service-wide error taxonomy. Maps onto the REST status contract:
/// validation 400, not-found 404, conflict 409, everything else 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Not-found for a missing hierarchy level, naming the level that broke
    /// the traversal ("module", "subModule", "topic", "subTopic", ...).
    pub fn missing(level: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} {} not found", level, id))
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("document decode failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            if debug_errors() {
                self.to_string()
            } else {
                "Internal server error".to_string()
            }
        } else {
            self.to_string()
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_level_message() {
        let e = ApiError::missing("subModule", "abc-123");
        assert_eq!(e.to_string(), "Not found: subModule abc-123 not found");
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let e: ApiError = diesel::result::Error::NotFound.into();
        assert!(matches!(e, ApiError::NotFound(_)));
    }

    async fn response_error(e: ApiError) -> String {
        let response = e.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_internal_detail_is_debug_gated() {
        // Never enabled: 500 bodies carry a generic message, 4xx keep theirs.
        let msg = response_error(ApiError::Database("relation missing".to_string())).await;
        assert_eq!(msg, "Internal server error");
        let msg = response_error(ApiError::Validation("bad input".to_string())).await;
        assert_eq!(msg, "Validation error: bad input");

        set_debug_errors(true);
        let msg = response_error(ApiError::Database("relation missing".to_string())).await;
        assert_eq!(msg, "Database error: relation missing");
    }
}
