use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    FatalConfig(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn invalid<E: std::fmt::Display>(err: E) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited(_))
    }

    /// Variant and detail followed by any `source()` chain, for the `log` field of
    /// error envelopes.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }

    /// Stable identifier of the error kind, used in response envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "invalid-argument",
            ApiError::NotFound(_) => "not-found",
            ApiError::RateLimited(_) => "rate-limited",
            ApiError::Upstream(_) => "upstream-failure",
            ApiError::Cancelled => "cancelled",
            ApiError::FatalConfig(_) => "fatal-config",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cancelled => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::FatalConfig(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, ApiError::Internal(_) | ApiError::FatalConfig(_)) {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "log": self.diagnostic(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(ApiError::InvalidArgument("x".into()).kind(), "invalid-argument");
        assert_eq!(ApiError::RateLimited("x".into()).kind(), "rate-limited");
        assert_eq!(ApiError::Cancelled.kind(), "cancelled");
        assert!(ApiError::RateLimited("429".into()).is_rate_limited());
        assert!(!ApiError::Upstream("500".into()).is_rate_limited());
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let response = ApiError::RateLimited("slow down".into()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn envelope_log_carries_the_diagnostic() {
        let response = ApiError::NotFound("folder kb/x".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(body["kind"], "not-found");
        assert_eq!(body["error"], "not found: folder kb/x");
        assert_eq!(body["log"], "NotFound(\"folder kb/x\")");
    }
}
