use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by every handler; renders as `{error, message, code}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    TooManyRequests(String),

    /// Extractor rejection that keeps the framework's status (400, 413, 415, 422).
    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Rejected(status, _) => *status,
            ApiError::Internal(_) | ApiError::Database(_) => match self.sqlx_error() {
                Some(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
                Some(sqlx::Error::Database(db)) if db.is_unique_violation() => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// The sqlx error behind a database or internal failure, looking through
    /// anyhow context.
    fn sqlx_error(&self) -> Option<&sqlx::Error> {
        match self {
            ApiError::Database(e) => Some(e),
            ApiError::Internal(e) => e.downcast_ref::<sqlx::Error>(),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        let message = match self {
            ApiError::Internal(_) | ApiError::Database(_) => match status {
                StatusCode::NOT_FOUND => "Resource not found".to_string(),
                StatusCode::CONFLICT => "Resource already exists".to_string(),
                _ => "Internal server error".to_string(),
            },
            other => other.to_string(),
        };
        ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            code: status.as_u16(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(err.body_text()),
            _ => ApiError::BadRequest(err.body_text()),
        }
    }
}

/// Router fallback so unknown paths still answer with the JSON envelope.
pub async fn not_found_fallback() -> ApiError {
    ApiError::NotFound("Resource not found".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_mirrors_status() {
        let cases = [
            (ApiError::BadRequest("bad flag".into()), 400, "Bad Request"),
            (ApiError::Unauthorized("no token".into()), 401, "Unauthorized"),
            (ApiError::Forbidden("admins only".into()), 403, "Forbidden"),
            (ApiError::NotFound("no such challenge".into()), 404, "Not Found"),
            (ApiError::Conflict("taken".into()), 409, "Conflict"),
            (ApiError::TooManyRequests("slow down".into()), 429, "Too Many Requests"),
        ];
        for (err, code, reason) in cases {
            let message = err.to_string();
            let body = err.body();
            assert_eq!(body.code, code);
            assert_eq!(body.error, reason);
            assert_eq!(body.message, message);
        }
    }

    #[test]
    fn internal_details_are_hidden() {
        let body = ApiError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3")).body();
        assert_eq!(body.code, 500);
        assert_eq!(body.error, "Internal Server Error");
        assert_eq!(body.message, "Internal server error");
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body().message, "Resource not found");
    }

    #[derive(Debug)]
    struct UniqueViolation;

    impl std::fmt::Display for UniqueViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint \"users_username_key\"")
        }
    }

    impl std::error::Error for UniqueViolation {}

    impl sqlx::error::DatabaseError for UniqueViolation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    fn unique_violation() -> sqlx::Error {
        sqlx::Error::Database(Box::new(UniqueViolation))
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = ApiError::from(unique_violation());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let body = err.body();
        assert_eq!(body.code, 409);
        assert_eq!(body.message, "Resource already exists");
        assert!(!body.message.contains("users_username_key"));
    }

    #[test]
    fn unique_violation_behind_context_maps_to_conflict() {
        use anyhow::Context;
        let wrapped: anyhow::Result<()> = Err(unique_violation()).context("insert user");
        let err = ApiError::from(wrapped.unwrap_err());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.body().error, "Conflict");

        let other: anyhow::Result<()> = Err(sqlx::Error::PoolTimedOut).context("begin tx");
        assert_eq!(ApiError::from(other.unwrap_err()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejections_keep_their_status() {
        let err = ApiError::Rejected(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected JSON".into());
        let body = err.body();
        assert_eq!(body.code, 415);
        assert_eq!(body.error, "Unsupported Media Type");
        assert_eq!(body.message, "Expected JSON");
    }

    #[tokio::test]
    async fn response_body_is_json_envelope() {
        let res = ApiError::Forbidden("admins only".into()).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Forbidden");
        assert_eq!(json["message"], "admins only");
        assert_eq!(json["code"], 403);
    }
}
