//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so the pipeline, the guards
//! and every admin handler reject with the same `{error, message, code}`
//! body.
//!
//! # Key invariants and assumptions
//! - `code` in the body always equals the HTTP status.
//! - 401/403 messages are generic and never say which check failed.
//!
//! # Security considerations
//! - Internal errors log details server-side but return a generic message.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

pub const MSG_CERTIFICATE_REQUIRED: &str = "client certificate required";
pub const MSG_AUTHENTICATION_REQUIRED: &str = "authentication required";
pub const MSG_ACCESS_DENIED: &str = "access denied";
pub const MSG_UNAVAILABLE: &str = "service temporarily unavailable";

/// Structured API error returned by middleware and handlers.
///
/// # Invariants
/// - `status` must match `body.code`.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use gatekeeper::api::error::api_forbidden;
///
/// let err = api_forbidden("access denied");
/// assert_eq!(err.status, StatusCode::FORBIDDEN);
/// assert_eq!(err.body.code, 403);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                message: message.to_string(),
                code: status.as_u16(),
                request_id: None,
            },
        }
    }

    pub fn with_request_id(mut self, request_id: impl ToString) -> Self {
        self.body.request_id = Some(request_id.to_string());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build a 404 Not Found error.
///
/// # Errors
/// - Does not fail.
pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 409 Conflict error.
///
/// # Errors
/// - Does not fail.
pub fn api_conflict(message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, "conflict", message)
}

/// Build a 429 error for an exhausted tenant quota.
///
/// # Errors
/// - Does not fail.
pub fn api_quota_exceeded(message: &str) -> ApiError {
    ApiError::new(StatusCode::TOO_MANY_REQUESTS, "quota_exceeded", message)
}

/// Build a 500 Internal Server Error from a store error.
///
/// # What it does
/// Logs the store error with `context` and returns the generic
/// "service temporarily unavailable" body.
///
/// # Errors
/// - Does not fail.
pub fn api_internal(context: &str, err: &StoreError) -> ApiError {
    // Details stay in the log.
    tracing::error!(error = ?err, %context, "gatekeeper storage error");
    api_unavailable()
}

/// Build the generic 500 body without a store error to log.
///
/// # Errors
/// - Does not fail.
pub fn api_unavailable() -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", MSG_UNAVAILABLE)
}

/// Build a 401 Unauthorized error.
///
/// # Errors
/// - Does not fail.
pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// Build a 403 Forbidden error.
///
/// # Errors
/// - Does not fail.
pub fn api_forbidden(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

/// Build a 400 Bad Request validation error.
///
/// # Errors
/// - Does not fail.
pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Translate a store failure into its HTTP counterpart.
///
/// # What it does
/// Client-attributable failures keep their message; connectivity and
/// corruption failures are logged and collapse to the generic 500.
///
/// # Errors
/// - Does not fail.
pub fn api_store_error(context: &str, err: StoreError) -> ApiError {
    match &err {
        StoreError::NotFound(_) => api_not_found(&err.to_string()),
        StoreError::AlreadyExists(_) | StoreError::Conflict(_) => api_conflict(&err.to_string()),
        StoreError::QuotaExceeded { .. } => api_quota_exceeded(&err.to_string()),
        StoreError::TenantInactive(_) => api_forbidden(&err.to_string()),
        StoreError::InvalidIdentifier(_) | StoreError::InvalidResourceClass(_) => {
            api_validation_error(&err.to_string())
        }
        StoreError::Unavailable(_) | StoreError::Unexpected(_) => api_internal(context, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceClass;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.error, "not_found");
        assert_eq!(not_found.body.code, 404);

        let conflict = api_conflict("exists");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.body.code, 409);

        let quota = api_quota_exceeded("full");
        assert_eq!(quota.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(quota.body.code, 429);

        let unauthorized = api_unauthorized(MSG_CERTIFICATE_REQUIRED);
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.body.error, "unauthorized");
        assert_eq!(unauthorized.body.message, "client certificate required");

        let forbidden = api_forbidden(MSG_ACCESS_DENIED);
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.body.code, 403);

        let validation = api_validation_error("bad");
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.body.error, "validation_error");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = StoreError::Unexpected(anyhow::anyhow!("redis payload decode: secret"));
        let api = api_internal("load user", &err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.message, "service temporarily unavailable");
        assert_eq!(api.body.code, 500);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = vec![
            (StoreError::NotFound("tenant x".into()), StatusCode::NOT_FOUND),
            (StoreError::AlreadyExists("user x".into()), StatusCode::CONFLICT),
            (StoreError::Conflict("busy".into()), StatusCode::CONFLICT),
            (
                StoreError::QuotaExceeded {
                    tenant_id: "acme".into(),
                    class: ResourceClass::Users,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (StoreError::TenantInactive("acme".into()), StatusCode::FORBIDDEN),
            (StoreError::InvalidIdentifier("a:b".into()), StatusCode::BAD_REQUEST),
            (StoreError::InvalidResourceClass("widgets".into()), StatusCode::BAD_REQUEST),
            (StoreError::Unavailable("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                StoreError::Unexpected(anyhow::anyhow!("corrupt")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let api = api_store_error("test", err);
            assert_eq!(api.status, status);
            assert_eq!(api.body.code, status.as_u16());
        }
    }

    #[test]
    fn request_id_is_attached() {
        let api = api_forbidden(MSG_ACCESS_DENIED).with_request_id("req-1");
        assert_eq!(api.body.request_id.as_deref(), Some("req-1"));
    }
}
