use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tally_credentials::CredentialError;
use tally_scheduler::SchedulerError;

/// Error returned by every setup-server handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid or expired state parameter")]
    InvalidState,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Credentials(CredentialError::Unauthorized { .. }) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            ApiError::Credentials(CredentialError::RefreshFailed(_)) => {
                (StatusCode::BAD_GATEWAY, "refresh_failed")
            }
            ApiError::Credentials(CredentialError::Exchange(_)) => {
                (StatusCode::BAD_GATEWAY, "exchange_failed")
            }
            ApiError::Credentials(CredentialError::Database(_) | CredentialError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            ApiError::Scheduler(SchedulerError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_job")
            }
            ApiError::Scheduler(SchedulerError::JobNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "job_not_found")
            }
            ApiError::Scheduler(SchedulerError::Database(_) | SchedulerError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_map_to_http_status() {
        let unauthorized = ApiError::from(CredentialError::Unauthorized {
            company_id: "c1".into(),
            reason: "refresh token expired".into(),
        });
        assert_eq!(unauthorized.status_and_code().0, StatusCode::UNAUTHORIZED);

        let refresh = ApiError::from(CredentialError::RefreshFailed("invalid_grant".into()));
        assert_eq!(refresh.status_and_code(), (StatusCode::BAD_GATEWAY, "refresh_failed"));
    }

    #[test]
    fn scheduler_errors_map_to_http_status() {
        let invalid = ApiError::from(SchedulerError::Validation("empty recipient".into()));
        assert_eq!(invalid.status_and_code().0, StatusCode::BAD_REQUEST);

        let missing = ApiError::from(SchedulerError::JobNotFound { id: "j1".into() });
        assert_eq!(missing.status_and_code().0, StatusCode::NOT_FOUND);
    }
}
