// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::zones::ZoneError;

/// Outcome carried in every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    BadRequest,
    InternalServerError,
    AlreadyExists,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponseBody {
    pub status: Status,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn internal<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }

    pub fn status(&self) -> Status {
        match self {
            AppError::BadRequest(_) | AppError::Unauthorized(_) => Status::BadRequest,
            AppError::AlreadyExists(_) => Status::AlreadyExists,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<ZoneError> for AppError {
    fn from(err: ZoneError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.into())
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Invalid(e) => AppError::BadRequest(e.to_string()),
            CredentialError::InvalidCredentials | CredentialError::UnknownAccount(_) => {
                AppError::BadRequest(err.to_string())
            }
            CredentialError::AlreadyExists(_) => AppError::AlreadyExists(err.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, msg) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".into(),
                )
            }
        };

        let body = Json(ErrorResponseBody { status, error: msg });
        (code, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soa::SoaError;
    use crate::validation::ValidationError;

    #[test]
    fn zone_errors_split_into_client_and_internal() {
        let err: AppError = ZoneError::ZoneNotFound("x.com".into()).into();
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.to_string(), "bad request: zone 'x.com' not found");

        let err: AppError = ZoneError::Soa(SoaError::Invalid).into();
        assert_eq!(err.status(), Status::InternalServerError);
    }

    #[test]
    fn credential_errors_map_to_statuses() {
        let err: AppError = CredentialError::AlreadyExists("a@x.com".into()).into();
        assert_eq!(err.status(), Status::AlreadyExists);

        let err: AppError = CredentialError::Invalid(ValidationError::Empty("email")).into();
        assert_eq!(err.status(), Status::BadRequest);

        let err: AppError = CredentialError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status(), Status::InternalServerError);
    }

    #[tokio::test]
    async fn internal_detail_stays_out_of_the_body() {
        use http_body_util::BodyExt;

        let err: AppError = CredentialError::Database(sqlx::Error::PoolTimedOut).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "InternalServerError");
        assert_eq!(body["error"], "internal server error");
    }
}
