//! API error type. Every handler returns `AppResult<T>`; errors render as
//! `{"success": false, "error": "<message>", "code": "<stable code>"}` with a matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{
    auth::service::AuthError,
    bookings::{CheckoutError, LifecycleError},
    payments::PaymentError,
    store::StoreError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound      => StatusCode::NOT_FOUND,
            AppError::Unauthorized  => StatusCode::UNAUTHORIZED,
            AppError::Forbidden     => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)   => StatusCode::CONFLICT,
            AppError::Upstream(_)   => StatusCode::BAD_GATEWAY,
            AppError::Internal(_)   => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::ProfileUnavailable => StatusCode::UNAUTHORIZED,
                AuthError::EmailTaken      => StatusCode::CONFLICT,
                AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AuthError::Internal(_) | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound      => "not_found",
            AppError::Unauthorized  => "unauthorized",
            AppError::Forbidden     => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_)   => "conflict",
            AppError::Upstream(_)   => "upstream",
            AppError::Internal(_)   => "internal",
            AppError::Auth(err)     => err.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "success": false, "error": message, "code": self.code() }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => AppError::Conflict(what),
            StoreError::MissingReference(what) => AppError::BadRequest(format!("Unknown {what}")),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::from(StoreError::from(err))
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound      => AppError::NotFound,
            LifecycleError::Transition(e) => AppError::Conflict(e.to_string()),
            LifecycleError::Concurrent    => AppError::Conflict(err.to_string()),
            LifecycleError::Store(e)      => AppError::from(e),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => AppError::Internal(anyhow::Error::new(err)),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::ServiceNotFound => AppError::NotFound,
            CheckoutError::NotPaid | CheckoutError::SessionMismatch | CheckoutError::Incomplete(_) => {
                AppError::BadRequest(err.to_string())
            }
            CheckoutError::Payment(e) => AppError::from(e),
            CheckoutError::Store(e)   => AppError::from(e),
        }
    }
}
