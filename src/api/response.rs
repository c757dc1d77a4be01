use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::application::AppError;

/// Error returned by HTTP handlers, rendered as `{"success": false, "message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    BadRequest(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(err) => app_error_status(err),
        }
    }
}

#[must_use]
pub fn app_error_status(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_)
        | AppError::Quote(_)
        | AppError::InvalidStatus(_)
        | AppError::AmountOutOfRange { .. }
        | AppError::TermOutOfRange { .. } => StatusCode::BAD_REQUEST,
        AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::AdminRequired => StatusCode::FORBIDDEN,
        AppError::UserNotFound(_) | AppError::LoanNotFound(_) => StatusCode::NOT_FOUND,
        AppError::EmailAlreadyRegistered(_) => StatusCode::CONFLICT,
        AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::App(AppError::Database(err)) => {
                error!(error = %err, "database failure while serving request");
                "Server error".to_string()
            }
            ApiError::App(err) => err.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuoteError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AppError::validation("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AppError::Quote(QuoteError::ZeroTerm)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AppError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AppError::AdminRequired).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AppError::LoanNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AppError::EmailAlreadyRegistered("a@b.c".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AppError::Database(anyhow::anyhow!("disk"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
