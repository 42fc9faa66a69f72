// src/error.rs
use crate::gate::TierOffer;
use crate::usage::Quota;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

/// Errors surfaced to HTTP callers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sign in required")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("Search quota exhausted")]
    QuotaExceeded {
        quota: Quota,
        upgrade: Option<&'static TierOffer>,
    },
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Unauthorized => json!({
                "error": self.to_string(),
                "sign_in_required": true,
            }),
            AppError::QuotaExceeded { quota, upgrade } => json!({
                "error": self.to_string(),
                "quota": quota,
                "upgrade": upgrade,
            }),
            AppError::BadRequest(_) => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
