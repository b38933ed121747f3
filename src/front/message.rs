use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::Error;

/// Error response of every JSON handler: `{ "error": code, "message": text }`.
pub struct AppMessage(Response);

impl AppMessage {
    pub fn new_error(status: StatusCode, code: &'static str, msg: impl Into<String>) -> AppMessage {
        Self(
            (
                status,
                Json(json!({
                    "error": code,
                    "message": msg.into(),
                })),
            )
                .into_response(),
        )
    }
}

fn validation_code(err: &Error) -> &'static str {
    match err {
        Error::InvalidAmount(_) => "invalid_amount",
        Error::InvalidDate(_) => "invalid_date",
        Error::InvalidFilter { .. } => "invalid_filter",
        Error::InvalidDirection(_) => "invalid_direction",
        Error::UnknownDictionary(_) => "unknown_dictionary",
        Error::MalformedItem(_) => "malformed_payload",
        Error::Upload(_) => "invalid_upload",
        Error::UploadTooLarge { .. } => "upload_too_large",
        Error::Csv(_) => "invalid_csv",
        _ => "validation_error",
    }
}

impl From<Error> for AppMessage {
    fn from(err: Error) -> Self {
        match err {
            e if e.is_validation() => {
                AppMessage::new_error(StatusCode::BAD_REQUEST, validation_code(&e), e.to_string())
            }
            e @ (Error::EntryNotFound(_) | Error::DictionaryItemNotFound { .. }) => {
                AppMessage::new_error(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            Error::Unauthorized => AppMessage::new_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                Error::Unauthorized.to_string(),
            ),
            Error::StorageUnavailable => AppMessage::new_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                Error::StorageUnavailable.to_string(),
            ),
            e => {
                log::error!("request failed: {}", e);
                AppMessage::new_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error",
                )
            }
        }
    }
}

impl From<JsonRejection> for AppMessage {
    fn from(rejection: JsonRejection) -> Self {
        AppMessage::new_error(rejection.status(), "malformed_payload", rejection.body_text())
    }
}

impl IntoResponse for AppMessage {
    fn into_response(self) -> Response {
        self.0
    }
}
