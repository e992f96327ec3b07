//! JSON error responses.
//!
//! Every error body has the same shape:
//! `{ "success": false, "error": "<kind>", "message": "<detail>" }`.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

pub type ErrorReply = (StatusCode, Json<ErrorResponse>);

pub fn error(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> ErrorReply {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
            message: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ErrorReply {
    error(StatusCode::BAD_REQUEST, "Bad request", message)
}

pub fn forbidden(message: impl Into<String>) -> ErrorReply {
    error(StatusCode::FORBIDDEN, "Forbidden", message)
}

pub fn not_found(message: impl Into<String>) -> ErrorReply {
    error(StatusCode::NOT_FOUND, "Not found", message)
}

pub fn bad_gateway(message: impl Into<String>) -> ErrorReply {
    error(StatusCode::BAD_GATEWAY, "Gateway error", message)
}

pub fn service_unavailable(message: impl Into<String>) -> ErrorReply {
    error(StatusCode::SERVICE_UNAVAILABLE, "Not configured", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let (status, Json(body)) = forbidden("Not an admin number");
        assert_eq!(status, StatusCode::FORBIDDEN);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Forbidden");
        assert_eq!(json["message"], "Not an admin number");
    }
}
