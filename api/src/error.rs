use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("db_error: {0}")]
    Db(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("bad_request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::Db(e.to_string())
    }
}

impl From<shared::SignalError> for ApiError {
    fn from(e: shared::SignalError) -> Self {
        Self::Db(format!("unreadable row: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_and_status() {
        assert_eq!(ApiError::NotFound("signal 7".into()).to_string(), "not_found: signal 7");
        assert_eq!(
            ApiError::from(shared::SignalError::InvalidData("unknown status: x".into())).to_string(),
            "db_error: unreadable row: invalid market data: unknown status: x"
        );
        assert_eq!(ApiError::BadRequest("days".into()).into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Db("gone".into()).into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
