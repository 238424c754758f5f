use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    // Rejected input, nothing written
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    // Identity
    #[error("Missing user identity")]
    IdentityMissing,
}

pub type Result<T> = core::result::Result<T, ChatError>;

impl ChatError {
    /// Text sent to the initiating client in a `message_error` event.
    /// Storage details stay in the server log.
    pub fn client_reason(&self) -> String {
        match self {
            ChatError::Validation(msg) => msg.clone(),
            ChatError::NotFound(what) => format!("{} not found", what),
            ChatError::Storage(_) => "Storage unavailable".to_string(),
            ChatError::IdentityMissing => "Missing user identity".to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::IdentityMissing => StatusCode::UNAUTHORIZED,
        };

        let body = Json(json!({
            "error": {
                "message": self.client_reason()
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_reason_hides_details() {
        let err = ChatError::from(StoreError::Unavailable("disk full at /var/db".to_string()));
        assert_eq!(err.client_reason(), "Storage unavailable");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ChatError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (ChatError::NotFound("Message".into()), StatusCode::NOT_FOUND),
            (ChatError::IdentityMissing, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
