use serde::Serialize;

use crate::gateway::mask;

pub mod api;
pub mod callback;
pub mod interaction_log;

pub type Result<T> = std::result::Result<T, ConnectErrorResponse>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Approved,
    Declined,
    Pending,
}

/// Error envelope. Sent with HTTP 200 like every other host response.
#[derive(Debug, Serialize)]
pub struct ConnectErrorResponse {
    result: bool,
    error: String,
    logs: Vec<interaction_log::InteractionLog>,
}

impl std::error::Error for ConnectErrorResponse {}

impl std::fmt::Display for ConnectErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

impl ConnectErrorResponse {
    pub fn new(text: impl Into<String>, logs: Vec<interaction_log::InteractionLog>) -> Self {
        Self {
            result: false,
            error: text.into(),
            logs,
        }
    }
}

impl axum::response::IntoResponse for ConnectErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::debug!(data = %mask::secure_serializable(&self), "Connect API error response payload");
        (axum::http::StatusCode::OK, axum::Json(self)).into_response()
    }
}
