use thiserror::Error;

/// Failures of a gateway operation.
///
/// Declined cards are not errors. They come back as [`super::response::Outcome::Failure`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Local validation failure raised before any network call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, TLS or body read failure.
    #[error("http request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body carried no `Status` line, so it did not come from the gateway.
    #[error("gateway returned no status in the response body (http status {status})")]
    EmptyResponse { status: u16 },
}

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Whether the error happened on the wire rather than in local validation.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::EmptyResponse { .. })
    }
}
