use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;

use crate::gateway::TransactionKind;

const GATEWAY: &str = "sagepay";

#[derive(Debug, Clone, Serialize)]
struct Request {
    url: String,
    params: serde_json::Value,
}

/// One gateway round trip as reported back to the host.
///
/// Payloads are stored already masked, nothing here touches raw card data.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionLog {
    gateway: &'static str,
    kind: TransactionKind,
    request: Option<Request>,
    status: Option<u16>,
    response: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    duration: f32,
}

#[derive(Debug)]
pub struct InteractionSpan {
    kind: TransactionKind,
    started: Instant,
    created_at: OffsetDateTime,
    request: Option<Request>,
    response: Option<serde_json::Value>,
    response_status: Option<u16>,
}

impl InteractionSpan {
    pub fn enter(kind: TransactionKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
            created_at: OffsetDateTime::now_utc(),
            request: None,
            response: None,
            response_status: None,
        }
    }

    pub fn set_request(&mut self, url: String, params: serde_json::Value) {
        self.request = Some(Request { url, params });
    }

    pub fn set_response(&mut self, response: serde_json::Value) {
        self.response = Some(response);
    }

    pub fn set_response_status(&mut self, status: u16) {
        self.response_status = Some(status);
    }

    pub fn interaction_log(self) -> InteractionLog {
        InteractionLog {
            gateway: GATEWAY,
            kind: self.kind,
            request: self.request,
            status: self.response_status,
            response: self.response,
            created_at: self.created_at,
            duration: self.started.elapsed().as_secs_f32(),
        }
    }
}
