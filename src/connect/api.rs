use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    connect::{
        ConnectErrorResponse, Result, Status,
        interaction_log::{InteractionLog, InteractionSpan},
    },
    db::{Db, PendingRedirect},
    gateway::{
        TransactionKind, config::GatewayConfig, request::TransactionParams, response::Outcome,
    },
    state::AppState,
};

pub const CLIENT_REDIRECT_PATH: &str = "/sagepay/webhooks/client-redirect";

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub settings: GatewayConfig,
    /// Host side payment handler notified once a challenge completes
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub payment: TransactionParams,
}

#[instrument(skip_all)]
async fn transaction(
    State(AppState { gate, db, config }): State<AppState>,
    Path(kind): Path<String>,
    Json(TransactionRequest {
        settings,
        handler,
        mut payment,
    }): Json<TransactionRequest>,
) -> Result<ConnectResponse<TransactionResponse>> {
    let kind = match kind.parse::<TransactionKind>() {
        Ok(kind) => kind,
        Err(e) => return Err(ConnectErrorResponse::new(e.to_string(), vec![])),
    };

    if kind.is_payment() {
        let transaction_id = payment
            .transaction_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
            .clone();
        if let (Some(handler), Some(callback_url)) = (&handler, &config.callback_url) {
            match client_redirect_url(callback_url, &transaction_id, handler) {
                Ok(url) => payment.notification_url = Some(url),
                Err(e) => tracing::error!("Failed to build client redirect url: {e}"),
            }
        }
    }

    let mut span = InteractionSpan::enter(kind);
    let outcome = gate.transact(kind, &payment, &settings, &mut span).await;
    let log = span.interaction_log();
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(transport = e.is_transport(), "Failed to process {kind} transaction: {e}");
            return Err(ConnectErrorResponse::new(e.to_string(), vec![log]));
        }
    };

    if let (Outcome::Redirect(redirect), Some(handler), Some(transaction_id), true) = (
        &outcome,
        &handler,
        &payment.transaction_id,
        kind.is_payment(),
    ) {
        let vps_tx_id = redirect.reference.as_ref().and_then(|r| r.vps_tx_id.clone());
        let pending = PendingRedirect::new(transaction_id, handler, &settings, vps_tx_id)
            .map(|pending| pending.with_return_url(payment.return_url.clone()));
        if let Err(e) = store_pending(&db, pending).await {
            tracing::error!("Failed to store pending redirect: {e}");
            return Err(ConnectErrorResponse::new(
                "failed to store pending redirect",
                vec![log],
            ));
        }
        tracing::info!(%transaction_id, "Stored pending redirect");
    }

    tracing::info!(success = outcome.is_success(), "Dispatched {kind} transaction");
    Ok(ConnectResponse::new(outcome.into(), vec![log]))
}

async fn store_pending(db: &Db, pending: anyhow::Result<PendingRedirect>) -> anyhow::Result<()> {
    db.insert_pending(&pending?).await?;
    Ok(())
}

fn client_redirect_url(
    callback_url: &str,
    transaction_id: &str,
    handler: &str,
) -> anyhow::Result<String> {
    let url = reqwest::Url::parse_with_params(
        &format!("{callback_url}{CLIENT_REDIRECT_PATH}"),
        [("transactionId", transaction_id), ("handler", handler)],
    )?;
    Ok(url.into())
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse<T> {
    result: bool,
    logs: Vec<InteractionLog>,
    #[serde(flatten)]
    data: T,
}

impl<T> ConnectResponse<T> {
    pub fn new(data: T, logs: Vec<InteractionLog>) -> Self {
        Self {
            result: true,
            logs,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ConnectResponse<T> {
    fn into_response(self) -> axum::response::Response {
        match serde_json::to_value(self) {
            Ok(value) => {
                tracing::debug!(data = %crate::gateway::mask::secure_value(&value), "Connect API response payload");
                axum::Json(value).into_response()
            }
            Err(e) => ConnectErrorResponse::new(format!("failed to encode response: {e}"), vec![])
                .into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_request: Option<RedirectRequest>,
    /// Encoded reference for follow-up operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Raw gateway status of a decline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedirectRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: RedirectRequestType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectRequestType {
    /// Auto submitted form with `params`
    Post,
    Get,
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/transactions/{kind}", post(transaction))
}

/// `Json` extractor wrapper that customizes the error from `axum::extract::Json`
pub struct Json<T>(pub T);

impl<S, T> axum::extract::FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ConnectErrorResponse;

    async fn from_request(
        req: axum::http::Request<axum::body::Body>,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(e) => Err(ConnectErrorResponse::new(e.to_string(), vec![])),
        }
    }
}
