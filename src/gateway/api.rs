use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{Instrument, instrument};

use crate::{
    connect::{self, callback::Notification, interaction_log::InteractionSpan},
    gateway::{
        TransactionKind, reference::TransactionReference, request::TransactionParams,
        response::Outcome,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    #[serde(rename = "transactionId")]
    transaction_id: Option<String>,
    handler: Option<String>,
}

/// Fields the ACS posts back after a challenge.
#[derive(Debug, Default, Deserialize)]
struct AcsForm {
    cres: Option<String>,
    #[serde(rename = "threeDSSessionData")]
    session_data: Option<String>,
    #[serde(rename = "PaRes")]
    pares: Option<String>,
    #[serde(rename = "MD")]
    md: Option<String>,
}

#[instrument(skip_all)]
async fn client_redirect_get(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    complete_redirect(state, query, AcsForm::default()).await
}

#[instrument(skip_all)]
async fn client_redirect_post(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    body: Bytes,
) -> Response {
    let form = serde_urlencoded::from_bytes::<AcsForm>(&body).unwrap_or_else(|e| {
        tracing::warn!("Failed to deserialize client redirect form: {e}");
        AcsForm::default()
    });
    complete_redirect(state, query, form).await
}

/// Finishes the challenge and sends the browser back to the host.
///
/// The row is claimed before any network call, a repeated or late
/// redirect gets 404. The host notification goes out in the background.
async fn complete_redirect(
    AppState { db, gate, config }: AppState,
    query: RedirectQuery,
    form: AcsForm,
) -> Response {
    let (Some(transaction_id), Some(handler)) = (query.transaction_id, query.handler) else {
        tracing::warn!("Client redirect without transaction id or handler");
        return StatusCode::NOT_FOUND.into_response();
    };
    tracing::trace!(
        %transaction_id,
        cres = form.cres.is_some(),
        pares = form.pares.is_some(),
        "Received client redirect"
    );
    let pending = match db
        .take_pending(&transaction_id, &handler, config.pending_redirect_ttl)
        .await
    {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            tracing::warn!(%transaction_id, "Pending redirect is not found in database");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            tracing::error!("Failed to claim pending redirect from the database: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let settings = match pending.settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let (Some(stored), Some(session)) = (&pending.vps_tx_id, &form.session_data) {
        if stored != session {
            tracing::warn!(%stored, %session, "ACS session data does not match the stored VPSTxId");
        }
    }
    let params = TransactionParams {
        transaction_id: Some(transaction_id.clone()),
        transaction_reference: Some(TransactionReference {
            vps_tx_id: pending.vps_tx_id.clone().or(form.session_data),
            vendor_tx_code: Some(transaction_id.clone()),
            ..Default::default()
        }),
        cres: form.cres,
        pares: form.pares,
        md: form.md,
        ..Default::default()
    };

    let mut span = InteractionSpan::enter(TransactionKind::CompleteAuthorize);
    let outcome = match gate
        .transact(TransactionKind::CompleteAuthorize, &params, &settings, &mut span)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Failed to complete authorization: {e}");
            Outcome::Failure {
                status: "ERROR".into(),
                detail: Some(e.to_string()),
                reference: None,
            }
        }
    };
    tracing::debug!(log = ?span.interaction_log(), "Completed authorization");

    let notification = Notification::from_outcome(&transaction_id, &outcome);
    tokio::spawn(
        async move {
            if let Err(e) =
                connect::callback::send_callback(&config, &handler, &notification).await
            {
                tracing::error!("Failed to send callback to gateway.connect: {e}");
            }
        }
        .in_current_span(),
    );

    match pending.return_url {
        Some(return_url) => Redirect::to(&return_url).into_response(),
        None => (
            StatusCode::OK,
            "Payment is being processed, you can close this page.",
        )
            .into_response(),
    }
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/webhooks/client-redirect",
        get(client_redirect_get).post(client_redirect_post),
    )
}
