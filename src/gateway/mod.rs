use crate::connect::interaction_log::InteractionSpan;

pub use error::GatewayError;
pub use request::TransactionKind;

pub mod api;
/// Shopping basket fields and name filtering
pub mod basket;
/// Card and address mapping
pub mod card;
pub mod config;
mod error;
/// Type conversions between the gateway outcome and the connect API
mod from;
/// Requisite masking
pub mod mask;
pub mod reference;
/// Outbound field assembly per transaction kind
pub mod request;
/// Response body parsing and classification
pub mod response;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Sage Pay Direct client.
#[derive(Debug, Clone)]
pub struct SagePayGateway {
    client: reqwest::Client,
    live_endpoint: String,
    test_endpoint: String,
}

impl Default for SagePayGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SagePayGateway {
    pub const LIVE_ENDPOINT: &str = "https://live.sagepay.com/gateway/service";
    pub const TEST_ENDPOINT: &str = "https://test.sagepay.com/gateway/service";

    pub fn new() -> Self {
        Self::with_endpoints(Self::LIVE_ENDPOINT, Self::TEST_ENDPOINT)
    }

    pub fn with_endpoints(live: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            live_endpoint: live.into(),
            test_endpoint: test.into(),
        }
    }

    /// `{test|live base}/{service}.vsp`
    pub fn endpoint(&self, kind: TransactionKind, test_mode: bool) -> String {
        let base = if test_mode {
            &self.test_endpoint
        } else {
            &self.live_endpoint
        };
        format!("{}/{}.vsp", base.trim_end_matches('/'), kind.service())
    }

    /// Posts the form and parses whatever body comes back.
    ///
    /// A non-2xx status is not an error as long as the body carries a
    /// `Status`, the gateway reports business failures in the body.
    pub async fn send(
        &self,
        kind: TransactionKind,
        data: &request::RequestParameters,
        test_mode: bool,
        span: &mut InteractionSpan,
    ) -> Result<response::ResponseData> {
        let url = self.endpoint(kind, test_mode);
        let secured_request = mask::secure_params(data);
        tracing::debug!(%url, data = %secured_request, "Gateway API request");
        span.set_request(url.clone(), secured_request);

        let res = self.client.post(&url).form(&data.to_form()).send().await?;
        let status = res.status();
        span.set_response_status(status.as_u16());
        let body = res.bytes().await?;

        let parsed = response::parse_bytes(&body);
        if parsed.skipped_lines() > 0 {
            tracing::warn!(
                skipped = parsed.skipped_lines(),
                "Skipped malformed lines in gateway response"
            );
        }
        let secured_response = mask::secure_response(&parsed);
        tracing::debug!(%status, data = %secured_response, "Gateway API response");
        span.set_response(secured_response);

        // Proxy error pages parse into stray pairs, only a `Status` makes a gateway answer
        if parsed.status().is_none_or(str::is_empty) {
            return Err(GatewayError::EmptyResponse {
                status: status.as_u16(),
            });
        }
        Ok(parsed)
    }

    /// Build, send, parse and classify one operation.
    pub async fn transact(
        &self,
        kind: TransactionKind,
        params: &request::TransactionParams,
        config: &config::GatewayConfig,
        span: &mut InteractionSpan,
    ) -> Result<response::Outcome> {
        let data = request::build(kind, params, config)?;
        let response = self.send(kind, &data, config.test_mode, span).await?;
        let outcome = response::interpret(&response).with_vendor_tx_code(data.get("VendorTxCode"));
        tracing::info!(
            %kind,
            status = response.status().unwrap_or_default(),
            success = outcome.is_success(),
            redirect = outcome.is_redirect(),
            "Gateway transaction finished"
        );
        Ok(outcome)
    }
}
