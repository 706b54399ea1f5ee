use std::time::Duration;

use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt};
use serde::Serialize;

use crate::config::AppConfig;

pub mod jwt;

const RETRY_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(3);

pub const GATEWAY_NAME: &str = "SagePay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Canceled,
}

/// Final result of a redirected payment, posted to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub status: PaymentStatus,
    /// Encoded transaction reference
    pub payment_reference: Option<String>,
    pub transaction_id: String,
    pub gateway: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn send_callback(
    config: &AppConfig,
    handler: &str,
    notification: &Notification,
) -> anyhow::Result<()> {
    deliver(config, handler, notification, RETRY_DELAY).await
}

async fn deliver(
    config: &AppConfig,
    handler: &str,
    notification: &Notification,
    retry_delay: Duration,
) -> anyhow::Result<()> {
    let Some(sign_key) = config.sign_key.as_ref() else {
        anyhow::bail!("SIGN_KEY is not configured");
    };
    let jwt = jwt::create_jwt(notification, sign_key)?;
    let mut headers = HeaderMap::new();
    headers.typed_insert(Authorization::bearer(&jwt)?);
    let url = format!("{}/callbacks/payments/{handler}", config.business_url);
    let client = reqwest::Client::new();

    for i in 0..RETRY_ATTEMPTS {
        match client
            .post(&url)
            .headers(headers.clone())
            .json(notification)
            .send()
            .await
            .and_then(|res| res.error_for_status())
        {
            Ok(_) => {
                tracing::info!(%handler, status = ?notification.status, "Delivered host notification");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(attempt = i + 1, "Failed to send callback to gateway connect: {e}");
                if i + 1 < RETRY_ATTEMPTS {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    Err(anyhow::anyhow!("max attempts exceeded"))
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header_exists, method, path},
    };

    use super::*;

    fn notification() -> Notification {
        Notification {
            status: PaymentStatus::Paid,
            payment_reference: Some(r#"{"VPSTxId":"{X}"}"#.into()),
            transaction_id: "order-1".into(),
            gateway: GATEWAY_NAME,
            message: None,
        }
    }

    #[tokio::test]
    async fn posts_signed_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callbacks/payments/h-42"))
            .and(header_exists("authorization"))
            .and(body_json(serde_json::json!({
                "status": "paid",
                "payment_reference": r#"{"VPSTxId":"{X}"}"#,
                "transaction_id": "order-1",
                "gateway": "SagePay",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        send_callback(&config, "h-42", &notification()).await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let err = deliver(&config, "h-42", &notification(), Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "max attempts exceeded");
    }

    #[tokio::test]
    async fn missing_sign_key_fails_fast() {
        let config = AppConfig {
            sign_key: None,
            ..AppConfig::for_tests("http://127.0.0.1:9")
        };
        assert!(send_callback(&config, "h", &notification()).await.is_err());
    }
}
