use crate::{
    connect::{
        self,
        api::{RedirectRequest, RedirectRequestType, TransactionResponse},
        callback::{GATEWAY_NAME, Notification, PaymentStatus},
    },
    gateway::{
        reference::TransactionReference,
        response::{Outcome, Redirect},
    },
};

fn encoded(reference: &TransactionReference) -> Option<String> {
    reference
        .encode()
        .inspect_err(|e| tracing::error!("Failed to encode transaction reference: {e}"))
        .ok()
}

impl From<&Outcome> for connect::Status {
    fn from(value: &Outcome) -> Self {
        match value {
            Outcome::Redirect(_) => Self::Pending,
            Outcome::Success { .. } => Self::Approved,
            Outcome::Failure { .. } => Self::Declined,
        }
    }
}

impl From<Redirect> for RedirectRequest {
    fn from(Redirect { url, fields, .. }: Redirect) -> Self {
        // PayPal redirects carry no form
        let kind = if fields.is_empty() {
            RedirectRequestType::Get
        } else {
            RedirectRequestType::Post
        };
        Self {
            url,
            kind,
            params: fields,
        }
    }
}

impl From<Outcome> for TransactionResponse {
    fn from(value: Outcome) -> Self {
        let status = connect::Status::from(&value);
        let transaction_reference = value.reference().and_then(encoded);
        let mut response = Self {
            status,
            redirect_request: None,
            transaction_reference,
            auth_code: None,
            token: None,
            status_code: None,
            details: None,
        };
        match value {
            Outcome::Redirect(redirect) => response.redirect_request = Some(redirect.into()),
            Outcome::Success {
                auth_code, token, ..
            } => {
                response.auth_code = auth_code;
                response.token = token;
            }
            Outcome::Failure { status, detail, .. } => {
                response.status_code = Some(status);
                response.details = detail;
            }
        }
        response
    }
}

impl Notification {
    /// Host notification for a completed challenge.
    pub fn from_outcome(transaction_id: &str, outcome: &Outcome) -> Self {
        let (status, message) = match outcome {
            Outcome::Success { .. } => (PaymentStatus::Paid, None),
            Outcome::Failure { status, detail, .. } => (
                PaymentStatus::Canceled,
                Some(detail.clone().unwrap_or_else(|| status.clone())),
            ),
            Outcome::Redirect(_) => (
                PaymentStatus::Canceled,
                Some("unexpected redirect after authentication".to_owned()),
            ),
        };
        Self {
            status,
            payment_reference: outcome.reference().and_then(encoded),
            transaction_id: transaction_id.to_owned(),
            gateway: GATEWAY_NAME,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn reference() -> TransactionReference {
        TransactionReference {
            vps_tx_id: Some("{X}".into()),
            vendor_tx_code: Some("order-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn success_response() {
        let response = TransactionResponse::from(Outcome::Success {
            reference: reference(),
            auth_code: Some("77".into()),
            token: Some("{TOKEN}".into()),
        });
        assert_eq!(response.status, connect::Status::Approved);
        assert_eq!(
            response.transaction_reference.as_deref(),
            Some(r#"{"VPSTxId":"{X}","VendorTxCode":"order-1"}"#)
        );
        assert_eq!(response.auth_code.as_deref(), Some("77"));
        assert_eq!(response.token.as_deref(), Some("{TOKEN}"));
        assert!(response.redirect_request.is_none());
    }

    #[test]
    fn redirect_response() {
        let paypal = TransactionResponse::from(Outcome::Redirect(Redirect {
            url: "https://paypal.example".into(),
            fields: BTreeMap::new(),
            reference: None,
        }));
        assert_eq!(paypal.status, connect::Status::Pending);
        let redirect = paypal.redirect_request.unwrap();
        assert_eq!(redirect.kind, RedirectRequestType::Get);
        assert_eq!(paypal.transaction_reference, None);

        let challenge = TransactionResponse::from(Outcome::Redirect(Redirect {
            url: "https://acs.example".into(),
            fields: BTreeMap::from([("PAReq".to_owned(), "pa".to_owned())]),
            reference: Some(reference()),
        }));
        let redirect = challenge.redirect_request.unwrap();
        assert_eq!(redirect.kind, RedirectRequestType::Post);
        assert_eq!(redirect.params["PAReq"], "pa");
    }

    #[test]
    fn notification_from_outcome() {
        let paid = Notification::from_outcome(
            "order-1",
            &Outcome::Success {
                reference: reference(),
                auth_code: None,
                token: None,
            },
        );
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.message, None);
        assert_eq!(paid.gateway, "SagePay");

        let canceled = Notification::from_outcome(
            "order-1",
            &Outcome::Failure {
                status: "REJECTED".into(),
                detail: None,
                reference: None,
            },
        );
        assert_eq!(canceled.status, PaymentStatus::Canceled);
        assert_eq!(canceled.message.as_deref(), Some("REJECTED"));
        assert_eq!(canceled.payment_reference, None);
    }
}
