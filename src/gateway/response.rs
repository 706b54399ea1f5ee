//! Sage Pay response decoding.
//!
//! The gateway answers with one `key=value` pair per line. Business failures
//! such as declined cards are reported through the `Status` field, never
//! through the HTTP status code.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::gateway::reference::TransactionReference;

const SUCCESS_STATUSES: [&str; 4] = ["OK", "OK REPEATED", "REGISTERED", "AUTHENTICATED"];
const STATUS_3DAUTH: &str = "3DAUTH";
const STATUS_PPREDIRECT: &str = "PPREDIRECT";

/// Parsed response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseData {
    fields: HashMap<String, String>,
    #[serde(skip)]
    skipped_lines: usize,
}

impl ResponseData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.get("Status")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Non-blank lines dropped because they had no `=` or an empty key.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResponseData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            skipped_lines: 0,
        }
    }
}

/// Lenient line scanner. Never fails, the last duplicate key wins.
pub fn parse(body: &str) -> ResponseData {
    let mut data = ResponseData::default();
    for line in body.split(['\r', '\n']) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            data.skipped_lines += 1;
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            data.skipped_lines += 1;
            continue;
        }
        data.fields.insert(key.to_owned(), value.trim().to_owned());
    }
    data
}

/// Decodes raw bytes, invalid UTF-8 is replaced rather than rejected.
pub fn parse_bytes(body: &[u8]) -> ResponseData {
    parse(&String::from_utf8_lossy(body))
}

/// Follow-up form the customer's browser must post to finish authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub url: String,
    pub fields: BTreeMap<String, String>,
    /// Reference issued before the challenge, needed to complete it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<TransactionReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Redirect(Redirect),
    Success {
        reference: TransactionReference,
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_code: Option<String>,
        /// Card token from a token registration or a `CreateToken` payment
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    Failure {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<TransactionReference>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect(_))
    }

    pub fn reference(&self) -> Option<&TransactionReference> {
        match self {
            Self::Redirect(redirect) => redirect.reference.as_ref(),
            Self::Success { reference, .. } => Some(reference),
            Self::Failure { reference, .. } => reference.as_ref(),
        }
    }

    /// Fills a missing `VendorTxCode` from the request that produced this outcome.
    pub fn with_vendor_tx_code(self, vendor_tx_code: Option<&str>) -> Self {
        let fill = |reference: TransactionReference| reference.with_vendor_tx_code(vendor_tx_code);
        match self {
            Self::Redirect(redirect) => Self::Redirect(Redirect {
                reference: fill(redirect.reference.unwrap_or_default()).non_empty(),
                ..redirect
            }),
            Self::Success {
                reference,
                auth_code,
                token,
            } => Self::Success {
                reference: fill(reference),
                auth_code,
                token,
            },
            Self::Failure {
                status,
                detail,
                reference,
            } => Self::Failure {
                status,
                detail,
                reference: reference.map(fill),
            },
        }
    }
}

/// Classifies parsed gateway fields.
pub fn interpret(data: &ResponseData) -> Outcome {
    let status = data.status().unwrap_or_default();
    let reference = TransactionReference::from_response(data);
    let non_empty = |key: &str| data.get(key).filter(|v| !v.is_empty()).map(str::to_owned);

    match status {
        STATUS_3DAUTH => {
            let mut fields = BTreeMap::new();
            if let Some(creq) = non_empty("CReq") {
                fields.insert("creq".to_owned(), creq);
                if let Some(session) = &reference.vps_tx_id {
                    fields.insert("threeDSSessionData".to_owned(), session.clone());
                }
            } else {
                for key in ["PAReq", "MD"] {
                    if let Some(value) = non_empty(key) {
                        fields.insert(key.to_owned(), value);
                    }
                }
            }
            Outcome::Redirect(Redirect {
                url: redirect_url(data, "ACSURL"),
                fields,
                reference: reference.non_empty(),
            })
        }
        STATUS_PPREDIRECT => Outcome::Redirect(Redirect {
            url: redirect_url(data, "PayPalRedirectURL"),
            fields: BTreeMap::new(),
            reference: reference.non_empty(),
        }),
        status if SUCCESS_STATUSES.contains(&status) => Outcome::Success {
            auth_code: reference.tx_auth_no.clone(),
            token: non_empty("Token"),
            reference,
        },
        status => Outcome::Failure {
            status: status.to_owned(),
            detail: non_empty("StatusDetail"),
            reference: reference.non_empty(),
        },
    }
}

fn redirect_url(data: &ResponseData, key: &str) -> String {
    let url = data.get(key).unwrap_or_default();
    if url.is_empty() {
        tracing::warn!(field = key, "Redirect status without a redirect url");
    }
    url.to_owned()
}
