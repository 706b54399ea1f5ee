use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::gateway::{GatewayError, Result, response::ResponseData};

/// Identifies an earlier transaction for capture, void, refund and repeat
/// requests.
///
/// Crosses the host boundary as a JSON object with the optional keys
/// `SecurityKey`, `TxAuthNo`, `VPSTxId` and `VendorTxCode`. Absent parts stay
/// absent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReference {
    #[serde(
        rename = "SecurityKey",
        default,
        deserialize_with = "text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub security_key: Option<String>,
    #[serde(
        rename = "TxAuthNo",
        default,
        deserialize_with = "text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tx_auth_no: Option<String>,
    #[serde(
        rename = "VPSTxId",
        default,
        deserialize_with = "text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub vps_tx_id: Option<String>,
    #[serde(
        rename = "VendorTxCode",
        default,
        deserialize_with = "text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub vendor_tx_code: Option<String>,
}

impl TransactionReference {
    /// Collects the reference parts the gateway returned.
    pub fn from_response(data: &ResponseData) -> Self {
        let part = |key: &str| data.get(key).filter(|v| !v.is_empty()).map(str::to_owned);
        Self {
            security_key: part("SecurityKey"),
            tx_auth_no: part("TxAuthNo"),
            vps_tx_id: part("VPSTxId"),
            vendor_tx_code: part("VendorTxCode"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.security_key.is_none()
            && self.tx_auth_no.is_none()
            && self.vps_tx_id.is_none()
            && self.vendor_tx_code.is_none()
    }

    /// `None` when no part is known.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    pub fn with_vendor_tx_code(mut self, vendor_tx_code: Option<&str>) -> Self {
        if self.vendor_tx_code.is_none() {
            self.vendor_tx_code = vendor_tx_code.filter(|v| !v.is_empty()).map(str::to_owned);
        }
        self
    }

    /// JSON wire form.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Reads the host supplied reference.
    ///
    /// JSON objects must be well formed, numeric parts are taken as their
    /// decimal text. Any other non-empty string is an opaque gateway
    /// transaction id and becomes `VPSTxId`.
    pub fn decode(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(GatewayError::invalid("transaction reference is empty"));
        }
        if !value.starts_with('{') {
            return Ok(Self {
                vps_tx_id: Some(value.to_owned()),
                ..Default::default()
            });
        }
        serde_json::from_str(value)
            .map_err(|e| GatewayError::invalid(format!("malformed transaction reference: {e}")))
    }
}

impl Display for TransactionReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode().map_err(|_| std::fmt::Error)?)
    }
}

impl FromStr for TransactionReference {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Part {
    Text(String),
    Number(serde_json::Number),
}

/// Hosts that stored `TxAuthNo` as an integer send it back unquoted.
fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Part>::deserialize(deserializer)?.map(|part| match part {
        Part::Text(text) => text,
        Part::Number(number) => number.to_string(),
    }))
}

/// `deserialize_with` helper for references carried as a JSON encoded string.
pub fn deserialize_encoded<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<TransactionReference>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    TransactionReference::decode(&raw)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::response::parse;

    #[test]
    fn round_trip_keeps_absent_parts_absent() {
        let reference = TransactionReference {
            vps_tx_id: Some("{ABC-123}".into()),
            security_key: Some("KEY".into()),
            ..Default::default()
        };
        let encoded = reference.encode().unwrap();
        assert_eq!(encoded, r#"{"SecurityKey":"KEY","VPSTxId":"{ABC-123}"}"#);
        let decoded = TransactionReference::decode(&encoded).unwrap();
        assert_eq!(decoded, reference);
        assert_eq!(decoded.tx_auth_no, None);
        assert_eq!(decoded.vendor_tx_code, None);
    }

    #[test]
    fn full_reference_round_trip() {
        let reference = TransactionReference {
            security_key: Some("KEY".into()),
            tx_auth_no: Some("9001".into()),
            vps_tx_id: Some("{X}".into()),
            vendor_tx_code: Some("order-1".into()),
        };
        assert_eq!(reference.to_string().parse::<TransactionReference>().unwrap(), reference);
    }

    #[test]
    fn opaque_reference_is_a_gateway_id() {
        let reference = TransactionReference::decode("{not-json").unwrap_err();
        assert!(matches!(reference, GatewayError::InvalidRequest(_)));

        let reference = TransactionReference::decode("ABCDEF-1234").unwrap();
        assert_eq!(reference.vps_tx_id.as_deref(), Some("ABCDEF-1234"));
        assert_eq!(reference.security_key, None);
    }

    #[test]
    fn numeric_parts_are_read_as_text() {
        let reference = TransactionReference::decode(r#"{"TxAuthNo":123,"VPSTxId":"{X}"}"#).unwrap();
        assert_eq!(reference.tx_auth_no.as_deref(), Some("123"));
        assert_eq!(reference.vps_tx_id.as_deref(), Some("{X}"));

        let reference = TransactionReference::decode(r#"{"SecurityKey":null}"#).unwrap();
        assert_eq!(reference, TransactionReference::default());

        assert!(matches!(
            TransactionReference::decode(r#"{"TxAuthNo":[1]}"#),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_reference_is_invalid() {
        assert!(matches!(
            TransactionReference::decode("  "),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn from_response_skips_missing_and_blank_parts() {
        let data = parse("Status=OK\r\nVPSTxId={X}\r\nSecurityKey=\r\n");
        let reference = TransactionReference::from_response(&data);
        assert_eq!(reference.vps_tx_id.as_deref(), Some("{X}"));
        assert_eq!(reference.security_key, None);
        assert!(TransactionReference::default().non_empty().is_none());
    }

    #[test]
    fn encoded_reference_inside_host_json() {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default, deserialize_with = "deserialize_encoded")]
            reference: Option<TransactionReference>,
        }
        let payload: Payload = serde_json::from_value(serde_json::json!({
            "reference": r#"{"VPSTxId":"{X}","TxAuthNo":"77"}"#,
        }))
        .unwrap();
        let reference = payload.reference.unwrap();
        assert_eq!(reference.tx_auth_no.as_deref(), Some("77"));

        let payload: Payload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(payload.reference.is_none());
    }
}
