use serde::Serialize;

use crate::gateway::{request::RequestParameters, response::ResponseData};

pub struct Masked;

pub trait MaskPolicy {
    fn mask(card: &str) -> String;
}

impl MaskPolicy for Masked {
    fn mask(card: &str) -> String {
        let len = card.chars().count();
        if len > 4 {
            let tail: String = card.chars().skip(len - 4).collect();
            "*".repeat(len - 4) + &tail
        } else {
            card.to_string()
        }
    }
}

/// Return true if a key name likely holds a PAN/card number.
fn is_pan_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k == "pan"
        || k == "number"
        || k.contains("cardnumber")
        || k.contains("card_number")
        || k.contains("card") && k.contains("num")
}

/// Return true if a key name likely holds a CVV/CVC.
fn is_cvv_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("cvv") || k == "cv2" || k.contains("cvc") || k.contains("card_verification")
}

/// Masked copy of a single value, keyed by its field name.
pub fn secure_field(key: &str, value: &str) -> String {
    if is_pan_key(key) {
        Masked::mask(value)
    } else if is_cvv_key(key) && !value.is_empty() {
        "***".to_string()
    } else {
        value.to_string()
    }
}

/// Outbound form fields as a JSON object safe for logs.
pub fn secure_params(params: &RequestParameters) -> serde_json::Value {
    let map = params
        .to_form()
        .into_iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(secure_field(k, v))))
        .collect();
    serde_json::Value::Object(map)
}

/// Parsed gateway response as a JSON object safe for logs.
pub fn secure_response(data: &ResponseData) -> serde_json::Value {
    let map = data
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(secure_field(k, v))))
        .collect();
    serde_json::Value::Object(map)
}

pub fn secure_serializable(v: impl Serialize) -> serde_json::Value {
    let value = serde_json::to_value(v).unwrap_or_default();
    secure_value(&value)
}

pub fn secure_value(v: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match v {
        Value::Object(map) => {
            let new = map
                .iter()
                .map(|(k, val)| {
                    let new_val = match val {
                        Value::String(s) => Value::String(secure_field(k, s)),
                        Value::Number(n) if is_pan_key(k) || is_cvv_key(k) => {
                            Value::String(secure_field(k, &n.to_string()))
                        }
                        _ => secure_value(val),
                    };
                    (k.clone(), new_val)
                })
                .collect();
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(secure_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::response::parse;

    #[test]
    fn masks_card_fields_by_name() {
        assert_eq!(secure_field("CardNumber", "4929000000006"), "*********0006");
        assert_eq!(secure_field("CV2", "123"), "***");
        assert_eq!(secure_field("CV2", ""), "");
        assert_eq!(secure_field("Amount", "10.00"), "10.00");
        assert_eq!(secure_field("VPSTxId", "{ABC}"), "{ABC}");
    }

    #[test]
    fn masks_outbound_form() {
        let mut params = RequestParameters::default();
        params.set("CardNumber", "5404000000000001");
        params.set("CV2", "999");
        params.set_opt::<&str>("BillingAddress2", None);
        let secured = secure_params(&params);
        assert_eq!(secured["CardNumber"], "************0001");
        assert_eq!(secured["CV2"], "***");
        assert_eq!(secured["BillingAddress2"], "");
    }

    #[test]
    fn masks_nested_json() {
        let value = serde_json::json!({
            "payment": {
                "card": { "number": "4929000000006", "cvv": 123, "holder": "Ada" },
            },
            "items": [{ "pan": "4929000000006" }],
        });
        let secured = secure_value(&value);
        assert_eq!(secured["payment"]["card"]["number"], "*********0006");
        assert_eq!(secured["payment"]["card"]["cvv"], "***");
        assert_eq!(secured["payment"]["card"]["holder"], "Ada");
        assert_eq!(secured["items"][0]["pan"], "*********0006");
    }

    #[test]
    fn response_fields_are_kept() {
        let secured = secure_response(&parse("Status=OK\nStatusDetail=fine\n"));
        assert_eq!(secured["Status"], "OK");
        assert_eq!(secured["StatusDetail"], "fine");
    }
}
