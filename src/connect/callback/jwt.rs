use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

impl Header {
    fn sha512() -> Self {
        Self {
            alg: "HS512",
            typ: "JWT",
        }
    }
}

#[derive(Serialize)]
struct Claims<'a, T> {
    #[serde(flatten)]
    payload: &'a T,
    iat: i64,
}

/// Compact HS512 token carrying the payload plus an `iat` claim.
pub fn create_jwt(payload: &impl Serialize, sign_key: &[u8; 32]) -> anyhow::Result<String> {
    let claims = Claims {
        payload,
        iat: time::OffsetDateTime::now_utc().unix_timestamp(),
    };
    encode(&claims, sign_key)
}

fn encode(claims: &impl Serialize, sign_key: &[u8]) -> anyhow::Result<String> {
    let mut token = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Header::sha512())?);
    token.push('.');
    token.push_str(&BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?));
    let signature = sign(token.as_bytes(), sign_key)?;
    token.push('.');
    token.push_str(&BASE64_URL_SAFE_NO_PAD.encode(signature));
    Ok(token)
}

fn sign(message: &[u8], sign_key: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = HmacSha512::new_from_slice(sign_key)
        .map_err(|e| anyhow::anyhow!("invalid signing key: {e}"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}
