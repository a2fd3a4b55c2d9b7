//! Token signing helpers for tests.
//!
//! Production tokens are issued by the users service; these helpers only exist
//! so tests can mint tokens the gate accepts (or deliberately refuses).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

/// Sign `claims` as an HS256 token with `secret`.
#[must_use]
pub fn sign_token(claims: &Value, secret: &str) -> String {
    sign_token_with_header(&json!({ "alg": "HS256", "typ": "JWT" }), claims, secret)
}

/// Sign `claims` under an arbitrary `header`, always with HMAC-SHA256.
#[must_use]
pub fn sign_token_with_header(header: &Value, claims: &Value, secret: &str) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let signature = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(signing_input.as_bytes());
            mac.finalize().into_bytes().to_vec()
        })
        .unwrap_or_default();
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}
