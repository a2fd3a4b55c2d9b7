//! HS256 session token verification.
//!
//! Tokens are compact JWS: `base64url(header).base64url(claims).base64url(signature)`.
//! Only HMAC-SHA256 is accepted. The signature check uses the MAC's constant-time
//! comparison.

use crate::error::InvalidReason;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use helpdesk_relay_core::principal::UserPrincipal;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm accepted in the token header.
pub const ALGORITHM: &str = "HS256";

/// Claims of a verified token.
pub type Claims = Map<String, Value>;

/// Verify `token` with `secret` at unix time `now` and return its claims.
///
/// `exp` and `nbf` are optional; when present they are checked with `leeway`.
///
/// # Errors
///
/// Returns the [`InvalidReason`] of the first check that fails, in this order:
/// structure, algorithm, signature, then time claims.
pub fn verify(token: &str, secret: &[u8], leeway: Duration, now: i64) -> Result<Claims, InvalidReason> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(InvalidReason::Malformed);
    };

    let header = decode_object(header)?;
    match header.get("alg").and_then(Value::as_str) {
        Some(ALGORITHM) => {}
        Some(other) => return Err(InvalidReason::UnsupportedAlgorithm(other.to_string())),
        None => return Err(InvalidReason::Malformed),
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| InvalidReason::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| InvalidReason::MissingKey)?;
    mac.update(token[..header_and_payload_len(token)].as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| InvalidReason::BadSignature)?;

    let claims = decode_object(payload)?;
    check_time(&claims, leeway, now)?;
    Ok(claims)
}

/// Build a [`UserPrincipal`] from verified claims.
///
/// The identifier is read from `id`, then `uid`, then `_id` (string or number);
/// the role from `rol` (required); the company from `empresaId` (optional, `null`
/// allowed); the global admin flag from `esAdminGeneral`. Tokens issued with the
/// user nested under `usuario` are read the same way.
///
/// # Errors
///
/// Returns [`InvalidReason::MissingClaim`] when the identifier or role is absent.
pub fn user_from_claims(claims: &Claims) -> Result<UserPrincipal, InvalidReason> {
    let user_id = ["id", "uid", "_id"]
        .iter()
        .find_map(|name| claim(claims, name).and_then(identifier))
        .ok_or(InvalidReason::MissingClaim("id"))?;

    let role = claim(claims, "rol")
        .and_then(Value::as_str)
        .filter(|role| !role.trim().is_empty())
        .ok_or(InvalidReason::MissingClaim("rol"))?
        .to_string();

    let company_id = claim(claims, "empresaId").and_then(identifier);
    let is_global_admin = claim(claims, "esAdminGeneral")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(UserPrincipal {
        user_id,
        role,
        company_id,
        is_global_admin,
    })
}

fn header_and_payload_len(token: &str) -> usize {
    token.rfind('.').unwrap_or(token.len())
}

fn decode_object(segment: &str) -> Result<Map<String, Value>, InvalidReason> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| InvalidReason::Malformed)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(InvalidReason::Malformed),
    }
}

fn check_time(claims: &Claims, leeway: Duration, now: i64) -> Result<(), InvalidReason> {
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);

    if let Some(exp) = claims.get("exp") {
        let exp = seconds(exp).ok_or(InvalidReason::MissingClaim("exp"))?;
        if now > exp.saturating_add(leeway) {
            return Err(InvalidReason::Expired);
        }
    }
    if let Some(nbf) = claims.get("nbf") {
        let nbf = seconds(nbf).ok_or(InvalidReason::MissingClaim("nbf"))?;
        if now.saturating_add(leeway) < nbf {
            return Err(InvalidReason::NotYetValid);
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // NumericDate may carry a fraction
fn seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs.floor() as i64))
}

fn claim<'a>(claims: &'a Claims, name: &str) -> Option<&'a Value> {
    claims
        .get(name)
        .filter(|value| !value.is_null())
        .or_else(|| claims.get("usuario")?.get(name).filter(|value| !value.is_null()))
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
