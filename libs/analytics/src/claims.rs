//! Identity claims for event attribution.
//!
//! The access token is a three-part `header.payload.signature` token. Only the
//! payload is read, and only for attribution: the signature is not checked
//! and the claims are never used to authorize anything.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;

/// URL-safe alphabet, padding optional.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Identity fields taken from the token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Session id (`sid` claim).
    pub sid: Option<String>,
    /// Subject id (`sub` claim).
    pub sub: Option<String>,
}

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("token is not three dot-separated segments")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Base64(String),

    #[error("token payload is not JSON: {0}")]
    Json(String),

    #[error("token payload is not a JSON object")]
    NotAnObject,
}

/// Result of decoding claims from a possibly-absent token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsDecode {
    /// No token was available.
    Absent,
    Decoded(IdentityClaims),
    Undecodable(ClaimsError),
}

impl ClaimsDecode {
    /// Claims to stamp on an event; empty unless decoding succeeded.
    pub fn into_claims(self) -> IdentityClaims {
        match self {
            ClaimsDecode::Decoded(claims) => claims,
            ClaimsDecode::Absent | ClaimsDecode::Undecodable(_) => IdentityClaims::default(),
        }
    }
}

/// Decode `sid` and `sub` from an access token.
///
/// Never fails: anything unexpected comes back as
/// [`ClaimsDecode::Undecodable`].
pub fn decode_claims(token: Option<&str>) -> ClaimsDecode {
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return ClaimsDecode::Absent,
    };

    match decode_payload(token) {
        Ok(claims) => ClaimsDecode::Decoded(claims),
        Err(err) => ClaimsDecode::Undecodable(err),
    }
}

fn decode_payload(token: &str) -> Result<IdentityClaims, ClaimsError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };
    if payload.is_empty() {
        return Err(ClaimsError::Malformed);
    }

    // Tolerate payloads encoded with the standard alphabet.
    let normalized = payload.replace('+', "-").replace('/', "_");
    let bytes = TOKEN_ENGINE
        .decode(normalized)
        .map_err(|e| ClaimsError::Base64(e.to_string()))?;

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))?;
    let object = value.as_object().ok_or(ClaimsError::NotAnObject)?;

    Ok(IdentityClaims {
        sid: object.get("sid").and_then(claim_string),
        sub: object.get("sub").and_then(claim_string),
    })
}

/// String and numeric claims are accepted; anything else counts as absent.
fn claim_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
