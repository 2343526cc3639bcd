//! Access token decoding.
//!
//! Tokens are three `.`-separated base64url segments. Only the payload
//! (middle) segment is read; the signature is never verified, so decoded
//! claims are a display hint and the server remains the authority on what a
//! user may do.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of segments in a well-formed token (header, payload, signature)
const TOKEN_SEGMENTS: usize = 3;

/// base64url that accepts payloads with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token must have 3 segments, found {0}")]
    Segments(usize),

    #[error("Token payload is not valid base64url: {0}")]
    Base64(String),

    #[error("Token payload is not a JSON object: {0}")]
    Json(String),
}

/// Claims carried in the access token payload.
///
/// Serialized with the same field names the token uses, which is also the
/// layout of the persisted `user_info` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedClaims {
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(rename = "exp", default)]
    pub expires_at_epoch_seconds: i64,
}

impl DecodedClaims {
    /// Expiry as a timestamp, if it is representable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at_epoch_seconds, 0)
    }
}

// Lenient view of the payload: absent or null fields fall back to defaults.
#[derive(Debug, Deserialize)]
struct RawClaims {
    user_id: Option<Value>,
    username: Option<String>,
    email: Option<String>,
    is_staff: Option<bool>,
    is_superuser: Option<bool>,
    exp: Option<Value>,
}

impl From<RawClaims> for DecodedClaims {
    fn from(raw: RawClaims) -> Self {
        let user_id = match raw.user_id {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let expires_at_epoch_seconds = match raw.exp {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            _ => 0,
        };

        Self {
            user_id,
            username: raw.username.unwrap_or_default(),
            email: raw.email.unwrap_or_default(),
            is_staff: raw.is_staff.unwrap_or(false),
            is_superuser: raw.is_superuser.unwrap_or(false),
            expires_at_epoch_seconds,
        }
    }
}

/// Decode the claims of an access token without verifying its signature.
pub fn decode(token: &str) -> Result<DecodedClaims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(DecodeError::Segments(segments.len()));
    }

    let payload = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let value: Value =
        serde_json::from_slice(&payload).map_err(|e| DecodeError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::Json(format!("expected an object, found {}", value)));
    }
    let raw: RawClaims =
        serde_json::from_value(value).map_err(|e| DecodeError::Json(e.to_string()))?;

    Ok(raw.into())
}

/// True once `now_epoch_seconds` reaches the token's expiry.
pub fn is_expired(claims: &DecodedClaims, now_epoch_seconds: i64) -> bool {
    now_epoch_seconds >= claims.expires_at_epoch_seconds
}

/// Seconds left before expiry, zero when already expired.
pub fn seconds_until_expiry(claims: &DecodedClaims, now_epoch_seconds: i64) -> i64 {
    (claims.expires_at_epoch_seconds - now_epoch_seconds).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_token;
    use serde_json::json;

    #[test]
    fn test_decode_full_payload() {
        let token = make_token(&json!({
            "user_id": 42,
            "username": "alice",
            "email": "alice@school.example",
            "is_staff": true,
            "is_superuser": false,
            "exp": 1_900_000_000,
        }));

        let claims = decode(&token).expect("token should decode");
        assert_eq!(claims.user_id.as_deref(), Some("42"));
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@school.example");
        assert!(claims.is_staff);
        assert!(!claims.is_superuser);
        assert_eq!(claims.expires_at_epoch_seconds, 1_900_000_000);
    }

    #[test]
    fn test_decode_defaults_missing_and_null_fields() {
        let token = make_token(&json!({ "user_id": "abc", "email": null }));
        let claims = decode(&token).expect("token should decode");
        assert_eq!(claims.user_id.as_deref(), Some("abc"));
        assert_eq!(claims.username, "");
        assert_eq!(claims.email, "");
        assert!(!claims.is_staff);
        assert!(!claims.is_superuser);
        assert_eq!(claims.expires_at_epoch_seconds, 0);
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"username":"bo"}"#);
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert_eq!(decode(&token).unwrap().username, "bo");
    }

    #[test]
    fn test_expiry_boundaries() {
        let exp = 1_700_000_000;
        let claims = decode(&make_token(&json!({ "exp": exp }))).unwrap();

        assert!(!is_expired(&claims, exp - 1));
        assert!(is_expired(&claims, exp));
        assert!(is_expired(&claims, exp + 1));
        assert_eq!(seconds_until_expiry(&claims, exp - 90), 90);
        assert_eq!(seconds_until_expiry(&claims, exp + 90), 0);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert_eq!(decode(""), Err(DecodeError::Segments(1)));
        assert_eq!(decode("onlyone"), Err(DecodeError::Segments(1)));
        assert_eq!(decode("a.b"), Err(DecodeError::Segments(2)));
        assert_eq!(decode("a.b.c.d"), Err(DecodeError::Segments(4)));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(decode("h.!!!not-base64!!!.s"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_non_object_payload() {
        let not_json = PAYLOAD_ENGINE.encode(b"definitely not json");
        assert!(matches!(decode(&format!("h.{}.s", not_json)), Err(DecodeError::Json(_))));

        let array = PAYLOAD_ENGINE.encode(b"[1,2,3]");
        assert!(matches!(decode(&format!("h.{}.s", array)), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_positional_array_payload() {
        // Six nulls would otherwise fill every claim field by position
        let token = make_token(&json!([null, null, null, null, null, null]));
        assert!(matches!(decode(&token), Err(DecodeError::Json(_))));

        let token = make_token(&json!("alice"));
        assert!(matches!(decode(&token), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_claims_persist_with_token_field_names() {
        let claims = DecodedClaims {
            user_id: Some("7".to_string()),
            username: "carol".to_string(),
            email: String::new(),
            is_staff: false,
            is_superuser: true,
            expires_at_epoch_seconds: 99,
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["exp"], 99);
        assert_eq!(value["is_superuser"], true);

        let back: DecodedClaims = serde_json::from_value(value).unwrap();
        assert_eq!(back, claims);
    }
}
