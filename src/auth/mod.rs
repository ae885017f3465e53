pub mod sealer;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::AUTH_TOKEN_FIELD;

pub use sealer::{SecurityKeys, TokenSealer};

/// Why a sealed token could not be produced or accepted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not in sealed form")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token payload could not be decrypted")]
    Decryption,

    #[error("token payload is not a valid token: {0}")]
    Payload(String),

    #[error("token expired")]
    Expired,

    #[error("token payload could not be encrypted")]
    Encryption,

    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),

    #[error("claim `{0}` collides with a token field")]
    ReservedClaim(String),
}

/// Field names of the token itself; custom claims may not reuse them
pub const RESERVED_CLAIMS: [&str; 3] = ["userId", "role", "expiry"];

/// Identity carried between login and authenticated requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<u32>,
    pub expiry: DateTime<Utc>,
    /// Additional application claims, sealed along with the rest
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl Token {
    /// A token for `user_id` that expires immediately until an expiry helper is applied
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: None,
            expiry: Utc::now(),
            claims: Map::new(),
        }
    }

    pub fn issue(user_id: impl Into<String>, role: Option<u32>, lifetime: Duration) -> Self {
        Self {
            role,
            ..Self::new(user_id)
        }
        .expires_in(lifetime)
    }

    pub fn with_role(mut self, role: u32) -> Self {
        self.role = Some(role);
        self
    }

    /// Add an application claim. Keys that name a token field are ignored.
    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if RESERVED_CLAIMS.contains(&key.as_str()) {
            tracing::warn!("Ignoring claim `{}`, it names a token field", key);
            return self;
        }
        self.claims.insert(key, value);
        self
    }

    /// First claim key that shadows a token field, if any
    pub fn reserved_claim(&self) -> Option<&str> {
        self.claims
            .keys()
            .map(String::as_str)
            .find(|key| RESERVED_CLAIMS.contains(key))
    }

    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.expiry = Utc::now() + lifetime;
        self
    }

    pub fn expires_in_minutes(self, minutes: i64) -> Self {
        self.expires_in(Duration::minutes(minutes))
    }

    pub fn expires_in_hours(self, hours: i64) -> Self {
        self.expires_in(Duration::hours(hours))
    }

    pub fn expires_in_days(self, days: i64) -> Self {
        self.expires_in(Duration::days(days))
    }

    pub fn expires_in_weeks(self, weeks: i64) -> Self {
        self.expires_in(Duration::weeks(weeks))
    }

    /// Calendar months from now, clamped to the last day of the target month
    pub fn expires_in_months(mut self, months: u32) -> Self {
        self.expiry = Utc::now()
            .checked_add_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Embed a sealed token under the fixed response field so clients can pick it up.
/// Non-object bodies are wrapped as `{"value": ..}` to make room for the field.
pub fn add_token_to_response(body: Value, sealed: &str) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    object.insert(AUTH_TOKEN_FIELD.to_string(), Value::String(sealed.to_string()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expiry_helpers_move_forward_from_now() {
        let now = Utc::now();
        assert!(Token::new("u").expires_in_minutes(5).expiry > now);
        assert!(Token::new("u").expires_in_hours(1).expiry > now + Duration::minutes(59));
        assert!(Token::new("u").expires_in_days(1).expiry > now + Duration::hours(23));
        assert!(Token::new("u").expires_in_weeks(1).expiry > now + Duration::days(6));
        assert!(Token::new("u").expires_in_months(1).expiry > now + Duration::days(27));
    }

    #[test]
    fn fresh_token_without_expiry_is_expired() {
        assert!(Token::new("u").is_expired());
        assert!(!Token::issue("u", Some(1), Duration::hours(1)).is_expired());
    }

    #[test]
    fn token_response_field_is_added() {
        let body = add_token_to_response(json!({"id": 7}), "sealed");
        assert_eq!(body, json!({"id": 7, "auth_token": "sealed"}));

        let wrapped = add_token_to_response(json!(true), "sealed");
        assert_eq!(wrapped, json!({"value": true, "auth_token": "sealed"}));
    }

    #[test]
    fn custom_claims_serialize_inline() {
        let token = Token::new("42").with_claim("tenant", json!("acme"));
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["userId"], "42");
        assert_eq!(value["tenant"], "acme");
        assert!(value.get("role").is_none());
    }

    #[test]
    fn claims_cannot_shadow_token_fields() {
        for key in RESERVED_CLAIMS {
            let token = Token::issue("17", None, Duration::hours(1)).with_claim(key, json!(5));
            assert!(token.claims.is_empty(), "claim {} was kept", key);
            assert_eq!(token.role, None);
            assert_eq!(token.reserved_claim(), None);
        }

        let mut token = Token::new("17");
        token.claims.insert("role".to_string(), json!(5));
        assert_eq!(token.reserved_claim(), Some("role"));
    }
}
