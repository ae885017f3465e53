use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::api::{ApiDescriptor, ApiSurface, HandlerDescriptor, TagBuilder};
use crate::auth::{SecurityKeys, Token, TokenSealer};

static KEYS: Lazy<SecurityKeys> = Lazy::new(SecurityKeys::generate);

/// One key set shared by every unit test in the process
pub fn test_keys() -> SecurityKeys {
    KEYS.clone()
}

pub fn test_sealer() -> Arc<TokenSealer> {
    Arc::new(TokenSealer::new(test_keys()))
}

/// `Authorization: Bearer <sealed token>`
pub fn bearer_headers(sealer: &TokenSealer, token: &Token) -> HeaderMap {
    let sealed = sealer.seal(token).unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", sealed)).unwrap(),
    );
    headers
}

/// Small surface covering the common tag combinations
pub fn fixture_surface() -> ApiSurface {
    ApiSurface::new()
        .api(
            ApiDescriptor::new("users")
                .handler(HandlerDescriptor::new("echo", ["value"], |args: Vec<Value>, _ctx| async move {
                    Ok(args.into_iter().next().unwrap_or(Value::Null))
                }))
                .handler(
                    HandlerDescriptor::new("whoami", Vec::<String>::new(), |_args, ctx| async move {
                        Ok(json!({ "userId": ctx.token.map(|t| t.user_id) }))
                    })
                    .with_authorization(),
                ),
        )
        .api(
            ApiDescriptor::new("files")
                .handler(HandlerDescriptor::new("a", ["x"], |_args, _ctx| async { Ok(Value::Null) }))
                .handler(HandlerDescriptor::new("b", ["y", "z"], |_args, _ctx| async { Ok(Value::Null) }).stream_response()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn shared_keys_unseal_each_others_tokens() {
        let token = Token::issue("1", None, Duration::minutes(1));
        let sealed = test_sealer().seal(&token).unwrap();
        assert_eq!(test_sealer().unseal(&sealed).unwrap(), token);
    }

    #[test]
    fn fixture_surface_describes() {
        let listing = fixture_surface().describe("");
        assert!(listing.contains(" files"));
        assert!(listing.contains("b(y, z)"));
    }
}
