use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::auth::{Token, TokenSealer};
use crate::error::ApiError;
use crate::middleware::{Middleware, RequestScope};

/// Verifies the bearer token and attaches it to the request scope
#[derive(Debug, Clone)]
pub struct AuthorizationMiddleware {
    sealer: Arc<TokenSealer>,
}

impl AuthorizationMiddleware {
    pub fn new(sealer: Arc<TokenSealer>) -> Self {
        Self { sealer }
    }
}

#[async_trait]
impl Middleware for AuthorizationMiddleware {
    fn name(&self) -> &str {
        "authorization"
    }

    async fn handle(&self, scope: &mut RequestScope) -> Result<(), ApiError> {
        let token = verify_bearer(&self.sealer, &scope.headers)?;
        tracing::debug!("Authorized user {} for {}", token.user_id, scope.path());
        scope.token = Some(token);
        Ok(())
    }
}

/// Rejects tokens whose role is not in the allowed set
#[derive(Debug, Clone)]
pub struct RoleAuthorizationMiddleware {
    roles: BTreeSet<u32>,
    sealer: Option<Arc<TokenSealer>>,
}

impl RoleAuthorizationMiddleware {
    /// `sealer` lets this middleware verify the token itself when no
    /// authorization middleware ran before it
    pub fn new(roles: BTreeSet<u32>, sealer: Option<Arc<TokenSealer>>) -> Self {
        Self { roles, sealer }
    }
}

#[async_trait]
impl Middleware for RoleAuthorizationMiddleware {
    fn name(&self) -> &str {
        "role-authorization"
    }

    async fn handle(&self, scope: &mut RequestScope) -> Result<(), ApiError> {
        if scope.token.is_none() {
            let sealer = self
                .sealer
                .as_ref()
                .ok_or_else(|| ApiError::authentication_missing("No authorization token"))?;
            scope.token = Some(verify_bearer(sealer, &scope.headers)?);
        }

        match scope.token.as_ref().and_then(|token| token.role) {
            Some(role) if self.roles.contains(&role) => Ok(()),
            Some(_) => Err(ApiError::role_denied("Role not authorized")),
            None => Err(ApiError::role_denied("Token has no role")),
        }
    }
}

fn verify_bearer(sealer: &TokenSealer, headers: &HeaderMap) -> Result<Token, ApiError> {
    let sealed = extract_bearer(headers)?;
    Ok(sealer.unseal(sealed)?)
}

/// The sealed token from `Authorization: Bearer <token>`
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::authentication_missing("No authorization header"))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::AuthenticationInvalid("Invalid authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(ApiError::authentication_missing("Empty authorization token"));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bearer_headers, test_sealer};
    use axum::http::{Method, Uri};
    use chrono::Duration;
    use serde_json::Value;

    fn scope(headers: HeaderMap) -> RequestScope {
        RequestScope::new("admin", "purge", Method::POST, Uri::from_static("/admin/purge"), headers, Value::Null)
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let middleware = AuthorizationMiddleware::new(test_sealer());
        let err = middleware.handle(&mut scope(HeaderMap::new())).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationMissing(_)));
    }

    #[tokio::test]
    async fn valid_token_is_attached() {
        let sealer = test_sealer();
        let token = Token::issue("9", Some(1), Duration::minutes(5));
        let mut scope = scope(bearer_headers(&sealer, &token));

        AuthorizationMiddleware::new(sealer).handle(&mut scope).await.unwrap();
        assert_eq!(scope.token, Some(token));
    }

    #[tokio::test]
    async fn expired_token_reports_expiry() {
        let sealer = test_sealer();
        let token = Token::issue("9", None, Duration::minutes(-1));
        let mut scope = scope(bearer_headers(&sealer, &token));

        let err = AuthorizationMiddleware::new(sealer).handle(&mut scope).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationExpired(_)));
    }

    #[tokio::test]
    async fn role_outside_set_is_denied() {
        let sealer = test_sealer();
        let middleware = RoleAuthorizationMiddleware::new(BTreeSet::from([2, 3]), Some(sealer.clone()));

        let denied = Token::issue("9", Some(1), Duration::minutes(5));
        let err = middleware
            .handle(&mut scope(bearer_headers(&sealer, &denied)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthorizationRoleDenied(_)));

        for role in [2, 3] {
            let allowed = Token::issue("9", Some(role), Duration::minutes(5));
            middleware
                .handle(&mut scope(bearer_headers(&sealer, &allowed)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn role_check_without_any_sealer_is_missing_auth() {
        let middleware = RoleAuthorizationMiddleware::new(BTreeSet::from([1]), None);
        let err = middleware.handle(&mut scope(HeaderMap::new())).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationMissing(_)));
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "abc.def".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def");

        headers.insert(AUTHORIZATION, "Bearer   abc.def ".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def");
    }
}
