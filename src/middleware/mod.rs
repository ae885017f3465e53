//! Request-scoped middleware that runs around core dispatch.
//!
//! A bound route owns an ordered list of middleware before dispatch and another
//! after it. Each one sees the same `RequestScope`; the first error stops the
//! chain and goes straight to the error reporter.

pub mod auth;
pub mod response;

use std::fmt;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::Value;

use crate::auth::Token;
use crate::error::ApiError;

pub use auth::{AuthorizationMiddleware, RoleAuthorizationMiddleware};
pub use response::Outcome;

/// State owned by one request for the lifetime of its chain
#[derive(Debug)]
pub struct RequestScope {
    pub api: String,
    pub handler: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Parsed request body, `{}` when empty
    pub body: Value,
    /// Set by the authorization middleware
    pub token: Option<Token>,
    /// Extra headers for the response, written by middleware or the handler
    pub response_headers: HeaderMap,
    /// Set once core dispatch finishes; append middleware may inspect or replace it
    pub outcome: Option<Outcome>,
}

impl RequestScope {
    pub fn new(
        api: impl Into<String>,
        handler: impl Into<String>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Value,
    ) -> Self {
        Self {
            api: api.into(),
            handler: handler.into(),
            method,
            uri,
            headers,
            body,
            token: None,
            response_headers: HeaderMap::new(),
            outcome: None,
        }
    }

    pub fn path(&self) -> String {
        format!("/{}/{}", self.api, self.handler)
    }
}

/// One step of a route's chain
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "middleware"
    }

    /// Return an error to stop the chain and report it
    async fn handle(&self, scope: &mut RequestScope) -> Result<(), ApiError>;
}

/// Adapter for plain synchronous middleware closures
pub struct FnMiddleware<F> {
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut RequestScope) -> Result<(), ApiError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestScope) -> Result<(), ApiError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, scope: &mut RequestScope) -> Result<(), ApiError> {
        (self.func)(scope)
    }
}

/// Shorthand for `FnMiddleware::new`
pub fn from_fn<F>(name: impl Into<String>, func: F) -> FnMiddleware<F>
where
    F: Fn(&mut RequestScope) -> Result<(), ApiError> + Send + Sync,
{
    FnMiddleware::new(name, func)
}
