use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use futures::{stream, FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::tags::{cache_max_age, is_truthy, roles_of};
use crate::api::{
    ApiDescriptor, ApiSurface, Handler, HandlerDescriptor, HandlerResult, InvocationContext, RequestInfo,
    ResponseHandle, StreamWriter, TagKind, TagMap,
};
use crate::auth::TokenSealer;
use crate::error::ApiError;
use crate::middleware::{AuthorizationMiddleware, Middleware, Outcome, RequestScope, RoleAuthorizationMiddleware};
use crate::types::ARGS_FIELD;

/// One handler with its composed chain, ready to serve requests
pub struct BoundRoute {
    api: String,
    handler: String,
    method: Method,
    implementation: Arc<dyn Handler>,
    tags: TagMap,
    before: Vec<Arc<dyn Middleware>>,
    after: Vec<Arc<dyn Middleware>>,
    stream_buffer: usize,
}

impl BoundRoute {
    /// Compose the chain for `handler`: authorization, role check, API then
    /// handler prepends, core dispatch, API then handler appends.
    pub fn compose(
        surface: &ApiSurface,
        api: &ApiDescriptor,
        handler: &HandlerDescriptor,
        sealer: Option<&Arc<TokenSealer>>,
        stream_buffer: usize,
    ) -> Self {
        let tags = surface.effective_tags(api, handler);
        let path = format!("/{}/{}", api.name(), handler.name());
        let method = if is_tagged(&tags, &TagKind::HttpGet) {
            Method::GET
        } else {
            Method::POST
        };

        let mut before: Vec<Arc<dyn Middleware>> = Vec::new();

        if is_tagged(&tags, &TagKind::WithAuthorization) {
            match sealer {
                Some(sealer) => {
                    tracing::info!("Adding authorization middleware to {} {}", method, path);
                    before.push(Arc::new(AuthorizationMiddleware::new(Arc::clone(sealer))));
                }
                None => {
                    tracing::warn!("{} requires authorization but no security keys are configured", path);
                }
            }
        }

        let roles = roles_of(tags.get(&TagKind::RoleAuthorization));
        if !roles.is_empty() {
            tracing::info!("Adding role authorization {:?} to {} {}", roles, method, path);
            before.push(Arc::new(RoleAuthorizationMiddleware::new(roles, sealer.cloned())));
        }

        before.extend(api.prepended().iter().cloned());
        before.extend(handler.prepended().iter().cloned());

        let mut after: Vec<Arc<dyn Middleware>> = Vec::new();
        after.extend(api.appended().iter().cloned());
        after.extend(handler.appended().iter().cloned());

        Self {
            api: api.name().to_string(),
            handler: handler.name().to_string(),
            method,
            implementation: handler.implementation(),
            tags,
            before,
            after,
            stream_buffer: stream_buffer.max(1),
        }
    }

    pub fn path(&self) -> String {
        format!("/{}/{}", self.api, self.handler)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Names of the middleware that run before dispatch, in order
    pub fn before_names(&self) -> Vec<String> {
        self.before.iter().map(|m| m.name().to_string()).collect()
    }

    pub async fn serve(self: Arc<Self>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        tracing::debug!("INCOMING {} {}", method, self.path());

        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(err) => return err.into_response(),
        };
        let mut scope = RequestScope::new(&self.api, &self.handler, method, uri, headers, body);

        match self.run(&mut scope).await {
            Ok(()) => {
                let outcome = scope.outcome.take().unwrap_or(Outcome::Empty);
                outcome.with_headers(std::mem::take(&mut scope.response_headers))
            }
            Err(err) => err.into_response(),
        }
    }

    async fn run(&self, scope: &mut RequestScope) -> Result<(), ApiError> {
        for middleware in &self.before {
            middleware.handle(scope).await?;
        }

        let outcome = self.dispatch(scope).await?;
        scope.outcome = Some(outcome);

        for middleware in &self.after {
            middleware.handle(scope).await?;
        }
        Ok(())
    }

    fn arguments(&self, body: &Value) -> Vec<Value> {
        if is_tagged(&self.tags, &TagKind::CustomRequestBody) {
            return vec![body.clone()];
        }
        body.get(ARGS_FIELD)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    async fn dispatch(&self, scope: &mut RequestScope) -> Result<Outcome, ApiError> {
        let args = self.arguments(&scope.body);
        let response = ResponseHandle::default();
        let request = RequestInfo {
            method: scope.method.clone(),
            uri: scope.uri.clone(),
            headers: scope.headers.clone(),
            body: scope.body.clone(),
        };
        let mut ctx = InvocationContext {
            api: self.api.clone(),
            handler: self.handler.clone(),
            request,
            response: response.clone(),
            token: scope.token.clone(),
            write_stream: None,
        };

        if is_tagged(&self.tags, &TagKind::StreamResponse) {
            let (tx, rx) = mpsc::channel(self.stream_buffer);
            ctx.write_stream = Some(StreamWriter::new(tx));
            return self.dispatch_stream(scope, args, ctx, response, rx).await;
        }

        let result = invoke(Arc::clone(&self.implementation), args, ctx).await?;
        scope.response_headers.extend(response.take_headers());

        if let Some(max_age) = cache_max_age(self.tags.get(&TagKind::CacheServer)) {
            let value = HeaderValue::from_str(&format!("max-age={}", max_age))
                .map_err(|_| ApiError::handler("Invalid cache policy"))?;
            scope.response_headers.insert(header::CACHE_CONTROL, value);
        }

        Ok(if is_truthy(&result) {
            Outcome::Json(result)
        } else {
            Outcome::Empty
        })
    }

    /// The handler runs in its own task and drives the channel. Headers it sets
    /// before the first write go out with the response; a failure before any
    /// write is reported like a normal handler error.
    async fn dispatch_stream(
        &self,
        scope: &mut RequestScope,
        args: Vec<Value>,
        ctx: InvocationContext,
        response: ResponseHandle,
        mut rx: mpsc::Receiver<Result<Bytes, std::io::Error>>,
    ) -> Result<Outcome, ApiError> {
        let mut task = tokio::spawn(invoke(Arc::clone(&self.implementation), args, ctx));

        let Some(first) = rx.recv().await else {
            // Every writer is gone before anything was written
            scope.response_headers.extend(response.take_headers());
            return match (&mut task).await {
                Ok(Ok(_)) => Ok(Outcome::Empty),
                Ok(Err(err)) => Err(err),
                Err(join) => {
                    tracing::error!("Stream handler task failed: {}", join);
                    Err(ApiError::handler("Handler failed"))
                }
            };
        };

        scope.response_headers.extend(response.take_headers());

        let path = self.path();
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(_)) => tracing::debug!("Stream {} finished", path),
                Ok(Err(err)) => tracing::error!("Stream {} failed after first write: {}", path, err),
                Err(join) => tracing::error!("Stream {} task failed: {}", path, join),
            }
        });

        let rest = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) });
        let body = stream::once(async move { first }).chain(rest);
        Ok(Outcome::Stream(Body::from_stream(body)))
    }
}

impl std::fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRoute")
            .field("method", &self.method)
            .field("path", &self.path())
            .field("tags", &self.tags)
            .field("before", &self.before_names())
            .field("after", &self.after.len())
            .finish()
    }
}

/// Run a handler, turning a panic into a handler error
async fn invoke(implementation: Arc<dyn Handler>, args: Vec<Value>, ctx: InvocationContext) -> HandlerResult {
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| implementation.call(args, ctx)))
        .map_err(|_| ApiError::handler("Handler panicked"))?;
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|_| ApiError::handler("Handler panicked"))?
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Request body is not valid JSON"))
}

fn is_tagged(tags: &TagMap, kind: &TagKind) -> bool {
    tags.get(kind).is_some_and(is_truthy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TagBuilder;
    use crate::middleware::from_fn;
    use crate::testing::test_sealer;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn echo(name: &str) -> HandlerDescriptor {
        HandlerDescriptor::new(name, ["x"], |args: Vec<Value>, _ctx| async move { Ok(json!(args)) })
    }

    fn bound(surface: &ApiSurface, api: &str, handler: &str, sealer: bool) -> Arc<BoundRoute> {
        let sealer = sealer.then(test_sealer);
        let (api, handler) = surface.lookup(api, handler).unwrap();
        Arc::new(BoundRoute::compose(surface, api, handler, sealer.as_ref(), 4))
    }

    #[test]
    fn chain_order_is_auth_role_api_prepend_handler_prepend() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("admin")
                .prepend_middleware(from_fn("api-pre", |_: &mut RequestScope| Ok(())))
                .handler(
                    echo("purge")
                        .role_authorization([2])
                        .prepend_middleware(from_fn("handler-pre", |_: &mut RequestScope| Ok(()))),
                ),
        );
        let route = bound(&surface, "admin", "purge", true);
        assert_eq!(
            route.before_names(),
            ["authorization", "role-authorization", "api-pre", "handler-pre"]
        );
        assert_eq!(route.method(), &Method::POST);
    }

    fn counting(name: &str, calls: &Arc<AtomicUsize>) -> HandlerDescriptor {
        let calls = Arc::clone(calls);
        HandlerDescriptor::new(name, Vec::<String>::new(), move |_args: Vec<Value>, _ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "ok": true }))
            }
        })
    }

    fn recorder(name: &'static str, seen: &Arc<Mutex<Vec<String>>>) -> impl Middleware + 'static {
        let seen = Arc::clone(seen);
        from_fn(name, move |scope: &mut RequestScope| {
            let entry = match &scope.outcome {
                Some(Outcome::Json(value)) => format!("{}:{}", name, value),
                Some(_) => format!("{}:other", name),
                None => name.to_string(),
            };
            seen.lock().unwrap().push(entry);
            Ok(())
        })
    }

    async fn post(route: Arc<BoundRoute>) -> Response {
        route
            .serve(Method::POST, Uri::from_static("/x/y"), HeaderMap::new(), Bytes::new())
            .await
    }

    #[tokio::test]
    async fn rejected_authorization_never_reaches_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("users")
                .append_middleware(recorder("post", &seen))
                .handler(counting("me", &calls).with_authorization())
                .handler(counting("admin", &calls).role_authorization([1])),
        );

        for handler in ["me", "admin"] {
            let response = post(bound(&surface, "users", handler, true)).await;
            assert_eq!(response.status(), 401);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_prepend_short_circuits_the_rest_of_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("files")
                .prepend_middleware(from_fn("gate", |_: &mut RequestScope| {
                    Err(ApiError::bad_request("closed"))
                }))
                .append_middleware(recorder("post", &seen))
                .handler(counting("list", &calls).prepend_middleware(recorder("handler-pre", &seen))),
        );

        let response = post(bound(&surface, "files", "list", false)).await;
        assert_eq!(response.status(), 400);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_middleware_runs_after_dispatch_with_the_outcome() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("files")
                .prepend_middleware(recorder("api-pre", &seen))
                .append_middleware(recorder("api-post", &seen))
                .handler(
                    counting("list", &calls)
                        .prepend_middleware(recorder("handler-pre", &seen))
                        .append_middleware(recorder("handler-post", &seen)),
                ),
        );

        let response = post(bound(&surface, "files", "list", false)).await;
        assert_eq!(response.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            [
                "api-pre",
                "handler-pre",
                r#"api-post:{"ok":true}"#,
                r#"handler-post:{"ok":true}"#,
            ]
        );
    }

    #[test]
    fn http_get_tag_selects_get() {
        let surface = ApiSurface::new().api(ApiDescriptor::new("users").handler(echo("list").http_get()));
        assert_eq!(bound(&surface, "users", "list", false).method(), &Method::GET);
    }

    #[test]
    fn authorization_is_skipped_without_security() {
        let surface = ApiSurface::new().api(ApiDescriptor::new("users").with_authorization().handler(echo("me")));
        assert!(bound(&surface, "users", "me", false).before_names().is_empty());
    }

    #[tokio::test]
    async fn without_keys_authorization_is_open_and_roles_are_refused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("users")
                .handler(counting("me", &calls).with_authorization())
                .handler(counting("admin", &calls).role_authorization([1])),
        );

        assert_eq!(post(bound(&surface, "users", "me", false)).await.status(), 200);
        assert_eq!(post(bound(&surface, "users", "admin", false)).await.status(), 401);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arguments_come_from_args_field_or_raw_body() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("users")
                .handler(echo("plain"))
                .handler(echo("raw").custom_request_body()),
        );
        let body = json!({"args": [1, "two"], "extra": true});

        let plain = bound(&surface, "users", "plain", false);
        assert_eq!(plain.arguments(&body), vec![json!(1), json!("two")]);
        assert!(plain.arguments(&json!({})).is_empty());

        let raw = bound(&surface, "users", "raw", false);
        assert_eq!(raw.arguments(&body), vec![body.clone()]);
    }

    #[test]
    fn empty_body_parses_as_empty_object() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), json!({}));
        assert!(parse_body(&Bytes::from_static(b"{nope")).is_err());
    }

    #[tokio::test]
    async fn panics_become_handler_errors() {
        async fn explode(_args: Vec<Value>, _ctx: InvocationContext) -> HandlerResult {
            panic!("kaboom")
        }

        let surface = ApiSurface::new()
            .api(ApiDescriptor::new("users").handler(HandlerDescriptor::new("boom", Vec::<String>::new(), explode)));
        let route = bound(&surface, "users", "boom", false);
        let response = route
            .serve(Method::POST, Uri::from_static("/users/boom"), HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), 500);
    }
}
