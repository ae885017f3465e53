//! Example surface served by `resi-server`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use chrono::Duration;
use serde_json::{json, Value};

use crate::api::{ApiDescriptor, ApiSurface, HandlerDescriptor, TagBuilder};
use crate::auth::{add_token_to_response, Token, TokenSealer};
use crate::error::ApiError;
use crate::middleware::{from_fn, RequestScope};

pub const ADMIN_ROLE: u32 = 1;
pub const MEMBER_ROLE: u32 = 2;

/// `users`, `admin`, `files` and `meta` APIs. Without a sealer `login`
/// fails and authenticated handlers answer 401.
pub fn demo_surface(sealer: Option<Arc<TokenSealer>>, token_hours: i64) -> ApiSurface {
    ApiSurface::new()
        .api(users_api(sealer, token_hours))
        .api(admin_api())
        .api(files_api())
        .api(meta_api())
}

fn users_api(sealer: Option<Arc<TokenSealer>>, token_hours: i64) -> ApiDescriptor {
    ApiDescriptor::new("users")
        .handler(HandlerDescriptor::new("login", ["userId", "role"], move |args: Vec<Value>, _ctx| {
            let sealer = sealer.clone();
            async move {
                let sealer = sealer.ok_or_else(|| ApiError::handler_with_status(503, "Authorization is not configured"))?;
                let user_id = match args.first() {
                    Some(Value::String(id)) if !id.is_empty() => id.clone(),
                    Some(Value::Number(id)) => id.to_string(),
                    _ => return Err(ApiError::bad_request("userId is required")),
                };
                let role = args
                    .get(1)
                    .and_then(Value::as_u64)
                    .and_then(|r| u32::try_from(r).ok())
                    .unwrap_or(MEMBER_ROLE);

                let token = Token::issue(user_id.clone(), Some(role), Duration::hours(token_hours));
                let sealed = sealer.seal(&token)?;
                tracing::info!("Issued token for user {} with role {}", user_id, role);
                Ok(add_token_to_response(json!({ "userId": user_id, "role": role }), &sealed))
            }
        }))
        .handler(
            HandlerDescriptor::new("whoami", Vec::<String>::new(), |_args, ctx| async move {
                let token = ctx
                    .token
                    .ok_or_else(|| ApiError::authentication_missing("No authorization token"))?;
                Ok(json!({ "userId": token.user_id, "role": token.role }))
            })
            .with_authorization(),
        )
}

fn admin_api() -> ApiDescriptor {
    let calls = Arc::new(AtomicU64::new(0));

    ApiDescriptor::new("admin")
        .role_authorization([ADMIN_ROLE])
        .append_middleware(from_fn("audit", |scope: &mut RequestScope| {
            let user = scope.token.as_ref().map(|t| t.user_id.as_str()).unwrap_or("-");
            tracing::info!("admin call {} by {}", scope.path(), user);
            Ok(())
        }))
        .handler(HandlerDescriptor::new("stats", Vec::<String>::new(), move |_args, _ctx| {
            let calls = Arc::clone(&calls);
            async move { Ok(json!({ "calls": calls.fetch_add(1, Ordering::SeqCst) + 1 })) }
        }))
}

fn files_api() -> ApiDescriptor {
    ApiDescriptor::new("files")
        .handler(
            HandlerDescriptor::new("count", ["n"], |args: Vec<Value>, ctx| async move {
                let n = args.first().and_then(Value::as_u64).unwrap_or(0);
                let stream = ctx.stream()?;
                for i in 0..n {
                    stream.write(format!("{}\n", i)).await?;
                }
                Ok(Value::Null)
            })
            .stream_response(),
        )
        .handler(
            HandlerDescriptor::new("upload", ["body"], |_args, ctx| async move {
                let size = serde_json::to_vec(&ctx.request.body).map(|b| b.len()).unwrap_or(0);
                Ok(json!({ "received": ctx.request.body, "size": size }))
            })
            .custom_request_body(),
        )
}

fn meta_api() -> ApiDescriptor {
    let pings = Arc::new(AtomicU64::new(0));

    ApiDescriptor::new("meta")
        .handler(
            HandlerDescriptor::new("ping", Vec::<String>::new(), move |_args, ctx| {
                let pings = Arc::clone(&pings);
                async move {
                    ctx.response
                        .set_header(HeaderName::from_static("x-resi-served-by"), HeaderValue::from_static("demo"));
                    Ok(json!({ "pong": pings.fetch_add(1, Ordering::SeqCst) + 1 }))
                }
            })
            .http_get()
            .cache_server(60)
            .cache_client(30),
        )
        .handler(
            HandlerDescriptor::new("client", Vec::<String>::new(), |_args, ctx| async move {
                let app = ctx
                    .request
                    .headers
                    .get("x-resi-client")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                Ok(json!({ "client": app }))
            })
            .custom_headers(json!({ "x-resi-client": "demo" })),
        )
        .handler(HandlerDescriptor::new("nothing", Vec::<String>::new(), |_args, _ctx| async {
            Ok(Value::Null)
        }))
}
