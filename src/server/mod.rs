//! Route binder: turns an `ApiSurface` into an axum router.

pub mod build;
pub mod dispatch;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{HeaderMap, HeaderValue, Method, Uri},
    routing::{on, MethodFilter},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::ApiSurface;
use crate::auth::{SecurityKeys, TokenError, TokenSealer};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::synthesis::ModelSource;
use crate::types::RESI_ROUTE;

pub use dispatch::BoundRoute;

/// Everything the binder needs, passed explicitly
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Path segment all APIs are mounted under; empty mounts at the root
    pub api_prefix: String,
    /// Authorization middleware is only attached when keys are present
    pub security: Option<SecurityKeys>,
    pub body_limit: usize,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
    pub request_logging: bool,
    pub client_builder: bool,
    /// Shared model files shipped by the client builder
    pub models: Vec<ModelSource>,
    /// Chunks a stream handler may queue before `write` waits
    pub stream_buffer: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            api_prefix: RESI_ROUTE.to_string(),
            security: None,
            body_limit: 16 * 1024 * 1024,
            cors_origins: Vec::new(),
            request_logging: true,
            client_builder: false,
            models: Vec::new(),
            stream_buffer: 16,
        }
    }
}

impl ServerOptions {
    /// Options from application config. Models are loaded separately.
    pub fn from_config(config: &AppConfig) -> Result<Self, TokenError> {
        let security = match config.security.key_material() {
            Some((private, public, secret)) => Some(SecurityKeys::from_base64(private, public, secret)?),
            None => None,
        };

        Ok(Self {
            api_prefix: config.server.api_prefix.clone(),
            security,
            body_limit: config.server.max_request_size_bytes,
            cors_origins: config.server.cors_origins.clone(),
            request_logging: config.server.enable_request_logging,
            client_builder: config.build.enable_client_builder,
            models: Vec::new(),
            stream_buffer: config.server.stream_buffer,
        })
    }

    pub fn sealer(&self) -> Option<Arc<TokenSealer>> {
        self.security.clone().map(|keys| Arc::new(TokenSealer::new(keys)))
    }
}

/// Register `/{api}/{handler}` for every handler, each with its composed chain
pub fn bind_surface(surface: &ApiSurface, options: &ServerOptions) -> Router {
    let sealer = options.sealer();
    let mut router = Router::new();

    for api in surface.apis() {
        for handler in api.handlers() {
            let route = Arc::new(BoundRoute::compose(
                surface,
                api,
                handler,
                sealer.as_ref(),
                options.stream_buffer,
            ));
            let filter = if *route.method() == Method::GET {
                MethodFilter::GET
            } else {
                MethodFilter::POST
            };
            tracing::debug!("Binding {} {}", route.method(), route.path());

            let path = route.path();
            router = router.route(
                &path,
                on(filter, move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                    let route = Arc::clone(&route);
                    async move { route.serve(method, uri, headers, body).await }
                }),
            );
        }
    }

    router
}

/// Full application router: the bound surface (plus the client builder when
/// enabled) under the API prefix, with CORS, body limit and request tracing
pub fn create_router(mut surface: ApiSurface, options: &ServerOptions) -> Router {
    if options.client_builder {
        tracing::info!("Adding handler for client builder");
        let snapshot = Arc::new(surface.clone());
        surface.insert(build::client_builder_api(snapshot, Arc::new(options.models.clone())));
    }

    let bound = bind_surface(&surface, options);
    let prefix = options.api_prefix.trim_matches('/');
    let router = if prefix.is_empty() {
        bound
    } else {
        Router::new().nest(&format!("/{}", prefix), bound)
    };

    let router = router
        .fallback(|uri: Uri| async move { ApiError::not_found(format!("No handler at {}", uri.path())) })
        .layer(DefaultBodyLimit::max(options.body_limit))
        .layer(cors_layer(&options.cors_origins));

    if options.request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Bind `0.0.0.0:{port}` and serve until the process stops
pub async fn serve(router: Router, port: u16) -> std::io::Result<()> {
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("resi server listening on http://{}", bind_addr);
    axum::serve(listener, router).await
}
