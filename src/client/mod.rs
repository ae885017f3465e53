//! Client invocation binder: calls the handlers of a `ClientSurface` over HTTP.
//!
//! Each call reads only the stub's tag map: authorization, custom headers,
//! custom request bodies, GET routing, streaming and client-side caching all
//! follow the tags shipped by the client builder.

pub mod error;
pub mod session;
pub mod storage;
pub mod surface;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response};
use serde_json::{json, Value};
use url::Url;

use crate::api::tags::cache_max_age;
use crate::api::TagKind;
use crate::types::{AUTH_TOKEN_FIELD, RESI_ROUTE};

pub use error::{ClientError, ErrorHandler};
pub use session::{HeaderInit, NoHeaders, Session, StaticHeaders};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use surface::{ClientApi, ClientHandler, ClientSurface};

#[derive(Clone)]
pub struct ClientOptions {
    /// Path segment the server mounts its APIs under
    pub api_prefix: String,
    pub token_store: Arc<dyn TokenStore>,
    pub header_init: Arc<dyn HeaderInit>,
    pub error_handler: ErrorHandler,
    pub timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_prefix: RESI_ROUTE.to_string(),
            token_store: Arc::new(MemoryTokenStore::new()),
            header_init: Arc::new(NoHeaders),
            error_handler: ErrorHandler::default(),
            timeout: None,
        }
    }
}

struct CachedResult {
    expires: Instant,
    value: Option<Value>,
}

/// A client bound to one server URL. Auth state belongs to this instance;
/// two clients never share a token.
pub struct ResiClient {
    http: reqwest::Client,
    base: Url,
    surface: Arc<ClientSurface>,
    session: Session,
    error_handler: ErrorHandler,
    cache: Mutex<HashMap<String, CachedResult>>,
}

impl ResiClient {
    pub fn connect(surface: ClientSurface, url: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let mut base = Url::parse(url)?;
        {
            let mut segments = base
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty();
            for segment in options.api_prefix.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            http = http.timeout(timeout);
        }

        Ok(Self {
            http: http.build()?,
            base,
            surface: Arc::new(surface),
            session: Session::new(options.token_store, options.header_init),
            error_handler: options.error_handler,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn surface(&self) -> &ClientSurface {
        &self.surface
    }

    /// Cached `Bearer <token>`, if any
    pub fn bearer(&self) -> Option<String> {
        self.session.bearer()
    }

    /// Call a non-stream handler. Failures go through the error handler; with
    /// the default handler they are logged and the result is `None`.
    pub async fn call(&self, api: &str, handler: &str, args: Vec<Value>) -> Result<Option<Value>, ClientError> {
        match self.try_call(api, handler, args).await {
            Ok(value) => Ok(value),
            Err(err) => self.error_handler.handle(err),
        }
    }

    /// Call a stream handler, passing each received chunk to `consumer`.
    /// Resolves to `None` once the stream ends.
    pub async fn call_stream<F>(
        &self,
        api: &str,
        handler: &str,
        args: Vec<Value>,
        consumer: F,
    ) -> Result<Option<Value>, ClientError>
    where
        F: FnMut(Bytes) + Send,
    {
        match self.try_call_stream(api, handler, args, consumer).await {
            Ok(()) => Ok(None),
            Err(err) => self.error_handler.handle(err),
        }
    }

    /// Forget the token in memory and in the token store
    pub async fn clear_credentials(&self) -> Result<(), ClientError> {
        self.cache().clear();
        self.session.clear().await
    }

    async fn try_call(&self, api: &str, name: &str, args: Vec<Value>) -> Result<Option<Value>, ClientError> {
        let handler = self.lookup(api, name)?;
        if handler.is_tagged(&TagKind::StreamResponse) {
            return Err(ClientError::StreamHandler {
                api: api.to_string(),
                handler: name.to_string(),
            });
        }

        let body = request_body(handler, args);
        let cache_ttl = cache_max_age(handler.tag(&TagKind::CacheClient)).map(Duration::from_secs);
        let cache_key = format!("{}/{}/{}", api, name, body);
        if cache_ttl.is_some() {
            if let Some(value) = self.cached(&cache_key) {
                tracing::debug!("Cache hit for {}.{}", api, name);
                return Ok(value);
            }
        }

        let response = self.send(api, handler, &body).await?;
        let bytes = response.bytes().await?;
        let value: Option<Value> = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes)?)
        };

        if let Some(sealed) = value.as_ref().and_then(|v| v.get(AUTH_TOKEN_FIELD)).and_then(Value::as_str) {
            self.session.absorb_token(sealed).await;
        }

        if let Some(ttl) = cache_ttl {
            self.cache().insert(
                cache_key,
                CachedResult {
                    expires: Instant::now() + ttl,
                    value: value.clone(),
                },
            );
        }
        Ok(value)
    }

    async fn try_call_stream<F>(&self, api: &str, name: &str, args: Vec<Value>, mut consumer: F) -> Result<(), ClientError>
    where
        F: FnMut(Bytes) + Send,
    {
        let handler = self.lookup(api, name)?;
        let body = request_body(handler, args);
        let response = self.send(api, handler, &body).await?;

        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            consumer(chunk?);
        }
        Ok(())
    }

    fn lookup(&self, api: &str, handler: &str) -> Result<&ClientHandler, ClientError> {
        self.surface
            .handler(api, handler)
            .ok_or_else(|| ClientError::UnknownHandler {
                api: api.to_string(),
                handler: handler.to_string(),
            })
    }

    async fn send(&self, api: &str, handler: &ClientHandler, body: &Value) -> Result<Response, ClientError> {
        let headers = self.request_headers(handler).await?;
        let method = if handler.is_tagged(&TagKind::HttpGet) {
            Method::GET
        } else {
            Method::POST
        };

        let url = self.endpoint(api, &handler.name)?;
        tracing::debug!("{} {}", method, url);
        let response = self
            .http
            .request(method, url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn request_headers(&self, handler: &ClientHandler) -> Result<HeaderMap, ClientError> {
        let mut headers = self.session.headers().await?;

        if handler.is_tagged(&TagKind::WithAuthorization) {
            let bearer = self.session.bearer().ok_or(ClientError::AuthenticationRequired)?;
            headers.insert(AUTHORIZATION, header_value(&bearer)?);
        }

        if let Some(custom) = handler.tag(&TagKind::CustomHeaders).and_then(Value::as_object) {
            for (name, value) in custom {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
                let value = match value {
                    Value::String(s) => header_value(s)?,
                    other => header_value(&other.to_string())?,
                };
                headers.insert(name, value);
            }
        }

        Ok(headers)
    }

    fn endpoint(&self, api: &str, handler: &str) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(api)
            .push(handler);
        Ok(url)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CachedResult>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self, key: &str) -> Option<Option<Value>> {
        let mut cache = self.cache();
        let entry = cache.get(key)?;
        if entry.expires > Instant::now() {
            return Some(entry.value.clone());
        }
        cache.remove(key);
        None
    }
}

/// `{"args": [...]}`, or the first argument verbatim for `customRequestBody`
fn request_body(handler: &ClientHandler, args: Vec<Value>) -> Value {
    if handler.is_tagged(&TagKind::CustomRequestBody) {
        args.into_iter().next().unwrap_or(Value::Null)
    } else {
        json!({ "args": args })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(value.to_string()))
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or(text);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TagMap;

    fn stub(tags: TagMap) -> ClientHandler {
        ClientHandler {
            name: "h".into(),
            params: vec!["a".into()],
            tags,
        }
    }

    #[test]
    fn body_wraps_args_unless_custom() {
        let plain = stub(TagMap::new());
        assert_eq!(request_body(&plain, vec![json!(1), json!(2)]), json!({"args": [1, 2]}));

        let custom = stub(TagMap::from([(TagKind::CustomRequestBody, json!(true))]));
        assert_eq!(request_body(&custom, vec![json!({"raw": 1}), json!(2)]), json!({"raw": 1}));
    }

    #[test]
    fn endpoint_includes_prefix() {
        let client = ResiClient::connect(ClientSurface::default(), "http://localhost:3000/", ClientOptions::default())
            .unwrap();
        assert_eq!(
            client.endpoint("users", "login").unwrap().as_str(),
            "http://localhost:3000/resi/users/login"
        );

        let options = ClientOptions {
            api_prefix: String::new(),
            ..Default::default()
        };
        let bare = ResiClient::connect(ClientSurface::default(), "http://localhost:3000", options).unwrap();
        assert_eq!(bare.endpoint("a", "b").unwrap().as_str(), "http://localhost:3000/a/b");
    }

    #[tokio::test]
    async fn authorization_is_required_before_any_request() {
        let surface = ClientSurface::from_modules([crate::synthesis::stub::StubModule {
            api_name: "users".into(),
            models: Vec::new(),
            stubs: vec![crate::synthesis::stub::Stub {
                name: "whoami".into(),
                params: Vec::new(),
            }],
            plugs_map: [("whoami".to_string(), TagMap::from([(TagKind::WithAuthorization, json!(true))]))]
                .into_iter()
                .collect(),
        }]);
        let options = ClientOptions {
            error_handler: ErrorHandler::Propagate,
            ..Default::default()
        };
        // Nothing listens on port 9; reaching the network would be a transport error
        let client = ResiClient::connect(surface, "http://127.0.0.1:9", options).unwrap();
        let err = client.call("users", "whoami", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn unknown_handler_goes_through_error_handler() {
        let client =
            ResiClient::connect(ClientSurface::default(), "http://127.0.0.1:9", ClientOptions::default()).unwrap();
        assert!(client.call("nope", "nope", Vec::new()).await.unwrap().is_none());
    }
}
