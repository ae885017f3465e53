use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::Token;
use crate::error::ApiError;

/// Read-only view of the incoming request handed to handlers
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Parsed request body, `{}` when the request had none
    pub body: Value,
}

/// Lets a handler add headers to the response it is producing
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseHandle {
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        if let Ok(mut headers) = self.headers.lock() {
            headers.insert(name, value);
        }
    }

    pub(crate) fn take_headers(&self) -> HeaderMap {
        self.headers
            .lock()
            .map(|mut headers| std::mem::take(&mut *headers))
            .unwrap_or_default()
    }
}

/// Write side of a streamed response.
///
/// Backed by a bounded channel: `write` waits while the transport is behind,
/// so a fast producer never queues more than the channel capacity.
#[derive(Debug, Clone)]
pub struct StreamWriter {
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
}

impl StreamWriter {
    pub(crate) fn new(tx: mpsc::Sender<Result<Bytes, std::io::Error>>) -> Self {
        Self { tx }
    }

    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), ApiError> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| ApiError::handler("Response stream closed by peer"))
    }
}

/// Passed to every handler as its final argument
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub api: String,
    pub handler: String,
    pub request: RequestInfo,
    pub response: ResponseHandle,
    /// Unsealed token, present when an authorization middleware ran
    pub token: Option<Token>,
    /// Only present for `streamResponse` handlers
    pub write_stream: Option<StreamWriter>,
}

impl InvocationContext {
    /// The stream writer, or an error for handlers not tagged for streaming
    pub fn stream(&self) -> Result<&StreamWriter, ApiError> {
        self.write_stream
            .as_ref()
            .ok_or_else(|| ApiError::handler("No write stream in context"))
    }
}
