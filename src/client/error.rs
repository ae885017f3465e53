use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::synthesis::SynthesisError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("must authenticate first")]
    AuthenticationRequired,

    #[error("unknown handler {api}.{handler}")]
    UnknownHandler { api: String, handler: String },

    #[error("{api}.{handler} is a stream handler, call it with a chunk consumer")]
    StreamHandler { api: String, handler: String },

    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("token store error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("cannot load client surface: {0}")]
    Surface(#[from] SynthesisError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

type CustomHandler = Arc<dyn Fn(ClientError) -> Result<Option<Value>, ClientError> + Send + Sync>;

/// What a failed call turns into for the caller
#[derive(Clone, Default)]
pub enum ErrorHandler {
    /// Log the error and resolve to `None`
    #[default]
    LogAndContinue,
    /// Hand the error back to the caller
    Propagate,
    Custom(CustomHandler),
}

impl ErrorHandler {
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(ClientError) -> Result<Option<Value>, ClientError> + Send + Sync + 'static,
    {
        ErrorHandler::Custom(Arc::new(func))
    }

    pub fn handle(&self, err: ClientError) -> Result<Option<Value>, ClientError> {
        match self {
            ErrorHandler::LogAndContinue => {
                tracing::error!("resi call failed: {}", err);
                Ok(None)
            }
            ErrorHandler::Propagate => Err(err),
            ErrorHandler::Custom(func) => func(err),
        }
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorHandler::LogAndContinue => f.write_str("LogAndContinue"),
            ErrorHandler::Propagate => f.write_str("Propagate"),
            ErrorHandler::Custom(_) => f.write_str("Custom"),
        }
    }
}
