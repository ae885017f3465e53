use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;

/// What core dispatch produced for the client
#[derive(Debug)]
pub enum Outcome {
    /// Serialized handler result
    Json(Value),
    /// Handler resolved to a falsy value: status 200, no body
    Empty,
    /// Bytes written by a stream handler, forwarded as they arrive
    Stream(Body),
}

impl Outcome {
    /// The JSON value, if this outcome carries one
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Attach extra headers and convert into a response
    pub fn with_headers(self, headers: HeaderMap) -> Response {
        let mut response = self.into_response();
        response.headers_mut().extend(headers);
        response
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Json(value) => (StatusCode::OK, Json(value)).into_response(),
            Outcome::Empty => StatusCode::OK.into_response(),
            Outcome::Stream(body) => {
                let mut response = Response::new(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
        }
    }
}
