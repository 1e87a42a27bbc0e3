//! Response bodies and builders.
//!
//! Responses are plain [`http::Response`] values carrying a [`ResponseBody`]:
//! either nothing, a buffered payload, or a stream of chunks.
//!
//! # Example
//!
//! ```rust
//! use heron_extract::response::{JsonResponse, NoContent};
//! use http::StatusCode;
//! use serde_json::json;
//!
//! let created = JsonResponse::new(json!({"id": 7}))
//!     .with_status(StatusCode::CREATED)
//!     .into_response();
//! assert_eq!(created.status(), StatusCode::CREATED);
//!
//! let empty = NoContent::new().into_response();
//! assert!(empty.body().is_empty());
//! ```

use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use http::{header, HeaderValue, StatusCode};
use serde_json::Value;
use std::fmt;

use crate::problem::InvalidRequest;

/// An HTTP response with a Heron body.
pub type Response = http::Response<ResponseBody>;

/// Stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, anyhow::Error>>;

/// A response body.
#[derive(Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// A buffered body.
    Full(Bytes),
    /// A streamed body.
    Stream(BodyStream),
}

impl ResponseBody {
    /// Wraps a chunk stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = Result<Bytes, anyhow::Error>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Returns true if no bytes will be written. Streams are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Returns true for streamed bodies.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns the buffered bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Reads the whole body, draining streams.
    pub async fn collect(self) -> Result<Bytes, anyhow::Error> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Self::Full(Bytes::from(text))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Self::Full(Bytes::from_static(text.as_bytes()))
    }
}

/// Builds a response from its parts.
#[must_use]
pub fn build(status: StatusCode, content_type: Option<&'static str>, body: ResponseBody) -> Response {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// JSON response builder.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    status: StatusCode,
    data: Value,
}

impl JsonResponse {
    /// Creates a 200 OK JSON response.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Builds the HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response {
        let body = Bytes::from(self.data.to_string());
        build(self.status, Some("application/json"), ResponseBody::Full(body))
    }
}

/// Plain text response builder.
#[derive(Debug, Clone)]
pub struct TextResponse {
    status: StatusCode,
    body: String,
}

impl TextResponse {
    /// Creates a 200 OK text response.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Builds the HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response {
        build(
            self.status,
            Some("text/plain; charset=utf-8"),
            ResponseBody::from(self.body),
        )
    }
}

/// 204 No Content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl NoContent {
    /// Creates the response builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response {
        build(StatusCode::NO_CONTENT, None, ResponseBody::Empty)
    }
}

impl InvalidRequest {
    /// Renders the 422 response carrying every problem.
    #[must_use]
    pub fn to_response(&self) -> Response {
        JsonResponse::new(self.to_json())
            .with_status(self.status_code())
            .into_response()
    }
}
