//! The live request as seen by the binder.
//!
//! [`RequestContext`] is the read-only view of one request: path placeholder
//! values, query pairs, headers, cookies, the buffered body, and any
//! transport handles (event bus, socket) attached for injection.

use bytes::Bytes;
use heron_core::Instance;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use indexmap::IndexMap;
use std::fmt;

use crate::cookie::Cookies;
use crate::form::{read_form, FormData, FormError};
use crate::multipart::MultipartConfig;
use crate::params::PathParams;

/// Context providing access to all parts of an HTTP request.
///
/// # Example
///
/// ```rust
/// use heron_extract::RequestContext;
/// use http::Method;
///
/// let ctx = RequestContext::builder()
///     .method(Method::GET)
///     .uri("/users/42?tag=a&tag=b")
///     .header("x-request-id", "r-1")
///     .path_param("user_id", "42")
///     .build();
///
/// assert_eq!(ctx.path_param("user_id"), Some("42"));
/// assert_eq!(ctx.query_all("tag"), ["a", "b"]);
/// assert_eq!(ctx.header("X-Request-Id"), Some("r-1"));
/// ```
#[derive(Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: PathParams,
    query: IndexMap<String, Vec<String>>,
    cookies: Cookies,
    event_bus: Option<Instance>,
    socket: Option<Instance>,
}

impl RequestContext {
    /// Creates a request context.
    #[must_use]
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        path_params: PathParams,
    ) -> Self {
        let query = parse_query(uri.query());
        let cookies = Cookies::from_headers(&headers);
        Self {
            method,
            uri,
            headers,
            body,
            path_params,
            query,
            cookies,
            event_bus: None,
            socket: None,
        }
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::new()
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string if present.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the last value of a query key.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|v| v.last())
            .map(String::as_str)
    }

    /// Returns every value of a repeated query key.
    #[must_use]
    pub fn query_all(&self, name: &str) -> &[String] {
        self.query.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string. Lookup is case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns every value of a repeated header.
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns a cookie value.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    /// Returns all cookies.
    #[must_use]
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// Returns the matched path placeholder values.
    #[must_use]
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Returns a single path placeholder value.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// Returns the buffered request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Checks if the request body is empty.
    #[must_use]
    pub fn is_body_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Reads the body as a form.
    ///
    /// # Errors
    ///
    /// Returns [`FormError`] when the body is not a readable form.
    pub async fn form(&self, config: &MultipartConfig) -> Result<FormData, FormError> {
        read_form(&self.headers, self.body.clone(), config).await
    }

    /// Returns the event bus handle attached by the transport.
    #[must_use]
    pub fn event_bus(&self) -> Option<&Instance> {
        self.event_bus.as_ref()
    }

    /// Returns the socket handle attached by the transport.
    #[must_use]
    pub fn socket(&self) -> Option<&Instance> {
        self.socket.as_ref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers.len())
            .field("body_len", &self.body.len())
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

fn parse_query(query: Option<&str>) -> IndexMap<String, Vec<String>> {
    let mut map: IndexMap<String, Vec<String>> = IndexMap::new();
    let Some(query) = query else {
        return map;
    };
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    for (key, value) in pairs {
        map.entry(key).or_default().push(value);
    }
    map
}

/// Builder for constructing a [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    headers: HeaderMap,
    body: Bytes,
    path_params: PathParams,
    event_bus: Option<Instance>,
    socket: Option<Instance>,
}

impl RequestContextBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method. Defaults to `GET`.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the URI. Invalid URIs are ignored and `/` is used.
    #[must_use]
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.parse().ok();
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Adds a path placeholder value.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push(name, value);
        self
    }

    /// Attaches the event bus handle.
    #[must_use]
    pub fn event_bus(mut self, bus: Instance) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Attaches the socket handle.
    #[must_use]
    pub fn socket(mut self, socket: Instance) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Builds the request context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        let mut ctx = RequestContext::new(
            self.method.unwrap_or(Method::GET),
            self.uri.unwrap_or_else(|| Uri::from_static("/")),
            self.headers,
            self.body,
            self.path_params,
        );
        ctx.event_bus = self.event_bus;
        ctx.socket = self.socket;
        ctx
    }
}
