//! Error solvers.
//!
//! An [`ErrorRegistry`] turns handler and binding failures into responses.
//! Lookup goes by the error's exact type, then by the types along its cause
//! chain, then by the status the error declares. An error no solver matches
//! is returned to the caller.
//!
//! # Example
//!
//! ```rust
//! use heron_server::{ErrorRegistry, StatusError};
//! use heron_extract::response::JsonResponse;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! let mut errors = ErrorRegistry::default();
//! errors.on_status(StatusCode::NOT_FOUND, |err| {
//!     JsonResponse::new(json!({ "detail": err.to_string() }))
//!         .with_status(StatusCode::NOT_FOUND)
//!         .into_response()
//! });
//!
//! let err = anyhow::Error::new(StatusError::not_found("no such user"));
//! let response = errors.solve(&err).unwrap();
//! assert_eq!(response.status(), StatusCode::NOT_FOUND);
//! ```

use heron_extract::response::JsonResponse;
use heron_extract::{InvalidRequest, Response};
use http::StatusCode;
use serde_json::json;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type TypeSolver = Arc<dyn Fn(&(dyn StdError + 'static)) -> Option<Response> + Send + Sync>;
type StatusSolver = Arc<dyn Fn(&anyhow::Error) -> Response + Send + Sync>;

/// An error carrying the HTTP status it should produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StatusError {
    status: StatusCode,
    message: String,
}

impl StatusError {
    /// Creates an error with a status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 409 Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Maps errors to responses.
#[derive(Clone)]
pub struct ErrorRegistry {
    by_type: Vec<(&'static str, TypeSolver)>,
    by_status: HashMap<StatusCode, StatusSolver>,
}

impl Default for ErrorRegistry {
    /// A registry that renders [`InvalidRequest`] as a 422 response.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.on::<InvalidRequest, _>(InvalidRequest::to_response);
        registry
    }
}

impl ErrorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: Vec::new(),
            by_status: HashMap::new(),
        }
    }

    /// Registers a solver for errors of type `E`, replacing any previous one.
    pub fn on<E, F>(&mut self, solver: F)
    where
        E: StdError + 'static,
        F: Fn(&E) -> Response + Send + Sync + 'static,
    {
        let name = std::any::type_name::<E>();
        self.by_type.retain(|(n, _)| *n != name);
        self.by_type.push((
            name,
            Arc::new(move |err: &(dyn StdError + 'static)| err.downcast_ref::<E>().map(&solver)),
        ));
    }

    /// Registers a solver for errors declaring `status`.
    pub fn on_status<F>(&mut self, status: StatusCode, solver: F)
    where
        F: Fn(&anyhow::Error) -> Response + Send + Sync + 'static,
    {
        self.by_status.insert(status, Arc::new(solver));
    }

    /// Registers a status solver rendering `{"detail": message}`.
    pub fn on_status_json(&mut self, status: StatusCode) {
        self.on_status(status, move |err| {
            JsonResponse::new(json!({ "detail": err.to_string() }))
                .with_status(status)
                .into_response()
        });
    }

    /// Returns the number of registered solvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len() + self.by_status.len()
    }

    /// Returns `true` if no solver is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts `err` with the first matching solver.
    #[must_use]
    pub fn solve(&self, err: &anyhow::Error) -> Option<Response> {
        for cause in err.chain() {
            if let Some(response) = self.by_type.iter().find_map(|(_, solver)| solver(cause)) {
                return Some(response);
            }
        }
        let status = declared_status(err)?;
        self.by_status.get(&status).map(|solver| solver(err))
    }
}

/// Returns the status an error declares through its cause chain.
#[must_use]
pub fn declared_status(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain().find_map(|cause| {
        if let Some(status) = cause.downcast_ref::<StatusError>() {
            return Some(status.status());
        }
        cause
            .downcast_ref::<InvalidRequest>()
            .map(InvalidRequest::status_code)
    })
}

impl fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.by_type.iter().map(|(n, _)| *n).collect();
        let mut statuses: Vec<u16> = self.by_status.keys().map(StatusCode::as_u16).collect();
        statuses.sort_unstable();
        f.debug_struct("ErrorRegistry")
            .field("types", &types)
            .field("statuses", &statuses)
            .finish()
    }
}
