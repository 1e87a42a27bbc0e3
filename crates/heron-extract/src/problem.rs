//! Runtime validation problems.
//!
//! Decoding a request never fails on the first bad parameter. Every failure is
//! recorded as a [`ValidationProblem`] and the whole list is surfaced once as
//! an [`InvalidRequest`].

use http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::decoder::{DecodeError, DecodeErrorKind};

/// Where a problem was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Path placeholder.
    Path,
    /// Query string.
    Query,
    /// Header.
    Header,
    /// Cookie.
    Cookie,
    /// Request body, including form bodies.
    Body,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Query => write!(f, "query"),
            Self::Header => write!(f, "header"),
            Self::Cookie => write!(f, "cookie"),
            Self::Body => write!(f, "body"),
        }
    }
}

/// Classification of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// A required value is absent.
    MissingParam,
    /// Well-formed input of the wrong shape or value.
    InvalidType,
    /// Malformed wire syntax.
    InvalidPayload,
    /// The form body could not be read.
    InvalidForm,
    /// A custom or auth decoder rejected the value.
    CustomDecodeMessage,
}

impl ProblemKind {
    /// Returns the stable tag used in error envelopes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParam => "missing_param",
            Self::InvalidType => "invalid_type",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidForm => "invalid_form",
            Self::CustomDecodeMessage => "custom_decode_message",
        }
    }
}

impl From<DecodeErrorKind> for ProblemKind {
    fn from(kind: DecodeErrorKind) -> Self {
        match kind {
            DecodeErrorKind::InvalidType => Self::InvalidType,
            DecodeErrorKind::InvalidPayload => Self::InvalidPayload,
            DecodeErrorKind::Custom => Self::CustomDecodeMessage,
        }
    }
}

/// One failed parameter or body decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationProblem {
    /// Problem classification.
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    /// Where the value was read from.
    pub location: Location,
    /// Wire-visible name of the parameter.
    pub param: String,
    /// Human-readable message.
    pub message: String,
}

impl ValidationProblem {
    /// A required value is absent.
    #[must_use]
    pub fn missing(location: Location, param: impl Into<String>) -> Self {
        Self {
            kind: ProblemKind::MissingParam,
            location,
            param: param.into(),
            message: "field required".to_string(),
        }
    }

    /// A decoder rejected the value.
    #[must_use]
    pub fn decode(location: Location, param: impl Into<String>, err: DecodeError) -> Self {
        Self {
            kind: err.kind().into(),
            location,
            param: param.into(),
            message: err.message().to_string(),
        }
    }

    /// The form body could not be read.
    #[must_use]
    pub fn invalid_form(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ProblemKind::InvalidForm,
            location: Location::Body,
            param: param.into(),
            message: message.into(),
        }
    }

    /// The body could not be read as the declared payload.
    #[must_use]
    pub fn invalid_payload(
        location: Location,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProblemKind::InvalidPayload,
            location,
            param: param.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}': {}",
            self.location,
            self.kind.as_str(),
            self.param,
            self.message
        )
    }
}

/// Aggregate validation failure for one request.
///
/// # Example
///
/// ```rust
/// use heron_extract::{InvalidRequest, Location, ValidationProblem};
///
/// let err = InvalidRequest::new(vec![
///     ValidationProblem::missing(Location::Query, "page"),
///     ValidationProblem::missing(Location::Header, "x-token"),
/// ]);
///
/// assert_eq!(err.problems().len(), 2);
/// assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
/// assert_eq!(err.to_json()["detail"][0]["location"], "query");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {} problem(s)", .problems.len())]
pub struct InvalidRequest {
    problems: Vec<ValidationProblem>,
}

impl InvalidRequest {
    /// Wraps the collected problems.
    #[must_use]
    pub fn new(problems: Vec<ValidationProblem>) -> Self {
        Self { problems }
    }

    /// Returns every problem in detection order.
    #[must_use]
    pub fn problems(&self) -> &[ValidationProblem] {
        &self.problems
    }

    /// Consumes the error, returning the problems.
    #[must_use]
    pub fn into_problems(self) -> Vec<ValidationProblem> {
        self.problems
    }

    /// Returns the HTTP status used when this error reaches a client.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    /// Renders the error envelope `{"detail": [...]}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "detail": self.problems })
    }
}
