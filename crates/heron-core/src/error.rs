//! Compile-time (route setup) errors.
//!
//! Every [`CompileError`] is raised while an endpoint is being compiled and is
//! fatal for that route. None of them is ever deferred to the first request.

use thiserror::Error;

/// Result type alias using [`CompileError`].
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors detected while compiling a handler against a route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A parameter carries more than one distinct routing-source mark.
    #[error("parameter '{param}' carries conflicting source marks: {marks}")]
    AmbiguousMarks {
        /// Parameter name.
        param: String,
        /// The distinct marks found, comma separated.
        marks: String,
    },

    /// More than one parameter is decoded from the request body.
    #[error("endpoint declares more than one body parameter: '{first}' and '{second}'")]
    MultipleBodyParams {
        /// The body parameter found first.
        first: String,
        /// The offending second body parameter.
        second: String,
    },

    /// A path placeholder parameter declares a default value.
    #[error("path parameter '{param}' of route '{route}' cannot have a default value")]
    PathParamDefault {
        /// Parameter name.
        param: String,
        /// Route template.
        route: String,
    },

    /// A path-marked parameter names a placeholder the route does not have.
    #[error("path parameter '{param}' reads placeholder '{alias}', which route '{route}' does not declare")]
    UnknownPathPlaceholder {
        /// Parameter name.
        param: String,
        /// Placeholder name read.
        alias: String,
        /// Route template.
        route: String,
    },

    /// A plugin mark has no registered provider.
    #[error("no plugin provider registered for '{key}' (parameter '{param}')")]
    UnresolvablePlugin {
        /// Parameter name.
        param: String,
        /// Plugin registry key.
        key: String,
    },

    /// A plugin provider refused the parameter.
    #[error("plugin '{key}' rejected parameter '{param}': {reason}")]
    PluginRejected {
        /// Parameter name.
        param: String,
        /// Plugin registry key.
        key: String,
        /// Provider message.
        reason: String,
    },

    /// A union mixes raw-byte and non-byte members.
    #[error("parameter '{param}' mixes byte and non-byte union members in {ty}")]
    AmbiguousBytesUnion {
        /// Parameter name.
        param: String,
        /// Rendered type.
        ty: String,
    },

    /// A `use` mark names a type the dependency graph cannot construct.
    #[error("parameter '{param}' depends on {ty}, which the dependency graph cannot construct")]
    UnresolvableDependency {
        /// Parameter name.
        param: String,
        /// Rendered type.
        ty: String,
    },

    /// A status mark is not a valid HTTP status.
    #[error("invalid status literal '{literal}'")]
    InvalidStatus {
        /// The literal as written.
        literal: String,
    },

    /// A status that forbids a body is paired with a non-empty payload type.
    #[error("status {status} does not allow a response body, but the return type is {ty}")]
    StatusBodyConflict {
        /// The status code.
        status: u16,
        /// Rendered payload type.
        ty: String,
    },

    /// A return union mixes status-marked and unmarked members.
    #[error("return annotation {ty} mixes status-marked and unmarked members")]
    MixedReturnMarks {
        /// Rendered return type.
        ty: String,
    },

    /// Two return arms declare the same status.
    #[error("return annotation declares status {status} more than once")]
    DuplicateStatus {
        /// The repeated status code.
        status: u16,
    },

    /// A constraint cannot be compiled (for example an invalid regex).
    #[error("invalid constraint on '{param}': {reason}")]
    InvalidConstraint {
        /// Parameter name.
        param: String,
        /// Why the constraint is invalid.
        reason: String,
    },
}

impl CompileError {
    /// Returns the parameter name the error refers to, if any.
    #[must_use]
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::AmbiguousMarks { param, .. }
            | Self::PathParamDefault { param, .. }
            | Self::UnknownPathPlaceholder { param, .. }
            | Self::UnresolvablePlugin { param, .. }
            | Self::PluginRejected { param, .. }
            | Self::AmbiguousBytesUnion { param, .. }
            | Self::UnresolvableDependency { param, .. }
            | Self::InvalidConstraint { param, .. } => Some(param),
            Self::MultipleBodyParams { second, .. } => Some(second),
            Self::InvalidStatus { .. }
            | Self::StatusBodyConflict { .. }
            | Self::MixedReturnMarks { .. }
            | Self::DuplicateStatus { .. } => None,
        }
    }
}
