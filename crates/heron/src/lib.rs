//! # Heron
//!
//! **Request binding and dependency resolution for HTTP handlers**
//!
//! Heron compiles a handler's declared parameters against a route template
//! and a dependency graph once, then binds every request against the
//! compiled signature:
//!
//! - **Classification** – each parameter is sourced from the path, query,
//!   headers, cookies, body, a dispatch-time plugin or the dependency graph
//! - **Validation** – every problem in a request is collected and reported
//!   together as a 422 response
//! - **Dependencies** – graph-constructible parameters are resolved per
//!   request, with disposable resources released once the response is done
//! - **Responses** – return annotations select status codes and encoders
//!
//! ## Quick Start
//!
//! ```rust
//! use heron::prelude::*;
//! use http::StatusCode;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = HeronConfig::default();
//! let ctx = CompileContext::new(Arc::new(Container::new()))
//!     .with_options(config.binding_options());
//!
//! let handler = Handler::new("get_user", |args| async move {
//!     let id: i64 = args.parse("user_id")?;
//!     Ok(HandlerReturn::Value(json!({ "id": id })))
//! })
//! .param(ParamDecl::new("user_id", TypeExpr::int()));
//!
//! let endpoint = Endpoint::compile(&ctx, "/users/{user_id}", handler, Arc::new(ErrorRegistry::default()))
//!     .unwrap();
//! let response = endpoint
//!     .handle(RequestContext::builder().uri("/users/7").path_param("user_id", "7").build())
//!     .await
//!     .unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ParamDecl[] + route ─► ParamParser ─► EndpointSignature ◄─ ReturnAnalyzer
//!                                              │
//! RequestContext ─► RequestBinder ─► BoundArgs ─► Handler ─► Encoder ─► Response
//!                        │
//!                        └─► Resolver (scoped per request when needed)
//! ```

#![doc(html_root_url = "https://docs.rs/heron/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use heron_core as core;

// Re-export request extraction types
pub use heron_extract as extract;

// Re-export compilation and binding types
pub use heron_signature as signature;

// Re-export the executor
pub use heron_server as server;

// Re-export logging setup
pub use heron_telemetry as telemetry;

// Re-export configuration
pub use heron_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use heron::prelude::*;
///
/// let decl = ParamDecl::new("x_token", marks::header(TypeExpr::str()));
/// assert!(decl.required());
/// ```
pub mod prelude {
    pub use heron_core::types::marks;
    pub use heron_core::{
        BoundArgs, CompileError, Container, DependencyGraph, InjectableKind, ParamDecl,
        RecordType, Resolver, ResolverHandle, TypeExpr,
    };

    pub use heron_extract::response::{JsonResponse, NoContent, TextResponse};
    pub use heron_extract::{
        InvalidRequest, Location, MultipartConfig, ProblemKind, RequestContext, UploadFile,
        ValidationProblem,
    };

    pub use heron_signature::{
        bind, BindError, BindingOptions, CompileContext, EndpointSignature, ParseResult,
        PluginProvider,
    };

    pub use heron_server::{Endpoint, ErrorRegistry, Handler, HandlerReturn, StatusError};

    pub use heron_telemetry::{init_logging, LogConfig};

    pub use heron_config::{ConfigLoader, HeronConfig};
}
