//! # Heron Server
//!
//! The request-time side of Heron: handler descriptors, error solvers and the
//! endpoint executor.
//!
//! - [`Handler`] wraps an async or blocking callable with its declared
//!   parameters and return annotation
//! - [`ErrorRegistry`] converts failures into responses by type, cause chain
//!   or declared status
//! - [`Endpoint`] binds each request, calls the handler and renders the
//!   result, managing the request's resolution scope
//!
//! ## Example
//!
//! ```rust
//! use heron_server::{Endpoint, ErrorRegistry, Handler, HandlerReturn};
//! use heron_signature::CompileContext;
//! use heron_core::{types::marks, Container, ParamDecl, TypeExpr};
//! use heron_extract::RequestContext;
//! use http::StatusCode;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let ctx = CompileContext::new(Arc::new(Container::new()));
//! let handler = Handler::new("create_item", |args| async move {
//!     let name: String = args.parse("name")?;
//!     Ok(HandlerReturn::Value(json!({ "name": name })))
//! })
//! .param(ParamDecl::new("name", TypeExpr::str()))
//! .returns(marks::status(TypeExpr::Any, 201));
//!
//! let endpoint = Endpoint::compile(&ctx, "/items", handler, Arc::new(ErrorRegistry::default())).unwrap();
//! let response = endpoint
//!     .handle(RequestContext::builder().uri("/items?name=pen").build())
//!     .await
//!     .unwrap();
//! assert_eq!(response.status(), StatusCode::CREATED);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/heron-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod endpoint;
mod errors;
mod handler;

pub use endpoint::{Endpoint, EndpointError};
pub use errors::{declared_status, ErrorRegistry, StatusError};
pub use handler::{Handler, HandlerPanicked, HandlerReturn, ItemStream};
