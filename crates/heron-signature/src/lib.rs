//! # Heron Signature
//!
//! Endpoint compilation and request binding.
//!
//! A handler's declared parameters and return annotation are compiled once
//! per route into an immutable [`EndpointSignature`]. Every request is then
//! bound against it by a [`RequestBinder`], which decodes wire values,
//! collects every validation problem, loads dispatch-time values and resolves
//! dependencies.
//!
//! ## Parameter sources
//!
//! | Rule | Source | Example |
//! |------|--------|---------|
//! | Route placeholder | Path | `/users/{user_id}` |
//! | Injectable handle | Plugin | `TypeExpr::injectable(InjectableKind::Request)` |
//! | Record or upload | Body | `TypeExpr::record(..)` |
//! | Graph-constructible | Dependency | `TypeExpr::named::<Repo>()` |
//! | Explicit mark | Header, cookie, ... | `marks::header(TypeExpr::str())` |
//! | Anything else | Query | `TypeExpr::int()` |
//!
//! ## Example
//!
//! ```rust
//! use heron_signature::{bind, BindingOptions, CompileContext, EndpointSignature};
//! use heron_core::{Container, ParamDecl, Resolver, TypeExpr};
//! use heron_extract::RequestContext;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let graph = Arc::new(Container::new());
//! let ctx = CompileContext::new(graph.clone());
//! let signature = EndpointSignature::compile(
//!     &ctx,
//!     "/users/{user_id}",
//!     &[ParamDecl::new("user_id", TypeExpr::int())],
//!     None,
//! )
//! .unwrap();
//!
//! let request = RequestContext::builder()
//!     .uri("/users/7")
//!     .path_param("user_id", "7")
//!     .build();
//! let resolver: Arc<dyn Resolver> = graph;
//! let result = bind(&signature, &request, &resolver, &BindingOptions::default())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(result.params.value("user_id"), Some(&json!(7)));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/heron-signature/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
mod param;
mod parser;
mod plugin;
mod returns;
mod signature;
mod template;

pub use binder::{
    bind, BindError, BindingOptions, Cleanup, ParseResult, RequestBinder, DEFAULT_MAX_BODY_SIZE,
};
pub use param::{
    BodyParam, DependencyParam, ParamInfo, ParamView, ParsedParam, PluginParam, PluginSource,
    TextParam,
};
pub use parser::{EndpointParams, ParamParser};
pub use plugin::{PluginProvider, PluginRegistry};
pub use returns::{forbids_body, ReturnAnalyzer, ReturnKind, ReturnMap, ReturnSpec};
pub use signature::{CompileContext, EndpointSignature};
pub use template::RouteTemplate;
