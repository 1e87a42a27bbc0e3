//! # Heron Extract
//!
//! Request access, decoding and response bodies for the Heron binding compiler.
//!
//! This crate turns the raw pieces of a request into JSON-shaped values that
//! the binder hands to handlers, and turns handler results back into bytes.
//!
//! ## Request side
//!
//! | Item | Source | Description |
//! |------|--------|-------------|
//! | [`RequestContext`] | Whole request | Path values, query, headers, cookies, body |
//! | [`PathParams`] | URL path | Placeholder values from routing |
//! | [`Cookies`] | `Cookie` headers | Parsed cookie pairs |
//! | [`read_form`] | Request body | Urlencoded and multipart forms |
//! | [`DecoderFactory`] | Any | Cached, type-driven decoders |
//!
//! ## Example
//!
//! ```rust
//! use heron_extract::{DecoderFactory, RequestContext};
//! use heron_core::TypeExpr;
//! use serde_json::json;
//!
//! let ctx = RequestContext::builder().uri("/items?limit=10").build();
//! let decoder = DecoderFactory::new()
//!     .text_decoder("limit", &TypeExpr::int())
//!     .unwrap();
//!
//! let raw = ctx.query_all("limit");
//! assert_eq!(decoder.decode(raw).unwrap(), json!(10));
//! ```
//!
//! ## Errors
//!
//! Decoders fail with a [`DecodeError`]. The binder wraps each one in a
//! [`ValidationProblem`] and reports all of them together as an
//! [`InvalidRequest`], which renders as a 422 response.

#![doc(html_root_url = "https://docs.rs/heron-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod cookie;
mod decoder;
mod encode;
mod form;
mod multipart;
mod params;
mod problem;
pub mod response;

pub use context::{RequestContext, RequestContextBuilder};
pub use cookie::Cookies;
pub use decoder::{
    AuthDecoder, BodyDecoder, BodyInput, BodyKind, DecodeError, DecodeErrorKind, DecoderFactory,
    TextDecoder,
};
pub use encode::{EncodeError, Encoder};
pub use form::{read_form, FormData, FormError, FormValue};
pub use multipart::{MultipartConfig, UploadFile};
pub use params::PathParams;
pub use problem::{InvalidRequest, Location, ProblemKind, ValidationProblem};
pub use response::{BodyStream, Response, ResponseBody};
