//! # Heron Core
//!
//! Core types for the Heron request-binding compiler.
//!
//! This crate provides the foundational pieces every other Heron crate builds on:
//!
//! - [`TypeExpr`] - Language-neutral type descriptor with attached [`Meta`]data
//! - [`resolve`] - Unwraps aliases, generics and metadata wrappers into a [`ResolvedType`]
//! - [`BoundArgs`] / [`ArgValue`] - The argument map handed to handlers and constructors
//! - [`di`] - Dependency graph capability traits and the default [`Container`]
//! - [`CompileError`] - Setup-time failures raised while compiling an endpoint

#![doc(html_root_url = "https://docs.rs/heron-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod di;
mod error;
mod resolve;
pub mod types;
mod value;

pub use di::{
    Container, DependencyGraph, DependencyNode, ParamDecl, ResolveError, Resolver, ResolverHandle,
    ResolverScope, Scope,
};
pub use error::{CompileError, CompileResult};
pub use resolve::{peel, resolve, ResolvedType};
pub use types::{
    Constraint, CustomDecoder, DecodeInput, Field, InjectableKind, Meta, ParamMark, ParamSource,
    PluginMark, RecordType, ReturnMark, Scalar, StatusLiteral, TypeAlias, TypeExpr, TypeKey,
};
pub use value::{ArgError, ArgValue, BoundArgs, Instance};
