//! Handler descriptors.
//!
//! A [`Handler`] declares its parameters and return annotation explicitly and
//! wraps one callable. Async callables run inline on the request task.
//! Blocking callables are moved to the blocking pool unless
//! [`Handler::inline`] is set or offloading is disabled.
//!
//! # Example
//!
//! ```rust
//! use heron_server::{Handler, HandlerReturn};
//! use heron_core::{ParamDecl, TypeExpr};
//! use serde_json::json;
//!
//! let handler = Handler::new("get_user", |args| async move {
//!     let id: i64 = args.parse("user_id")?;
//!     Ok(HandlerReturn::Value(json!({ "id": id })))
//! })
//! .param(ParamDecl::new("user_id", TypeExpr::int()));
//!
//! assert_eq!(handler.name(), "get_user");
//! assert_eq!(handler.params().len(), 1);
//! ```

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use heron_core::{BoundArgs, ParamDecl, TypeExpr};
use heron_extract::Response;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Stream of items produced by a streaming handler.
pub type ItemStream = BoxStream<'static, anyhow::Result<Value>>;

/// What a handler hands back to the executor.
pub enum HandlerReturn {
    /// A value encoded with the endpoint's default status.
    Value(Value),
    /// A value sent with one of the declared statuses.
    WithStatus(StatusCode, Value),
    /// A finished response, passed through unchanged.
    Response(Response),
    /// Items encoded lazily as they are produced.
    Streaming(ItemStream),
}

impl HandlerReturn {
    /// Serializes `value` into a [`HandlerReturn::Value`].
    ///
    /// # Errors
    ///
    /// Returns the serialization error.
    pub fn json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// Wraps an item stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Streaming(stream.boxed())
    }
}

impl From<Value> for HandlerReturn {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Response> for HandlerReturn {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl fmt::Debug for HandlerReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::WithStatus(status, value) => {
                f.debug_tuple("WithStatus").field(status).field(value).finish()
            }
            Self::Response(response) => f.debug_tuple("Response").field(&response.status()).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// A blocking handler panicked or was cancelled.
#[derive(Error, Debug)]
#[error("handler '{handler}' did not complete: {reason}")]
pub struct HandlerPanicked {
    /// Handler name.
    pub handler: String,
    /// Join failure.
    pub reason: String,
}

type AsyncFn = Arc<dyn Fn(BoundArgs) -> BoxFuture<'static, anyhow::Result<HandlerReturn>> + Send + Sync>;
type BlockingFn = Arc<dyn Fn(BoundArgs) -> anyhow::Result<HandlerReturn> + Send + Sync>;

#[derive(Clone)]
enum Call {
    Async(AsyncFn),
    Blocking(BlockingFn),
}

/// A handler callable with its declared signature.
#[derive(Clone)]
pub struct Handler {
    name: String,
    params: Vec<ParamDecl>,
    returns: Option<TypeExpr>,
    call: Call,
    inline: bool,
}

impl Handler {
    /// Wraps an async callable.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerReturn>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::with_call(
            name,
            Call::Async(Arc::new(move |args| {
                let f = Arc::clone(&f);
                async move { f(args).await }.boxed()
            })),
        )
    }

    /// Wraps a blocking callable.
    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(BoundArgs) -> anyhow::Result<HandlerReturn> + Send + Sync + 'static,
    {
        Self::with_call(name, Call::Blocking(Arc::new(f)))
    }

    fn with_call(name: impl Into<String>, call: Call) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            call,
            inline: false,
        }
    }

    /// Declares a parameter.
    #[must_use]
    pub fn param(mut self, decl: ParamDecl) -> Self {
        self.params.push(decl);
        self
    }

    /// Declares several parameters.
    #[must_use]
    pub fn params_from(mut self, decls: impl IntoIterator<Item = ParamDecl>) -> Self {
        self.params.extend(decls);
        self
    }

    /// Declares the return annotation.
    #[must_use]
    pub fn returns(mut self, annotation: TypeExpr) -> Self {
        self.returns = Some(annotation);
        self
    }

    /// Runs a blocking callable on the request task.
    #[must_use]
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameters.
    #[must_use]
    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Returns the return annotation.
    #[must_use]
    pub fn return_annotation(&self) -> Option<&TypeExpr> {
        self.returns.as_ref()
    }

    /// Returns `true` for blocking callables.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self.call, Call::Blocking(_))
    }

    /// Calls the handler. Blocking callables go to the blocking pool when
    /// `offload` is set and the handler is not inline.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or [`HandlerPanicked`] when an offloaded
    /// call does not complete.
    pub async fn call(&self, args: BoundArgs, offload: bool) -> anyhow::Result<HandlerReturn> {
        match &self.call {
            Call::Async(f) => f(args).await,
            Call::Blocking(f) if offload && !self.inline => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(args))
                    .await
                    .map_err(|err| HandlerPanicked {
                        handler: self.name.clone(),
                        reason: err.to_string(),
                    })?
            }
            Call::Blocking(f) => f(args),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("blocking", &self.is_blocking())
            .field("inline", &self.inline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> BoundArgs {
        let mut args = BoundArgs::new();
        for (name, value) in pairs {
            args.insert_value(*name, value.clone());
        }
        args
    }

    #[tokio::test]
    async fn test_async_handler() {
        let handler = Handler::new("echo", |args: BoundArgs| async move {
            Ok(HandlerReturn::Value(args.value("x").cloned().unwrap_or(Value::Null)))
        });
        let result = handler.call(args(&[("x", json!(5))]), true).await.unwrap();
        assert!(matches!(result, HandlerReturn::Value(v) if v == json!(5)));
        assert!(!handler.is_blocking());
    }

    #[tokio::test]
    async fn test_blocking_handler_offloaded() {
        let handler = Handler::blocking("thread", |_| {
            let name = std::thread::current().name().map(str::to_string);
            Ok(HandlerReturn::Value(json!(name)))
        });
        assert!(handler.is_blocking());
        let result = handler.call(BoundArgs::new(), true).await.unwrap();
        assert!(matches!(result, HandlerReturn::Value(_)));
    }

    #[tokio::test]
    async fn test_blocking_panic_is_error() {
        let handler = Handler::blocking("boom", |_| panic!("boom"));
        let err = handler.call(BoundArgs::new(), true).await.unwrap_err();
        assert!(err.downcast_ref::<HandlerPanicked>().is_some());
    }

    #[test]
    fn test_inline_blocking_runs_on_caller() {
        let handler = Handler::blocking("inline", |_| Ok(json!("ok").into())).inline();
        let result = tokio_test::block_on(handler.call(BoundArgs::new(), true)).unwrap();
        assert!(matches!(result, HandlerReturn::Value(v) if v == json!("ok")));
    }

    #[test]
    fn test_json_return() {
        #[derive(Serialize)]
        struct User {
            id: u32,
        }
        let result = HandlerReturn::json(&User { id: 1 }).unwrap();
        assert!(matches!(result, HandlerReturn::Value(v) if v == json!({"id": 1})));
    }
}
