//! The endpoint executor.
//!
//! An [`Endpoint`] pairs a [`Handler`] with its compiled
//! [`EndpointSignature`]. Each request is bound, dispatched and rendered;
//! failures go through the [`ErrorRegistry`].
//!
//! Scoped endpoints open a resolution scope before binding and close it once
//! the response is complete. For streamed responses that is when the stream
//! ends or is dropped. A request future dropped mid-flight still closes its
//! scope.

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use heron_core::{CompileResult, DependencyGraph, Resolver, ResolverScope};
use heron_extract::response::build;
use heron_extract::{Encoder, RequestContext, Response, ResponseBody};
use heron_signature::{
    forbids_body, BindError, BindingOptions, CompileContext, EndpointSignature, RequestBinder,
    ReturnSpec,
};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::ErrorRegistry;
use crate::handler::{Handler, HandlerReturn, ItemStream};

/// Error escaping an endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// No solver matched a binding or handler failure.
    #[error("unhandled error in endpoint '{route}': {source}")]
    Unhandled {
        /// Route template.
        route: String,
        /// The original error.
        #[source]
        source: anyhow::Error,
    },
}

impl EndpointError {
    /// Returns the original error.
    #[must_use]
    pub fn into_source(self) -> anyhow::Error {
        match self {
            Self::Unhandled { source, .. } => source,
        }
    }
}

/// A compiled, callable endpoint.
///
/// # Example
///
/// ```rust
/// use heron_server::{Endpoint, ErrorRegistry, Handler, HandlerReturn};
/// use heron_signature::CompileContext;
/// use heron_core::{Container, ParamDecl, TypeExpr};
/// use heron_extract::RequestContext;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let ctx = CompileContext::new(Arc::new(Container::new()));
/// let handler = Handler::new("double", |args| async move {
///     let n: i64 = args.parse("n")?;
///     Ok(HandlerReturn::Value(json!(n * 2)))
/// })
/// .param(ParamDecl::new("n", TypeExpr::int()));
///
/// let endpoint = Endpoint::compile(&ctx, "/double", handler, Arc::new(ErrorRegistry::default())).unwrap();
/// let request = RequestContext::builder().uri("/double?n=21").build();
/// let response = endpoint.handle(request).await.unwrap();
///
/// let body = response.into_body().collect().await.unwrap();
/// assert_eq!(&body[..], b"42");
/// # });
/// ```
#[derive(Clone)]
pub struct Endpoint {
    handler: Handler,
    signature: Arc<EndpointSignature>,
    graph: Arc<dyn DependencyGraph>,
    errors: Arc<ErrorRegistry>,
    options: BindingOptions,
}

impl Endpoint {
    /// Compiles `handler` for `route`.
    ///
    /// # Errors
    ///
    /// Returns the first [`heron_core::CompileError`] found.
    pub fn compile(
        ctx: &CompileContext,
        route: &str,
        handler: Handler,
        errors: Arc<ErrorRegistry>,
    ) -> CompileResult<Self> {
        let signature = EndpointSignature::compile(
            ctx,
            route,
            handler.params(),
            handler.return_annotation(),
        )?;
        Ok(Self {
            handler,
            signature: Arc::new(signature),
            graph: Arc::clone(ctx.graph()),
            errors,
            options: ctx.options().clone(),
        })
    }

    /// Returns the compiled signature.
    #[must_use]
    pub fn signature(&self) -> &EndpointSignature {
        &self.signature
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Unhandled`] when a failure matches no solver.
    pub async fn handle(&self, request: RequestContext) -> Result<Response, EndpointError> {
        let mut guard = ScopeGuard(
            self.signature
                .scoped()
                .then(|| Arc::clone(&self.graph).open_scope()),
        );
        let resolver: Arc<dyn Resolver> = match &guard.0 {
            Some(scope) => Arc::clone(scope).as_resolver(),
            None => Arc::clone(&self.graph).as_resolver(),
        };

        let outcome = self.run(&request, &resolver).await;
        drop(resolver);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => match self.errors.solve(&err) {
                Some(response) => response,
                None => {
                    tracing::error!(
                        route = %self.signature.route(),
                        handler = self.handler.name(),
                        error = %err,
                        "unhandled endpoint error"
                    );
                    guard.close().await;
                    return Err(EndpointError::Unhandled {
                        route: self.signature.route().to_string(),
                        source: err,
                    });
                }
            },
        };

        let mut response = finalize(response);
        if guard.is_open() && response.body().is_stream() {
            let body = std::mem::take(response.body_mut());
            *response.body_mut() = close_after(body, guard);
        } else {
            guard.close().await;
        }
        Ok(response)
    }

    async fn run(
        &self,
        request: &RequestContext,
        resolver: &Arc<dyn Resolver>,
    ) -> anyhow::Result<Response> {
        let mut bound = RequestBinder::new(&self.signature, &self.options)
            .validate_request(request, resolver)
            .await
            .map_err(|err| match err {
                BindError::Invalid(invalid) => anyhow::Error::new(invalid),
                other => anyhow::Error::new(other),
            })?;
        let args = bound.take_params();

        let returned = self
            .handler
            .call(args, self.options.offload_sync_handlers)
            .await;
        drop(bound);
        self.render(returned?)
    }

    fn render(&self, returned: HandlerReturn) -> anyhow::Result<Response> {
        let default = self.signature.default_status();
        match returned {
            HandlerReturn::Response(response) => Ok(response),
            HandlerReturn::Value(value) => self.encode(default, &value),
            HandlerReturn::WithStatus(status, value) => self.encode(status, &value),
            HandlerReturn::Streaming(items) => {
                let (encoder, content_type) = self.encoding(default, true);
                Ok(build(default, content_type, ResponseBody::stream(encode_stream(items, encoder))))
            }
        }
    }

    fn encode(&self, status: StatusCode, value: &Value) -> anyhow::Result<Response> {
        let (encoder, content_type) = self.encoding(status, false);
        let body = encoder.encode(value)?;
        Ok(build(status, content_type, ResponseBody::Full(body)))
    }

    /// Undeclared statuses borrow the default status's encoder.
    fn encoding(&self, status: StatusCode, streaming: bool) -> (Encoder, Option<&'static str>) {
        let spec: Option<&ReturnSpec> = self
            .signature
            .return_spec(status)
            .or_else(|| self.signature.return_spec(self.signature.default_status()));
        let encoder = match spec {
            Some(spec) => spec.encoder,
            None if streaming => Encoder::EventStream,
            None => Encoder::Json,
        };
        let encoder = if streaming && encoder == Encoder::Empty {
            Encoder::EventStream
        } else {
            encoder
        };
        (encoder, encoder.content_type())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("handler", &self.handler)
            .field("route", &self.signature.route().as_str())
            .field("scoped", &self.signature.scoped())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

fn encode_stream(
    items: ItemStream,
    encoder: Encoder,
) -> impl futures_util::Stream<Item = anyhow::Result<Bytes>> {
    items.map(move |item: anyhow::Result<Value>| -> anyhow::Result<Bytes> {
        Ok(encoder.encode_item(&item?)?)
    })
}

/// Empties the body of responses whose status forbids one.
fn finalize(mut response: Response) -> Response {
    if forbids_body(response.status()) {
        *response.body_mut() = ResponseBody::Empty;
        response.headers_mut().remove(CONTENT_TYPE);
    }
    response
}

async fn close_scope(scope: Option<Arc<dyn ResolverScope>>) {
    if let Some(scope) = scope {
        if let Err(err) = scope.close().await {
            tracing::warn!(error = %err, "failed to close request scope");
        }
    }
}

/// Closes the scope when dropped, unless already closed.
struct ScopeGuard(Option<Arc<dyn ResolverScope>>);

impl ScopeGuard {
    fn is_open(&self) -> bool {
        self.0.is_some()
    }

    async fn close(&mut self) {
        close_scope(self.0.take()).await;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(scope) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_scope(Some(scope)));
            }
            Err(_) => tracing::warn!("request scope dropped outside a runtime; disposers skipped"),
        }
    }
}

fn close_after(body: ResponseBody, guard: ScopeGuard) -> ResponseBody {
    let ResponseBody::Stream(chunks) = body else {
        return body;
    };
    let tail = stream::once(async move {
        let mut guard = guard;
        guard.close().await;
    })
    .filter_map(|()| async { None::<anyhow::Result<Bytes>> });
    ResponseBody::stream(chunks.chain(tail))
}
