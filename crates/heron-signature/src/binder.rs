//! Request binding.
//!
//! [`RequestBinder::validate_request`] turns one request into the argument
//! map of a compiled endpoint, in a fixed order:
//!
//! 1. path, query, header and cookie params are decoded, collecting every
//!    problem instead of stopping at the first;
//! 2. the body param, if any, is read and decoded;
//! 3. any collected problem fails the request with one [`InvalidRequest`];
//! 4. plugin and dispatch-time params are loaded;
//! 5. dependencies are resolved, seeing every value bound so far;
//! 6. names bound only for nested dependencies are removed.

use heron_core::{ArgValue, BoundArgs, InjectableKind, Instance, ResolveError, Resolver, ResolverHandle};
use heron_extract::{
    BodyInput, BodyKind, FormError, InvalidRequest, Location, MultipartConfig, RequestContext,
    ValidationProblem,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::param::{BodyParam, PluginParam, PluginSource, TextParam};
use crate::signature::EndpointSignature;

/// Default maximum request body size (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Options applied while compiling and binding endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOptions {
    /// Maximum JSON body size in bytes.
    pub max_body_size: usize,
    /// Form reader limits.
    pub multipart: MultipartConfig,
    /// Run blocking handlers on the blocking pool.
    pub offload_sync_handlers: bool,
    /// Warn about route placeholders no parameter consumes.
    pub warn_unused_path_keys: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            multipart: MultipartConfig::default(),
            offload_sync_handlers: true,
            warn_unused_path_keys: true,
        }
    }
}

impl BindingOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum JSON body size.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Sets the form reader limits.
    #[must_use]
    pub fn multipart(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    /// Sets whether blocking handlers are offloaded.
    #[must_use]
    pub fn offload_sync_handlers(mut self, offload: bool) -> Self {
        self.offload_sync_handlers = offload;
        self
    }
}

/// A callback run once binding resources are no longer needed.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Per-request binding state, owned by the task handling the request.
///
/// Cleanup callbacks run newest first, either through
/// [`ParseResult::run_cleanup`] or when the result is dropped.
#[derive(Default)]
pub struct ParseResult {
    /// Bound arguments.
    pub params: BoundArgs,
    /// Problems collected so far.
    pub errors: Vec<ValidationProblem>,
    callbacks: Vec<Cleanup>,
}

impl ParseResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup callback.
    pub fn defer(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Returns the number of cleanup callbacks not yet run.
    #[must_use]
    pub fn pending_cleanup(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns `true` if any problem was collected.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Takes the bound arguments, leaving an empty map.
    pub fn take_params(&mut self) -> BoundArgs {
        std::mem::take(&mut self.params)
    }

    /// Runs every pending cleanup callback, newest first.
    pub fn run_cleanup(&mut self) {
        while let Some(callback) = self.callbacks.pop() {
            callback();
        }
    }
}

impl Drop for ParseResult {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

impl fmt::Debug for ParseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseResult")
            .field("params", &self.params)
            .field("errors", &self.errors)
            .field("pending_cleanup", &self.callbacks.len())
            .finish()
    }
}

/// Error when a request cannot be bound.
#[derive(Error, Debug)]
pub enum BindError {
    /// One or more wire values failed to decode.
    #[error(transparent)]
    Invalid(#[from] InvalidRequest),

    /// A dependency could not be resolved.
    #[error("failed to resolve dependency '{param}': {source}")]
    Dependency {
        /// Parameter name.
        param: String,
        /// Resolver error.
        #[source]
        source: ResolveError,
    },

    /// A plugin or dispatch-time value could not be loaded.
    #[error("failed to load '{param}': {source}")]
    Plugin {
        /// Parameter name.
        param: String,
        /// Provider error.
        #[source]
        source: anyhow::Error,
    },
}

/// Binds requests against one compiled endpoint.
#[derive(Debug, Clone, Copy)]
pub struct RequestBinder<'a> {
    signature: &'a EndpointSignature,
    options: &'a BindingOptions,
}

impl<'a> RequestBinder<'a> {
    /// Creates a binder.
    #[must_use]
    pub fn new(signature: &'a EndpointSignature, options: &'a BindingOptions) -> Self {
        Self { signature, options }
    }

    /// Decodes every wire parameter, collecting problems.
    pub async fn decode(&self, ctx: &RequestContext) -> ParseResult {
        let mut result = ParseResult::new();
        let sig = self.signature;

        for param in sig.path_params().values() {
            let values: Vec<String> = ctx.path_param(param.alias()).map(str::to_string).into_iter().collect();
            bind_text(&mut result, param, &values);
        }
        for param in sig.query_params().values() {
            bind_text(&mut result, param, ctx.query_all(param.alias()));
        }
        for param in sig.header_params().values() {
            bind_text(&mut result, param, &ctx.header_all(param.alias()));
        }
        for param in sig.cookie_params().values() {
            let values: Vec<String> = ctx.cookie(param.alias()).map(str::to_string).into_iter().collect();
            bind_text(&mut result, param, &values);
        }

        if let Some(body) = sig.body_param() {
            match body.decoder().kind() {
                BodyKind::Json => self.bind_json(&mut result, body, ctx),
                BodyKind::Form => self.bind_form(&mut result, body, ctx).await,
            }
        }
        result
    }

    /// Binds a request.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Invalid`] carrying every decode problem, or the
    /// first plugin or dependency failure. Cleanup callbacks registered so
    /// far run before the error is returned.
    pub async fn validate_request(
        &self,
        ctx: &RequestContext,
        resolver: &Arc<dyn Resolver>,
    ) -> Result<ParseResult, BindError> {
        let mut result = self.decode(ctx).await;

        if result.has_errors() {
            let problems = std::mem::take(&mut result.errors);
            tracing::debug!(
                route = %self.signature.route(),
                problems = problems.len(),
                "request failed validation"
            );
            result.run_cleanup();
            return Err(InvalidRequest::new(problems).into());
        }

        for (name, param) in self.signature.plugin_params() {
            let value = load_plugin(param, ctx, resolver).await.map_err(|source| BindError::Plugin {
                param: name.clone(),
                source,
            })?;
            result.params.insert(name.clone(), value);
        }

        for (name, dep) in self.signature.dependencies() {
            let instance = resolver
                .resolve(&dep.node, &result.params)
                .await
                .map_err(|source| BindError::Dependency {
                    param: name.clone(),
                    source,
                })?;
            result.params.insert(name.clone(), ArgValue::Instance(instance));
        }

        for name in self.signature.transitive_params() {
            result.params.remove(name);
        }
        Ok(result)
    }

    fn bind_json(&self, result: &mut ParseResult, param: &BodyParam, ctx: &RequestContext) {
        let alias = &param.info.alias;
        let body = ctx.body();
        if body.len() > self.options.max_body_size {
            result.errors.push(ValidationProblem::invalid_payload(
                Location::Body,
                alias,
                format!(
                    "body of {} bytes exceeds the limit of {} bytes",
                    body.len(),
                    self.options.max_body_size
                ),
            ));
            return;
        }
        if body.is_empty() {
            bind_default(result, &param.info.name, alias, Location::Body, param.info.default.as_ref());
            return;
        }
        if param.decoder().is_raw() {
            match param.decoder().check_raw(body) {
                Ok(()) => result
                    .params
                    .insert_instance(param.info.name.clone(), Arc::new(body.clone())),
                Err(err) => result.errors.push(ValidationProblem::decode(Location::Body, alias, err)),
            }
            return;
        }
        match param.decoder().decode(BodyInput::Bytes(body)) {
            Ok(Some(value)) => result.params.insert_value(param.info.name.clone(), value),
            Ok(None) => bind_default(result, &param.info.name, alias, Location::Body, param.info.default.as_ref()),
            Err(err) => result.errors.push(ValidationProblem::decode(Location::Body, alias, err)),
        }
    }

    async fn bind_form(&self, result: &mut ParseResult, param: &BodyParam, ctx: &RequestContext) {
        let alias = &param.info.alias;
        if ctx.is_body_empty() {
            bind_default(result, &param.info.name, alias, Location::Body, param.info.default.as_ref());
            return;
        }

        let form = match ctx.form(&self.options.multipart).await {
            Ok(form) => form,
            Err(err @ FormError::TooLarge { .. }) => {
                result
                    .errors
                    .push(ValidationProblem::invalid_payload(Location::Body, alias, err.to_string()));
                return;
            }
            Err(err) => {
                result.errors.push(ValidationProblem::invalid_form(alias, err.to_string()));
                return;
            }
        };

        match param.decoder().decode(BodyInput::Form(&form)) {
            Ok(Some(value)) => result.params.insert_value(param.info.name.clone(), value),
            Ok(None) => bind_default(result, &param.info.name, alias, Location::Body, param.info.default.as_ref()),
            Err(err) => result.errors.push(ValidationProblem::decode(Location::Body, alias, err)),
        }

        let fields = form.len();
        result.defer(move || {
            drop(form);
            tracing::trace!(fields, "released request form");
        });
    }
}

/// Binds `ctx` against `signature`.
///
/// # Errors
///
/// See [`RequestBinder::validate_request`].
pub async fn bind(
    signature: &EndpointSignature,
    ctx: &RequestContext,
    resolver: &Arc<dyn Resolver>,
    options: &BindingOptions,
) -> Result<ParseResult, BindError> {
    RequestBinder::new(signature, options)
        .validate_request(ctx, resolver)
        .await
}

fn bind_text(result: &mut ParseResult, param: &TextParam, values: &[String]) {
    if values.is_empty() {
        bind_default(result, param.name(), param.alias(), param.location, param.info.default.as_ref());
        return;
    }
    match param.decoder().decode(values) {
        Ok(value) => result.params.insert_value(param.name(), value),
        Err(err) => result
            .errors
            .push(ValidationProblem::decode(param.location, param.alias(), err)),
    }
}

fn bind_default(
    result: &mut ParseResult,
    name: &str,
    alias: &str,
    location: Location,
    default: Option<&serde_json::Value>,
) {
    match default {
        Some(value) => result.params.insert_value(name, value.clone()),
        None => result.errors.push(ValidationProblem::missing(location, alias)),
    }
}

async fn load_plugin(
    param: &PluginParam,
    ctx: &RequestContext,
    resolver: &Arc<dyn Resolver>,
) -> anyhow::Result<ArgValue> {
    let handle = |found: Option<&Instance>, what: &str| match (found, &param.info.default) {
        (Some(instance), _) => Ok(ArgValue::Instance(Arc::clone(instance))),
        (None, Some(default)) => Ok(ArgValue::Value(default.clone())),
        (None, None) => Err(anyhow::anyhow!("no {what} is attached to the request")),
    };

    match &param.source {
        PluginSource::Injectable(InjectableKind::Request) => {
            Ok(ArgValue::Instance(Arc::new(ctx.clone())))
        }
        PluginSource::Injectable(InjectableKind::Resolver) => Ok(ArgValue::Instance(Arc::new(
            ResolverHandle(Arc::clone(resolver)),
        ))),
        PluginSource::Injectable(InjectableKind::EventBus) => handle(ctx.event_bus(), "event bus"),
        PluginSource::Injectable(InjectableKind::Socket) => handle(ctx.socket(), "socket"),
        PluginSource::Provider { provider, .. } => provider.load(ctx, resolver, param).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::CompileContext;
    use heron_core::types::marks;
    use heron_core::{Container, ParamDecl, RecordType, TypeExpr};
    use heron_extract::ProblemKind;
    use bytes::Bytes;
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Pagination {
        page: i64,
    }

    fn container() -> Arc<Container> {
        let mut container = Container::new();
        container.factory::<Pagination, _, _>(
            vec![ParamDecl::new("page", TypeExpr::int()).with_default(json!(1))],
            |args: BoundArgs| async move {
                Ok(Pagination {
                    page: args.parse::<i64>("page")?,
                })
            },
        );
        Arc::new(container)
    }

    fn compile(route: &str, params: &[ParamDecl]) -> (EndpointSignature, Arc<dyn Resolver>) {
        let graph = container();
        let ctx = CompileContext::new(graph.clone());
        let signature = EndpointSignature::compile(&ctx, route, params, None).unwrap();
        let resolver: Arc<dyn Resolver> = graph;
        (signature, resolver)
    }

    fn user() -> TypeExpr {
        TypeExpr::record(
            RecordType::new("User")
                .field("id", TypeExpr::int())
                .field("name", TypeExpr::str())
                .field("email", TypeExpr::str()),
        )
    }

    fn problems(err: BindError) -> Vec<ValidationProblem> {
        match err {
            BindError::Invalid(invalid) => invalid.into_problems(),
            other => panic!("expected invalid request, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_binds_json_body() {
        let (signature, resolver) = compile(
            "/users/{user_id}",
            &[
                ParamDecl::new("user_id", TypeExpr::str()),
                ParamDecl::new("user", user()),
            ],
        );
        let body = json!({"id": 1, "name": "a", "email": "b"});
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/users/42")
            .path_param("user_id", "42")
            .json(&body)
            .build();

        let result = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.params.value("user"), Some(&body));
        assert_eq!(result.params.value("user_id"), Some(&json!("42")));
    }

    #[tokio::test]
    async fn test_empty_body_is_missing() {
        let (signature, resolver) = compile(
            "/users/{user_id}",
            &[
                ParamDecl::new("user_id", TypeExpr::str()),
                ParamDecl::new("user", user()),
            ],
        );
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/users/42")
            .path_param("user_id", "42")
            .build();

        let err = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap_err();
        let problems = problems(err);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::MissingParam);
        assert_eq!(problems[0].location, Location::Body);
    }

    #[tokio::test]
    async fn test_query_problems() {
        let (signature, resolver) = compile(
            "/search",
            &[
                ParamDecl::new("limit", TypeExpr::int()),
                ParamDecl::new("filter", TypeExpr::map(TypeExpr::str())).with_default(json!({})),
            ],
        );
        let options = BindingOptions::default();

        let missing = RequestContext::builder().uri("/search").build();
        let problems_missing = problems(bind(&signature, &missing, &resolver, &options).await.unwrap_err());
        assert_eq!(problems_missing.len(), 1);
        assert_eq!(problems_missing[0].kind, ProblemKind::MissingParam);
        assert_eq!(problems_missing[0].location, Location::Query);

        let wrong = RequestContext::builder().uri("/search?limit=abc").build();
        let problems_wrong = problems(bind(&signature, &wrong, &resolver, &options).await.unwrap_err());
        assert_eq!(problems_wrong[0].kind, ProblemKind::InvalidType);

        let broken = RequestContext::builder()
            .uri("/search?limit=1&filter=%7Bbroken")
            .build();
        let problems_broken = problems(bind(&signature, &broken, &resolver, &options).await.unwrap_err());
        assert_eq!(problems_broken.len(), 1);
        assert_eq!(problems_broken[0].kind, ProblemKind::InvalidPayload);
    }

    #[tokio::test]
    async fn test_problems_accumulate_across_sources() {
        let (signature, resolver) = compile(
            "/users",
            &[
                ParamDecl::new("limit", TypeExpr::int()),
                ParamDecl::new("x_token", marks::header(TypeExpr::str())),
                ParamDecl::new("user", user()),
            ],
        );
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/users?limit=nope")
            .build();

        let problems = problems(
            bind(&signature, &ctx, &resolver, &BindingOptions::default())
                .await
                .unwrap_err(),
        );
        let locations: Vec<Location> = problems.iter().map(|p| p.location).collect();
        assert_eq!(locations, vec![Location::Query, Location::Header, Location::Body]);
        assert_eq!(problems[1].param, "x-token");
    }

    #[tokio::test]
    async fn test_dependency_sees_bound_values_and_transitive_removed() {
        let (signature, resolver) = compile(
            "/items",
            &[ParamDecl::new("pages", TypeExpr::named::<Pagination>())],
        );
        let ctx = RequestContext::builder().uri("/items?page=3").build();

        let result = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap();
        let pages = result.params.require::<Pagination>("pages").unwrap();
        assert_eq!(pages.page, 3);
        assert!(!result.params.contains("page"));
    }

    #[tokio::test]
    async fn test_injectables() {
        let (signature, resolver) = compile(
            "/",
            &[
                ParamDecl::new("request", TypeExpr::injectable(InjectableKind::Request)),
                ParamDecl::new("resolver", TypeExpr::injectable(InjectableKind::Resolver)),
            ],
        );
        let ctx = RequestContext::builder().uri("/?a=1").build();

        let result = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap();
        let request = result.params.require::<RequestContext>("request").unwrap();
        assert_eq!(request.query("a"), Some("1"));
        assert!(result.params.require::<ResolverHandle>("resolver").is_ok());
    }

    #[tokio::test]
    async fn test_missing_event_bus_fails() {
        let (signature, resolver) = compile(
            "/",
            &[ParamDecl::new("bus", TypeExpr::injectable(InjectableKind::EventBus))],
        );
        let ctx = RequestContext::builder().build();
        let err = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::Plugin { ref param, .. } if param == "bus"));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let (signature, resolver) = compile("/", &[ParamDecl::new("user", user())]);
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .json(&json!({"id": 1, "name": "a", "email": "b"}))
            .build();
        let options = BindingOptions::default().max_body_size(8);

        let problems = problems(bind(&signature, &ctx, &resolver, &options).await.unwrap_err());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::InvalidPayload);
    }

    #[tokio::test]
    async fn test_binds_raw_bytes_body() {
        let (signature, resolver) = compile("/upload", &[ParamDecl::new("raw", marks::body(TypeExpr::bytes()))]);
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("content-type", "application/octet-stream")
            .body(vec![0xff_u8, 0xfe, 0x00])
            .build();

        let result = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap();
        assert!(result.errors.is_empty());
        let raw = result.params.require::<Bytes>("raw").unwrap();
        assert_eq!(raw.as_ref(), &Bytes::from_static(&[0xff, 0xfe, 0x00]));
    }

    #[tokio::test]
    async fn test_raw_bytes_length_constraint() {
        let ty = marks::body(TypeExpr::bytes().constrained(heron_core::Constraint::MaxLength(2)));
        let (signature, resolver) = compile("/upload", &[ParamDecl::new("raw", ty)]);
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(vec![0xff_u8, 0xfe, 0x00])
            .build();

        let problems = problems(
            bind(&signature, &ctx, &resolver, &BindingOptions::default())
                .await
                .unwrap_err(),
        );
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].location, Location::Body);
        assert_eq!(problems[0].kind, ProblemKind::InvalidType);
    }

    #[tokio::test]
    async fn test_form_registers_cleanup() {
        let form = TypeExpr::record(
            RecordType::new("Login")
                .field("name", TypeExpr::str())
                .field("age", TypeExpr::int()),
        );
        let (signature, resolver) = compile("/", &[ParamDecl::new("login", marks::form(form))]);
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=a&age=3")
            .build();

        let mut result = bind(&signature, &ctx, &resolver, &BindingOptions::default())
            .await
            .unwrap();
        assert_eq!(result.params.value("login"), Some(&json!({"name": "a", "age": 3})));
        assert_eq!(result.pending_cleanup(), 1);
        result.run_cleanup();
        assert_eq!(result.pending_cleanup(), 0);
    }

    #[tokio::test]
    async fn test_malformed_form_is_invalid_form() {
        let (signature, resolver) = compile(
            "/",
            &[ParamDecl::new("file", TypeExpr::Upload)],
        );
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .header("content-type", "multipart/form-data")
            .body("garbage")
            .build();

        let problems = problems(
            bind(&signature, &ctx, &resolver, &BindingOptions::default())
                .await
                .unwrap_err(),
        );
        assert_eq!(problems[0].kind, ProblemKind::InvalidForm);
    }

    #[test]
    fn test_decode_without_runtime_setup() {
        let (signature, _) = compile("/", &[ParamDecl::new("q", TypeExpr::str())]);
        let ctx = RequestContext::builder().uri("/?q=a&q=b").build();
        let options = BindingOptions::default();
        let result = tokio_test::block_on(RequestBinder::new(&signature, &options).decode(&ctx));
        assert!(!result.has_errors());
        assert_eq!(result.params.value("q"), Some(&json!("b")));
    }

    #[test]
    fn test_cleanup_runs_on_drop() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let mut result = ParseResult::new();
            for _ in 0..2 {
                let runs = Arc::clone(&runs);
                result.defer(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
